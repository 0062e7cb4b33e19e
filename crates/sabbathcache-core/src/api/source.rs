//! The seam between Sabbath resolution and wherever sunsets come from.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::models::{Coordinates, SabbathTimes, SabbathWeek};

use super::error::{ApiError, DayFailure};

#[async_trait]
pub trait SunsetSource: Send + Sync {
    /// Sunset at `coords` on `date`, expressed in `tz`.
    async fn fetch_sunset(
        &self,
        coords: Coordinates,
        date: NaiveDate,
        tz: Tz,
    ) -> Result<DateTime<FixedOffset>, ApiError>;

    /// Friday and Saturday sunsets for `week`. Both lookups must succeed;
    /// otherwise every failed day is reported in [`ApiError::Incomplete`].
    async fn fetch_sabbath_times(
        &self,
        coords: Coordinates,
        week: SabbathWeek,
        tz: Tz,
    ) -> Result<SabbathTimes, ApiError> {
        let (friday, saturday) = futures::join!(
            self.fetch_sunset(coords, week.friday, tz),
            self.fetch_sunset(coords, week.saturday, tz),
        );

        match (friday, saturday) {
            (Ok(friday), Ok(saturday)) => {
                debug!(week = %week.key(), %friday, %saturday, "Fetched Sabbath sunsets");
                SabbathTimes::new(friday, saturday)
                    .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            }
            (friday, saturday) => {
                let failures: Vec<DayFailure> = [(week.friday, friday), (week.saturday, saturday)]
                    .into_iter()
                    .filter_map(|(date, result)| result.err().map(|error| DayFailure { date, error }))
                    .collect();
                warn!(week = %week.key(), failed = failures.len(), "Sunset lookup incomplete");
                Err(ApiError::Incomplete(failures))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns 18:00 local sunsets, failing on the configured dates.
    struct ScriptedSource {
        fail_on: Vec<NaiveDate>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SunsetSource for ScriptedSource {
        async fn fetch_sunset(
            &self,
            _coords: Coordinates,
            date: NaiveDate,
            tz: Tz,
        ) -> Result<DateTime<FixedOffset>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&date) {
                return Err(ApiError::LookupFailed("INVALID_REQUEST".to_string()));
            }
            let local = date.and_hms_opt(18, 0, 0).unwrap().and_local_timezone(tz).unwrap();
            Ok(local.fixed_offset())
        }
    }

    fn week() -> SabbathWeek {
        SabbathWeek::from_friday(NaiveDate::from_ymd_opt(2025, 9, 26).unwrap()).unwrap()
    }

    fn coords() -> Coordinates {
        Coordinates::new(40.7128, -74.006).unwrap()
    }

    #[tokio::test]
    async fn test_both_days_succeed() {
        let source = ScriptedSource { fail_on: vec![], calls: AtomicUsize::new(0) };
        let times = source.fetch_sabbath_times(coords(), week(), New_York).await.unwrap();
        assert_eq!(times.friday.to_rfc3339(), "2025-09-26T18:00:00-04:00");
        assert_eq!(times.saturday.to_rfc3339(), "2025-09-27T18:00:00-04:00");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_saturday_failure_fails_whole_week() {
        let source = ScriptedSource {
            fail_on: vec![week().saturday],
            calls: AtomicUsize::new(0),
        };
        match source.fetch_sabbath_times(coords(), week(), New_York).await {
            Err(ApiError::Incomplete(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].date, week().saturday);
            }
            other => panic!("expected incomplete error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_both_failures_are_combined() {
        let source = ScriptedSource {
            fail_on: vec![week().friday, week().saturday],
            calls: AtomicUsize::new(0),
        };
        match source.fetch_sabbath_times(coords(), week(), New_York).await {
            Err(ApiError::Incomplete(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("expected incomplete error, got {:?}", other),
        }
    }
}
