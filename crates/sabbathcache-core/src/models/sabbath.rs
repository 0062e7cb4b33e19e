use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::is_within_sabbath;

/// Date format used for week-keys (the Friday's calendar date).
const WEEK_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum TimesError {
    #[error("Friday sunset {friday} is not before Saturday sunset {saturday}")]
    OutOfOrder {
        friday: DateTime<FixedOffset>,
        saturday: DateTime<FixedOffset>,
    },

    #[error("Invalid cached timestamp {value}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("No Sabbath week near {0} fits the supported calendar range")]
    OutOfRange(NaiveDate),
}

/// Calendar dates bounding one Sabbath. The Saturday is always the day after the Friday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SabbathWeek {
    pub friday: NaiveDate,
    pub saturday: NaiveDate,
}

impl SabbathWeek {
    /// `None` when the Saturday would fall past the last representable date.
    pub fn from_friday(friday: NaiveDate) -> Option<Self> {
        Some(Self {
            friday,
            saturday: friday.succ_opt()?,
        })
    }

    /// Cache key identifying this week.
    pub fn key(&self) -> String {
        self.friday.format(WEEK_KEY_FORMAT).to_string()
    }

    /// The same boundaries one week later.
    pub fn next(&self) -> Option<Self> {
        Self::from_friday(self.friday.checked_add_signed(Duration::weeks(1))?)
    }
}

/// Friday and Saturday sunsets as returned by the sunset API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabbathTimes {
    pub friday: DateTime<FixedOffset>,
    pub saturday: DateTime<FixedOffset>,
}

impl SabbathTimes {
    /// Build from two sunsets. The Saturday timestamp is expressed in the
    /// Friday's offset so both carry the same timezone.
    pub fn new(
        friday: DateTime<FixedOffset>,
        saturday: DateTime<FixedOffset>,
    ) -> Result<Self, TimesError> {
        if friday >= saturday {
            return Err(TimesError::OutOfOrder { friday, saturday });
        }
        Ok(Self {
            friday,
            saturday: saturday.with_timezone(friday.offset()),
        })
    }
}

/// Cached row in the `sabbath_times` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabbathTimesEntity {
    pub id: String,
    pub friday: String,
    pub saturday: String,
}

impl SabbathTimesEntity {
    pub fn from_times(key: &str, times: &SabbathTimes) -> Self {
        Self {
            id: key.to_string(),
            friday: times.friday.to_rfc3339(),
            saturday: times.saturday.to_rfc3339(),
        }
    }

    pub fn to_times(&self) -> Result<SabbathTimes, TimesError> {
        let parse = |value: &str| {
            DateTime::parse_from_rfc3339(value).map_err(|source| TimesError::InvalidTimestamp {
                value: value.to_string(),
                source,
            })
        };
        SabbathTimes::new(parse(&self.friday)?, parse(&self.saturday)?)
    }
}

/// Sabbath details ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SabbathInfo {
    pub week_key: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub location: String,
    pub is_sabbath: bool,
}

impl SabbathInfo {
    pub fn new(week_key: String, times: &SabbathTimes, location: String, now: DateTime<Utc>) -> Self {
        Self {
            week_key,
            start: times.friday,
            end: times.saturday,
            location,
            is_sabbath: is_within_sabbath(&now, &times.friday, &times.saturday),
        }
    }

    /// Whether the Sabbath described here is already over at `now`.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end.with_timezone(&Utc)
    }

    /// Human readable countdown, e.g. "starts in 2d 4h" or "ends in 35m".
    pub fn countdown_display(&self, now: DateTime<Utc>) -> String {
        let start = self.start.with_timezone(&Utc);
        let end = self.end.with_timezone(&Utc);
        if now < start {
            format!("starts in {}", format_span(start - now))
        } else if now < end {
            format!("ends in {}", format_span(end - now))
        } else {
            "ended".to_string()
        }
    }
}

fn format_span(span: Duration) -> String {
    let minutes = span.num_minutes().max(0);
    if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 1440 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}d {}h", minutes / 1440, (minutes % 1440) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_week_key_and_next() {
        let week = SabbathWeek::from_friday(NaiveDate::from_ymd_opt(2025, 9, 26).unwrap()).unwrap();
        assert_eq!(week.key(), "2025-09-26");
        assert_eq!(week.saturday, NaiveDate::from_ymd_opt(2025, 9, 27).unwrap());

        let next = week.next().unwrap();
        assert_eq!(next.friday, NaiveDate::from_ymd_opt(2025, 10, 3).unwrap());
        assert_eq!(next.saturday, NaiveDate::from_ymd_opt(2025, 10, 4).unwrap());
    }

    #[test]
    fn test_week_at_end_of_calendar() {
        assert!(SabbathWeek::from_friday(NaiveDate::MAX).is_none());

        let last_friday = NaiveDate::MAX - Duration::days(3);
        let week = SabbathWeek::from_friday(last_friday).unwrap();
        assert_eq!(week.saturday, last_friday + Duration::days(1));
        assert!(week.next().is_none());
    }

    #[test]
    fn test_times_rejects_out_of_order() {
        let result = SabbathTimes::new(
            ts("2025-09-27T19:00:00-04:00"),
            ts("2025-09-26T18:00:00-04:00"),
        );
        assert!(matches!(result, Err(TimesError::OutOfOrder { .. })));
    }

    #[test]
    fn test_times_share_friday_offset() {
        let times = SabbathTimes::new(
            ts("2025-09-26T18:00:00-04:00"),
            ts("2025-09-27T22:00:00+00:00"),
        )
        .unwrap();
        assert_eq!(times.saturday.offset(), times.friday.offset());
        assert_eq!(times.saturday, ts("2025-09-27T18:00:00-04:00"));
    }

    #[test]
    fn test_entity_conversion() {
        let times = SabbathTimes::new(
            ts("2025-09-26T18:55:12-04:00"),
            ts("2025-09-27T18:53:40-04:00"),
        )
        .unwrap();
        let entity = SabbathTimesEntity::from_times("2025-09-26", &times);
        assert_eq!(entity.id, "2025-09-26");
        assert_eq!(entity.friday, "2025-09-26T18:55:12-04:00");
        assert_eq!(entity.to_times().unwrap(), times);
    }

    #[test]
    fn test_entity_with_garbage_timestamp() {
        let entity = SabbathTimesEntity {
            id: "2025-09-26".to_string(),
            friday: "not a date".to_string(),
            saturday: "2025-09-27T18:53:40-04:00".to_string(),
        };
        assert!(matches!(
            entity.to_times(),
            Err(TimesError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_info_flags_and_countdown() {
        let times = SabbathTimes::new(
            ts("2025-09-26T18:00:00-04:00"),
            ts("2025-09-27T19:00:00-04:00"),
        )
        .unwrap();

        let before = ts("2025-09-26T14:30:00-04:00").with_timezone(&Utc);
        let info = SabbathInfo::new("2025-09-26".to_string(), &times, "Here".to_string(), before);
        assert!(!info.is_sabbath);
        assert!(!info.has_ended(before));
        assert_eq!(info.countdown_display(before), "starts in 3h 30m");

        let during = ts("2025-09-27T12:00:00-04:00").with_timezone(&Utc);
        let info = SabbathInfo::new("2025-09-26".to_string(), &times, "Here".to_string(), during);
        assert!(info.is_sabbath);
        assert_eq!(info.countdown_display(during), "ends in 7h 0m");

        let after = ts("2025-09-27T19:00:00-04:00").with_timezone(&Utc);
        let info = SabbathInfo::new("2025-09-26".to_string(), &times, "Here".to_string(), after);
        assert!(!info.is_sabbath);
        assert!(info.has_ended(after));
        assert_eq!(info.countdown_display(after), "ended");
    }
}
