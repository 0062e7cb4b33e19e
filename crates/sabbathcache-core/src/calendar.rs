//! Sabbath week calculation.
//!
//! Maps an instant to the Friday/Saturday calendar dates bounding the
//! current or upcoming Sabbath. Weeks run Monday through Sunday: from Monday
//! to Thursday the upcoming Friday is returned, from Friday to Sunday the
//! most recent one. Once a known Sabbath end has passed, the week rolls
//! forward by seven days.
//!
//! All functions here are pure; "now" comes from an injectable [`Clock`].
//! Dates whose week runs off either end of chrono's range yield `None`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::{SabbathWeek, TimesError};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Friday of the Monday-to-Sunday week containing `reference`.
pub fn friday_of_week(reference: NaiveDate) -> Option<NaiveDate> {
    let offset = i64::from(reference.weekday().num_days_from_monday())
        - i64::from(Weekday::Fri.num_days_from_monday());
    reference.checked_sub_signed(Duration::days(offset))
}

/// Saturday of the Monday-to-Sunday week containing `reference`; always the
/// day after [`friday_of_week`].
pub fn saturday_of_week(reference: NaiveDate) -> Option<NaiveDate> {
    friday_of_week(reference)?.succ_opt()
}

/// Week boundaries to query at `now`.
///
/// `now`'s own timezone decides the calendar date. If `known_end` belongs to
/// this week (or a later one) and `now` is past it, the next week is
/// returned instead. An end from an earlier week is stale and ignored.
pub fn week_for_query<Tz2: TimeZone>(
    now: &DateTime<Tz2>,
    known_end: Option<&DateTime<FixedOffset>>,
) -> Option<SabbathWeek> {
    let week = SabbathWeek::from_friday(friday_of_week(now.date_naive())?)?;
    match known_end {
        Some(end) if end.date_naive() >= week.friday && now.with_timezone(&Utc) > end.with_timezone(&Utc) => {
            week.next()
        }
        _ => Some(week),
    }
}

/// Half-open interval test: `start <= now < end`.
pub fn is_within_sabbath<A: TimeZone, B: TimeZone>(
    now: &DateTime<A>,
    start: &DateTime<B>,
    end: &DateTime<B>,
) -> bool {
    let now = now.with_timezone(&Utc);
    start.with_timezone(&Utc) <= now && now < end.with_timezone(&Utc)
}

/// Calculator bound to a timezone and clock.
#[derive(Clone)]
pub struct SabbathCalendar {
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl SabbathCalendar {
    pub fn new(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self { tz, clock }
    }

    pub fn system(tz: Tz) -> Self {
        Self::new(tz, Arc::new(SystemClock))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current instant in the calendar's timezone.
    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    /// Week boundaries containing `date`, without roll-forward.
    pub fn week_of(&self, date: NaiveDate) -> Result<SabbathWeek, TimesError> {
        friday_of_week(date)
            .and_then(SabbathWeek::from_friday)
            .ok_or(TimesError::OutOfRange(date))
    }

    pub fn week_for_query(
        &self,
        known_end: Option<&DateTime<FixedOffset>>,
    ) -> Result<SabbathWeek, TimesError> {
        let now = self.now();
        week_for_query(&now, known_end).ok_or_else(|| TimesError::OutOfRange(now.date_naive()))
    }
}
