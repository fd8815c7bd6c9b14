//! Calendar source for policy decisions
//!
//! All loan and reservation dates are whole calendar days in the library's
//! time zone. The clock is injected so tests can move time deterministically.

use std::sync::atomic::{AtomicI32, Ordering};

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::error::{AppError, AppResult};

#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current calendar date in the library's time zone
    fn today(&self) -> NaiveDate;

    /// Current instant, used for payment timestamps
    fn now(&self) -> DateTime<Utc>;
}

/// `date` plus a policy duration in days
pub fn add_days(date: NaiveDate, days: i32) -> AppResult<NaiveDate> {
    u64::try_from(days)
        .ok()
        .and_then(|days| date.checked_add_days(Days::new(days)))
        .ok_or_else(|| AppError::Internal(format!("Cannot add {} days to {}", days, date)))
}

/// Wall clock shifted to the library's UTC offset
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| {
            tracing::warn!(utc_offset_minutes, "Invalid library UTC offset, falling back to UTC");
            Utc.fix()
        });
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    days_from_ce: AtomicI32,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            days_from_ce: AtomicI32::new(today.num_days_from_ce()),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        self.days_from_ce.store(today.num_days_from_ce(), Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: i32) {
        self.days_from_ce.fetch_add(days, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        let days = self.days_from_ce.load(Ordering::SeqCst);
        NaiveDate::from_num_days_from_ce_opt(days).unwrap_or(NaiveDate::MIN)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.today().and_time(NaiveTime::default()))
    }
}
