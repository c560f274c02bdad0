//! Billing period calculation.
//!
//! Periods are anchored to a day of month (1-28, so every month has one) in
//! the account's billing timezone, and resolved to concrete UTC instants for
//! the query layer. Date-only datasets get the local anchor dates instead,
//! which is why [`BillingPeriod`] carries both representations.

use std::fmt;

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Half-open billing window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// Inclusive start instant.
    pub start: DateTime<Utc>,
    /// Exclusive end instant.
    pub end: DateTime<Utc>,
    /// Local calendar date the period starts on.
    pub start_date: NaiveDate,
    /// Local calendar date the period ends on.
    pub end_date: NaiveDate,
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

/// Billing period containing `now`.
///
/// The period starts at local midnight of the most recent anchor day and
/// ends at local midnight of the same day one month later, so period length
/// follows the calendar rather than a fixed number of days.
pub fn current_billing_period(anchor_day: u32, tz: Tz, now: DateTime<Utc>) -> BillingPeriod {
    let anchor = anchor_day.clamp(1, 28);
    let local = now.with_timezone(&tz);

    let (mut year, mut month) = (local.year(), local.month());
    if local.day() < anchor {
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }

    let start_date = anchor_date(year, month, anchor);
    let (end_year, end_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end_date = anchor_date(end_year, end_month, anchor);

    BillingPeriod {
        start: local_midnight(tz, start_date).with_timezone(&Utc),
        end: local_midnight(tz, end_date).with_timezone(&Utc),
        start_date,
        end_date,
    }
}

// Infallible for day <= 28, but stay total rather than panic on a bad call.
fn anchor_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
        .unwrap_or_default()
}

/// Resolve local midnight on `date` to an instant. A DST fold at midnight
/// yields the earliest of the two instants; a DST gap (midnight skipped)
/// falls through to the first hour that exists.
fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    for hour in 0..=3 {
        match tz.with_ymd_and_hms(date.year(), date.month(), date.day(), hour, 0, 0) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => continue,
        }
    }
    // Unreachable with real tzdata; interpret as UTC rather than panic.
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .with_timezone(&tz)
}
