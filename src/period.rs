use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::{PayoutError, Result};
use crate::models::PayoutPeriod;

/// Which cutoff a payout run closes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutDay {
    /// `"M"`: Thursday of last week up to Monday of this week.
    Monday,
    /// `"R"`: Monday up to Thursday of this week.
    Thursday,
}

impl PayoutDay {
    pub fn code(self) -> &'static str {
        match self {
            PayoutDay::Monday => "M",
            PayoutDay::Thursday => "R",
        }
    }

    pub fn period(self, effective: DateTime<Utc>, cutoff: NaiveTime) -> PayoutPeriod {
        let today = effective.date_naive();
        match self {
            PayoutDay::Thursday => {
                let monday = monday_of_week(today);
                PayoutPeriod {
                    start: at_cutoff(monday, cutoff),
                    end: at_cutoff(monday + Duration::days(3), cutoff),
                }
            }
            PayoutDay::Monday => PayoutPeriod {
                start: at_cutoff(
                    monday_of_week(today - Duration::days(7)) + Duration::days(3),
                    cutoff,
                ),
                end: at_cutoff(monday_of_week(today), cutoff),
            },
        }
    }
}

impl FromStr for PayoutDay {
    type Err = PayoutError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "M" => Ok(PayoutDay::Monday),
            "R" => Ok(PayoutDay::Thursday),
            other => Err(PayoutError::InvalidArgument(format!(
                "unknown payout day '{other}', expected 'M' or 'R'"
            ))),
        }
    }
}

impl fmt::Display for PayoutDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Resolves the `[start, end)` window for a raw day designator.
pub fn resolve_period(
    day: &str,
    effective: DateTime<Utc>,
    cutoff: NaiveTime,
) -> Result<PayoutPeriod> {
    Ok(day.parse::<PayoutDay>()?.period(effective, cutoff))
}

/// Builds the daily cutoff time, rejecting out-of-range components.
pub fn cutoff_time(hour: u32, minute: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        PayoutError::InvalidArgument(format!("invalid cutoff time {hour:02}:{minute:02}"))
    })
}

pub fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn at_cutoff(date: NaiveDate, cutoff: NaiveTime) -> DateTime<Utc> {
    date.and_time(cutoff).and_utc()
}
