//! Rotation buckets and the schedule that picks between them.
//!
//! Every run files its archives into exactly one bucket. Daily is the
//! fallback; weekly and monthly take over on their scheduled days, but only
//! while their retention is enabled. Selection is a pure function of the
//! calendar date so it can be tested without a clock.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A named retention tier with its own subdirectory under the backup root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Daily,
    Weekly,
    Monthly,
}

impl Bucket {
    /// All buckets, in the order their directories are created.
    pub const ALL: [Bucket; 3] = [Bucket::Daily, Bucket::Weekly, Bucket::Monthly];

    /// Directory name under the backup root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Daily => "daily",
            Bucket::Weekly => "weekly",
            Bucket::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Bucket::Daily),
            "weekly" => Ok(Bucket::Weekly),
            "monthly" => Ok(Bucket::Monthly),
            other => Err(format!(
                "unknown bucket '{other}' (expected daily, weekly or monthly)"
            )),
        }
    }
}

/// Day-of-week schedule value, configured as the lowercase English day name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn to_weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }
}

/// When the weekly and monthly buckets become active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSchedule {
    /// Weekday on which the weekly bucket takes the run.
    pub weekly_on: DayOfWeek,
    /// Day of month (1..=31) on which the monthly bucket takes the run.
    pub monthly_on: u8,
}

/// Per-bucket retention counts.
///
/// A count of zero disables retention for that bucket: nothing is ever
/// deleted from it, and the bucket is skipped during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
}

impl RetentionPolicy {
    /// Retention count for one bucket.
    pub fn retention(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Daily => self.daily,
            Bucket::Weekly => self.weekly,
            Bucket::Monthly => self.monthly,
        }
    }

    /// Whether retention is enabled (count > 0) for one bucket.
    pub fn is_enabled(&self, bucket: Bucket) -> bool {
        self.retention(bucket) > 0
    }
}

/// Pick the bucket today's archives belong to.
///
/// Daily is the fallback. Weekly wins when today matches the scheduled
/// weekday and weekly retention is enabled. The monthly check runs after
/// the weekly one, so monthly overrides weekly when both land on the same
/// date. A disabled bucket (retention zero) never takes the run.
pub fn select_bucket(
    today: NaiveDate,
    schedule: &RotationSchedule,
    policy: &RetentionPolicy,
) -> Bucket {
    let mut bucket = Bucket::Daily;

    if today.weekday() == schedule.weekly_on.to_weekday() && policy.is_enabled(Bucket::Weekly) {
        bucket = Bucket::Weekly;
    }
    if today.day() == u32::from(schedule.monthly_on) && policy.is_enabled(Bucket::Monthly) {
        bucket = Bucket::Monthly;
    }

    bucket
}
