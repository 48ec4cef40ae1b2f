//! Reply deadlines measured in business hours.
//!
//! Time is walked one local calendar day at a time. Non-business weekdays
//! contribute nothing; every other day contributes up to the hours left until
//! local midnight. The local zone is a fixed UTC offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, Utc, Weekday};

/// Default reply budget in business hours
pub const DEFAULT_BUDGET_HOURS: i64 = 100;

/// Default local offset (CET, UTC+1)
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 60;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlinePolicy {
    pub budget_hours: i64,
    pub non_business_days: Vec<Weekday>,
    pub utc_offset_minutes: i32,
    /// Zone name printed after formatted instants
    pub zone_label: String,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            budget_hours: DEFAULT_BUDGET_HOURS,
            non_business_days: vec![Weekday::Sat, Weekday::Sun],
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            zone_label: "CET".to_string(),
        }
    }
}

impl DeadlinePolicy {
    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    fn is_business_day(&self, day: Weekday) -> bool {
        !self.non_business_days.contains(&day)
    }

    /// Instant at which the business-hour budget starting at `start` runs out
    pub fn reply_by(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let mut remaining = Duration::hours(self.budget_hours.max(0));
        if remaining.is_zero() || !WEEK.iter().any(|d| self.is_business_day(*d)) {
            return start;
        }

        let mut cursor = start.with_timezone(&self.offset());
        loop {
            let next_midnight = cursor
                .date_naive()
                .succ_opt()
                .and_then(|d| d.and_time(NaiveTime::MIN).and_local_timezone(self.offset()).single())
                .unwrap_or(cursor + Duration::days(1));

            if self.is_business_day(cursor.weekday()) {
                let available = next_midnight - cursor;
                if remaining <= available {
                    return (cursor + remaining).with_timezone(&Utc);
                }
                remaining -= available;
            }
            cursor = next_midnight;
        }
    }

    /// Local rendering used in comments, e.g. `16-Jan-2025 at 13:00 CET`
    pub fn format(&self, instant: DateTime<Utc>) -> String {
        let local = instant.with_timezone(&self.offset());
        format!("{} {}", local.format("%d-%b-%Y at %H:%M"), self.zone_label)
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> chrono::NaiveDate {
        instant.with_timezone(&self.offset()).date_naive()
    }
}
