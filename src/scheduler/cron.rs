//! Cron-style schedules.
//!
//! Accepts six fields (`sec min hour dom month dow`) or the classic five,
//! in which case seconds are fixed at 0. Times are evaluated in UTC.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Cron parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 or 6 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} value {value} is outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// How far ahead `next_after` searches before concluding the schedule never fires.
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Names for values, starting at `min`
    aliases: &'static [&'static str],
}

const SECOND: FieldSpec = FieldSpec { name: "second", min: 0, max: 59, aliases: &[] };
const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, aliases: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, aliases: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, aliases: &[] };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, aliases: &MONTH_NAMES };
// 7 is accepted as a second spelling of Sunday.
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, aliases: &WEEKDAY_NAMES };

/// The set of values one field matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    bits: u64,
    /// False when the field was written starting with `*`
    restricted: bool,
}

impl Field {
    fn single(value: u32) -> Self {
        Self {
            bits: 1 << value,
            restricted: true,
        }
    }

    fn every(bounds: &FieldSpec) -> Self {
        let mut bits = 0;
        for v in bounds.min..=bounds.max {
            bits |= 1 << v;
        }
        Self {
            bits,
            restricted: false,
        }
    }

    fn contains(&self, value: u32) -> bool {
        self.bits & (1 << value) != 0
    }

    fn parse(text: &str, bounds: &FieldSpec) -> Result<Self, CronError> {
        let invalid = || CronError::InvalidValue {
            field: bounds.name,
            value: text.to_string(),
        };

        let mut bits = 0u64;
        for part in text.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| invalid())?;
                    if step == 0 {
                        return Err(invalid());
                    }
                    (range, Some(step))
                }
                None => (part, None),
            };

            let (start, end) = if range == "*" {
                (bounds.min, bounds.max)
            } else if let Some((a, b)) = range.split_once('-') {
                (parse_value(a, bounds)?, parse_value(b, bounds)?)
            } else {
                let v = parse_value(range, bounds)?;
                // `n/s` means from n through the end of the range
                if step.is_some() {
                    (v, bounds.max)
                } else {
                    (v, v)
                }
            };

            if start > end {
                return Err(invalid());
            }

            for v in (start..=end).step_by(step.unwrap_or(1) as usize) {
                bits |= 1 << v;
            }
        }

        Ok(Self {
            bits,
            restricted: !text.starts_with('*'),
        })
    }
}

fn parse_value(text: &str, bounds: &FieldSpec) -> Result<u32, CronError> {
    let lower = text.to_ascii_lowercase();
    if let Some(pos) = bounds.aliases.iter().position(|a| *a == lower) {
        return Ok(bounds.min + pos as u32);
    }

    let value: u32 = text.parse().map_err(|_| CronError::InvalidValue {
        field: bounds.name,
        value: text.to_string(),
    })?;

    if value < bounds.min || value > bounds.max {
        return Err(CronError::OutOfRange {
            field: bounds.name,
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(value)
}

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expression: String,
    seconds: Field,
    minutes: Field,
    hours: Field,
    days_of_month: Field,
    months: Field,
    days_of_week: Field,
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let (second, rest) = match fields.len() {
            6 => (Field::parse(fields[0], &SECOND)?, &fields[1..]),
            5 => (Field::single(0), &fields[..]),
            n => return Err(CronError::FieldCount(n)),
        };

        let mut days_of_week = Field::parse(rest[4], &DAY_OF_WEEK)?;
        if days_of_week.contains(7) {
            days_of_week.bits = (days_of_week.bits & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            seconds: second,
            minutes: Field::parse(rest[0], &MINUTE)?,
            hours: Field::parse(rest[1], &HOUR)?,
            days_of_month: Field::parse(rest[2], &DAY_OF_MONTH)?,
            months: Field::parse(rest[3], &MONTH)?,
            days_of_week,
        })
    }

    /// Fires once a day at 00:00:00 UTC.
    pub fn daily_at_midnight() -> Self {
        Self {
            expression: "0 0 0 * * *".to_string(),
            seconds: Field::single(0),
            minutes: Field::single(0),
            hours: Field::single(0),
            days_of_month: Field::every(&DAY_OF_MONTH),
            months: Field::every(&MONTH),
            days_of_week: Field::every(&WEEKDAY_RANGE),
        }
    }

    #[cfg(test)]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first instant strictly after `after` at which the schedule fires,
    /// or `None` if it never fires within the search horizon.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = after.with_nanosecond(0)? + ChronoDuration::seconds(1);
        let limit = after + ChronoDuration::days(SEARCH_HORIZON_DAYS);

        while t <= limit {
            if !self.months.contains(t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t) {
                t = midnight(t.date_naive().succ_opt()?)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)?.with_second(0)? + ChronoDuration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.with_second(0)? + ChronoDuration::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += ChronoDuration::seconds(1);
                continue;
            }
            return Some(t);
        }

        None
    }

    /// Day-of-month and day-of-week combine with OR when both are restricted.
    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(t.day());
        let dow = self.days_of_week.contains(t.weekday().num_days_from_sunday());
        if self.days_of_month.restricted && self.days_of_week.restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

// Weekday values after folding 7 onto 0.
const WEEKDAY_RANGE: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 6, aliases: &[] };

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn start_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    midnight(NaiveDate::from_ymd_opt(year, month, 1)?)
}

impl FromStr for Schedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_five_seconds() {
        let schedule = Schedule::parse("*/5 * * * * *").unwrap();
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0, 0)), Some(at(2024, 1, 1, 0, 0, 5)));
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0, 7)), Some(at(2024, 1, 1, 0, 0, 10)));
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0, 57)), Some(at(2024, 1, 1, 0, 1, 0)));
    }

    #[test]
    fn test_next_is_strictly_after() {
        let schedule = Schedule::parse("0 * * * * *").unwrap();
        let on_the_minute = at(2024, 1, 1, 10, 30, 0);
        assert_eq!(schedule.next_after(on_the_minute), Some(at(2024, 1, 1, 10, 31, 0)));

        let with_nanos = on_the_minute + ChronoDuration::milliseconds(250);
        assert_eq!(schedule.next_after(with_nanos), Some(at(2024, 1, 1, 10, 31, 0)));
    }

    #[test]
    fn test_five_field_midnight() {
        let schedule = Schedule::parse("0 0 * * *").unwrap();
        assert_eq!(schedule.next_after(at(2024, 2, 28, 13, 45, 10)), Some(at(2024, 2, 29, 0, 0, 0)));
        assert_eq!(schedule.next_after(at(2024, 12, 31, 23, 59, 59)), Some(at(2025, 1, 1, 0, 0, 0)));
        assert_eq!(schedule.expression(), "0 0 * * *");
    }

    #[test]
    fn test_daily_at_midnight_matches_parsed() {
        let built = Schedule::daily_at_midnight();
        let parsed = Schedule::parse("0 0 0 * * *").unwrap();
        let from = at(2024, 3, 10, 8, 0, 0);
        assert_eq!(built.next_after(from), parsed.next_after(from));
        assert_eq!(built.next_after(from), Some(at(2024, 3, 11, 0, 0, 0)));
    }

    #[test]
    fn test_weekday_names_and_ranges() {
        let schedule = Schedule::parse("30 9 * * mon-fri").unwrap();
        // 2024-06-07 is a Friday.
        assert_eq!(schedule.next_after(at(2024, 6, 7, 10, 0, 0)), Some(at(2024, 6, 10, 9, 30, 0)));
        assert_eq!(schedule.next_after(at(2024, 6, 7, 8, 0, 0)), Some(at(2024, 6, 7, 9, 30, 0)));
    }

    #[test]
    fn test_sunday_as_seven() {
        let schedule = Schedule::parse("0 12 * * 7").unwrap();
        // 2024-06-09 is a Sunday.
        assert_eq!(schedule.next_after(at(2024, 6, 5, 0, 0, 0)), Some(at(2024, 6, 9, 12, 0, 0)));
    }

    #[test]
    fn test_day_of_month_or_weekday() {
        // The 15th, or any Monday.
        let schedule = Schedule::parse("0 0 15 * mon").unwrap();
        // 2024-06-11 is a Tuesday; next Monday is the 17th, but the 15th comes first.
        assert_eq!(schedule.next_after(at(2024, 6, 11, 0, 0, 0)), Some(at(2024, 6, 15, 0, 0, 0)));
        assert_eq!(schedule.next_after(at(2024, 6, 15, 0, 0, 0)), Some(at(2024, 6, 17, 0, 0, 0)));
    }

    #[test]
    fn test_lists_steps_and_month_names() {
        let schedule = Schedule::parse("0 0,30 8-18/5 1 jan,jul *").unwrap();
        assert_eq!(schedule.next_after(at(2024, 2, 1, 0, 0, 0)), Some(at(2024, 7, 1, 8, 0, 0)));
        assert_eq!(schedule.next_after(at(2024, 7, 1, 8, 0, 0)), Some(at(2024, 7, 1, 8, 30, 0)));
        assert_eq!(schedule.next_after(at(2024, 7, 1, 8, 30, 0)), Some(at(2024, 7, 1, 13, 0, 0)));
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let schedule = Schedule::parse("0 0 0 30 feb *").unwrap();
        assert_eq!(schedule.next_after(at(2024, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Schedule::parse("* * *"), Err(CronError::FieldCount(3)));
        assert_eq!(Schedule::parse(""), Err(CronError::FieldCount(0)));
        assert!(matches!(
            Schedule::parse("60 * * * * *"),
            Err(CronError::OutOfRange { field: "second", value: 60, .. })
        ));
        assert!(matches!(
            Schedule::parse("*/0 * * * * *"),
            Err(CronError::InvalidValue { field: "second", .. })
        ));
        assert!(matches!(
            Schedule::parse("a * * * *"),
            Err(CronError::InvalidValue { field: "minute", .. })
        ));
        assert!(matches!(
            Schedule::parse("5-1 * * * *"),
            Err(CronError::InvalidValue { field: "minute", .. })
        ));
        assert!(matches!(
            Schedule::parse("0 0 0 * 13 *"),
            Err(CronError::OutOfRange { field: "month", value: 13, .. })
        ));
    }

    #[test]
    fn test_from_str_and_display() {
        let schedule: Schedule = "  */10   * * * * * ".parse().unwrap();
        assert_eq!(schedule.to_string(), "*/10 * * * * *");
    }
}
