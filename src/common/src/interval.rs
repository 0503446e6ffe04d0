//! Translation of a calendar granularity and value into a half-open time
//! interval.
//!
//! Calendar boundaries ("midnight", "first of the month") are computed in the
//! time zone of the supplied `now` and converted to UTC instants. The epoch
//! form of an interval is derived from the calendar form, so both always carry
//! the same millisecond boundaries.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Utc,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest DST gap we walk through when looking for the first valid local
/// instant of a day.
const MAX_GAP_MINUTES: i64 = 180;

/// Errors produced while turning caller input into an interval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("Invalid granularity '{0}': expected one of year, month, week, day")]
    InvalidGranularity(String),

    #[error("Invalid value '{0}': expected an integer")]
    InvalidValue(String),

    #[error("{granularity} {value} is outside the representable date range")]
    OutOfRange { granularity: Granularity, value: i64 },

    #[error("Invalid date '{input}': {message}")]
    InvalidDate { input: String, message: String },

    #[error("Missing required query parameter '{0}'")]
    MissingBound(&'static str),
}

/// Unit by which a caller selects a time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `value` is the absolute calendar year
    Year,
    /// `value` is a 1-based month of the current year
    Month,
    /// `value` is a number of weeks before now
    Week,
    /// `value` is a day of the current month
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Week => "week",
            Granularity::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Granularity::Year),
            "month" => Ok(Granularity::Month),
            "week" => Ok(Granularity::Week),
            "day" => Ok(Granularity::Day),
            other => Err(IntervalError::InvalidGranularity(other.to_string())),
        }
    }
}

/// Half-open interval `[start, end)` of calendar instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.start <= *instant && *instant < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn to_epoch(&self) -> EpochInterval {
        EpochInterval {
            start_ms: self.start.timestamp_millis(),
            end_ms: self.end.timestamp_millis(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Half-open interval `[start_ms, end_ms)` in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInterval {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl EpochInterval {
    pub fn contains(&self, millis: i64) -> bool {
        self.start_ms <= millis && millis < self.end_ms
    }
}

/// Parse the `:value` path segment.
pub fn parse_value(input: &str) -> Result<i64, IntervalError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| IntervalError::InvalidValue(input.to_string()))
}

/// Resolve a granularity and value against `now` into a calendar interval.
///
/// - `year`: `[Jan 1 of value, Jan 1 of value + 1)`
/// - `month`: the given month of now's year; out-of-range months roll over
///   into neighbouring years
/// - `week`: `[now - 7 * value days, +7 days)`, keeping now's time of day
/// - `day`: the given day of now's month; out-of-range days roll over into
///   neighbouring months
pub fn resolve<Tz: TimeZone>(
    granularity: Granularity,
    value: i64,
    now: &DateTime<Tz>,
) -> Result<Interval, IntervalError> {
    let out_of_range = || IntervalError::OutOfRange { granularity, value };
    let tz = now.timezone();

    let interval = match granularity {
        Granularity::Year => {
            let year = i32::try_from(value).map_err(|_| out_of_range())?;
            let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(out_of_range)?;
            let end = year
                .checked_add(1)
                .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
                .ok_or_else(out_of_range)?;
            calendar_days(&tz, start, end)
        }
        Granularity::Month => {
            let index = (now.year() as i64 * 12)
                .checked_add(value)
                .and_then(|i| i.checked_sub(1))
                .ok_or_else(out_of_range)?;
            let start = first_of_month(index).ok_or_else(out_of_range)?;
            let end = index
                .checked_add(1)
                .and_then(first_of_month)
                .ok_or_else(out_of_range)?;
            calendar_days(&tz, start, end)
        }
        Granularity::Week => {
            let start = weeks_before(now, value).ok_or_else(out_of_range)?;
            start
                .checked_add_signed(TimeDelta::days(7))
                .map(|end| Interval::new(start, end))
        }
        Granularity::Day => {
            let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1).ok_or_else(out_of_range)?;
            let start = value
                .checked_sub(1)
                .and_then(TimeDelta::try_days)
                .and_then(|offset| first.checked_add_signed(offset))
                .ok_or_else(out_of_range)?;
            let end = start.succ_opt().ok_or_else(out_of_range)?;
            calendar_days(&tz, start, end)
        }
    };

    interval.ok_or_else(out_of_range)
}

/// Same as [`resolve`], expressed in epoch milliseconds.
pub fn resolve_epoch<Tz: TimeZone>(
    granularity: Granularity,
    value: i64,
    now: &DateTime<Tz>,
) -> Result<EpochInterval, IntervalError> {
    resolve(granularity, value, now).map(|interval| interval.to_epoch())
}

/// Parse a caller-supplied bound.
///
/// Accepts RFC 3339, a naive date-time (interpreted in `tz`) or a bare
/// `YYYY-MM-DD` date (UTC midnight).
pub fn parse_instant<Tz: TimeZone>(input: &str, tz: &Tz) -> Result<DateTime<Utc>, IntervalError> {
    let input = input.trim();
    let invalid = |message: &str| IntervalError::InvalidDate {
        input: input.to_string(),
        message: message.to_string(),
    };

    if input.is_empty() {
        return Err(invalid("empty date"));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Ok(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| invalid("local time does not exist in the configured time zone"));
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| invalid(&e.to_string()))
}

/// Parse an explicit `startDate`/`endDate` pair into an interval.
pub fn parse_range<Tz: TimeZone>(
    start: Option<&str>,
    end: Option<&str>,
    tz: &Tz,
) -> Result<Interval, IntervalError> {
    let start = start.ok_or(IntervalError::MissingBound("startDate"))?;
    let end = end.ok_or(IntervalError::MissingBound("endDate"))?;

    Ok(Interval::new(parse_instant(start, tz)?, parse_instant(end, tz)?))
}

/// First day of the month at `index` months since year 0.
fn first_of_month(index: i64) -> Option<NaiveDate> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn calendar_days<Tz: TimeZone>(tz: &Tz, start: NaiveDate, end: NaiveDate) -> Option<Interval> {
    Some(Interval::new(
        start_of_day(tz, start)?,
        start_of_day(tz, end)?,
    ))
}

/// Local midnight of `date` in `tz`.
///
/// An ambiguous midnight resolves to the earlier instant; a midnight inside a
/// DST gap resolves to the first valid local instant after it.
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_time(NaiveTime::MIN);

    (0..=MAX_GAP_MINUTES).find_map(|minutes| {
        let candidate = midnight.checked_add_signed(TimeDelta::minutes(minutes))?;
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(local) => Some(local.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    })
}

/// `now` moved back by `weeks` calendar weeks, keeping the local time of day.
fn weeks_before<Tz: TimeZone>(now: &DateTime<Tz>, weeks: i64) -> Option<DateTime<Utc>> {
    let days = weeks.checked_mul(7)?;
    let offset = TimeDelta::try_days(days)?;
    let shifted = now.naive_local().checked_sub_signed(offset)?;

    match now.timezone().from_local_datetime(&shifted) {
        LocalResult::Single(local) => Some(local.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // Skipped local time: fall back to elapsed-time arithmetic
        LocalResult::None => now.with_timezone(&Utc).checked_sub_signed(offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    fn now_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 13, 45, 30).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_granularity_parsing() {
        assert_eq!("year".parse::<Granularity>().unwrap(), Granularity::Year);
        assert_eq!("month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("week".parse::<Granularity>().unwrap(), Granularity::Week);
        assert_eq!("day".parse::<Granularity>().unwrap(), Granularity::Day);
        assert_eq!(
            "hour".parse::<Granularity>(),
            Err(IntervalError::InvalidGranularity("hour".to_string()))
        );
        assert!("Year".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_year_interval() {
        let interval = resolve(Granularity::Year, 2024, &now_utc()).unwrap();
        assert_eq!(interval.start, utc(2024, 1, 1, 0, 0, 0));
        assert_eq!(interval.end, utc(2025, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_month_uses_current_year() {
        let interval = resolve(Granularity::Month, 11, &now_utc()).unwrap();
        assert_eq!(interval.start, utc(2024, 11, 1, 0, 0, 0));
        assert_eq!(interval.end, utc(2024, 12, 1, 0, 0, 0));

        let december = resolve(Granularity::Month, 12, &now_utc()).unwrap();
        assert_eq!(december.end, utc(2025, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_month_rolls_over() {
        let thirteenth = resolve(Granularity::Month, 13, &now_utc()).unwrap();
        assert_eq!(thirteenth.start, utc(2025, 1, 1, 0, 0, 0));

        let zeroth = resolve(Granularity::Month, 0, &now_utc()).unwrap();
        assert_eq!(zeroth.start, utc(2023, 12, 1, 0, 0, 0));
        assert_eq!(zeroth.end, utc(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_week_is_rolling_window() {
        let now = now_utc();
        let interval = resolve(Granularity::Week, 1, &now).unwrap();
        assert_eq!(interval.start, utc(2024, 2, 3, 13, 45, 30));
        assert_eq!(interval.end, now);

        let current = resolve(Granularity::Week, 0, &now).unwrap();
        assert_eq!(current.start, now);
        assert_eq!(current.end, utc(2024, 2, 17, 13, 45, 30));
    }

    #[test]
    fn test_day_of_current_month() {
        let interval = resolve(Granularity::Day, 15, &now_utc()).unwrap();
        assert_eq!(interval.start, utc(2024, 2, 15, 0, 0, 0));
        assert_eq!(interval.end, utc(2024, 2, 16, 0, 0, 0));
    }

    #[test]
    fn test_day_rolls_over() {
        // 2024 is a leap year
        let interval = resolve(Granularity::Day, 30, &now_utc()).unwrap();
        assert_eq!(interval.start, utc(2024, 3, 1, 0, 0, 0));

        let zero = resolve(Granularity::Day, 0, &now_utc()).unwrap();
        assert_eq!(zero.start, utc(2024, 1, 31, 0, 0, 0));
    }

    #[test]
    fn test_out_of_range_values() {
        assert!(matches!(
            resolve(Granularity::Year, i64::MAX, &now_utc()),
            Err(IntervalError::OutOfRange { .. })
        ));
        assert!(matches!(
            resolve(Granularity::Week, i64::MAX / 2, &now_utc()),
            Err(IntervalError::OutOfRange { .. })
        ));
        assert!(matches!(
            resolve(Granularity::Day, i64::MIN, &now_utc()),
            Err(IntervalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_calendar_and_epoch_forms_agree() {
        let now = now_utc();
        let berlin = now.with_timezone(&chrono_tz::Europe::Berlin);

        for granularity in [
            Granularity::Year,
            Granularity::Month,
            Granularity::Week,
            Granularity::Day,
        ] {
            let values: &[i64] = match granularity {
                Granularity::Year => &[1970, 1999, 2024, 2100],
                _ => &[-3, 0, 1, 2, 12, 15, 31, 52],
            };
            for &value in values {
                for interval in [
                    resolve(granularity, value, &now).unwrap(),
                    resolve(granularity, value, &berlin).unwrap(),
                ] {
                    let epoch = interval.to_epoch();
                    assert!(interval.start < interval.end, "{granularity} {value}");
                    assert_eq!(epoch.start_ms, interval.start.timestamp_millis());
                    assert_eq!(epoch.end_ms, interval.end.timestamp_millis());
                }
                assert_eq!(
                    resolve_epoch(granularity, value, &now).unwrap(),
                    resolve(granularity, value, &now).unwrap().to_epoch()
                );
            }
        }
    }

    #[test]
    fn test_boundaries_follow_local_midnight() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 20, 9, 0, 0).unwrap();

        // DST starts on 2024-03-31 at 02:00 local, so that day is 23 hours long
        let interval = resolve(Granularity::Day, 31, &now).unwrap();
        assert_eq!(interval.start, utc(2024, 3, 30, 23, 0, 0));
        assert_eq!(interval.end, utc(2024, 3, 31, 22, 0, 0));
    }

    #[test]
    fn test_midnight_inside_dst_gap() {
        let tz: Tz = "America/Sao_Paulo".parse().unwrap();
        let now = tz.with_ymd_and_hms(2018, 11, 10, 12, 0, 0).unwrap();

        // Clocks jumped from 00:00 to 01:00 on 2018-11-04
        let interval = resolve(Granularity::Day, 4, &now).unwrap();
        assert_eq!(interval.start, utc(2018, 11, 4, 3, 0, 0));
        assert_eq!(interval.end, utc(2018, 11, 5, 2, 0, 0));
    }

    #[test]
    fn test_interval_is_half_open() {
        let interval = resolve(Granularity::Day, 15, &now_utc()).unwrap();
        assert!(interval.contains(&interval.start));
        assert!(!interval.contains(&interval.end));

        let epoch = interval.to_epoch();
        assert!(epoch.contains(epoch.start_ms));
        assert!(!epoch.contains(epoch.end_ms));
        assert!(epoch.contains(epoch.end_ms - 1));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("2024").unwrap(), 2024);
        assert_eq!(parse_value("-1").unwrap(), -1);
        assert!(matches!(
            parse_value("abc"),
            Err(IntervalError::InvalidValue(_))
        ));
        assert!(parse_value("12abc").is_err());
    }

    #[test]
    fn test_parse_instant_formats() {
        assert_eq!(
            parse_instant("2024-01-01T10:00:00+02:00", &Utc).unwrap(),
            utc(2024, 1, 1, 8, 0, 0)
        );
        assert_eq!(
            parse_instant("2024-01-01", &chrono_tz::Europe::Berlin).unwrap(),
            utc(2024, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            parse_instant("2024-01-01T10:00:00", &chrono_tz::Europe::Berlin).unwrap(),
            utc(2024, 1, 1, 9, 0, 0)
        );
        assert_eq!(
            parse_instant("2024-01-01 10:00:00", &Utc).unwrap(),
            utc(2024, 1, 1, 10, 0, 0)
        );
        assert!(matches!(
            parse_instant("not-a-date", &Utc),
            Err(IntervalError::InvalidDate { .. })
        ));
        assert!(parse_instant("", &Utc).is_err());
        assert!(parse_instant("2024-02-30", &Utc).is_err());
    }

    #[test]
    fn test_parse_range_requires_both_bounds() {
        assert_eq!(
            parse_range(None, Some("2024-01-01"), &Utc),
            Err(IntervalError::MissingBound("startDate"))
        );
        assert_eq!(
            parse_range(Some("2024-01-01"), None, &Utc),
            Err(IntervalError::MissingBound("endDate"))
        );

        let interval = parse_range(Some("2024-01-01"), Some("2024-02-01"), &Utc).unwrap();
        assert_eq!(interval.start, utc(2024, 1, 1, 0, 0, 0));
        assert_eq!(interval.end, utc(2024, 2, 1, 0, 0, 0));
    }
}
