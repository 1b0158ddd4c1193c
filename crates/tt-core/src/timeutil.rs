//! Fuzzy time parsing and named time windows.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Matches "2 hours ago", "30 min ago".
static AGO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*(s|sec|second|m|min|minute|h|hr|hour|d|day|w|week)s?\s+ago$").unwrap()
});

/// Matches "+15m", "-2h", "in 10 minutes".
static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([+-])|in\s+)(\d+)\s*(s|sec|second|m|min|minute|h|hr|hour|d|day|w|week)s?$")
        .unwrap()
});

/// Conservative bound for relative offsets (~1000 years in seconds).
const MAX_RELATIVE_SECONDS: i64 = 1000 * 365 * 24 * 60 * 60;

/// Fuzzy time parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("empty time expression")]
    Empty,
    #[error("unrecognized time expression: {0}")]
    Unrecognized(String),
    #[error("relative time value too large: {0}")]
    TooLarge(String),
    #[error("time does not exist in the local time zone: {0}")]
    Nonexistent(String),
}

/// Formats `at` as `HH:MM` in `tz`.
pub fn clock<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: fmt::Display,
{
    at.with_timezone(tz).format("%H:%M").to_string()
}

/// Parses a human-entered time expression relative to `reference`.
///
/// Supports:
/// - `now`
/// - RFC 3339: `2026-01-15T10:30:00Z`
/// - Local date and time: `2026-01-15 10:30`
/// - Time of day on the reference date: `10:30`, `10:30:15`
/// - Past offsets: `2 hours ago`, `15m ago`
/// - Signed offsets: `-15m`, `+1h`, `in 10 minutes`
pub fn parse_fuzzy<Tz: TimeZone>(
    input: &str,
    reference: &DateTime<Tz>,
) -> Result<DateTime<Utc>, TimeParseError> {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        return Err(TimeParseError::Empty);
    }
    if s == "now" {
        return Ok(reference.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(dt.with_timezone(&Utc));
    }

    let tz = reference.timezone();
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, format) {
            return localize(&tz, naive, input);
        }
    }
    for format in ["%H:%M", "%H:%M:%S"] {
        if let Ok(time) = NaiveTime::parse_from_str(&s, format) {
            let naive = reference.date_naive().and_time(time);
            return localize(&tz, naive, input);
        }
    }

    if let Some(caps) = AGO_RE.captures(&s) {
        let offset = parse_offset(&caps[1], &caps[2], input)?;
        return Ok(reference.with_timezone(&Utc) - offset);
    }
    if let Some(caps) = OFFSET_RE.captures(&s) {
        let offset = parse_offset(&caps[2], &caps[3], input)?;
        let reference = reference.with_timezone(&Utc);
        return Ok(match caps.get(1).map(|m| m.as_str()) {
            Some("-") => reference - offset,
            _ => reference + offset,
        });
    }

    Err(TimeParseError::Unrecognized(input.to_string()))
}

fn parse_offset(amount: &str, unit: &str, input: &str) -> Result<Duration, TimeParseError> {
    let n: i64 = amount
        .parse()
        .map_err(|_| TimeParseError::TooLarge(input.to_string()))?;
    let seconds_per_unit = match unit {
        "s" | "sec" | "second" => 1,
        "m" | "min" | "minute" => 60,
        "h" | "hr" | "hour" => 60 * 60,
        "d" | "day" => 24 * 60 * 60,
        "w" | "week" => 7 * 24 * 60 * 60,
        _ => return Err(TimeParseError::Unrecognized(input.to_string())),
    };
    if n > MAX_RELATIVE_SECONDS / seconds_per_unit {
        return Err(TimeParseError::TooLarge(input.to_string()));
    }
    Ok(Duration::seconds(n * seconds_per_unit))
}

fn localize<Tz: TimeZone>(
    tz: &Tz,
    naive: NaiveDateTime,
    input: &str,
) -> Result<DateTime<Utc>, TimeParseError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| TimeParseError::Nonexistent(input.to_string()))
}

/// Named time window used when listing entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeSpanShorthand {
    /// No window; use explicit bounds if any.
    #[default]
    None,
    Today,
    Yesterday,
    /// Monday through Sunday of the reference week.
    ThisWeek,
    LastWeek,
}

impl TimeSpanShorthand {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "this-week",
            Self::LastWeek => "last-week",
        }
    }

    /// Resolves the window to `[start, end)` around `reference`, in the
    /// reference's time zone. Returns `None` for [`TimeSpanShorthand::None`].
    pub fn span<Tz: TimeZone>(
        self,
        reference: &DateTime<Tz>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = reference.date_naive();
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let (from, days) = match self {
            Self::None => return None,
            Self::Today => (today, 1),
            Self::Yesterday => (today - Duration::days(1), 1),
            Self::ThisWeek => (monday, 7),
            Self::LastWeek => (monday - Duration::days(7), 7),
        };
        let tz = reference.timezone();
        Some((
            start_of_day(&tz, from),
            start_of_day(&tz, from + Duration::days(days)),
        ))
    }
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc))
}

impl fmt::Display for TimeSpanShorthand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeSpanShorthand {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "all" => Ok(Self::None),
            "today" | "day" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "this-week" | "week" => Ok(Self::ThisWeek),
            "last-week" => Ok(Self::LastWeek),
            _ => Err(TimeParseError::Unrecognized(s.to_string())),
        }
    }
}

impl Serialize for TimeSpanShorthand {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimeSpanShorthand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn reference() -> DateTime<Utc> {
        // A Wednesday.
        Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn clock_uses_the_given_zone() {
        assert_eq!(clock(reference(), &Utc), "14:30");
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(clock(reference(), &east), "16:30");
    }

    #[test]
    fn parses_now_and_rfc3339() {
        assert_eq!(parse_fuzzy("now", &reference()).unwrap(), reference());
        let parsed = parse_fuzzy("2025-01-10T08:00:00Z", &reference()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap());
    }

    #[test]
    fn parses_time_of_day_on_reference_date() {
        let parsed = parse_fuzzy("09:15", &reference()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 15, 9, 15, 0).unwrap());
    }

    #[test]
    fn time_of_day_uses_reference_time_zone() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let reference = reference().with_timezone(&cet);
        let parsed = parse_fuzzy("09:15", &reference).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 15, 8, 15, 0).unwrap());
    }

    #[test]
    fn parses_relative_offsets() {
        let r = reference();
        assert_eq!(parse_fuzzy("2 hours ago", &r).unwrap(), r - Duration::hours(2));
        assert_eq!(parse_fuzzy("15m ago", &r).unwrap(), r - Duration::minutes(15));
        assert_eq!(parse_fuzzy("-30min", &r).unwrap(), r - Duration::minutes(30));
        assert_eq!(parse_fuzzy("+1h", &r).unwrap(), r + Duration::hours(1));
        assert_eq!(parse_fuzzy("in 10 minutes", &r).unwrap(), r + Duration::minutes(10));
    }

    #[test]
    fn rejects_garbage_and_huge_offsets() {
        assert_eq!(parse_fuzzy("  ", &reference()), Err(TimeParseError::Empty));
        assert!(matches!(
            parse_fuzzy("after lunch", &reference()),
            Err(TimeParseError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_fuzzy("99999999 weeks ago", &reference()),
            Err(TimeParseError::TooLarge(_))
        ));
    }

    #[test]
    fn today_spans_reference_date() {
        let (start, end) = TimeSpanShorthand::Today.span(&reference()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn weeks_run_monday_to_monday() {
        let (start, end) = TimeSpanShorthand::ThisWeek.span(&reference()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap());

        let (start, end) = TimeSpanShorthand::LastWeek.span(&reference()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap());
    }

    #[test]
    fn none_has_no_span() {
        assert!(TimeSpanShorthand::None.span(&reference()).is_none());
        assert_eq!("week".parse::<TimeSpanShorthand>().unwrap(), TimeSpanShorthand::ThisWeek);
    }
}
