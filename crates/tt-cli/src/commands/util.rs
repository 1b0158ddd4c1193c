//! Shared utilities for CLI commands.

use std::fmt;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use tt_core::{Alert, AlertKind, Entry, clock, format_duration, parse_fuzzy};

/// Parses a time expression relative to the current time in `tz`.
///
/// Accepts everything the fuzzy parser does, e.g. "10:30", "15m ago",
/// "2026-01-15T10:30:00Z".
pub fn parse_time<Tz: TimeZone>(input: &str, tz: &Tz) -> anyhow::Result<DateTime<Utc>> {
    parse_fuzzy(input, &Utc::now().with_timezone(tz))
        .with_context(|| format!("invalid time: {input}"))
}

/// One-line description such as `#3 "Work" 09:00 - 10:30 (1h 30m)`.
///
/// Active entries end in `now` without a duration.
pub fn describe_entry<Tz: TimeZone>(entry: &Entry, tz: &Tz) -> String
where
    Tz::Offset: fmt::Display,
{
    match entry.end {
        Some(end) => format!(
            "{} \"{}\" {} - {} ({})",
            entry.id,
            entry.name,
            clock(entry.start, tz),
            clock(end, tz),
            format_duration(end.signed_duration_since(entry.start)),
        ),
        None => format!(
            "{} \"{}\" {} - now",
            entry.id,
            entry.name,
            clock(entry.start, tz)
        ),
    }
}

/// One-line description of an alert.
pub fn describe_alert<Tz: TimeZone>(alert: &Alert, tz: &Tz) -> String
where
    Tz::Offset: fmt::Display,
{
    let body = match &alert.kind {
        AlertKind::PlainMessage { message } => message.clone(),
        AlertKind::Afk { active_entry } => {
            format!("away while {} \"{}\" is active", active_entry.id, active_entry.name)
        }
        AlertKind::FormerlyAfk {
            afk_since,
            active_entry: Some(entry),
        } => format!(
            "back after being away since {} during {} \"{}\"",
            clock(*afk_since, tz),
            entry.id,
            entry.name
        ),
        AlertKind::FormerlyAfk {
            afk_since,
            active_entry: None,
        } => format!("back after being away since {}", clock(*afk_since, tz)),
    };
    format!(
        "{} {} [{}] {}",
        alert.id,
        clock(alert.created_at, tz),
        alert.kind.alert_type(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use tt_core::{AlertId, EntryId};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn entry(end: Option<DateTime<Utc>>) -> Entry {
        let start = at("2026-01-15T09:00:00Z");
        Entry {
            id: EntryId::new(3),
            name: "Work".to_string(),
            start,
            end,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn describes_ended_and_active_entries() {
        let ended = entry(Some(at("2026-01-15T10:30:00Z")));
        assert_eq!(describe_entry(&ended, &Utc), "#3 \"Work\" 09:00 - 10:30 (1h 30m)");
        assert_eq!(describe_entry(&entry(None), &Utc), "#3 \"Work\" 09:00 - now");
    }

    #[test]
    fn describes_alerts() {
        let alert = Alert {
            id: AlertId::new(2),
            created_at: at("2026-01-15T11:00:00Z"),
            updated_at: at("2026-01-15T11:00:00Z"),
            kind: AlertKind::FormerlyAfk {
                afk_since: at("2026-01-15T10:15:00Z"),
                active_entry: Some(entry(None)),
            },
        };
        assert_eq!(
            describe_alert(&alert, &Utc),
            "#2 11:00 [formerly_afk] back after being away since 10:15 during #3 \"Work\""
        );
    }

    #[test]
    fn parses_relative_times() {
        let parsed = parse_time("15m ago", &Utc).unwrap();
        let expected = Utc::now() - Duration::minutes(15);
        assert!((expected - parsed).num_seconds().abs() < 5);
        assert!(parse_time("whenever", &Utc).is_err());
    }
}
