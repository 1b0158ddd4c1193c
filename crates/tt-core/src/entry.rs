//! Time entries and the request shapes used to create, edit, and search them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event_type::EventType;
use crate::timeutil::TimeSpanShorthand;
use crate::types::EntryId;

/// A named span of tracked time.
///
/// An entry without an `end` is *active*. The store guarantees that at most
/// one entry is active at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// Store-assigned identifier.
    pub id: EntryId,

    /// Non-empty name.
    pub name: String,

    /// When the entry started.
    pub start: DateTime<Utc>,

    /// When the entry ended, or `None` while it is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,

    /// When the entry was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Returns true if the entry has no end time.
    pub const fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// Duration between start and end, or between start and `now` for an
    /// active entry.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.end.unwrap_or(now).signed_duration_since(self.start)
    }
}

/// Parameters for creating an entry.
///
/// The `start_after_id`, `end_before_id` and `start_after_last` fields splice
/// the new entry next to existing ones without manual timestamp arithmetic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Start where this entry ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after_id: Option<EntryId>,
    /// End where this entry starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_before_id: Option<EntryId>,
    /// Start where the most recent entry ends.
    #[serde(default)]
    pub start_after_last: bool,
}

impl NewEntry {
    /// A new entry with the given name starting now.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub const fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }
}

/// Parameters for editing an entry.
///
/// Every field is optional; absent fields leave the entry unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditEntry {
    /// Entry to edit. When `None` the active entry is edited, falling back to
    /// the most recently created entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    /// New name, or text to append when `append_name` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Append `name` to the existing name, delimited by a space.
    #[serde(default)]
    pub append_name: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    /// Fuzzy start expression, ignored when `start` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_fuzzy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Fuzzy end expression, ignored when `end` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_fuzzy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after_id: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_before_id: Option<EntryId>,
    #[serde(default)]
    pub start_after_last: bool,
}

impl EditEntry {
    /// An edit that ends the given entry at `end`.
    pub fn end_entry(id: EntryId, end: DateTime<Utc>) -> Self {
        Self {
            id: Some(id),
            end: Some(end),
            ..Self::default()
        }
    }
}

/// Parameters for listing entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of entries to return. Zero means no limit.
    #[serde(default)]
    pub limit: u64,
    /// Named window; overrides `start` and `end` when set.
    #[serde(default)]
    pub shorthand: TimeSpanShorthand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_fuzzy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_highlight_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_highlight_end: Option<String>,
}

/// Result of creating an entry: the new entry plus the one it stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartedEntry {
    pub started: Entry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped: Option<Entry>,
}

/// Result of editing an entry, with snapshots from before and after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdatedEntry {
    pub before: Entry,
    pub after: Entry,
}

/// An entry mutation as seen on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamedEntry {
    pub entry: Entry,
    pub event: EventType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(end: Option<DateTime<Utc>>) -> Entry {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        Entry {
            id: EntryId::new(1),
            name: "Reviewing".to_string(),
            start,
            end,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn active_entry_elapsed_uses_now() {
        let active = entry(None);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap();
        assert!(active.is_active());
        assert_eq!(active.elapsed(now), Duration::minutes(90));
    }

    #[test]
    fn ended_entry_elapsed_ignores_now() {
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 9, 45, 0).unwrap();
        let done = entry(Some(end));
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        assert!(!done.is_active());
        assert_eq!(done.elapsed(now), Duration::minutes(45));
    }

    #[test]
    fn active_entry_omits_end_in_json() {
        let json = serde_json::to_value(entry(None)).unwrap();
        assert!(json.get("end").is_none());
        assert_eq!(json["id"], 1);
    }
}
