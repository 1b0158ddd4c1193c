//! Alerts raised about away-from-keyboard (AFK) transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::event_type::EventType;
use crate::types::AlertId;

/// An immutable notification record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alert {
    pub id: AlertId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub kind: AlertKind,
}

/// Variant-specific alert payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// A free-form message.
    PlainMessage { message: String },
    /// The user went AFK while an entry was active.
    Afk { active_entry: Entry },
    /// The user is back after being AFK since `afk_since`.
    FormerlyAfk {
        afk_since: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active_entry: Option<Entry>,
    },
}

impl AlertKind {
    pub const fn alert_type(&self) -> AlertType {
        match self {
            Self::PlainMessage { .. } => AlertType::PlainMessage,
            Self::Afk { .. } => AlertType::Afk,
            Self::FormerlyAfk { .. } => AlertType::FormerlyAfk,
        }
    }
}

/// Discriminant of [`AlertKind`], used to delete alerts by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    PlainMessage,
    Afk,
    FormerlyAfk,
}

impl AlertType {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlainMessage => "plain_message",
            Self::Afk => "afk",
            Self::FormerlyAfk => "formerly_afk",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = UnknownAlertType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain_message" | "plain" => Ok(Self::PlainMessage),
            "afk" => Ok(Self::Afk),
            "formerly_afk" => Ok(Self::FormerlyAfk),
            _ => Err(UnknownAlertType(s.to_string())),
        }
    }
}

impl Serialize for AlertType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlertType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown alert type strings.
#[derive(Debug, Clone)]
pub struct UnknownAlertType(String);

impl fmt::Display for UnknownAlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown alert type: {}", self.0)
    }
}

impl std::error::Error for UnknownAlertType {}

/// An alert mutation as seen on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamedAlert {
    pub alert: Alert,
    pub event: EventType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_reports_its_type() {
        let since = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let kind = AlertKind::FormerlyAfk {
            afk_since: since,
            active_entry: None,
        };
        assert_eq!(kind.alert_type(), AlertType::FormerlyAfk);
        let kind = AlertKind::PlainMessage {
            message: "hi".to_string(),
        };
        assert_eq!(kind.alert_type(), AlertType::PlainMessage);
    }

    #[test]
    fn kind_is_tagged_in_json() {
        let kind = AlertKind::PlainMessage {
            message: "Backup finished".to_string(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"type":"plain_message","message":"Backup finished"}"#);
        let parsed: AlertKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kind);
    }

    #[test]
    fn alert_type_strings_roundtrip() {
        for ty in [AlertType::PlainMessage, AlertType::Afk, AlertType::FormerlyAfk] {
            assert_eq!(ty.as_str().parse::<AlertType>().unwrap(), ty);
        }
        let err = "snooze".parse::<AlertType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown alert type: snooze");
    }
}
