//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The provided value was not a valid identifier.
    #[error("invalid {field}: {value}")]
    InvalidId { field: &'static str, value: String },
}

/// Generates a numeric ID newtype backed by an SQLite integer primary key.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim().trim_start_matches('#');
                if trimmed.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                trimmed
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidId {
                        field: $field_name,
                        value: s.to_string(),
                    })
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                i64::try_from(self.0)
                    .map(ToSqlOutput::from)
                    .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = i64::column_result(value)?;
                u64::try_from(raw)
                    .map(Self)
                    .map_err(|_| FromSqlError::OutOfRange(raw))
            }
        }
    };
}

define_numeric_id!(
    /// A store-assigned entry identifier.
    ///
    /// Assigned on creation and never reused within one database.
    EntryId, "entry ID"
);

define_numeric_id!(
    /// A store-assigned alert identifier.
    AlertId, "alert ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_parses_with_or_without_hash() {
        assert_eq!("12".parse::<EntryId>().unwrap(), EntryId::new(12));
        assert_eq!("#12".parse::<EntryId>().unwrap(), EntryId::new(12));
    }

    #[test]
    fn entry_id_rejects_garbage() {
        let err = "twelve".parse::<EntryId>().unwrap_err();
        assert_eq!(err.to_string(), "invalid entry ID: twelve");
        let err = "".parse::<AlertId>().unwrap_err();
        assert_eq!(err, ValidationError::Empty { field: "alert ID" });
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&EntryId::new(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(EntryId::new(7).to_string(), "#7");
    }
}
