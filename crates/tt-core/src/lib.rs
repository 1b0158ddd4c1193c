//! Core domain logic for the time tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Entries and alerts: the records owned by the store
//! - Event bus: multi-subscriber fan-out of entry and alert events
//! - AFK resolution: turning "formerly AFK" alerts into entry edits
//! - Time helpers: fuzzy time parsing and named time windows

pub mod afk;
pub mod alert;
pub mod bus;
pub mod cancel;
pub mod entry;
pub mod event_type;
pub mod search;
pub mod timeutil;
pub mod types;

pub use afk::{
    AfkChoice, AfkResolution, AfkResolver, PromptError, Prompter, ResolverState, format_duration,
};
pub use alert::{Alert, AlertKind, AlertType, StreamedAlert, UnknownAlertType};
pub use bus::{BusError, EventBus, Subscription, SubscriptionId};
pub use cancel::CancelToken;
pub use entry::{EditEntry, Entry, NewEntry, SearchEntry, StartedEntry, StreamedEntry, UpdatedEntry};
pub use event_type::EventType;
pub use timeutil::{TimeParseError, TimeSpanShorthand, clock, parse_fuzzy};
pub use types::{AlertId, EntryId, ValidationError};
