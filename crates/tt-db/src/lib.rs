//! Storage layer for the time tracker.
//!
//! [`Store`] persists entries and alerts in SQLite using `rusqlite` and
//! publishes every committed mutation on its event buses. Callers program
//! against the [`Entries`] and [`Alerts`] traits so the CLI, the daemon and
//! tests can drive the store interchangeably.
//!
//! # Concurrency
//!
//! The store owns a single `rusqlite::Connection` behind an async mutex, so
//! transactions never run in parallel. A mutation runs entirely inside one
//! transaction on a `&Transaction` handle. After the commit the store takes its
//! publish lock before it releases the connection, which makes subscribers
//! observe events in commit order while reads continue during a slow publish.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). This keeps lexicographic ordering equal
//! to chronological ordering, and values human-readable.
//!
//! ## Active Entries
//!
//! An entry with a NULL `end_at` is active. A partial unique index rejects a
//! second active row, backing up the checks done inside transactions.
//!
//! ## Alert Payload Storage
//!
//! The `data` column stores the whole alert variant as JSON, including a
//! snapshot of the entry it refers to. The `type` column repeats the variant
//! name for deletion by type.

mod alerts;
mod entries;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tt_core::bus::DEFAULT_CAPACITY;
use tt_core::{
    AfkResolution, Alert, AlertId, AlertKind, AlertType, CancelToken, EditEntry, Entry, EntryId,
    EventBus, NewEntry, SearchEntry, StartedEntry, StreamedAlert, StreamedEntry, Subscription,
    TimeParseError, UpdatedEntry,
};

pub use entries::AppliedResolution;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not connected")]
    NotConnected,
    #[error("store is already connected")]
    AlreadyConnected,
    /// The target of a lookup or mutation does not exist.
    #[error("{0} not found")]
    NotFound(String),
    #[error("entry name cannot be empty")]
    EmptyName,
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("limit {0} is too large")]
    LimitTooLarge(u64),
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored timestamp: {value}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Stored alert payload JSON could not be decoded.
    #[error("invalid alert data for {id}: {message}")]
    InvalidAlertData { id: AlertId, message: String },
    #[error("failed to encode alert data: {0}")]
    AlertEncoding(#[from] serde_json::Error),
    /// A fuzzy time expression could not be parsed.
    #[error("invalid time: {0}")]
    InvalidTime(#[from] TimeParseError),
}

impl StoreError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable snake_case name of the error kind, used on the wire.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::AlreadyConnected => "already_connected",
            Self::NotFound(_) => "not_found",
            Self::EmptyName => "empty_name",
            Self::EndBeforeStart { .. } => "end_before_start",
            Self::LimitTooLarge(_) => "limit_too_large",
            Self::Sqlite(_) => "sqlite",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::InvalidAlertData { .. } | Self::AlertEncoding(_) => "invalid_alert_data",
            Self::InvalidTime(_) => "invalid_time",
        }
    }
}

/// Entry Store operations.
#[async_trait]
pub trait Entries: Send + Sync {
    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError>;

    async fn get_active_entry(&self) -> Result<Option<Entry>, StoreError>;

    /// Lists entries overlapping the search window, oldest first.
    async fn get_entry_list(&self, search: SearchEntry) -> Result<Vec<Entry>, StoreError>;

    /// Creates an entry, stopping the active one when the new entry takes over.
    async fn create_entry(&self, new: NewEntry) -> Result<StartedEntry, StoreError>;

    async fn update_entry(&self, edit: EditEntry) -> Result<UpdatedEntry, StoreError>;

    async fn delete_entry(&self, id: EntryId) -> Result<Entry, StoreError>;

    /// Ends the active entry at `end`. Returns `Ok(None)` if nothing is active.
    async fn stop_active_entry(&self, end: DateTime<Utc>) -> Result<Option<Entry>, StoreError>;

    /// Applies the edit and new entries of an AFK resolution in one transaction.
    async fn apply_afk_resolution(
        &self,
        resolution: AfkResolution,
    ) -> Result<AppliedResolution, StoreError>;

    /// Streams entry events until `cancel` fires.
    async fn stream_entries(
        &self,
        cancel: &CancelToken,
    ) -> Result<Subscription<StreamedEntry>, StoreError>;
}

/// Alert Store operations.
#[async_trait]
pub trait Alerts: Send + Sync {
    async fn get_alert_list(&self) -> Result<Vec<Alert>, StoreError>;

    async fn create_alert(&self, kind: AlertKind) -> Result<Alert, StoreError>;

    async fn create_plain_message(&self, message: String) -> Result<Alert, StoreError> {
        self.create_alert(AlertKind::PlainMessage { message }).await
    }

    async fn delete_alert(&self, id: AlertId) -> Result<Alert, StoreError>;

    /// Deletes every alert of `alert_type`. Fails with `NotFound` if none exist.
    async fn delete_alert_type(&self, alert_type: AlertType) -> Result<Vec<Alert>, StoreError>;

    /// Records that the user went AFK while an entry is active.
    ///
    /// Returns `Ok(None)` if nothing is active or an AFK alert is outstanding.
    async fn mark_afk(&self) -> Result<Option<Alert>, StoreError>;

    /// Records that the user is back after being AFK since `afk_since`.
    ///
    /// Outstanding AFK alerts are replaced by one "formerly AFK" alert. Returns
    /// `Ok(None)` when no entry is active, as there is nothing to resolve.
    async fn mark_back(&self, afk_since: DateTime<Utc>) -> Result<Option<Alert>, StoreError>;

    /// Streams alert events until `cancel` fires.
    async fn stream_alerts(
        &self,
        cancel: &CancelToken,
    ) -> Result<Subscription<StreamedAlert>, StoreError>;
}

/// SQLite-backed entry and alert store.
///
/// A store starts disconnected when built with [`Store::new`]; [`Store::open`]
/// and [`Store::open_in_memory`] connect right away.
pub struct Store {
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
    publish: Mutex<()>,
    entry_bus: EventBus<StreamedEntry>,
    alert_bus: EventBus<StreamedAlert>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// A disconnected store for the database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::at(Some(path.into()))
    }

    /// A disconnected store backed by a private in-memory database.
    pub fn in_memory() -> Self {
        Self::at(None)
    }

    fn at(path: Option<PathBuf>) -> Self {
        Self {
            path,
            conn: Mutex::new(None),
            publish: Mutex::new(()),
            entry_bus: EventBus::with_capacity(DEFAULT_CAPACITY),
            alert_bus: EventBus::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Sets the per-subscriber buffer of both event buses.
    #[must_use]
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.entry_bus = EventBus::with_capacity(capacity);
        self.alert_bus = EventBus::with_capacity(capacity);
        self
    }

    /// Opens the database at `path`, creating it if necessary.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        store.connect().await?;
        Ok(store)
    }

    /// Opens an in-memory database. Useful for testing.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::in_memory();
        store.connect().await?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Opens the connection and initializes the schema.
    pub async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            return Err(StoreError::AlreadyConnected);
        }
        let conn = match &self.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        init(&conn)?;
        *guard = Some(conn);
        tracing::debug!(path = ?self.path, "store connected");
        Ok(())
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .await
            .take()
            .ok_or(StoreError::NotConnected)?;
        conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
        tracing::debug!(path = ?self.path, "store closed");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Checks that the connection is usable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.read(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }

    async fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    /// Runs `f` against the live connection.
    async fn read<R: Send>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, StoreError> + Send,
    ) -> Result<R, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        f(conn)
    }

    /// Runs `f` in a transaction and commits it.
    ///
    /// Returns the publish permit, taken before the connection is released.
    /// Events for this transaction must be published while holding it.
    async fn write<R: Send>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<R, StoreError> + Send,
    ) -> Result<(R, MutexGuard<'_, ()>), StoreError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StoreError::NotConnected)?;
        let value = {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            value
        };
        let permit = self.publish.lock().await;
        drop(guard);
        Ok((value, permit))
    }

    async fn publish_entries(&self, events: &[StreamedEntry]) {
        for event in events {
            let delivered = self.entry_bus.publish_wait(event).await;
            tracing::trace!(id = %event.entry.id, event = %event.event, delivered, "published entry event");
        }
    }

    async fn publish_alerts(&self, events: &[StreamedAlert]) {
        for event in events {
            let delivered = self.alert_bus.publish_wait(event).await;
            tracing::trace!(id = %event.alert.id, event = %event.event, delivered, "published alert event");
        }
    }
}

/// Initializes the database schema.
///
/// This is idempotent - safe to call on an already-initialized database.
fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        -- Entries: named spans of time; end_at NULL marks the active entry
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            start_at TEXT NOT NULL,
            end_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_start ON entries(start_at);
        CREATE INDEX IF NOT EXISTS idx_entries_end ON entries(end_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_single_active
            ON entries((end_at IS NULL)) WHERE end_at IS NULL;

        -- Alerts: immutable notifications
        -- type: variant name (e.g., 'afk', 'formerly_afk')
        -- data: JSON payload of the whole variant
        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            type TEXT NOT NULL,
            data TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_type ON alerts(type);
        ",
    )?;
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| StoreError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
