//! Where commands send their operations: the local database or the daemon.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tt_core::{
    AfkResolution, Alert, AlertId, AlertType, EditEntry, Entry, EntryId, NewEntry, SearchEntry,
    StartedEntry, UpdatedEntry,
};
use tt_daemon::{AfkState, Client};
use tt_db::{Alerts, AppliedResolution, Entries, Store};

use crate::Config;

/// Store operations used by the CLI.
///
/// Lookups return `None` for missing records in both modes; mutations of
/// missing records are errors.
#[derive(Debug)]
pub enum Backend {
    Local(Store),
    Remote(Client),
}

impl Backend {
    /// Opens the backend selected by `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        if config.remote {
            return Ok(Self::Remote(connect_daemon(config).await?));
        }
        Ok(Self::Local(open_store(config).await?))
    }

    pub async fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>> {
        match self {
            Self::Local(store) => match store.get_entry(id).await {
                Ok(entry) => Ok(Some(entry)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err.into()),
            },
            Self::Remote(client) => Ok(client.get_entry(id).await?),
        }
    }

    pub async fn get_active_entry(&mut self) -> Result<Option<Entry>> {
        match self {
            Self::Local(store) => Ok(store.get_active_entry().await?),
            Self::Remote(client) => Ok(client.get_active_entry().await?),
        }
    }

    pub async fn get_entry_list(&mut self, search: SearchEntry) -> Result<Vec<Entry>> {
        match self {
            Self::Local(store) => Ok(store.get_entry_list(search).await?),
            Self::Remote(client) => Ok(client.get_entry_list(search).await?),
        }
    }

    pub async fn create_entry(&mut self, entry: NewEntry) -> Result<StartedEntry> {
        match self {
            Self::Local(store) => Ok(store.create_entry(entry).await?),
            Self::Remote(client) => Ok(client.create_entry(entry).await?),
        }
    }

    pub async fn update_entry(&mut self, edit: EditEntry) -> Result<UpdatedEntry> {
        match self {
            Self::Local(store) => Ok(store.update_entry(edit).await?),
            Self::Remote(client) => Ok(client.update_entry(edit).await?),
        }
    }

    pub async fn delete_entry(&mut self, id: EntryId) -> Result<Entry> {
        match self {
            Self::Local(store) => Ok(store.delete_entry(id).await?),
            Self::Remote(client) => Ok(client.delete_entry(id).await?),
        }
    }

    pub async fn stop_active_entry(&mut self, end: DateTime<Utc>) -> Result<Option<Entry>> {
        match self {
            Self::Local(store) => Ok(store.stop_active_entry(end).await?),
            Self::Remote(client) => Ok(client.stop_active_entry(Some(end)).await?),
        }
    }

    pub async fn apply_afk_resolution(
        &mut self,
        resolution: AfkResolution,
    ) -> Result<AppliedResolution> {
        match self {
            Self::Local(store) => Ok(store.apply_afk_resolution(resolution).await?),
            Self::Remote(client) => Ok(client.apply_afk_resolution(resolution).await?),
        }
    }

    pub async fn get_alert_list(&mut self) -> Result<Vec<Alert>> {
        match self {
            Self::Local(store) => Ok(store.get_alert_list().await?),
            Self::Remote(client) => Ok(client.get_alert_list().await?),
        }
    }

    pub async fn delete_alert(&mut self, id: AlertId) -> Result<Alert> {
        match self {
            Self::Local(store) => Ok(store.delete_alert(id).await?),
            Self::Remote(client) => Ok(client.delete_alert(id).await?),
        }
    }

    pub async fn delete_alert_type(&mut self, alert_type: AlertType) -> Result<Vec<Alert>> {
        match self {
            Self::Local(store) => Ok(store.delete_alert_type(alert_type).await?),
            Self::Remote(client) => Ok(client.delete_alert_type(alert_type).await?),
        }
    }

    /// Records that the user left the keyboard.
    pub async fn afk_away(&mut self) -> Result<Option<Alert>> {
        match self {
            Self::Local(store) => Ok(store.mark_afk().await?),
            Self::Remote(client) => Ok(client.afk_signal(AfkState::Idle, Utc::now()).await?),
        }
    }

    /// Records that the user is back.
    ///
    /// Locally the away time starts at the oldest outstanding AFK alert.
    /// Returns `None` if the user was not marked as away.
    pub async fn afk_back(&mut self) -> Result<Option<Alert>> {
        match self {
            Self::Local(store) => {
                let since = store
                    .get_alert_list()
                    .await?
                    .into_iter()
                    .filter(|alert| alert.kind.alert_type() == AlertType::Afk)
                    .map(|alert| alert.created_at)
                    .min();
                match since {
                    Some(since) => Ok(store.mark_back(since).await?),
                    None => Ok(None),
                }
            }
            Self::Remote(client) => Ok(client.afk_signal(AfkState::Active, Utc::now()).await?),
        }
    }
}

/// Connects to the configured daemon.
pub async fn connect_daemon(config: &Config) -> Result<Client> {
    let addr = config.daemon_addr();
    let client = Client::connect(addr.as_str())
        .await
        .with_context(|| format!("failed to connect to daemon at {addr}"))?;
    tracing::debug!(%addr, "connected to daemon");
    Ok(client)
}

/// Opens the database at the configured path, creating its directory.
pub async fn open_store(config: &Config) -> Result<Store> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let store = Store::new(config.database_path.clone()).with_bus_capacity(config.bus_capacity);
    store
        .connect()
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok(store)
}
