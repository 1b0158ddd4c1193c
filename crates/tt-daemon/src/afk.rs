//! Turns idle-sensor samples into AFK alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tt_core::Alert;
use tt_db::{Alerts, StoreError};

/// What the idle sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfkState {
    /// No user input for the sensor's idle threshold.
    Idle,
    /// User input seen again.
    Active,
}

/// Tracks AFK transitions and records them in the alert store.
///
/// Repeated samples of the same state are ignored, so the sensor may report
/// as often as it likes.
#[derive(Debug, Default)]
pub struct AfkTracker {
    afk_since: Option<DateTime<Utc>>,
}

impl AfkTracker {
    pub const fn new() -> Self {
        Self { afk_since: None }
    }

    pub const fn afk_since(&self) -> Option<DateTime<Utc>> {
        self.afk_since
    }

    pub const fn is_afk(&self) -> bool {
        self.afk_since.is_some()
    }

    /// Feeds one sample taken at `at`. Returns the alert created by a
    /// transition, if any.
    pub async fn observe<A>(
        &mut self,
        alerts: &A,
        state: AfkState,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>
    where
        A: Alerts + ?Sized,
    {
        match (self.afk_since, state) {
            (None, AfkState::Idle) => {
                let alert = alerts.mark_afk().await?;
                self.afk_since = Some(at);
                tracing::info!(since = %at, "user went AFK");
                Ok(alert)
            }
            (Some(since), AfkState::Active) => {
                let alert = alerts.mark_back(since).await?;
                self.afk_since = None;
                tracing::info!(since = %since, back = %at, "user is back");
                Ok(alert)
            }
            (None, AfkState::Active) | (Some(_), AfkState::Idle) => Ok(None),
        }
    }
}
