//! Alert Store: AFK alerts and plain messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tt_core::{
    Alert, AlertId, AlertKind, AlertType, CancelToken, EventType, StreamedAlert, Subscription,
};

use crate::entries::fetch_active;
use crate::{Alerts, Store, StoreError, format_timestamp, parse_timestamp};

const ALERT_COLUMNS: &str = "id, created_at, updated_at, type, data";

struct AlertRow {
    id: AlertId,
    created_at: String,
    updated_at: String,
    data: String,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            data: row.get(4)?,
        })
    }

    fn into_alert(self) -> Result<Alert, StoreError> {
        let kind: AlertKind =
            serde_json::from_str(&self.data).map_err(|err| StoreError::InvalidAlertData {
                id: self.id,
                message: err.to_string(),
            })?;
        Ok(Alert {
            id: self.id,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            kind,
        })
    }
}

fn list_alerts(conn: &Connection, alert_type: Option<AlertType>) -> Result<Vec<Alert>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts WHERE (?1 IS NULL OR type = ?1) ORDER BY id"
    ))?;
    let rows = stmt.query_map(
        params![alert_type.as_ref().map(AlertType::as_str)],
        AlertRow::from_row,
    )?;
    rows.map(|row| row?.into_alert()).collect()
}

fn fetch_alert(conn: &Connection, id: AlertId) -> Result<Alert, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id], AlertRow::from_row)?;
    match rows.next() {
        Some(row) => row?.into_alert(),
        None => Err(StoreError::NotFound(format!("alert {id}"))),
    }
}

fn insert_alert(
    conn: &Connection,
    kind: &AlertKind,
    now: DateTime<Utc>,
) -> Result<Alert, StoreError> {
    let data = serde_json::to_string(kind)?;
    let id: AlertId = conn.query_row(
        "
        INSERT INTO alerts (created_at, updated_at, type, data)
        VALUES (?1, ?1, ?2, ?3)
        RETURNING id
        ",
        params![format_timestamp(now), kind.alert_type().as_str(), data],
        |row| row.get(0),
    )?;
    fetch_alert(conn, id)
}

fn delete_in_tx(conn: &Connection, id: AlertId) -> Result<Alert, StoreError> {
    let alert = fetch_alert(conn, id)?;
    conn.execute("DELETE FROM alerts WHERE id = ?1", params![id])?;
    Ok(alert)
}

fn delete_type_in_tx(conn: &Connection, alert_type: AlertType) -> Result<Vec<Alert>, StoreError> {
    let alerts = list_alerts(conn, Some(alert_type))?;
    conn.execute(
        "DELETE FROM alerts WHERE type = ?1",
        params![alert_type.as_str()],
    )?;
    Ok(alerts)
}

fn mark_afk_in_tx(conn: &Connection, now: DateTime<Utc>) -> Result<Option<Alert>, StoreError> {
    let Some(active_entry) = fetch_active(conn)? else {
        return Ok(None);
    };
    if !list_alerts(conn, Some(AlertType::Afk))?.is_empty() {
        return Ok(None);
    }
    insert_alert(conn, &AlertKind::Afk { active_entry }, now).map(Some)
}

/// Deleted AFK alerts and the "formerly AFK" alert that replaced them.
type MarkedBack = (Vec<Alert>, Option<Alert>);

fn mark_back_in_tx(
    conn: &Connection,
    afk_since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<MarkedBack, StoreError> {
    let removed = delete_type_in_tx(conn, AlertType::Afk)?;
    let Some(active_entry) = fetch_active(conn)? else {
        return Ok((removed, None));
    };
    let kind = AlertKind::FormerlyAfk {
        afk_since,
        active_entry: Some(active_entry),
    };
    let created = insert_alert(conn, &kind, now)?;
    Ok((removed, Some(created)))
}

fn streamed(alerts: &[Alert], event: EventType) -> Vec<StreamedAlert> {
    alerts
        .iter()
        .map(|alert| StreamedAlert {
            alert: alert.clone(),
            event,
        })
        .collect()
}

#[async_trait]
impl Alerts for Store {
    async fn get_alert_list(&self) -> Result<Vec<Alert>, StoreError> {
        self.read(|conn| list_alerts(conn, None)).await
    }

    async fn create_alert(&self, kind: AlertKind) -> Result<Alert, StoreError> {
        let (alert, _permit) = self
            .write(|tx| insert_alert(tx, &kind, Utc::now()))
            .await?;
        tracing::debug!(id = %alert.id, kind = %alert.kind.alert_type(), "created alert");
        self.publish_alerts(&streamed(std::slice::from_ref(&alert), EventType::Created))
            .await;
        Ok(alert)
    }

    async fn delete_alert(&self, id: AlertId) -> Result<Alert, StoreError> {
        let (alert, _permit) = self.write(|tx| delete_in_tx(tx, id)).await?;
        tracing::debug!(id = %alert.id, "deleted alert");
        self.publish_alerts(&streamed(std::slice::from_ref(&alert), EventType::Deleted))
            .await;
        Ok(alert)
    }

    async fn delete_alert_type(&self, alert_type: AlertType) -> Result<Vec<Alert>, StoreError> {
        let (alerts, _permit) = self
            .write(|tx| {
                let alerts = delete_type_in_tx(tx, alert_type)?;
                if alerts.is_empty() {
                    return Err(StoreError::NotFound(format!("{alert_type} alerts")));
                }
                Ok(alerts)
            })
            .await?;
        tracing::debug!(%alert_type, count = alerts.len(), "deleted alerts by type");
        self.publish_alerts(&streamed(&alerts, EventType::Deleted))
            .await;
        Ok(alerts)
    }

    async fn mark_afk(&self) -> Result<Option<Alert>, StoreError> {
        let (alert, _permit) = self.write(|tx| mark_afk_in_tx(tx, Utc::now())).await?;
        match &alert {
            Some(alert) => {
                tracing::debug!(id = %alert.id, "marked AFK");
                self.publish_alerts(&streamed(std::slice::from_ref(alert), EventType::Created))
                    .await;
            }
            None => tracing::debug!("AFK ignored, no active entry or already AFK"),
        }
        Ok(alert)
    }

    async fn mark_back(&self, afk_since: DateTime<Utc>) -> Result<Option<Alert>, StoreError> {
        let ((removed, created), _permit) = self
            .write(|tx| mark_back_in_tx(tx, afk_since, Utc::now()))
            .await?;
        tracing::debug!(
            removed = removed.len(),
            created = ?created.as_ref().map(|alert| alert.id),
            "marked back from AFK"
        );
        let mut events = streamed(&removed, EventType::Deleted);
        if let Some(alert) = &created {
            events.push(StreamedAlert {
                alert: alert.clone(),
                event: EventType::Created,
            });
        }
        self.publish_alerts(&events).await;
        Ok(created)
    }

    async fn stream_alerts(
        &self,
        cancel: &CancelToken,
    ) -> Result<Subscription<StreamedAlert>, StoreError> {
        self.ensure_connected().await?;
        Ok(self.alert_bus.subscribe_until(cancel))
    }
}
