//! Entry Store: transactional entry mutations and queries.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use serde::{Deserialize, Serialize};
use tt_core::search::{fuzzy_matches, highlight};
use tt_core::{
    AfkResolution, CancelToken, EditEntry, Entry, EntryId, EventType, NewEntry, SearchEntry,
    StartedEntry, StreamedEntry, Subscription, UpdatedEntry, parse_fuzzy,
};

use crate::{Entries, Store, StoreError, format_timestamp, parse_timestamp};

const ENTRY_COLUMNS: &str = "id, name, start_at, end_at, created_at, updated_at";

/// Outcome of [`Entries::apply_afk_resolution`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<UpdatedEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub started: Vec<StartedEntry>,
}

struct EntryRow {
    id: EntryId,
    name: String,
    start_at: String,
    end_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            start_at: row.get(2)?,
            end_at: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<Entry, StoreError> {
        Ok(Entry {
            id: self.id,
            name: self.name,
            start: parse_timestamp(&self.start_at)?,
            end: self.end_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn query_entry(
    conn: &Connection,
    clause: &str,
    params: impl Params,
) -> Result<Option<Entry>, StoreError> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries {clause}"),
        params,
        EntryRow::from_row,
    )
    .optional()?
    .map(EntryRow::into_entry)
    .transpose()
}

pub(crate) fn fetch_entry(conn: &Connection, id: EntryId) -> Result<Entry, StoreError> {
    query_entry(conn, "WHERE id = ?1", params![id])?
        .ok_or_else(|| StoreError::NotFound(format!("entry {id}")))
}

pub(crate) fn fetch_active(conn: &Connection) -> Result<Option<Entry>, StoreError> {
    query_entry(conn, "WHERE end_at IS NULL LIMIT 1", [])
}

fn fetch_latest(conn: &Connection) -> Result<Option<Entry>, StoreError> {
    query_entry(conn, "ORDER BY created_at DESC, id DESC LIMIT 1", [])
}

/// End of the most recently ended entry, skipping `exclude`.
fn last_end(conn: &Connection, exclude: Option<EntryId>) -> Result<DateTime<Utc>, StoreError> {
    query_entry(
        conn,
        "WHERE end_at IS NOT NULL AND (?1 IS NULL OR id != ?1) ORDER BY end_at DESC, id DESC LIMIT 1",
        params![exclude],
    )?
    .and_then(|entry| entry.end)
    .ok_or_else(|| StoreError::NotFound("previous entry".to_string()))
}

/// Where an entry starting right after `id` begins.
fn end_of(conn: &Connection, id: EntryId, now: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
    Ok(fetch_entry(conn, id)?.end.unwrap_or(now))
}

fn check_order(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<(), StoreError> {
    match end {
        Some(end) if end < start => Err(StoreError::EndBeforeStart { start, end }),
        _ => Ok(()),
    }
}

fn resolve_time(
    exact: Option<DateTime<Utc>>,
    fuzzy: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    if exact.is_some() {
        return Ok(exact);
    }
    let reference = now.with_timezone(&Local);
    Ok(fuzzy.map(|expr| parse_fuzzy(expr, &reference)).transpose()?)
}

fn set_end(
    conn: &Connection,
    id: EntryId,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE entries SET end_at = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, format_timestamp(end), format_timestamp(now)],
    )?;
    Ok(())
}

pub(crate) fn create_in_tx(
    conn: &Connection,
    new: &NewEntry,
    now: DateTime<Utc>,
) -> Result<StartedEntry, StoreError> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(StoreError::EmptyName);
    }

    let mut start = new.start;
    if let Some(id) = new.start_after_id {
        start = Some(end_of(conn, id, now)?);
    } else if new.start_after_last {
        start = Some(last_end(conn, None)?);
    }
    let end = match new.end_before_id {
        Some(id) => Some(fetch_entry(conn, id)?.start),
        None => new.end,
    };
    let start = start.unwrap_or(now);
    check_order(start, end)?;

    let stopped = match fetch_active(conn)? {
        Some(active) if end.is_none() || start >= now => {
            check_order(active.start, Some(start))?;
            set_end(conn, active.id, start, now)?;
            Some(fetch_entry(conn, active.id)?)
        }
        _ => None,
    };

    let id: EntryId = conn.query_row(
        "
        INSERT INTO entries (name, start_at, end_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        RETURNING id
        ",
        params![
            name,
            format_timestamp(start),
            end.map(format_timestamp),
            format_timestamp(now)
        ],
        |row| row.get(0),
    )?;
    let started = fetch_entry(conn, id)?;
    Ok(StartedEntry { started, stopped })
}

pub(crate) fn update_in_tx(
    conn: &Connection,
    edit: &EditEntry,
    now: DateTime<Utc>,
) -> Result<UpdatedEntry, StoreError> {
    let before = match edit.id {
        Some(id) => fetch_entry(conn, id)?,
        None => match fetch_active(conn)? {
            Some(active) => active,
            None => fetch_latest(conn)?
                .ok_or_else(|| StoreError::NotFound("entry to edit".to_string()))?,
        },
    };
    let mut name = before.name.clone();
    if let Some(new_name) = edit.name.as_deref().map(str::trim) {
        if edit.append_name {
            if !new_name.is_empty() {
                name = format!("{name} {new_name}");
            }
        } else if new_name.is_empty() {
            return Err(StoreError::EmptyName);
        } else {
            name = new_name.to_string();
        }
    }

    let mut start = resolve_time(edit.start, edit.start_fuzzy.as_deref(), now)?
        .unwrap_or(before.start);
    if let Some(id) = edit.start_after_id {
        start = end_of(conn, id, now)?;
    } else if edit.start_after_last {
        start = last_end(conn, Some(before.id))?;
    }
    let mut end = resolve_time(edit.end, edit.end_fuzzy.as_deref(), now)?.or(before.end);
    if let Some(id) = edit.end_before_id {
        end = Some(fetch_entry(conn, id)?.start);
    }
    check_order(start, end)?;

    conn.execute(
        "
        UPDATE entries
        SET name = ?2, start_at = ?3, end_at = ?4, updated_at = ?5
        WHERE id = ?1
        ",
        params![
            before.id,
            name,
            format_timestamp(start),
            end.map(format_timestamp),
            format_timestamp(now)
        ],
    )?;
    let after = fetch_entry(conn, before.id)?;
    Ok(UpdatedEntry { before, after })
}

fn delete_in_tx(conn: &Connection, id: EntryId) -> Result<Entry, StoreError> {
    let entry = fetch_entry(conn, id)?;
    conn.execute("DELETE FROM entries WHERE id = ?1", params![id])?;
    Ok(entry)
}

fn stop_in_tx(
    conn: &Connection,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<Entry>, StoreError> {
    let Some(active) = fetch_active(conn)? else {
        return Ok(None);
    };
    check_order(active.start, Some(end))?;
    set_end(conn, active.id, end, now)?;
    fetch_entry(conn, active.id).map(Some)
}

fn apply_in_tx(
    conn: &Connection,
    resolution: &AfkResolution,
    now: DateTime<Utc>,
) -> Result<AppliedResolution, StoreError> {
    let updated = resolution
        .edit
        .as_ref()
        .map(|edit| update_in_tx(conn, edit, now))
        .transpose()?;
    let started = resolution
        .new_entries
        .iter()
        .map(|new| create_in_tx(conn, new, now))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AppliedResolution { updated, started })
}

fn search_entries(
    conn: &Connection,
    search: &SearchEntry,
    now: DateTime<Utc>,
) -> Result<Vec<Entry>, StoreError> {
    let limit = i64::try_from(search.limit)
        .ok()
        .and_then(|limit| usize::try_from(limit).ok())
        .ok_or(StoreError::LimitTooLarge(search.limit))?;
    let (from, to) = search
        .shorthand
        .span(&now.with_timezone(&Local))
        .map_or((search.start, search.end), |(start, end)| {
            (Some(start), Some(end))
        });

    let mut stmt = conn.prepare(&format!(
        "
        SELECT {ENTRY_COLUMNS} FROM entries
        WHERE (?1 IS NULL OR end_at IS NULL OR end_at > ?1)
          AND (?2 IS NULL OR start_at < ?2)
        ORDER BY start_at ASC, id ASC
        "
    ))?;
    let rows = stmt.query_map(
        params![from.map(format_timestamp), to.map(format_timestamp)],
        EntryRow::from_row,
    )?;

    let pattern = search
        .name_fuzzy
        .as_deref()
        .filter(|pattern| !pattern.trim().is_empty());
    let markers = (
        search.name_highlight_start.as_deref(),
        search.name_highlight_end.as_deref(),
    );
    let mut entries = Vec::new();
    for row in rows {
        let mut entry = row?.into_entry()?;
        if let Some(pattern) = pattern {
            if !fuzzy_matches(pattern, &entry.name) {
                continue;
            }
            if markers.0.is_some() || markers.1.is_some() {
                let (open, close) = (markers.0.unwrap_or(""), markers.1.unwrap_or(""));
                if let Some(highlighted) = highlight(pattern, &entry.name, open, close) {
                    entry.name = highlighted;
                }
            }
        }
        entries.push(entry);
    }
    if limit > 0 && entries.len() > limit {
        entries.drain(..entries.len() - limit);
    }
    Ok(entries)
}

fn started_events(started: &StartedEntry, events: &mut Vec<StreamedEntry>) {
    if let Some(stopped) = &started.stopped {
        events.push(StreamedEntry {
            entry: stopped.clone(),
            event: EventType::Updated,
        });
    }
    events.push(StreamedEntry {
        entry: started.started.clone(),
        event: EventType::Created,
    });
}

#[async_trait]
impl Entries for Store {
    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError> {
        self.read(|conn| fetch_entry(conn, id)).await
    }

    async fn get_active_entry(&self) -> Result<Option<Entry>, StoreError> {
        self.read(fetch_active).await
    }

    async fn get_entry_list(&self, search: SearchEntry) -> Result<Vec<Entry>, StoreError> {
        self.read(|conn| search_entries(conn, &search, Utc::now()))
            .await
    }

    async fn create_entry(&self, new: NewEntry) -> Result<StartedEntry, StoreError> {
        let (started, _permit) = self
            .write(|tx| create_in_tx(tx, &new, Utc::now()))
            .await?;
        tracing::debug!(
            id = %started.started.id,
            stopped = ?started.stopped.as_ref().map(|entry| entry.id),
            "created entry"
        );
        let mut events = Vec::with_capacity(2);
        started_events(&started, &mut events);
        self.publish_entries(&events).await;
        Ok(started)
    }

    async fn update_entry(&self, edit: EditEntry) -> Result<UpdatedEntry, StoreError> {
        let (updated, _permit) = self
            .write(|tx| update_in_tx(tx, &edit, Utc::now()))
            .await?;
        tracing::debug!(id = %updated.after.id, "updated entry");
        self.publish_entries(&[StreamedEntry {
            entry: updated.after.clone(),
            event: EventType::Updated,
        }])
        .await;
        Ok(updated)
    }

    async fn delete_entry(&self, id: EntryId) -> Result<Entry, StoreError> {
        let (deleted, _permit) = self.write(|tx| delete_in_tx(tx, id)).await?;
        tracing::debug!(id = %deleted.id, "deleted entry");
        self.publish_entries(&[StreamedEntry {
            entry: deleted.clone(),
            event: EventType::Deleted,
        }])
        .await;
        Ok(deleted)
    }

    async fn stop_active_entry(&self, end: DateTime<Utc>) -> Result<Option<Entry>, StoreError> {
        let (stopped, _permit) = self.write(|tx| stop_in_tx(tx, end, Utc::now())).await?;
        if let Some(entry) = &stopped {
            tracing::debug!(id = %entry.id, "stopped active entry");
            self.publish_entries(&[StreamedEntry {
                entry: entry.clone(),
                event: EventType::Updated,
            }])
            .await;
        }
        Ok(stopped)
    }

    async fn apply_afk_resolution(
        &self,
        resolution: AfkResolution,
    ) -> Result<AppliedResolution, StoreError> {
        if resolution.is_empty() {
            self.ensure_connected().await?;
            return Ok(AppliedResolution::default());
        }
        let (applied, _permit) = self
            .write(|tx| apply_in_tx(tx, &resolution, Utc::now()))
            .await?;
        tracing::debug!(
            edited = ?applied.updated.as_ref().map(|updated| updated.after.id),
            created = applied.started.len(),
            "applied AFK resolution"
        );
        let mut events = Vec::new();
        if let Some(updated) = &applied.updated {
            events.push(StreamedEntry {
                entry: updated.after.clone(),
                event: EventType::Updated,
            });
        }
        for started in &applied.started {
            started_events(started, &mut events);
        }
        self.publish_entries(&events).await;
        Ok(applied)
    }

    async fn stream_entries(
        &self,
        cancel: &CancelToken,
    ) -> Result<Subscription<StreamedEntry>, StoreError> {
        self.ensure_connected().await?;
        Ok(self.entry_bus.subscribe_until(cancel))
    }
}
