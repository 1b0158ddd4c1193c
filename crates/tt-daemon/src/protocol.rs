//! Wire protocol between the daemon and its clients.
//!
//! Every message is one frame: a big-endian `u32` byte length followed by a
//! JSON document. A connection carries request/response pairs until the client
//! sends a stream request. The daemon then answers with
//! [`Response::Subscribed`] and one event frame per bus event for the rest of
//! the connection.
//!
//! List responses larger than one frame are split over several frames. Every
//! frame but the last has `more` set.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tt_core::{
    AfkResolution, Alert, AlertId, AlertKind, AlertType, EditEntry, Entry, EntryId, NewEntry,
    SearchEntry, StartedEntry, StreamedAlert, StreamedEntry, UpdatedEntry,
};
use tt_db::{AppliedResolution, StoreError};

use crate::afk::AfkState;
use crate::error::DaemonError;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Client requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    GetEntry {
        id: EntryId,
    },
    GetActiveEntry,
    GetEntryList {
        #[serde(default)]
        search: SearchEntry,
    },
    CreateEntry {
        entry: NewEntry,
    },
    UpdateEntry {
        edit: EditEntry,
    },
    DeleteEntry {
        id: EntryId,
    },
    /// Stops the active entry at `end`, or now if absent.
    StopActiveEntry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<DateTime<Utc>>,
    },
    ApplyAfkResolution {
        resolution: AfkResolution,
    },
    GetAlertList,
    DeleteAlert {
        id: AlertId,
    },
    DeleteAlertType {
        alert_type: AlertType,
    },
    CreateAlert {
        alert: AlertKind,
    },
    /// A sample from the idle sensor.
    AfkSignal {
        state: AfkState,
        at: DateTime<Utc>,
    },
    StreamEntry,
    StreamAlert,
}

/// Daemon responses and stream events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Entry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry: Option<Entry>,
    },
    Entries {
        entries: Vec<Entry>,
        #[serde(default)]
        more: bool,
    },
    Started {
        started: StartedEntry,
    },
    Updated {
        updated: UpdatedEntry,
    },
    Applied {
        applied: AppliedResolution,
    },
    Alert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alert: Option<Alert>,
    },
    Alerts {
        alerts: Vec<Alert>,
        #[serde(default)]
        more: bool,
    },
    /// Acknowledges a stream request; event frames follow.
    Subscribed,
    EntryEvent {
        event: StreamedEntry,
    },
    AlertEvent {
        event: StreamedAlert,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Response {
    pub fn error(err: &StoreError) -> Self {
        Self::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Error frame for a response that does not fit in one frame.
    pub fn frame_too_large(len: usize) -> Self {
        Self::Error {
            kind: "frame_too_large".to_string(),
            message: DaemonError::FrameTooLarge(len).to_string(),
        }
    }

    /// Variant name, for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Entry { .. } => "entry",
            Self::Entries { .. } => "entries",
            Self::Started { .. } => "started",
            Self::Updated { .. } => "updated",
            Self::Applied { .. } => "applied",
            Self::Alert { .. } => "alert",
            Self::Alerts { .. } => "alerts",
            Self::Subscribed => "subscribed",
            Self::EntryEvent { .. } => "entry_event",
            Self::AlertEvent { .. } => "alert_event",
            Self::Error { .. } => "error",
        }
    }

    /// Turns an error frame into [`DaemonError::Remote`].
    pub fn into_result(self) -> Result<Self, DaemonError> {
        match self {
            Self::Error { kind, message } => Err(DaemonError::Remote { kind, message }),
            other => Ok(other),
        }
    }
}

/// Reads one frame. Returns `Ok(None)` if the peer closed the connection
/// before a new frame started.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, DaemonError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = usize::try_from(u32::from_be_bytes(len_buf)).unwrap_or(usize::MAX);
    if len > MAX_FRAME_LEN {
        return Err(DaemonError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

/// Writes one frame and flushes the writer.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_FRAME_LEN {
        return Err(DaemonError::FrameTooLarge(json.len()));
    }
    let len = u32::try_from(json.len()).map_err(|_| DaemonError::FrameTooLarge(json.len()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_snake_case() {
        let json = serde_json::to_string(&Request::GetActiveEntry).unwrap();
        assert_eq!(json, r#"{"type":"get_active_entry"}"#);

        let json = serde_json::to_string(&Request::DeleteAlertType {
            alert_type: AlertType::FormerlyAfk,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"delete_alert_type","alert_type":"formerly_afk"}"#);
    }

    #[test]
    fn deserializes_request_with_defaults() {
        let request: Request = serde_json::from_str(r#"{"type":"get_entry_list"}"#).unwrap();
        assert_eq!(
            request,
            Request::GetEntryList {
                search: SearchEntry::default()
            }
        );
        let request: Request = serde_json::from_str(r#"{"type":"stop_active_entry"}"#).unwrap();
        assert_eq!(request, Request::StopActiveEntry { end: None });
    }

    #[test]
    fn error_frames_become_remote_errors() {
        let response = Response::error(&StoreError::NotFound("entry #3".to_string()));
        let err = response.into_result().unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "daemon error (not_found): entry #3 not found");
    }

    #[test]
    fn list_frames_default_to_complete() {
        let response: Response =
            serde_json::from_str(r#"{"type":"alerts","alerts":[]}"#).unwrap();
        assert_eq!(
            response,
            Response::Alerts {
                alerts: Vec::new(),
                more: false
            }
        );
    }

    #[tokio::test]
    async fn frames_round_trip_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, &Request::Ping).await.unwrap();
        write_frame(&mut client, &Request::GetEntry { id: EntryId::new(7) })
            .await
            .unwrap();
        drop(client);

        let first: Option<Request> = read_frame(&mut server).await.unwrap();
        assert_eq!(first, Some(Request::Ping));
        let second: Option<Request> = read_frame(&mut server).await.unwrap();
        assert_eq!(second, Some(Request::GetEntry { id: EntryId::new(7) }));
        let end: Option<Request> = read_frame(&mut server).await.unwrap();
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
        client.write_all(&len.to_be_bytes()).await.unwrap();
        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(err, DaemonError::FrameTooLarge(_)));
    }
}
