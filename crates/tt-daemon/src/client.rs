//! Client for a running daemon.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tt_core::{
    AfkResolution, Alert, AlertId, AlertKind, AlertType, EditEntry, Entry, EntryId, NewEntry,
    SearchEntry, StartedEntry, StreamedAlert, StreamedEntry, UpdatedEntry,
};
use tt_db::AppliedResolution;

use crate::afk::AfkState;
use crate::error::DaemonError;
use crate::protocol::{Request, Response, read_frame, write_frame};

/// Request/response connection to the daemon.
#[derive(Debug)]
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, DaemonError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn receive(&mut self) -> Result<Response, DaemonError> {
        read_frame::<_, Response>(&mut self.reader)
            .await?
            .ok_or(DaemonError::ConnectionClosed)?
            .into_result()
    }

    async fn call(&mut self, request: &Request) -> Result<Response, DaemonError> {
        write_frame(&mut self.writer, request).await?;
        self.receive().await
    }

    /// Sends `request` and collects list frames until one without `more`.
    async fn list<T>(
        &mut self,
        request: &Request,
        unpack: fn(Response) -> Option<(Vec<T>, bool)>,
    ) -> Result<Vec<T>, DaemonError> {
        write_frame(&mut self.writer, request).await?;
        let mut items = Vec::new();
        loop {
            let response = self.receive().await?;
            let name = response.name();
            let (chunk, more) = unpack(response).ok_or(DaemonError::UnexpectedResponse(name))?;
            items.extend(chunk);
            if !more {
                return Ok(items);
            }
        }
    }

    pub async fn ping(&mut self) -> Result<(), DaemonError> {
        match self.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }

    async fn entry(&mut self, request: &Request) -> Result<Option<Entry>, DaemonError> {
        match self.call(request).await? {
            Response::Entry { entry } => Ok(entry),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }

    async fn alerts(&mut self, request: &Request) -> Result<Vec<Alert>, DaemonError> {
        self.list(request, |response| match response {
            Response::Alerts { alerts, more } => Some((alerts, more)),
            _ => None,
        })
        .await
    }

    async fn alert(&mut self, request: &Request) -> Result<Option<Alert>, DaemonError> {
        match self.call(request).await? {
            Response::Alert { alert } => Ok(alert),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }

    /// Returns `Ok(None)` if the entry does not exist.
    pub async fn get_entry(&mut self, id: EntryId) -> Result<Option<Entry>, DaemonError> {
        self.entry(&Request::GetEntry { id }).await
    }

    pub async fn get_active_entry(&mut self) -> Result<Option<Entry>, DaemonError> {
        self.entry(&Request::GetActiveEntry).await
    }

    pub async fn get_entry_list(&mut self, search: SearchEntry) -> Result<Vec<Entry>, DaemonError> {
        self.list(&Request::GetEntryList { search }, |response| match response {
            Response::Entries { entries, more } => Some((entries, more)),
            _ => None,
        })
        .await
    }

    pub async fn create_entry(&mut self, entry: NewEntry) -> Result<StartedEntry, DaemonError> {
        match self.call(&Request::CreateEntry { entry }).await? {
            Response::Started { started } => Ok(started),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }

    pub async fn update_entry(&mut self, edit: EditEntry) -> Result<UpdatedEntry, DaemonError> {
        match self.call(&Request::UpdateEntry { edit }).await? {
            Response::Updated { updated } => Ok(updated),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }

    pub async fn delete_entry(&mut self, id: EntryId) -> Result<Entry, DaemonError> {
        self.entry(&Request::DeleteEntry { id })
            .await?
            .ok_or(DaemonError::UnexpectedResponse("empty entry"))
    }

    /// Stops the active entry at `end`, or at the daemon's current time.
    pub async fn stop_active_entry(
        &mut self,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<Entry>, DaemonError> {
        self.entry(&Request::StopActiveEntry { end }).await
    }

    pub async fn apply_afk_resolution(
        &mut self,
        resolution: AfkResolution,
    ) -> Result<AppliedResolution, DaemonError> {
        match self.call(&Request::ApplyAfkResolution { resolution }).await? {
            Response::Applied { applied } => Ok(applied),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }

    pub async fn get_alert_list(&mut self) -> Result<Vec<Alert>, DaemonError> {
        self.alerts(&Request::GetAlertList).await
    }

    pub async fn delete_alert(&mut self, id: AlertId) -> Result<Alert, DaemonError> {
        self.alert(&Request::DeleteAlert { id })
            .await?
            .ok_or(DaemonError::UnexpectedResponse("empty alert"))
    }

    pub async fn delete_alert_type(
        &mut self,
        alert_type: AlertType,
    ) -> Result<Vec<Alert>, DaemonError> {
        self.alerts(&Request::DeleteAlertType { alert_type }).await
    }

    pub async fn create_alert(&mut self, alert: AlertKind) -> Result<Alert, DaemonError> {
        self.alert(&Request::CreateAlert { alert })
            .await?
            .ok_or(DaemonError::UnexpectedResponse("empty alert"))
    }

    /// Reports an idle-sensor sample. Returns the alert a transition created.
    pub async fn afk_signal(
        &mut self,
        state: AfkState,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, DaemonError> {
        self.alert(&Request::AfkSignal { state, at }).await
    }

    /// Turns this connection into a stream of entry events.
    pub async fn stream_entries(self) -> Result<EventStream<StreamedEntry>, DaemonError> {
        self.subscribe(Request::StreamEntry).await
    }

    /// Turns this connection into a stream of alert events.
    pub async fn stream_alerts(self) -> Result<EventStream<StreamedAlert>, DaemonError> {
        self.subscribe(Request::StreamAlert).await
    }

    async fn subscribe<T>(mut self, request: Request) -> Result<EventStream<T>, DaemonError> {
        match self.call(&request).await? {
            Response::Subscribed => Ok(EventStream {
                reader: self.reader,
                _writer: self.writer,
                _event: PhantomData,
            }),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }
}

/// Event type carried by an [`EventStream`].
pub trait StreamEvent: Sized {
    fn from_response(response: Response) -> Result<Self, DaemonError>;
}

impl StreamEvent for StreamedEntry {
    fn from_response(response: Response) -> Result<Self, DaemonError> {
        match response.into_result()? {
            Response::EntryEvent { event } => Ok(event),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }
}

impl StreamEvent for StreamedAlert {
    fn from_response(response: Response) -> Result<Self, DaemonError> {
        match response.into_result()? {
            Response::AlertEvent { event } => Ok(event),
            other => Err(DaemonError::UnexpectedResponse(other.name())),
        }
    }
}

/// Events streamed by the daemon over one connection.
///
/// Dropping the stream closes the connection, which ends the relay on the
/// daemon side.
#[derive(Debug)]
pub struct EventStream<T> {
    reader: BufReader<OwnedReadHalf>,
    _writer: OwnedWriteHalf,
    _event: PhantomData<fn() -> T>,
}

impl<T: StreamEvent> EventStream<T> {
    /// Waits for the next event. Returns `Ok(None)` when the daemon ends the stream.
    pub async fn next(&mut self) -> Result<Option<T>, DaemonError> {
        match read_frame::<_, Response>(&mut self.reader).await? {
            Some(response) => T::from_response(response).map(Some),
            None => Ok(None),
        }
    }
}
