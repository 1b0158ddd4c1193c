//! TCP server exposing the entry and alert stores.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tt_core::{CancelToken, Subscription};
use tt_db::{Alerts, Entries, StoreError};

use crate::afk::AfkTracker;
use crate::error::DaemonError;
use crate::protocol::{MAX_FRAME_LEN, Request, Response, read_frame, write_frame};
use crate::relay::{EventSink, FrameSink, relay};

/// Serves store requests over TCP.
pub struct Server<S: ?Sized> {
    store: Arc<S>,
    tracker: Arc<Mutex<AfkTracker>>,
}

impl<S: ?Sized> Clone for Server<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tracker: Arc::clone(&self.tracker),
        }
    }
}

impl<S> Server<S>
where
    S: Entries + Alerts + ?Sized + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            tracker: Arc::new(Mutex::new(AfkTracker::new())),
        }
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// Open connections, including streams, are cancelled on shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: CancelToken) -> Result<(), DaemonError> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "daemon listening");
        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted connection");
                    let server = self.clone();
                    let cancel = shutdown.child();
                    tokio::spawn(async move {
                        if let Err(err) = server.handle_connection(stream, cancel).await {
                            tracing::warn!(%peer, error = %err, "connection failed");
                        }
                        tracing::debug!(%peer, "connection closed");
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                }
            }
        }
        tracing::info!(%addr, "daemon stopped");
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        cancel: CancelToken,
    ) -> Result<(), DaemonError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                frame = read_frame::<_, Request>(&mut reader) => frame?,
            };
            let Some(request) = frame else {
                return Ok(());
            };
            match request {
                Request::StreamEntry => {
                    let stream_cancel = cancel.child();
                    let subscription = match self.store.stream_entries(&stream_cancel).await {
                        Ok(subscription) => subscription,
                        Err(err) => {
                            write_frame(&mut writer, &Response::error(&err)).await?;
                            continue;
                        }
                    };
                    write_frame(&mut writer, &Response::Subscribed).await?;
                    return relay_to_peer(
                        subscription,
                        reader,
                        FrameSink::new(writer),
                        stream_cancel,
                    )
                    .await;
                }
                Request::StreamAlert => {
                    let stream_cancel = cancel.child();
                    let subscription = match self.store.stream_alerts(&stream_cancel).await {
                        Ok(subscription) => subscription,
                        Err(err) => {
                            write_frame(&mut writer, &Response::error(&err)).await?;
                            continue;
                        }
                    };
                    write_frame(&mut writer, &Response::Subscribed).await?;
                    return relay_to_peer(
                        subscription,
                        reader,
                        FrameSink::new(writer),
                        stream_cancel,
                    )
                    .await;
                }
                request => {
                    let response = self.dispatch(request).await;
                    write_response(&mut writer, response).await?;
                }
            }
        }
    }

    /// Answers one request/response request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let store = &*self.store;
        let result = match request {
            Request::Ping => Ok(Response::Pong),
            Request::GetEntry { id } => lookup(store.get_entry(id).await)
                .map(|entry| Response::Entry { entry }),
            Request::GetActiveEntry => store
                .get_active_entry()
                .await
                .map(|entry| Response::Entry { entry }),
            Request::GetEntryList { search } => store
                .get_entry_list(search)
                .await
                .map(|entries| Response::Entries {
                    entries,
                    more: false,
                }),
            Request::CreateEntry { entry } => store
                .create_entry(entry)
                .await
                .map(|started| Response::Started { started }),
            Request::UpdateEntry { edit } => store
                .update_entry(edit)
                .await
                .map(|updated| Response::Updated { updated }),
            Request::DeleteEntry { id } => store.delete_entry(id).await.map(|entry| {
                Response::Entry { entry: Some(entry) }
            }),
            Request::StopActiveEntry { end } => store
                .stop_active_entry(end.unwrap_or_else(Utc::now))
                .await
                .map(|entry| Response::Entry { entry }),
            Request::ApplyAfkResolution { resolution } => store
                .apply_afk_resolution(resolution)
                .await
                .map(|applied| Response::Applied { applied }),
            Request::GetAlertList => store
                .get_alert_list()
                .await
                .map(|alerts| Response::Alerts {
                    alerts,
                    more: false,
                }),
            Request::DeleteAlert { id } => store
                .delete_alert(id)
                .await
                .map(|alert| Response::Alert { alert: Some(alert) }),
            Request::DeleteAlertType { alert_type } => store
                .delete_alert_type(alert_type)
                .await
                .map(|alerts| Response::Alerts {
                    alerts,
                    more: false,
                }),
            Request::CreateAlert { alert } => store
                .create_alert(alert)
                .await
                .map(|alert| Response::Alert { alert: Some(alert) }),
            Request::AfkSignal { state, at } => self
                .tracker
                .lock()
                .await
                .observe(store, state, at)
                .await
                .map(|alert| Response::Alert { alert }),
            Request::StreamEntry | Request::StreamAlert => {
                return Response::Error {
                    kind: "bad_request".to_string(),
                    message: "stream requests are not request/response".to_string(),
                };
            }
        };
        result.unwrap_or_else(|err| Response::error(&err))
    }
}

/// Bytes of a list frame outside its items, with room to spare.
const LIST_FRAME_OVERHEAD: usize = 64;

/// Writes `response`, splitting lists over as many frames as they need.
///
/// A frame that still does not fit is answered with a `frame_too_large`
/// error frame and the connection stays usable.
async fn write_response<W>(writer: &mut W, response: Response) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
{
    let frames = match response {
        Response::Entries { entries, .. } => split_list(entries)?
            .map(|(entries, more)| Response::Entries { entries, more })
            .collect(),
        Response::Alerts { alerts, .. } => split_list(alerts)?
            .map(|(alerts, more)| Response::Alerts { alerts, more })
            .collect(),
        other => vec![other],
    };
    for frame in &frames {
        match write_frame(writer, frame).await {
            Ok(()) => {}
            Err(DaemonError::FrameTooLarge(len)) => {
                tracing::warn!(len, response = frame.name(), "response does not fit in a frame");
                return write_frame(writer, &Response::frame_too_large(len)).await;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Groups `items` into chunks that each fit in one list frame, paired with
/// whether more chunks follow. Always yields at least one chunk.
fn split_list<T: Serialize>(
    items: Vec<T>,
) -> Result<impl Iterator<Item = (Vec<T>, bool)>, DaemonError> {
    let mut chunks = Vec::new();
    let mut chunk = Vec::new();
    let mut size = LIST_FRAME_OVERHEAD;
    for item in items {
        // One more byte for the separating comma.
        let len = serde_json::to_vec(&item)?.len() + 1;
        if !chunk.is_empty() && size + len > MAX_FRAME_LEN {
            chunks.push(std::mem::take(&mut chunk));
            size = LIST_FRAME_OVERHEAD;
        }
        size += len;
        chunk.push(item);
    }
    chunks.push(chunk);
    let last = chunks.len() - 1;
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(move |(index, chunk)| (chunk, index < last)))
}

/// Maps `NotFound` to an absent result for lookups.
fn lookup<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Relays `subscription` to the peer until it disconnects or `cancel` fires.
async fn relay_to_peer<T, R, S>(
    subscription: Subscription<T>,
    mut reader: R,
    mut sink: S,
    cancel: CancelToken,
) -> Result<(), DaemonError>
where
    T: Send,
    R: AsyncRead + Unpin + Send + 'static,
    S: EventSink<T>,
{
    // The peer sends nothing more on a stream; EOF or a read error means it is gone.
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            while let Ok(Some(_)) = read_frame::<_, Request>(&mut reader).await {}
            cancel.cancel();
        }
    });
    let result = relay(subscription, &cancel, &mut sink).await;
    watcher.abort();
    result.map(|_| ())
}
