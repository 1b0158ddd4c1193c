//! `tt watch`: follow daemon events and resolve AFK alerts as they arrive.

use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::TimeZone;
use tokio::sync::{mpsc, oneshot};
use tt_core::{
    AfkResolver, Alert, AlertType, CancelToken, EventType, Prompter, StreamedAlert, StreamedEntry,
};
use tt_daemon::{DaemonError, EventStream, StreamEvent};

use super::resolve;
use super::util::{describe_alert, describe_entry};
use crate::backend::connect_daemon;
use crate::{Backend, Config};

enum Event {
    Entry(StreamedEntry),
    Alert(StreamedAlert),
}

/// Subscriptions to both event streams plus a connection for applying
/// resolutions.
#[derive(Debug)]
pub struct Watch {
    entries: EventStream<StreamedEntry>,
    alerts: EventStream<StreamedAlert>,
    backend: Backend,
}

impl Watch {
    /// Connects and subscribes. Events committed after this returns are seen.
    pub async fn connect(config: &Config) -> Result<Self> {
        let entries = connect_daemon(config).await?.stream_entries().await?;
        let alerts = connect_daemon(config).await?.stream_alerts().await?;
        let backend = Backend::Remote(connect_daemon(config).await?);
        Ok(Self {
            entries,
            alerts,
            backend,
        })
    }

    /// Prints events until `shutdown` fires or the daemon closes the streams.
    ///
    /// New "formerly AFK" alerts are resolved with `resolver` and dismissed.
    pub async fn run<W, P, Tz>(
        self,
        writer: &mut W,
        resolver: AfkResolver<P>,
        shutdown: &CancelToken,
        tz: &Tz,
    ) -> Result<()>
    where
        W: Write,
        P: Prompter + Send + 'static,
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let Self {
            entries,
            alerts,
            mut backend,
        } = self;
        let (tx, mut rx) = mpsc::channel(16);
        let forwarders = [
            tokio::spawn(forward(entries, tx.clone(), Event::Entry)),
            tokio::spawn(forward(alerts, tx, Event::Alert)),
        ];
        let result = follow(writer, &mut rx, &mut backend, resolver, shutdown, tz).await;
        for task in forwarders {
            task.abort();
        }
        result
    }
}

/// Pushes events from one stream into the shared channel.
///
/// Both streams are read by their own task so neither read is ever dropped
/// mid-frame.
async fn forward<T, F>(
    mut stream: EventStream<T>,
    tx: mpsc::Sender<Result<Event, DaemonError>>,
    wrap: F,
) where
    T: StreamEvent,
    F: Fn(T) -> Event,
{
    loop {
        let item = match stream.next().await {
            Ok(Some(event)) => Ok(wrap(event)),
            Ok(None) => return,
            Err(err) => Err(err),
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}

async fn follow<W, P, Tz>(
    writer: &mut W,
    rx: &mut mpsc::Receiver<Result<Event, DaemonError>>,
    backend: &mut Backend,
    mut resolver: AfkResolver<P>,
    shutdown: &CancelToken,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    P: Prompter + Send + 'static,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            event = rx.recv() => event,
        };
        let Some(event) = event else {
            tracing::info!("daemon closed the event streams");
            return Ok(());
        };
        match event.context("event stream failed")? {
            Event::Entry(streamed) => writeln!(
                writer,
                "[entry {}] {}",
                streamed.event,
                describe_entry(&streamed.entry, tz)
            )?,
            Event::Alert(streamed) => {
                writeln!(
                    writer,
                    "[alert {}] {}",
                    streamed.event,
                    describe_alert(&streamed.alert, tz)
                )?;
                if streamed.event == EventType::Created
                    && streamed.alert.kind.alert_type() == AlertType::FormerlyAfk
                {
                    let resolved =
                        resolve_alert(writer, backend, resolver, streamed.alert, shutdown, tz)
                            .await?;
                    let Some(next) = resolved else {
                        return Ok(());
                    };
                    resolver = next;
                }
            }
        }
    }
}

/// Prompts on a dedicated thread, then applies the answer.
///
/// A prompt that fails leaves the alert in place for `tt resolve`. Returns
/// `None` if `shutdown` fires while the prompt waits for input; the alert is
/// kept and the prompt thread is abandoned so it cannot hold up exit.
async fn resolve_alert<W, P, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    mut resolver: AfkResolver<P>,
    alert: Alert,
    shutdown: &CancelToken,
    tz: &Tz,
) -> Result<Option<AfkResolver<P>>>
where
    W: Write,
    P: Prompter + Send + 'static,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let (tx, rx) = oneshot::channel();
    let prompted = alert.clone();
    std::thread::Builder::new()
        .name("afk-prompt".to_string())
        .spawn(move || {
            let outcome = resolver.handle(&prompted);
            if tx.send((resolver, outcome)).is_err() {
                tracing::debug!("prompt answered after shutdown");
            }
        })
        .context("failed to start prompt thread")?;
    let (resolver, outcome) = tokio::select! {
        () = shutdown.cancelled() => {
            tracing::info!(alert = %alert.id, "prompt cancelled, alert kept");
            return Ok(None);
        }
        answer = rx => answer.context("prompt thread panicked")?,
    };
    match outcome {
        Ok(Some(resolution)) => resolve::apply(writer, backend, &alert, resolution, tz).await?,
        Ok(None) => {}
        Err(err) => tracing::warn!(alert = %alert.id, error = %err, "alert left unresolved"),
    }
    Ok(Some(resolver))
}
