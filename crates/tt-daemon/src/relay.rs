//! Streaming relay: forwards one bus subscription to one outbound stream.

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tt_core::{CancelToken, StreamedAlert, StreamedEntry, Subscription};

use crate::error::DaemonError;
use crate::protocol::{Response, write_frame};

/// Destination of relayed events.
#[async_trait]
pub trait EventSink<T>: Send {
    async fn send(&mut self, event: T) -> Result<(), DaemonError>;
}

/// Forwards events from `subscription` to `sink` until the subscription closes
/// or `cancel` fires.
///
/// A failed send ends the relay with that error. The subscription is dropped,
/// and so removed from the bus, before this function returns. Returns the
/// number of events sent.
pub async fn relay<T, S>(
    mut subscription: Subscription<T>,
    cancel: &CancelToken,
    sink: &mut S,
) -> Result<u64, DaemonError>
where
    T: Send,
    S: EventSink<T> + ?Sized,
{
    let id = subscription.id();
    let mut sent = 0;
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => None,
            event = subscription.recv() => event,
        };
        let Some(event) = event else {
            tracing::debug!(subscription = %id, sent, "relay finished");
            return Ok(sent);
        };
        let result = tokio::select! {
            () = cancel.cancelled() => return Ok(sent),
            result = sink.send(event) => result,
        };
        if let Err(err) = result {
            drop(subscription);
            tracing::warn!(subscription = %id, error = %err, "relay send failed");
            return Err(err);
        }
        sent += 1;
    }
}

/// Writes relayed events as protocol frames.
#[derive(Debug)]
pub struct FrameSink<W> {
    writer: W,
}

impl<W> FrameSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink<StreamedEntry> for FrameSink<W> {
    async fn send(&mut self, event: StreamedEntry) -> Result<(), DaemonError> {
        write_frame(&mut self.writer, &Response::EntryEvent { event }).await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink<StreamedAlert> for FrameSink<W> {
    async fn send(&mut self, event: StreamedAlert) -> Result<(), DaemonError> {
        write_frame(&mut self.writer, &Response::AlertEvent { event }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tt_core::EventBus;

    #[derive(Default)]
    struct RecordingSink {
        received: Vec<u32>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl EventSink<u32> for RecordingSink {
        async fn send(&mut self, event: u32) -> Result<(), DaemonError> {
            if self.fail_on == Some(event) {
                return Err(DaemonError::ConnectionClosed);
            }
            self.received.push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_events_until_cancelled() {
        let bus: EventBus<u32> = EventBus::new();
        let cancel = CancelToken::new();
        let subscription = bus.subscribe_until(&cancel);
        for n in 1..=3 {
            bus.publish_wait(&n).await;
        }

        let relay_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut sink = RecordingSink::default();
            let sent = relay(subscription, &relay_cancel, &mut sink).await;
            (sent, sink.received)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let (sent, received) = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay should stop on cancel")
            .unwrap();
        assert_eq!(sent.unwrap(), 3);
        assert_eq!(received, vec![1, 2, 3]);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn send_failure_tears_down_subscription() {
        let bus: EventBus<u32> = EventBus::new();
        let cancel = CancelToken::new();
        let subscription = bus.subscribe();
        bus.publish_wait(&1).await;
        bus.publish_wait(&2).await;

        let mut sink = RecordingSink {
            fail_on: Some(2),
            ..RecordingSink::default()
        };
        let err = relay(subscription, &cancel, &mut sink).await.unwrap_err();
        assert!(matches!(err, DaemonError::ConnectionClosed));
        assert_eq!(sink.received, vec![1]);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closed_source_ends_relay_cleanly() {
        let bus: EventBus<u32> = EventBus::new();
        let subscription = bus.subscribe();
        bus.unsubscribe(subscription.id()).unwrap();

        let mut sink = RecordingSink::default();
        let sent = relay(subscription, &CancelToken::new(), &mut sink).await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn frame_sink_writes_event_frames() {
        use crate::protocol::read_frame;
        use chrono::Utc;
        use tt_core::{Entry, EntryId, EventType};

        let now = Utc::now();
        let event = StreamedEntry {
            entry: Entry {
                id: EntryId::new(1),
                name: "Work".to_string(),
                start: now,
                end: None,
                created_at: now,
                updated_at: now,
            },
            event: EventType::Created,
        };
        let (writer, mut reader) = tokio::io::duplex(4096);
        let mut sink = FrameSink::new(writer);
        sink.send(event.clone()).await.unwrap();

        let frame: Option<Response> = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame, Some(Response::EntryEvent { event }));
    }
}
