use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use shared::domain::{RaffleEvent, RaffleEventKind};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Producer half handed to whatever watches the chain for one event kind.
pub struct EventSink {
    pub events: mpsc::Sender<RaffleEvent>,
    pub unsubscribed: oneshot::Receiver<()>,
}

/// Stream of contract events of a single kind. Dropping it, or calling
/// [`EventSubscription::unsubscribe`], tells the producer to stop.
pub struct EventSubscription {
    kind: RaffleEventKind,
    events: ReceiverStream<RaffleEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl EventSubscription {
    pub fn channel(kind: RaffleEventKind) -> (EventSink, EventSubscription) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        (
            EventSink {
                events: events_tx,
                unsubscribed: cancel_rx,
            },
            EventSubscription {
                kind,
                events: ReceiverStream::new(events_rx),
                cancel: Some(cancel_tx),
            },
        )
    }

    pub fn kind(&self) -> RaffleEventKind {
        self.kind
    }

    pub async fn next_event(&mut self) -> Option<RaffleEvent> {
        futures::StreamExt::next(&mut self.events).await
    }

    pub fn unsubscribe(mut self) {
        self.signal_unsubscribed();
    }

    fn signal_unsubscribed(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Stream for EventSubscription {
    type Item = RaffleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.signal_unsubscribed();
    }
}
