//! Event fan-out shared by every transport role.
//!
//! Each subscriber owns an unbounded channel, so a slow consumer only grows
//! its own backlog and never loses events. Dropping the receiver
//! unsubscribes; the sender is pruned on the next emission.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Receiving end of one subscription
pub type EventReceiver<E> = mpsc::UnboundedReceiver<E>;

/// Subscription as a `Stream`
pub type EventStream<E> = UnboundedReceiverStream<E>;

pub(crate) struct EventHub<E> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<E>>>,
}

impl<E: Clone> EventHub<E> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> EventReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Holds the lock for the whole fan-out: all subscribers see one order.
    pub(crate) fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_backlog_is_never_truncated() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        for i in 0..10_000u32 {
            hub.emit(i);
        }
        for i in 0..10_000u32 {
            assert_eq!(rx.try_recv().unwrap(), i);
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        let mut kept = hub.subscribe();
        drop(rx);

        hub.emit("a");
        assert_eq!(hub.subscribers.lock().unwrap().len(), 1);
        assert_eq!(kept.try_recv().unwrap(), "a");
    }

    #[test]
    fn test_late_subscriber_sees_only_new_events() {
        let hub = EventHub::new();
        hub.emit(1);
        let mut rx = hub.subscribe();
        hub.emit(2);
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_yields_in_emission_order() {
        use futures::StreamExt;

        let hub = EventHub::new();
        let mut stream = EventStream::new(hub.subscribe());
        hub.emit(1);
        hub.emit(2);
        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
    }
}
