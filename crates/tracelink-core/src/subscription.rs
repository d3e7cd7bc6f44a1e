//! Consumer-side handle of a live filtered message feed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{timeout_at, Instant};
use tracelink_proto::Message;

use crate::filter::SubscriptionId;

/// The consumer half of one subscription.
///
/// The broker's dispatch path is the only producer for the underlying
/// bounded queue; this handle is the only consumer. Dropping the handle
/// unsubscribes implicitly: the broker prunes the closed queue on the next
/// matching message.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Message>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        receiver: mpsc::Receiver<Message>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self { id, receiver, dropped }
    }

    /// Identifier of this subscription, for `unsubscribe`.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Messages dropped for this subscription because its queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Receive the next matching message, waiting as long as it takes.
    ///
    /// Returns `None` once the broker stopped (or unsubscribed this id) and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Receive a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Collect up to `count` messages within `timeout`.
    ///
    /// Blocks only the calling consumer, against a single monotonic
    /// deadline. Returns early once `count` messages arrived; on timeout or
    /// broker shutdown it returns whatever matched so far, possibly empty,
    /// never an error.
    pub async fn wait_for(&mut self, count: usize, timeout: Duration) -> Vec<Message> {
        let deadline = Instant::now() + timeout;
        let mut messages = Vec::with_capacity(count.min(64));
        while messages.len() < count {
            match timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(message)) => messages.push(message),
                // Queue closed: the broker stopped or unsubscribed us.
                Ok(None) => break,
                // Deadline reached.
                Err(_) => break,
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterPredicate, FilterRegistry};
    use tracelink_proto::Message;

    fn subscription(capacity: usize) -> (FilterRegistry, Subscription) {
        let mut registry = FilterRegistry::new();
        let (id, receiver, dropped) =
            registry.register(FilterPredicate::match_all(), capacity).unwrap();
        (registry, Subscription::new(id, receiver, dropped))
    }

    fn message(n: u8) -> Message {
        Message::builder().counter(n).text("m").build()
    }

    #[tokio::test]
    async fn wait_for_returns_early_once_count_is_reached() {
        let (mut registry, mut sub) = subscription(16);
        for n in 0..3 {
            registry.dispatch(&message(n));
        }

        let start = Instant::now();
        let messages = sub.wait_for(3, Duration::from_secs(30)).await;
        assert_eq!(messages.len(), 3);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(messages[1].counter(), 1);
    }

    #[tokio::test]
    async fn wait_for_times_out_with_partial_results() {
        let (mut registry, mut sub) = subscription(16);
        registry.dispatch(&message(0));

        let messages = sub.wait_for(10, Duration::from_millis(50)).await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn wait_for_returns_empty_after_shutdown() {
        let (registry, mut sub) = subscription(16);
        drop(registry);
        let messages = sub.wait_for(5, Duration::from_millis(50)).await;
        assert!(messages.is_empty());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn try_recv_never_blocks() {
        let (mut registry, mut sub) = subscription(16);
        assert!(sub.try_recv().is_none());
        registry.dispatch(&message(7));
        assert_eq!(sub.try_recv().unwrap().counter(), 7);
    }
}
