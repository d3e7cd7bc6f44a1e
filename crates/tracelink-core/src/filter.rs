//! Filter predicates and the subscription registry.
//!
//! A predicate is a set of `(application id, context id)` pairs where either
//! side may be wildcarded; the empty set matches everything. Matching is a
//! linear scan over subscriptions: counts are tens, not thousands, so a
//! reverse index would buy nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracelink_proto::{Message, ShortId};

use crate::error::FilterError;

/// Most pairs accepted in a single predicate.
pub const MAX_FILTER_PAIRS: usize = 30;

/// One accepted `(application id, context id)` combination.
///
/// `None` on either side matches any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterPair {
    /// Application id to accept, or any if `None`.
    pub app_id: Option<ShortId>,
    /// Context id to accept, or any if `None`.
    pub context_id: Option<ShortId>,
}

impl FilterPair {
    /// Build a pair; empty ids are treated as wildcards.
    pub fn new(app_id: Option<ShortId>, context_id: Option<ShortId>) -> Self {
        Self {
            app_id: app_id.filter(|id| !id.is_empty()),
            context_id: context_id.filter(|id| !id.is_empty()),
        }
    }

    fn matches(&self, message: &Message) -> bool {
        self.app_id.is_none_or(|id| id == message.app_id())
            && self.context_id.is_none_or(|id| id == message.context_id())
    }
}

/// The filter of one subscription: zero or more accepted pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterPredicate {
    pairs: Vec<FilterPair>,
}

impl FilterPredicate {
    /// A predicate that matches every message.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// A predicate from explicit pairs.
    pub fn new(pairs: Vec<FilterPair>) -> Self {
        Self { pairs }
    }

    /// Convenience: a single-pair predicate.
    pub fn pair(app_id: Option<ShortId>, context_id: Option<ShortId>) -> Self {
        Self { pairs: vec![FilterPair::new(app_id, context_id)] }
    }

    /// The accepted pairs; empty means match-all.
    pub fn pairs(&self) -> &[FilterPair] {
        &self.pairs
    }

    /// True when every message matches.
    pub fn is_match_all(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Does `message` match this predicate?
    pub fn matches(&self, message: &Message) -> bool {
        self.pairs.is_empty() || self.pairs.iter().any(|pair| pair.matches(message))
    }
}

/// Identifier of a live subscription, unique within one broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct RegisteredQueue {
    predicate: FilterPredicate,
    sender: mpsc::Sender<Message>,
    dropped: Arc<AtomicU64>,
}

/// Delivery accounting for one dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Queues the message was delivered to.
    pub delivered: usize,
    /// Matching queues that were full (message dropped for them).
    pub dropped: usize,
    /// Queues removed because their consumer went away.
    pub pruned: usize,
}

/// Maps subscription ids to predicates and delivery queues.
///
/// The broker API and the ingestion task share one registry behind a mutex;
/// every method is non-blocking so the lock is never held across `await`.
#[derive(Default)]
pub struct FilterRegistry {
    next_id: u64,
    entries: HashMap<SubscriptionId, RegisteredQueue>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate with a bounded queue of `capacity` messages.
    ///
    /// Returns the new id, the consumer half of the queue, and the shared
    /// dropped-message counter.
    pub fn register(
        &mut self,
        predicate: FilterPredicate,
        capacity: usize,
    ) -> Result<(SubscriptionId, mpsc::Receiver<Message>, Arc<AtomicU64>), FilterError> {
        if predicate.pairs().len() > MAX_FILTER_PAIRS {
            return Err(FilterError::TooManyPairs {
                count: predicate.pairs().len(),
                limit: MAX_FILTER_PAIRS,
            });
        }
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        self.entries.insert(
            id,
            RegisteredQueue { predicate, sender, dropped: Arc::clone(&dropped) },
        );
        Ok((id, receiver, dropped))
    }

    /// Remove a subscription; its queue closes once in-flight messages are
    /// drained. Returns whether the id was known.
    pub fn unregister(&mut self, id: SubscriptionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Ids of all subscriptions whose predicate matches `message`.
    pub fn matching(&self, message: &Message) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.predicate.matches(message))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Deliver `message` to every matching queue.
    ///
    /// Never blocks: a full queue drops the message for that subscription
    /// only (drop-new) and bumps its dropped counter; a closed queue is
    /// pruned.
    pub fn dispatch(&mut self, message: &Message) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut closed = Vec::new();

        for (id, entry) in &self.entries {
            if !entry.predicate.matches(message) {
                continue;
            }
            match entry.sender.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    entry.dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            self.entries.remove(&id);
            report.pruned += 1;
        }
        report
    }

    /// Drop every queue, closing all subscriptions.
    pub fn close_all(&mut self) {
        self.entries.clear();
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no subscription is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelink_proto::Message;

    fn message(app: &str, ctx: &str) -> Message {
        Message::builder()
            .ids(app.parse().unwrap(), ctx.parse().unwrap())
            .text("test")
            .build()
    }

    fn id(s: &str) -> Option<ShortId> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn wildcard_semantics() {
        let msg = message("SYS", "JOUR");

        assert!(FilterPredicate::match_all().matches(&msg));
        assert!(FilterPredicate::pair(id("SYS"), id("JOUR")).matches(&msg));
        assert!(FilterPredicate::pair(id("SYS"), None).matches(&msg));
        assert!(FilterPredicate::pair(None, id("JOUR")).matches(&msg));
        assert!(!FilterPredicate::pair(id("APP"), id("JOUR")).matches(&msg));
        assert!(!FilterPredicate::pair(id("SYS"), id("CTX")).matches(&msg));
    }

    #[test]
    fn empty_ids_act_as_wildcards() {
        let pair = FilterPair::new(Some(ShortId::EMPTY), id("JOUR"));
        assert_eq!(pair.app_id, None);
        assert!(FilterPredicate::new(vec![pair]).matches(&message("ANY", "JOUR")));
    }

    #[test]
    fn any_pair_in_the_set_suffices() {
        let predicate = FilterPredicate::new(vec![
            FilterPair::new(id("AAA"), id("BBB")),
            FilterPair::new(id("SYS"), id("JOUR")),
        ]);
        assert!(predicate.matches(&message("SYS", "JOUR")));
        assert!(!predicate.matches(&message("SYS", "CTX")));
    }

    #[test]
    fn messages_without_extended_header_match_only_wildcards() {
        let msg = Message::builder().non_verbose(bytes::Bytes::new()).build();
        assert!(FilterPredicate::match_all().matches(&msg));
        assert!(!FilterPredicate::pair(id("SYS"), None).matches(&msg));
    }

    #[test]
    fn registry_matches_and_dispatches() {
        let mut registry = FilterRegistry::new();
        let (all, mut all_rx, _) = registry.register(FilterPredicate::match_all(), 8).unwrap();
        let (journal, mut journal_rx, _) =
            registry.register(FilterPredicate::pair(id("SYS"), id("JOUR")), 8).unwrap();

        let sys = message("SYS", "JOUR");
        let app = message("APP", "CTX");

        assert_eq!(registry.matching(&sys), vec![all, journal]);
        assert_eq!(registry.matching(&app), vec![all]);

        let report = registry.dispatch(&sys);
        assert_eq!(report, DispatchReport { delivered: 2, dropped: 0, pruned: 0 });
        registry.dispatch(&app);

        assert_eq!(all_rx.try_recv().unwrap(), sys);
        assert_eq!(all_rx.try_recv().unwrap(), app);
        assert_eq!(journal_rx.try_recv().unwrap(), sys);
        assert!(journal_rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_new_messages_and_counts_them() {
        let mut registry = FilterRegistry::new();
        let (_, mut rx, dropped) = registry.register(FilterPredicate::match_all(), 2).unwrap();

        for _ in 0..5 {
            registry.dispatch(&message("SYS", "JOUR"));
        }
        assert_eq!(dropped.load(Ordering::Relaxed), 3);

        // The two oldest messages survived.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_consumers_are_pruned() {
        let mut registry = FilterRegistry::new();
        let (_, rx, _) = registry.register(FilterPredicate::match_all(), 2).unwrap();
        drop(rx);

        let report = registry.dispatch(&message("SYS", "JOUR"));
        assert_eq!(report.pruned, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn oversized_predicates_are_rejected() {
        let mut registry = FilterRegistry::new();
        let pairs = vec![FilterPair::default(); MAX_FILTER_PAIRS + 1];
        let error = registry.register(FilterPredicate::new(pairs), 1).unwrap_err();
        assert_eq!(error, FilterError::TooManyPairs { count: 31, limit: 30 });
    }
}
