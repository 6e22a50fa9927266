//! The shared publish/subscribe bus.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::error::{BrokerError, BrokerResult};
use crate::subscriber::{Deliver, Delivery, SubscriberId};
use crate::table::TopicTable;

/// Proof of a registered subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: String,
    subscriber: SubscriberId,
    created: bool,
}

impl SubscriptionHandle {
    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The subscriber holding the subscription.
    #[must_use]
    pub const fn subscriber(&self) -> &SubscriberId {
        &self.subscriber
    }

    /// `false` if the subscription already existed before this call.
    #[must_use]
    pub const fn created(&self) -> bool {
        self.created
    }
}

/// Per-publish delivery outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sinks that accepted the payload.
    pub delivered: usize,
    /// Sinks that were saturated.
    pub dropped: usize,
    /// Sinks whose subscriber had already gone away.
    pub closed: usize,
}

impl PublishReport {
    /// Number of sinks the payload was offered to.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.closed
    }

    fn record(&mut self, outcome: Delivery) {
        match outcome {
            Delivery::Queued => self.delivered += 1,
            Delivery::Dropped => self.dropped += 1,
            Delivery::Closed => self.closed += 1,
        }
    }
}

/// Point-in-time broker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Live (topic, subscriber) pairs.
    pub subscriptions: usize,
    /// Publish calls accepted since start.
    pub published: u64,
    /// Successful sink deliveries since start.
    pub delivered: u64,
    /// Deliveries discarded (saturated or closed sinks) since start.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// In-process topic broker.
///
/// Construct one per process and share it behind an [`Arc`]. The routing table
/// sits behind a single [`RwLock`] that is held only for the mutation or the
/// sink snapshot; sinks are always invoked with the lock released.
pub struct Broker {
    table: RwLock<TopicTable>,
    closed: AtomicBool,
    counters: Counters,
}

impl Broker {
    /// Create an empty, open broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RwLock::new(TopicTable::default()),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Create an empty broker already wrapped for sharing.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register `sink` to receive every future publish on `topic`.
    ///
    /// Subscribing twice with the same `subscriber` keeps the original sink and
    /// reports `created() == false`.
    ///
    /// # Errors
    ///
    /// [`BrokerError::InvalidTopic`] for an empty topic, [`BrokerError::Closed`]
    /// once the broker has been closed.
    pub fn subscribe<D>(
        &self,
        topic: &str,
        subscriber: SubscriberId,
        sink: D,
    ) -> BrokerResult<SubscriptionHandle>
    where
        D: Deliver + 'static,
    {
        validate_topic(topic)?;

        let created = {
            let mut table = self.table.write();
            // Checked under the lock so a concurrent close() cannot leave a
            // subscription behind in the cleared table.
            if self.is_closed() {
                return Err(BrokerError::Closed);
            }
            if table.contains(topic, &subscriber) {
                false
            } else {
                table.insert(topic, subscriber.clone(), Arc::new(sink))
            }
        };

        debug!(%topic, %subscriber, created, "subscribed");
        Ok(SubscriptionHandle {
            topic: topic.to_string(),
            subscriber,
            created,
        })
    }

    /// Remove one subscription.
    ///
    /// # Errors
    ///
    /// [`BrokerError::NotSubscribed`] if no such subscription exists. Callers
    /// should treat it as an already-completed removal.
    pub fn unsubscribe(&self, topic: &str, subscriber: &SubscriberId) -> BrokerResult<()> {
        if self.table.write().remove(topic, subscriber) {
            debug!(%topic, %subscriber, "unsubscribed");
            Ok(())
        } else {
            Err(BrokerError::NotSubscribed {
                topic: topic.to_string(),
                subscriber: subscriber.clone(),
            })
        }
    }

    /// Remove every subscription held by `subscriber`. Returns how many existed.
    pub fn unsubscribe_all(&self, subscriber: &SubscriberId) -> usize {
        let removed = self.table.write().remove_subscriber(subscriber);
        if removed > 0 {
            debug!(%subscriber, removed, "removed all subscriptions");
        }
        removed
    }

    /// Offer `payload` to every current subscriber of `topic`.
    ///
    /// Sinks run on the caller's task, one after another, after the table lock
    /// has been released. A topic with no subscribers yields an empty report.
    ///
    /// # Errors
    ///
    /// [`BrokerError::InvalidTopic`] for an empty topic, [`BrokerError::Closed`]
    /// once the broker has been closed.
    pub fn publish(&self, topic: &str, payload: Bytes) -> BrokerResult<PublishReport> {
        validate_topic(topic)?;
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let sinks = self.table.read().sinks(topic);
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let mut report = PublishReport::default();
        for sink in &sinks {
            report.record(sink.deliver(topic, payload.clone()));
        }

        self.counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .dropped
            .fetch_add((report.dropped + report.closed) as u64, Ordering::Relaxed);

        trace!(
            %topic,
            bytes = payload.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "published"
        );
        Ok(report)
    }

    /// Close the broker: drop all subscriptions and refuse further work.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.table.write().clear();
        info!(dropped_subscriptions = dropped, "broker closed");
    }

    /// Whether [`Broker::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Health summary for diagnostics.
    #[must_use]
    pub fn status(&self) -> &'static str {
        if self.is_closed() { "closed" } else { "online" }
    }

    /// Snapshot of table sizes and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        let (topics, subscriptions) = {
            let table = self.table.read();
            (table.topic_count(), table.subscription_count())
        };
        BrokerStats {
            topics,
            subscriptions,
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.table.read().topic_count()
    }

    /// Subscribers registered on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.table.read().subscriber_count(topic)
    }

    /// Whether `subscriber` is registered on `topic`.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str, subscriber: &SubscriberId) -> bool {
        self.table.read().contains(topic, subscriber)
    }

    /// Topics `subscriber` is registered on, sorted.
    #[must_use]
    pub fn topics_for(&self, subscriber: &SubscriberId) -> Vec<String> {
        self.table.read().topics_for(subscriber)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

fn validate_topic(topic: &str) -> BrokerResult<()> {
    if topic.is_empty() {
        return Err(BrokerError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn channel_sink(capacity: usize) -> (impl Deliver + 'static, Receiver<Bytes>) {
        let (tx, rx): (SyncSender<Bytes>, Receiver<Bytes>) = mpsc::sync_channel(capacity);
        let sink = move |_: &str, payload: Bytes| match tx.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Disconnected(_)) => Delivery::Closed,
        };
        (sink, rx)
    }

    fn noop_sink() -> impl Deliver + 'static {
        |_: &str, _: Bytes| Delivery::Queued
    }

    fn id(name: &str) -> SubscriberId {
        SubscriberId::from(name)
    }

    #[test]
    fn test_new_broker_is_online_and_empty() {
        let broker = Broker::new();
        assert_eq!(broker.status(), "online");
        assert_eq!(broker.stats(), BrokerStats::default());
    }

    #[test]
    fn test_subscribe_and_publish() {
        let broker = Broker::new();
        let (sink, rx) = channel_sink(4);

        let handle = broker.subscribe("sensors", id("ws-1"), sink).unwrap();
        assert!(handle.created());
        assert_eq!(handle.topic(), "sensors");
        assert_eq!(handle.subscriber(), &id("ws-1"));

        let report = broker
            .publish("sensors", Bytes::from_static(b"{\"t\":1}"))
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"{\"t\":1}"));
    }

    #[test_case(""; "empty topic")]
    fn test_subscribe_rejects_invalid_topic(topic: &str) {
        let broker = Broker::new();
        let err = broker.subscribe(topic, id("ws-1"), noop_sink()).unwrap_err();
        assert_eq!(err, BrokerError::InvalidTopic(String::new()));
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_publish_rejects_empty_topic() {
        let broker = Broker::new();
        assert!(matches!(
            broker.publish("", Bytes::new()),
            Err(BrokerError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_duplicate_subscribe_keeps_original_sink() {
        let broker = Broker::new();
        let (first, first_rx) = channel_sink(4);
        let (second, second_rx) = channel_sink(4);

        broker.subscribe("t", id("ws-1"), first).unwrap();
        let handle = broker.subscribe("t", id("ws-1"), second).unwrap();
        assert!(!handle.created());
        assert_eq!(broker.subscriber_count("t"), 1);

        broker.publish("t", Bytes::from_static(b"1")).unwrap();
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let broker = Broker::new();
        let report = broker.publish("nobody", Bytes::from_static(b"x")).unwrap();
        assert_eq!(report, PublishReport::default());
        assert_eq!(report.attempted(), 0);
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_unsubscribe_missing_is_not_subscribed() {
        let broker = Broker::new();
        let err = broker.unsubscribe("t", &id("ws-1")).unwrap_err();
        assert!(err.is_not_subscribed());
    }

    #[test]
    fn test_last_unsubscribe_removes_topic() {
        let broker = Broker::new();
        broker.subscribe("t", id("ws-1"), noop_sink()).unwrap();
        broker.subscribe("t", id("ws-2"), noop_sink()).unwrap();

        broker.unsubscribe("t", &id("ws-1")).unwrap();
        assert_eq!(broker.topic_count(), 1);
        broker.unsubscribe("t", &id("ws-2")).unwrap();
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_unsubscribe_all() {
        let broker = Broker::new();
        broker.subscribe("a", id("ws-1"), noop_sink()).unwrap();
        broker.subscribe("b", id("ws-1"), noop_sink()).unwrap();
        broker.subscribe("b", id("ws-2"), noop_sink()).unwrap();

        assert_eq!(broker.unsubscribe_all(&id("ws-1")), 2);
        assert!(broker.topics_for(&id("ws-1")).is_empty());
        assert_eq!(broker.topics_for(&id("ws-2")), vec!["b"]);
        assert_eq!(broker.unsubscribe_all(&id("ws-1")), 0);
    }

    #[test]
    fn test_full_subscriber_does_not_affect_others() {
        let broker = Broker::new();
        let (slow, slow_rx) = channel_sink(1);
        let (fast, fast_rx) = channel_sink(8);
        broker.subscribe("t", id("slow"), slow).unwrap();
        broker.subscribe("t", id("fast"), fast).unwrap();

        for i in 0..4u8 {
            broker.publish("t", Bytes::from(vec![i])).unwrap();
        }

        assert_eq!(fast_rx.try_iter().count(), 4);
        assert_eq!(slow_rx.try_iter().count(), 1);

        let stats = broker.stats();
        assert_eq!(stats.published, 4);
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn test_closed_receiver_is_reported() {
        let broker = Broker::new();
        let (sink, rx) = channel_sink(1);
        broker.subscribe("t", id("gone"), sink).unwrap();
        drop(rx);

        let report = broker.publish("t", Bytes::from_static(b"x")).unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(report.delivered, 0);
    }

    #[test]
    fn test_sink_may_reenter_broker() {
        let broker = Arc::new(Broker::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let broker = Arc::clone(&broker);
            let seen = Arc::clone(&seen);
            move |topic: &str, _: Bytes| {
                // Would deadlock if the table lock were held during delivery.
                seen.lock().unwrap().push(broker.subscriber_count(topic));
                Delivery::Queued
            }
        };
        broker.subscribe("t", id("ws-1"), sink).unwrap();

        broker.publish("t", Bytes::from_static(b"x")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_close_is_idempotent_and_refuses_work() {
        let broker = Broker::new();
        broker.subscribe("t", id("ws-1"), noop_sink()).unwrap();

        broker.close();
        broker.close();

        assert_eq!(broker.status(), "closed");
        assert_eq!(broker.topic_count(), 0);
        assert_eq!(
            broker.subscribe("t", id("ws-1"), noop_sink()).unwrap_err(),
            BrokerError::Closed
        );
        assert_eq!(
            broker.publish("t", Bytes::new()).unwrap_err(),
            BrokerError::Closed
        );
    }

    #[test]
    fn test_concurrent_subscribers() {
        let broker = Arc::new(Broker::new());

        std::thread::scope(|scope| {
            for n in 0..8 {
                let broker = Arc::clone(&broker);
                scope.spawn(move || {
                    let subscriber = SubscriberId::from(format!("ws-{n}"));
                    for round in 0..50 {
                        broker
                            .subscribe("shared", subscriber.clone(), noop_sink())
                            .unwrap();
                        broker.publish("shared", Bytes::from(vec![round])).unwrap();
                        broker.unsubscribe("shared", &subscriber).unwrap();
                    }
                });
            }
        });

        assert_eq!(broker.topic_count(), 0);
        assert_eq!(broker.stats().published, 400);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Subscribe(u8),
        Unsubscribe(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3u8).prop_map(Op::Subscribe),
            (0..3u8).prop_map(Op::Unsubscribe),
        ]
    }

    proptest! {
        #[test]
        fn test_membership_follows_operation_order(ops in proptest::collection::vec(op(), 0..40)) {
            let broker = Broker::new();
            let subscriber = id("ws-1");
            let mut expected = std::collections::BTreeSet::new();

            for op in ops {
                match op {
                    Op::Subscribe(n) => {
                        let topic = format!("topic-{n}");
                        let handle = broker.subscribe(&topic, subscriber.clone(), noop_sink()).unwrap();
                        prop_assert_eq!(handle.created(), expected.insert(topic));
                    }
                    Op::Unsubscribe(n) => {
                        let topic = format!("topic-{n}");
                        let result = broker.unsubscribe(&topic, &subscriber);
                        prop_assert_eq!(result.is_ok(), expected.remove(&topic));
                    }
                }
            }

            let expected: Vec<String> = expected.into_iter().collect();
            prop_assert_eq!(broker.topics_for(&subscriber), expected);
            prop_assert_eq!(broker.topic_count(), broker.topics_for(&subscriber).len());
        }
    }
}
