//! Topic → subscriber fan-out table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::subscriber::{Deliver, SubscriberId};

type Sinks = HashMap<SubscriberId, Arc<dyn Deliver>>;

/// The broker's routing table. Topics with no subscribers are never kept.
#[derive(Default)]
pub(crate) struct TopicTable {
    topics: HashMap<String, Sinks>,
}

impl TopicTable {
    /// Register (or replace) a sink. Returns `true` if the pair is new.
    pub(crate) fn insert(
        &mut self,
        topic: &str,
        subscriber: SubscriberId,
        sink: Arc<dyn Deliver>,
    ) -> bool {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(subscriber, sink)
            .is_none()
    }

    /// Remove one subscription. Returns `true` if it existed.
    pub(crate) fn remove(&mut self, topic: &str, subscriber: &SubscriberId) -> bool {
        let Some(sinks) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = sinks.remove(subscriber).is_some();
        if sinks.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Remove every subscription held by `subscriber`.
    pub(crate) fn remove_subscriber(&mut self, subscriber: &SubscriberId) -> usize {
        let mut removed = 0;
        self.topics.retain(|_, sinks| {
            if sinks.remove(subscriber).is_some() {
                removed += 1;
            }
            !sinks.is_empty()
        });
        removed
    }

    /// Snapshot of the sinks registered for `topic`.
    pub(crate) fn sinks(&self, topic: &str) -> Vec<Arc<dyn Deliver>> {
        self.topics
            .get(topic)
            .map(|sinks| sinks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, topic: &str, subscriber: &SubscriberId) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|sinks| sinks.contains_key(subscriber))
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub(crate) fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HashMap::len)
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.topics.values().map(HashMap::len).sum()
    }

    /// Topics `subscriber` is registered on, sorted.
    pub(crate) fn topics_for(&self, subscriber: &SubscriberId) -> Vec<String> {
        let mut topics: Vec<String> = self
            .topics
            .iter()
            .filter(|(_, sinks)| sinks.contains_key(subscriber))
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.subscription_count();
        self.topics.clear();
        count
    }
}
