//! Subscriber identity and the delivery seam.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Identifies one subscriber (typically one client connection).
///
/// Cheap to clone; the broker stores one copy per subscription.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Arc<str>);

impl SubscriberId {
    /// Create a subscriber id.
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Outcome of handing one message to a subscriber sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// The message was accepted for delivery.
    Queued,
    /// The subscriber is saturated; the message was discarded.
    Dropped,
    /// The subscriber is gone; the message was discarded.
    Closed,
}

/// A subscriber sink invoked by [`Broker::publish`](crate::Broker::publish).
///
/// Implementations run on the publisher's task and must not block: hand the
/// payload off (e.g. `try_send` on a bounded channel) and report the outcome.
pub trait Deliver: Send + Sync {
    /// Offer `payload`, published on `topic`, to this subscriber.
    fn deliver(&self, topic: &str, payload: Bytes) -> Delivery;
}

impl<F> Deliver for F
where
    F: Fn(&str, Bytes) -> Delivery + Send + Sync,
{
    fn deliver(&self, topic: &str, payload: Bytes) -> Delivery {
        self(topic, payload)
    }
}
