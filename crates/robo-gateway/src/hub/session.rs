//! Transport-independent per-connection state and envelope dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::CloseCode;
use bytes::Bytes;
use robo_broker::{Broker, BrokerError, Deliver, Delivery, SubscriberId};
use robo_proto::{Envelope, ErrorCode, Payload};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use super::error::HubError;
use super::id::ConnectionId;

/// An item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encode and send.
    Envelope(Envelope),
    /// Send a close frame with this code, then stop writing.
    Close(CloseCode),
}

/// Sending half of an outbound queue.
pub type OutboundSender = mpsc::Sender<Outbound>;

/// Receiving half of an outbound queue.
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// Create a bounded outbound queue.
#[must_use]
pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity.max(1))
}

/// State owned by a connection's read side.
///
/// Holds the local subscription set and turns decoded envelopes into broker
/// operations. Replies (acks and error notices) are queued with an awaited
/// send; broker deliveries go through [`Session::delivery_sink`], which never
/// waits.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    subscriber: SubscriberId,
    broker: Arc<Broker>,
    outbound: OutboundSender,
    topics: HashSet<String>,
    max_subscriptions: usize,
}

impl Session {
    /// Create a session for connection `id`.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        broker: Arc<Broker>,
        outbound: OutboundSender,
        max_subscriptions: usize,
    ) -> Self {
        Self {
            id,
            subscriber: id.subscriber_id(),
            broker,
            outbound,
            topics: HashSet::new(),
            max_subscriptions,
        }
    }

    /// The connection this session belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Number of topics currently subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.topics.len()
    }

    /// Whether the connection holds `topic`.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Handle one inbound text frame.
    ///
    /// # Errors
    ///
    /// Only [`HubError::QueueClosed`]; protocol problems are answered with an
    /// error envelope and the connection stays open.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), HubError> {
        match Envelope::decode(text) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => self.reject_malformed(&e).await,
        }
    }

    /// Handle one inbound binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Same as [`Session::handle_text`].
    pub async fn handle_binary(&mut self, bytes: &[u8]) -> Result<(), HubError> {
        match Envelope::decode_bytes(bytes) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => self.reject_malformed(&e).await,
        }
    }

    /// Apply one decoded envelope.
    ///
    /// # Errors
    ///
    /// Same as [`Session::handle_text`].
    pub async fn dispatch(&mut self, envelope: Envelope) -> Result<(), HubError> {
        match envelope {
            Envelope::Subscribe { topic } => self.subscribe(topic).await,
            Envelope::Unsubscribe { topic } => self.unsubscribe(topic).await,
            Envelope::Publish { topic, payload } => self.publish(&topic, payload).await,
            other => {
                debug!(connection_id = %self.id, kind = %other.kind(), "unsupported message type");
                self.reply(Envelope::error(ErrorCode::UnknownType)).await
            }
        }
    }

    async fn subscribe(&mut self, topic: String) -> Result<(), HubError> {
        if self.topics.contains(&topic) {
            return self.reply(Envelope::subscribed(topic)).await;
        }
        if self.topics.len() >= self.max_subscriptions {
            warn!(
                connection_id = %self.id,
                %topic,
                limit = self.max_subscriptions,
                "subscription limit reached"
            );
            return self.reply(Envelope::error(ErrorCode::SubscriptionLimit)).await;
        }

        let sink = delivery_sink(self.id, self.outbound.clone());
        match self.broker.subscribe(&topic, self.subscriber.clone(), sink) {
            Ok(_) => {
                debug!(connection_id = %self.id, %topic, "client subscribed");
                self.topics.insert(topic.clone());
                self.reply(Envelope::subscribed(topic)).await
            }
            Err(e) => {
                warn!(connection_id = %self.id, %topic, operation = "subscribe", error = %e, "subscribe failed");
                self.reply(Envelope::error(ErrorCode::SubscriptionFailed)).await
            }
        }
    }

    async fn unsubscribe(&mut self, topic: String) -> Result<(), HubError> {
        if self.topics.remove(&topic) {
            self.release(&topic);
            debug!(connection_id = %self.id, %topic, "client unsubscribed");
        } else {
            trace!(connection_id = %self.id, %topic, "redundant unsubscribe");
        }
        self.reply(Envelope::unsubscribed(topic)).await
    }

    async fn publish(&mut self, topic: &str, payload: Option<Payload>) -> Result<(), HubError> {
        let bytes = payload.map(Payload::into_bytes).unwrap_or_default();
        match self.broker.publish(topic, bytes) {
            Ok(report) => {
                if report.dropped > 0 {
                    debug!(
                        connection_id = %self.id,
                        %topic,
                        dropped = report.dropped,
                        "publish dropped for saturated subscribers"
                    );
                }
                Ok(())
            }
            Err(e) => {
                warn!(connection_id = %self.id, %topic, operation = "publish", error = %e, "publish failed");
                self.reply(Envelope::error(ErrorCode::PublishFailed)).await
            }
        }
    }

    async fn reject_malformed(&self, err: &robo_proto::ProtoError) -> Result<(), HubError> {
        debug!(connection_id = %self.id, error = %err, "malformed frame");
        self.reply(Envelope::error(ErrorCode::InvalidMessage)).await
    }

    /// Queue a close frame ahead of ending the connection.
    ///
    /// # Errors
    ///
    /// [`HubError::QueueClosed`] if the writer is already gone.
    pub async fn close(&self, code: CloseCode) -> Result<(), HubError> {
        self.outbound
            .send(Outbound::Close(code))
            .await
            .map_err(|_| HubError::QueueClosed)
    }

    async fn reply(&self, envelope: Envelope) -> Result<(), HubError> {
        self.outbound
            .send(Outbound::Envelope(envelope))
            .await
            .map_err(|_| HubError::QueueClosed)
    }

    fn release(&self, topic: &str) {
        match self.broker.unsubscribe(topic, &self.subscriber) {
            Ok(()) => {}
            Err(e @ BrokerError::NotSubscribed { .. }) => {
                debug!(connection_id = %self.id, %topic, error = %e, "subscription already removed");
            }
            Err(e) => {
                warn!(connection_id = %self.id, %topic, operation = "unsubscribe", error = %e, "unsubscribe failed");
            }
        }
    }

    /// Drop every subscription this connection holds. Returns how many were
    /// released.
    pub fn teardown(&mut self) -> usize {
        let released = self.topics.len();
        for topic in std::mem::take(&mut self.topics) {
            self.release(&topic);
        }
        let stray = self.broker.unsubscribe_all(&self.subscriber);
        if stray > 0 {
            warn!(connection_id = %self.id, stray, "removed subscriptions missing from the local set");
        }
        released
    }
}

/// Broker sink that pushes deliveries onto a connection's queue without
/// waiting. A full queue drops the message.
pub fn delivery_sink(id: ConnectionId, outbound: OutboundSender) -> impl Deliver + 'static {
    move |topic: &str, payload: Bytes| {
        let payload = (!payload.is_empty()).then(|| Payload::from_bytes(payload));
        match outbound.try_send(Outbound::Envelope(Envelope::message(topic, payload))) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                trace!(connection_id = %id, %topic, "outbound queue full, dropping delivery");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
