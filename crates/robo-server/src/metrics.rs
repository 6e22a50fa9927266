//! Prometheus rendering of broker and connection statistics.
//!
//! The `/metrics` document is built on demand: every export samples the
//! broker and the connection tracker, folds the samples into the registry and
//! encodes it in the Prometheus text format.

use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use robo_broker::Broker;
use robo_gateway::{ConnectionTracker, DiagnosticsExporter};

#[derive(Clone, Default)]
struct BrokerMetrics {
    topics: Gauge,
    subscriptions: Gauge,
    published: Counter,
    delivered: Counter,
    dropped: Counter,
}

impl BrokerMetrics {
    fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "robocore_broker_topics",
            "Topics with at least one subscriber",
            metrics.topics.clone(),
        );
        registry.register(
            "robocore_broker_subscriptions",
            "Live topic subscriptions",
            metrics.subscriptions.clone(),
        );
        registry.register(
            "robocore_broker_published",
            "Messages published to the broker",
            metrics.published.clone(),
        );
        registry.register(
            "robocore_broker_delivered",
            "Messages handed to subscriber queues",
            metrics.delivered.clone(),
        );
        registry.register(
            "robocore_broker_dropped",
            "Messages discarded because a subscriber queue was full or closed",
            metrics.dropped.clone(),
        );
        metrics
    }
}

#[derive(Clone, Default)]
struct ConnectionMetrics {
    active: Gauge,
    accepted: Counter,
}

impl ConnectionMetrics {
    fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "robocore_ws_connections_active",
            "Open WebSocket connections",
            metrics.active.clone(),
        );
        registry.register(
            "robocore_ws_connections",
            "WebSocket connections accepted",
            metrics.accepted.clone(),
        );
        metrics
    }
}

/// Advance a monotonic counter to `total`.
fn catch_up(counter: &Counter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[allow(clippy::cast_possible_wrap)] // Counts won't exceed i64::MAX
fn set_gauge(gauge: &Gauge, value: usize) {
    gauge.set(value as i64);
}

/// Exports gateway diagnostics in the Prometheus text format.
#[derive(Clone)]
pub struct PrometheusExporter {
    registry: Arc<RwLock<Registry>>,
    broker: Arc<Broker>,
    connections: Arc<ConnectionTracker>,
    broker_metrics: BrokerMetrics,
    connection_metrics: ConnectionMetrics,
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter")
            .field("broker", &self.broker)
            .field("connections", &self.connections.active())
            .finish_non_exhaustive()
    }
}

impl PrometheusExporter {
    /// Create an exporter sampling `broker` and `connections`.
    #[must_use]
    pub fn new(broker: Arc<Broker>, connections: Arc<ConnectionTracker>) -> Self {
        let mut registry = Registry::default();
        let broker_metrics = BrokerMetrics::new(&mut registry);
        let connection_metrics = ConnectionMetrics::new(&mut registry);

        Self {
            registry: Arc::new(RwLock::new(registry)),
            broker,
            connections,
            broker_metrics,
            connection_metrics,
        }
    }

    /// Refresh every metric from its source.
    pub fn sample(&self) {
        let stats = self.broker.stats();
        set_gauge(&self.broker_metrics.topics, stats.topics);
        set_gauge(&self.broker_metrics.subscriptions, stats.subscriptions);
        catch_up(&self.broker_metrics.published, stats.published);
        catch_up(&self.broker_metrics.delivered, stats.delivered);
        catch_up(&self.broker_metrics.dropped, stats.dropped);

        set_gauge(&self.connection_metrics.active, self.connections.active());
        catch_up(&self.connection_metrics.accepted, self.connections.total());
    }

    /// Sample and encode all metrics.
    #[must_use]
    pub fn encode(&self) -> String {
        self.sample();
        let registry = self.registry.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }
}

impl DiagnosticsExporter for PrometheusExporter {
    fn export(&self) -> String {
        self.encode()
    }

    fn content_type(&self) -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}
