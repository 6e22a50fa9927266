//! In-process core system: command dispatch, algorithm registry, sensor cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use robo_broker::{Broker, Delivery, SubscriberId};
use robo_gateway::{
    AlgorithmStore, CollaboratorError, CollaboratorResult, CommandExecutor, CommandRequest,
    SensorSource,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::service::Service;

/// Broker topic commands are published on.
pub const COMMAND_TOPIC: &str = "commands";

const SUBSCRIBER: &str = "core";

#[derive(Debug, Clone, Serialize)]
struct AlgorithmRecord {
    id: String,
    definition: Value,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SensorCache {
    readings: BTreeMap<String, Value>,
    updated_at: Option<DateTime<Utc>>,
}

impl SensorCache {
    fn record(&mut self, topic: &str, payload: &[u8]) {
        let value = serde_json::from_slice(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));
        self.readings.insert(topic.to_string(), value);
        self.updated_at = Some(Utc::now());
    }

    fn snapshot(&self) -> Value {
        json!({
            "readings": self.readings,
            "updated_at": self
                .updated_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        })
    }
}

/// Local stand-in for the robot core.
///
/// Commands are acknowledged and forwarded to the broker's `commands` topic,
/// algorithms are kept in memory, and the sensor snapshot is the latest
/// payload seen on each configured sensor topic.
#[derive(Debug)]
pub struct LocalCore {
    broker: Arc<Broker>,
    sensor_topics: Vec<String>,
    sensors: Arc<RwLock<SensorCache>>,
    algorithms: RwLock<Vec<AlgorithmRecord>>,
    running: AtomicBool,
    commands_executed: AtomicU64,
}

impl LocalCore {
    /// Create a core watching `sensor_topics`.
    #[must_use]
    pub fn new(broker: Arc<Broker>, sensor_topics: Vec<String>) -> Self {
        Self {
            broker,
            sensor_topics,
            sensors: Arc::new(RwLock::new(SensorCache::default())),
            algorithms: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            commands_executed: AtomicU64::new(0),
        }
    }

    /// Whether the core has started and not yet stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Commands accepted since start.
    #[must_use]
    pub fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }

    fn subscriber() -> SubscriberId {
        SubscriberId::from(SUBSCRIBER)
    }
}

#[async_trait]
impl Service for LocalCore {
    fn name(&self) -> &'static str {
        "core"
    }

    async fn start(&self) -> ServiceResult<()> {
        for topic in &self.sensor_topics {
            let cache = Arc::clone(&self.sensors);
            let sink = move |topic: &str, payload: Bytes| {
                cache.write().record(topic, &payload);
                Delivery::Queued
            };
            self.broker
                .subscribe(topic, Self::subscriber(), sink)
                .map_err(|e| ServiceError::init("core", format!("sensor topic {topic:?}: {e}")))?;
        }
        self.running.store(true, Ordering::SeqCst);
        info!(sensor_topics = ?self.sensor_topics, "core system started");
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) {
        cancel.cancelled().await;
        self.running.store(false, Ordering::SeqCst);
        let released = self.broker.unsubscribe_all(&Self::subscriber());
        info!(
            released,
            commands = self.commands_executed(),
            "core system stopped"
        );
    }
}

#[async_trait]
impl CommandExecutor for LocalCore {
    async fn execute_command(&self, request: CommandRequest) -> CollaboratorResult<Value> {
        if !self.is_running() {
            return Err(CollaboratorError::Unavailable(
                "core system is not running".to_string(),
            ));
        }
        if request.action.trim().is_empty() {
            return Err(CollaboratorError::Rejected("action is required".to_string()));
        }

        let command_id = Uuid::new_v4().to_string();
        let event = json!({
            "command_id": command_id,
            "action": request.action,
            "target": request.target,
            "params": request.params,
        });
        self.broker
            .publish(COMMAND_TOPIC, Bytes::from(event.to_string()))
            .map_err(|e| CollaboratorError::Internal(e.to_string()))?;
        self.commands_executed.fetch_add(1, Ordering::Relaxed);

        debug!(%command_id, action = %request.action, target = %request.target, "command dispatched");
        Ok(json!({
            "command_id": command_id,
            "status": "accepted",
            "action": request.action,
            "target": request.target,
        }))
    }

    fn status(&self) -> String {
        if self.is_running() { "online" } else { "offline" }.to_string()
    }
}

#[async_trait]
impl AlgorithmStore for LocalCore {
    async fn list_algorithms(&self) -> CollaboratorResult<Value> {
        serde_json::to_value(&*self.algorithms.read())
            .map_err(|e| CollaboratorError::Internal(e.to_string()))
    }

    async fn register_algorithm(&self, definition: Value) -> CollaboratorResult<String> {
        if definition.is_null() {
            return Err(CollaboratorError::Rejected(
                "algorithm definition is empty".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        self.algorithms.write().push(AlgorithmRecord {
            id: id.clone(),
            definition,
            registered_at: Utc::now(),
        });
        info!(algorithm_id = %id, "algorithm registered");
        Ok(id)
    }
}

#[async_trait]
impl SensorSource for LocalCore {
    async fn sensor_snapshot(&self) -> CollaboratorResult<Value> {
        Ok(self.sensors.read().snapshot())
    }
}
