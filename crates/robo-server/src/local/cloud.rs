//! In-process cloud synchronization engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use robo_broker::Broker;
use robo_gateway::{CloudSync, CollaboratorError, CollaboratorResult, SyncMode};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::service::Service;

/// Broker topic sync progress is published on.
pub const SYNC_TOPIC: &str = "cloud.sync";

#[derive(Debug, Clone)]
struct SyncJob {
    sync_id: String,
    mode: SyncMode,
}

#[derive(Debug, Clone, Serialize)]
struct SyncRecord {
    sync_id: String,
    mode: SyncMode,
    completed_at: DateTime<Utc>,
}

/// Local stand-in for the cloud sync engine.
///
/// Sync requests are queued and completed by the service task. Each state
/// change is announced on the `cloud.sync` topic.
#[derive(Debug)]
pub struct LocalCloud {
    broker: Arc<Broker>,
    connected: AtomicBool,
    pending: AtomicUsize,
    jobs: mpsc::UnboundedSender<SyncJob>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<SyncJob>>>,
    last_sync: RwLock<Option<SyncRecord>>,
}

impl LocalCloud {
    /// Create a disconnected engine.
    #[must_use]
    pub fn new(broker: Arc<Broker>) -> Self {
        let (jobs, inbox) = mpsc::unbounded_channel();
        Self {
            broker,
            connected: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            jobs,
            inbox: Mutex::new(Some(inbox)),
            last_sync: RwLock::new(None),
        }
    }

    /// Whether the engine is accepting sync requests.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Syncs queued but not yet completed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn announce(&self, sync_id: &str, mode: SyncMode, state: &str) {
        let event = json!({ "sync_id": sync_id, "mode": mode, "state": state });
        if let Err(e) = self.broker.publish(SYNC_TOPIC, Bytes::from(event.to_string())) {
            debug!(error = %e, sync_id, state, "sync event not published");
        }
    }

    fn complete(&self, job: SyncJob) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.announce(&job.sync_id, job.mode, "completed");
        info!(sync_id = %job.sync_id, mode = %job.mode, "sync completed");
        *self.last_sync.write() = Some(SyncRecord {
            sync_id: job.sync_id,
            mode: job.mode,
            completed_at: Utc::now(),
        });
    }
}

#[async_trait]
impl Service for LocalCloud {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn start(&self) -> ServiceResult<()> {
        if self.inbox.lock().is_none() {
            return Err(ServiceError::init("cloud", "sync queue already consumed"));
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("cloud sync connected");
        Ok(())
    }

    async fn run(&self, cancel: CancellationToken) {
        let Some(mut inbox) = self.inbox.lock().take() else {
            warn!("cloud sync queue missing; nothing to run");
            return;
        };

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                job = inbox.recv() => match job {
                    Some(job) => self.complete(job),
                    None => break,
                },
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!(abandoned = self.pending(), "cloud sync disconnected");
    }
}

#[async_trait]
impl CloudSync for LocalCloud {
    async fn trigger_sync(&self, mode: SyncMode) -> CollaboratorResult<String> {
        if !self.is_connected() {
            return Err(CollaboratorError::Unavailable(
                "cloud sync is not connected".to_string(),
            ));
        }

        let mut sync_id = Uuid::new_v4().simple().to_string();
        sync_id.truncate(12);

        // Announce before handing off so `queued` always precedes `completed`.
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.announce(&sync_id, mode, "queued");
        let job = SyncJob {
            sync_id: sync_id.clone(),
            mode,
        };
        if self.jobs.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            self.announce(&sync_id, mode, "failed");
            return Err(CollaboratorError::Unavailable(
                "cloud sync queue closed".to_string(),
            ));
        }

        debug!(%sync_id, %mode, "sync queued");
        Ok(sync_id)
    }

    async fn sync_status(&self) -> CollaboratorResult<Value> {
        Ok(json!({
            "connected": self.is_connected(),
            "pending": self.pending(),
            "last_sync": *self.last_sync.read(),
        }))
    }

    fn status(&self) -> String {
        if self.is_connected() { "connected" } else { "disconnected" }.to_string()
    }
}
