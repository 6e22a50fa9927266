//! In-crate fakes for handler and router tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use robo_broker::Broker;
use serde_json::{Value, json};

use crate::collaborators::{
    AlgorithmStore, CloudSync, CollaboratorError, CollaboratorResult, Collaborators,
    CommandExecutor, CommandRequest, DiagnosticsExporter, SensorSource, SyncMode,
};
use crate::config::GatewayConfig;
use crate::state::GatewayState;

#[derive(Default)]
pub(crate) struct FakeCore {
    pub(crate) fail: bool,
    pub(crate) commands: Mutex<Vec<CommandRequest>>,
    pub(crate) algorithms: Mutex<Vec<Value>>,
}

impl FakeCore {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> CollaboratorResult<()> {
        if self.fail {
            Err(CollaboratorError::Internal("core offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeCore {
    async fn execute_command(&self, request: CommandRequest) -> CollaboratorResult<Value> {
        self.check()?;
        let result = json!({"status": "accepted", "action": request.action});
        self.commands.lock().unwrap().push(request);
        Ok(result)
    }

    fn status(&self) -> String {
        if self.fail { "degraded" } else { "online" }.to_string()
    }
}

#[async_trait]
impl AlgorithmStore for FakeCore {
    async fn list_algorithms(&self) -> CollaboratorResult<Value> {
        self.check()?;
        Ok(Value::Array(self.algorithms.lock().unwrap().clone()))
    }

    async fn register_algorithm(&self, definition: Value) -> CollaboratorResult<String> {
        self.check()?;
        let mut algorithms = self.algorithms.lock().unwrap();
        algorithms.push(definition);
        Ok(format!("algo-{}", algorithms.len()))
    }
}

#[async_trait]
impl SensorSource for FakeCore {
    async fn sensor_snapshot(&self) -> CollaboratorResult<Value> {
        self.check()?;
        Ok(json!({"lidar": {"range": 4.2}}))
    }
}

#[derive(Default)]
pub(crate) struct FakeCloud {
    pub(crate) fail: bool,
}

#[async_trait]
impl CloudSync for FakeCloud {
    async fn trigger_sync(&self, mode: SyncMode) -> CollaboratorResult<String> {
        if self.fail {
            return Err(CollaboratorError::Unavailable("cloud unreachable".to_string()));
        }
        Ok(match mode {
            SyncMode::Full => "abc123".to_string(),
            SyncMode::Incremental => "inc456".to_string(),
        })
    }

    async fn sync_status(&self) -> CollaboratorResult<Value> {
        if self.fail {
            return Err(CollaboratorError::Unavailable("cloud unreachable".to_string()));
        }
        Ok(json!({"connected": true, "pending": 0}))
    }

    fn status(&self) -> String {
        if self.fail { "disconnected" } else { "connected" }.to_string()
    }
}

pub(crate) struct FakeDiagnostics;

impl DiagnosticsExporter for FakeDiagnostics {
    fn export(&self) -> String {
        "# EOF\n".to_string()
    }

    fn content_type(&self) -> &'static str {
        "application/openmetrics-text; version=1.0.0; charset=utf-8"
    }
}

pub(crate) fn collaborators(core: FakeCore, cloud: FakeCloud) -> Collaborators {
    let core = Arc::new(core);
    Collaborators {
        commands: core.clone(),
        algorithms: core.clone(),
        sensors: core,
        cloud: Arc::new(cloud),
        diagnostics: Arc::new(FakeDiagnostics),
    }
}

pub(crate) fn state_with(config: GatewayConfig, core: FakeCore, cloud: FakeCloud) -> GatewayState {
    GatewayState::new(config, Broker::shared(), collaborators(core, cloud))
}

pub(crate) fn test_state() -> GatewayState {
    state_with(GatewayConfig::default(), FakeCore::default(), FakeCloud::default())
}
