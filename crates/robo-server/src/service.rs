//! The unit of work the coordinator starts and stops.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceResult;

/// An independently running component.
///
/// The coordinator calls [`start`](Service::start) on every service before
/// spawning anything; a failure there aborts startup. [`run`](Service::run)
/// then executes on its own task and must return promptly once the token is
/// cancelled.
#[async_trait]
pub trait Service: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Initialize. Failure is fatal to startup.
    async fn start(&self) -> ServiceResult<()>;

    /// Run until `cancel` fires.
    async fn run(&self, cancel: CancellationToken);
}
