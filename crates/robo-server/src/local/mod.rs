//! In-process collaborators used when the gateway runs standalone.
//!
//! Both implement [`Service`](crate::Service) as well as the gateway's
//! collaborator traits, so the coordinator drives their lifecycle and the
//! HTTP surface talks to the same instances.

mod cloud;
mod core;

pub use self::cloud::{LocalCloud, SYNC_TOPIC};
pub use self::core::{COMMAND_TOPIC, LocalCore};
