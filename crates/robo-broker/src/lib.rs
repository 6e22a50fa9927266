//! # robo-broker
//!
//! The internal publish/subscribe bus of the robocore gateway.
//!
//! A [`Broker`] maps topic names to subscriber sinks. Publishing invokes every
//! sink registered for the topic from the publisher's own context; sinks are
//! required to be non-blocking (the connection hub's sink only pushes onto a
//! bounded queue and drops when it is full), so a slow consumer can never
//! stall the publisher or its peers.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use bytes::Bytes;
//! use robo_broker::{Broker, Delivery, SubscriberId};
//!
//! let broker = Broker::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let seen = Arc::clone(&seen);
//!     move |_topic: &str, payload: Bytes| {
//!         seen.lock().unwrap().push(payload);
//!         Delivery::Queued
//!     }
//! };
//!
//! broker.subscribe("sensors", SubscriberId::from("ws-1"), sink).unwrap();
//! let report = broker.publish("sensors", Bytes::from_static(b"{\"t\":1}")).unwrap();
//! assert_eq!(report.delivered, 1);
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod error;
pub mod subscriber;
mod table;

pub use broker::{Broker, BrokerStats, PublishReport, SubscriptionHandle};
pub use error::{BrokerError, BrokerResult};
pub use subscriber::{Deliver, Delivery, SubscriberId};
