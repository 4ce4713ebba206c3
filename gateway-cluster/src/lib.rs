//! # Gateway Cluster
//!
//! Cluster membership registry and heartbeat exchange (C11): tracks node
//! status transitions (`UP`/`SUSPECT`/`DOWN`/`LEAVING`) and drives the
//! periodic heartbeat exchange that keeps them current.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod heartbeat;
pub mod registry;

pub use heartbeat::{HeartbeatPayload, HeartbeatService};
pub use registry::ClusterRegistry;
