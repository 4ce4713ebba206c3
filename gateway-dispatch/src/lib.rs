//! # Gateway Dispatch
//!
//! The request-routing layer between ingestion and the supervised worker
//! pool: the handler registry (C4), the execution engine/dispatcher (C7),
//! streaming session admission (C8), the multi-channel response publisher
//! (C9), and cluster forwarding.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod dispatcher;
pub mod forward;
pub mod publisher;
pub mod registry;
pub mod streaming;

pub use acl::{AclEntry, AclTable};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use forward::{forward_to_peer, pick_forwarding_peer};
pub use publisher::{MultiChannelPublisher, RestBuffer, WebSocketSink};
pub use registry::{HandlerFactory, HandlerRegistry};
pub use streaming::{StreamingLimits, StreamingSessionManager};
