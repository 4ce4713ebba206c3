//! # Gateway Core
//!
//! Canonical data model and trait contracts for the data-gateway facade.
//!
//! This crate has no I/O of its own. It defines the shapes that flow between
//! every other crate in the workspace — [`Request`]/[`Response`], handler
//! lifecycle state, chain definitions, broker/cluster configuration — and the
//! trait seams (`Handler`, `Publisher`, `Subscriber`) that the concrete
//! crates (`gateway-runtime`, `gateway-brokers`, `gateway-dispatch`, …)
//! implement against.
//!
//! ## Modules
//!
//! - [`request`]: `Request` / `Response` envelopes and their enums
//! - [`handler`]: `HandlerConfig`, `HandlerState`, the `Handler` capability trait
//! - [`chain`]: declarative chain/step types and strategy enums
//! - [`streaming`]: `StreamingSession` and response channel set
//! - [`broker`]: `BrokerConfig`, `Envelope`, the `Publisher`/`Subscriber` traits
//! - [`cluster`]: `ClusterNode` and its role/status enums
//! - [`config`]: `${key:default}` property placeholder resolution
//! - [`error`]: the shared `GatewayError` enum

pub mod broker;
pub mod chain;
pub mod cluster;
pub mod config;
pub mod error;
pub mod handler;
pub mod request;
pub mod streaming;

pub use broker::{
    BrokerConfig, BrokerState, BrokerType, Envelope, Publisher, PublisherStats, Subscriber,
};
pub use chain::{ChainConfig, ErrorStrategy, JoinStrategy, MergeStrategy, StepKind};
pub use cluster::{ClusterNode, NodeRole, NodeStatus};
pub use error::{GatewayError, Result};
pub use handler::{Handler, HandlerConfig, HandlerPhase, HandlerState};
pub use request::{DeliveryDestination, Request, Response, ResponseChannel, ResponseStatus};
pub use streaming::StreamingSession;

pub use chrono::{DateTime, Utc};
pub use serde_json::Value as JsonValue;
pub use uuid::Uuid;
