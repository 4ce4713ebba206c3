//! # Gateway Ingest
//!
//! Request Ingesters (C3): the bridge between a broker-delivered envelope
//! and the [`gateway_dispatch::Dispatcher`]. [`resolution::resolve_chain`]
//! computes an ingester's effective config by deep-merging its broker,
//! input-channel, and override sources; [`ingester::Ingester`] drives the
//! per-message parse/validate/enrich/submit protocol over that config.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ingester;
pub mod resolution;

pub use ingester::{Ingester, IngesterStats};
pub use resolution::{deep_merge, resolve_chain};
