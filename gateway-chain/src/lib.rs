//! # Gateway Chain
//!
//! The declarative chain execution engine (C10): sequential and parallel
//! step composition over handlers resolved through a
//! [`gateway_dispatch::Dispatcher`], `${path}` variable resolution, `when`
//! guard evaluation, and merge/join/error strategies.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod join;
pub mod merge;
pub mod variables;
pub mod when;

pub use engine::ChainHandler;
pub use join::{join, BranchOutcome};
pub use merge::merge;
pub use variables::{resolve, ChainState};
