//! # Gateway Config
//!
//! JSON config file loaders: the glue that turns `handlers/*.json`,
//! `brokers/*.json`, `chains/*.json`, `apikeys.json`, `channels/*.json`, and
//! `ingesters/*.json` into the already-parsed maps the core crates consume
//! (spec §1's explicit out-of-scope boundary — this crate is the boundary
//! itself, not a redefinition of what's on either side of it).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod apikeys;
pub mod brokers;
pub mod chains;
pub mod dir;
pub mod handlers;
pub mod loader;
pub mod model;

pub use apikeys::load_acl_table;
pub use brokers::{load_brokers, load_brokers_dir};
pub use chains::{load_chain, load_chains_dir};
pub use dir::json_files;
pub use handlers::{load_handlers, load_handlers_dir};
pub use loader::{load_json, load_json_with_placeholders, ConfigError};
pub use model::{load_ingesters_dir, load_input_channels_dir, IngesterDefinition, InputChannelConfig};
