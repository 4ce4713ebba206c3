//! `brokers/*.json` loading into [`BrokerConfig`] (spec §3, §4.1). Broker
//! files are the one config shape whose string fields regularly carry
//! `${key:default}` placeholders (credentials, hostnames), so they load
//! through [`load_json_with_placeholders`].

use gateway_core::BrokerConfig;
use gateway_core::config::PlaceholderResolver;

use crate::dir::json_files;
use crate::loader::{load_json_with_placeholders, ConfigError};

/// Load one `brokers/*.json` file, an array of [`BrokerConfig`] entries,
/// resolving `${key:default}` placeholders against `resolver` first.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file can't be read, a placeholder has no
/// resolution, or the resolved text doesn't parse.
pub async fn load_brokers(path: &str, resolver: &PlaceholderResolver) -> Result<Vec<BrokerConfig>, ConfigError> {
    load_json_with_placeholders(path, resolver).await
}

/// Load every `brokers/*.json` file under `dir`, concatenated in sorted
/// file order.
///
/// # Errors
///
/// Returns [`ConfigError`] if any file can't be read, a placeholder has no
/// resolution, or the resolved text doesn't parse.
pub async fn load_brokers_dir(dir: &str, resolver: &PlaceholderResolver) -> Result<Vec<BrokerConfig>, ConfigError> {
    let mut all = Vec::new();
    for path in json_files(dir) {
        all.extend(load_brokers(&path, resolver).await?);
    }
    Ok(all)
}
