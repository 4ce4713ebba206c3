//! `handlers/*.json` loading into [`HandlerConfig`] (spec §3, §4.4).

use gateway_core::HandlerConfig;

use crate::dir::json_files;
use crate::loader::{load_json, ConfigError};

/// Load one `handlers/*.json` file, an array of [`HandlerConfig`] entries.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file can't be read or parsed.
pub async fn load_handlers(path: &str) -> Result<Vec<HandlerConfig>, ConfigError> {
    load_json(path).await
}

/// Load every `handlers/*.json` file under `dir`, concatenated in sorted
/// file order.
///
/// # Errors
///
/// Returns [`ConfigError`] if any file can't be read or parsed.
pub async fn load_handlers_dir(dir: &str) -> Result<Vec<HandlerConfig>, ConfigError> {
    let mut all = Vec::new();
    for path in json_files(dir) {
        all.extend(load_handlers(&path).await?);
    }
    Ok(all)
}
