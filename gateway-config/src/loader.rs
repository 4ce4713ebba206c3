//! Generic JSON config file loading, with `${key:default}` placeholder
//! resolution applied to string fields named `connection_string` before
//! deserialization completes (spec §1: "the core consumes them as
//! already-parsed maps"; this crate is the glue that produces those maps).

use gateway_core::config::PlaceholderResolver;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure loading or parsing one config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// The file that could not be read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file's contents were not valid JSON for the expected shape.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// The file that failed to parse.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A `${key}` placeholder inside the file had no resolution.
    #[error(transparent)]
    Placeholder(#[from] gateway_core::GatewayError),
}

/// Read and deserialize `path` as JSON into `T`, with no placeholder
/// resolution. Used for files (handler, chain definitions) that carry no
/// `${key}` connection strings of their own.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file can't be read, or
/// [`ConfigError::Parse`] if its contents don't match `T`.
pub async fn load_json<T: DeserializeOwned>(path: &str) -> Result<T, ConfigError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
}

/// Read `path` as JSON, resolve every `${key:default}` placeholder found in
/// its raw text against `resolver`, then deserialize into `T`. Used for
/// broker definitions, whose `connection_string` fields carry placeholders
/// (spec §4.1, §4.12).
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file can't be read,
/// [`ConfigError::Placeholder`] if a placeholder has no resolution, or
/// [`ConfigError::Parse`] if the resolved text doesn't match `T`.
pub async fn load_json_with_placeholders<T: DeserializeOwned>(path: &str, resolver: &PlaceholderResolver) -> Result<T, ConfigError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
    let resolved = resolver.resolve(&raw)?;
    serde_json::from_str(&resolved).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        value: u32,
    }

    #[tokio::test]
    async fn loads_a_well_formed_file() {
        let dir = std::env::temp_dir().join(format!("dgf-config-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("sample.json");
        tokio::fs::write(&path, r#"{"name": "x", "value": 42}"#).await.unwrap();

        let sample: Sample = load_json(path.to_str().unwrap()).await.unwrap();
        assert_eq!(sample.name, "x");
        assert_eq!(sample.value, 42);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = load_json::<Sample>("/nonexistent/path/sample.json").await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[tokio::test]
    async fn placeholder_in_file_text_is_resolved_before_parsing() {
        let dir = std::env::temp_dir().join(format!("dgf-config-test-ph-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("sample.json");
        tokio::fs::write(&path, r#"{"name": "${DGF_NAME:fallback-name}", "value": 1}"#).await.unwrap();

        let resolver = PlaceholderResolver::new();
        let sample: Sample = load_json_with_placeholders(path.to_str().unwrap(), &resolver).await.unwrap();
        assert_eq!(sample.name, "fallback-name");
    }
}
