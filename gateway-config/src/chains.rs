//! `chains/*.json` loading into [`ChainConfig`] (spec §3, §4.9).

use gateway_core::ChainConfig;

use crate::dir::json_files;
use crate::loader::{load_json, ConfigError};

/// Load one `chains/*.json` file as a single [`ChainConfig`] definition.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file can't be read or parsed.
pub async fn load_chain(path: &str) -> Result<ChainConfig, ConfigError> {
    load_json(path).await
}

/// Load every `chains/*.json` file under `dir`, one [`ChainConfig`] per
/// file, in sorted file order.
///
/// # Errors
///
/// Returns [`ConfigError`] if any file can't be read or parsed.
pub async fn load_chains_dir(dir: &str) -> Result<Vec<ChainConfig>, ConfigError> {
    let mut all = Vec::new();
    for path in json_files(dir) {
        all.push(load_chain(&path).await?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_a_single_chain_definition() {
        let dir = std::env::temp_dir().join(format!("dgf-config-chains-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("chain.json");
        tokio::fs::write(
            &path,
            r#"{"chain_id": "enrich", "ttl_minutes": 5.0, "error_strategy": "ABORT", "steps": [{"step": 1, "handler": "ECHO", "alias": null, "payload_mapping": null, "merge_strategy": "REPLACE", "when": null, "error_strategy": null, "fallback_value": null}]}"#,
        )
        .await
        .unwrap();

        let chain = load_chain(path.to_str().unwrap()).await.unwrap();
        assert_eq!(chain.chain_id, "enrich");
        assert_eq!(chain.steps.len(), 1);
    }
}
