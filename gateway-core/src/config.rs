//! `${key}` / `${key:default}` placeholder resolution for broker connection
//! strings and other config values (spec §4.1, §4.12).

use std::collections::HashMap;
use std::env;

use crate::error::{GatewayError, Result};

/// Resolves `${key}` and `${key:default}` placeholders against the process
/// environment, falling back to an explicit overlay map before the literal
/// default (spec §4.12: environment takes precedence over file-provided
/// defaults, so operators can override any setting without editing config).
#[derive(Debug, Clone, Default)]
pub struct PlaceholderResolver {
    overlay: HashMap<String, String>,
}

impl PlaceholderResolver {
    /// Build a resolver with no overlay; placeholders resolve against the
    /// environment and their inline defaults only.
    #[must_use]
    pub fn new() -> Self {
        Self { overlay: HashMap::new() }
    }

    /// Build a resolver seeded with an overlay map, checked before the
    /// environment (useful for tests and for values sourced from a secrets
    /// file rather than the environment).
    #[must_use]
    pub fn with_overlay(overlay: HashMap<String, String>) -> Self {
        Self { overlay }
    }

    /// Resolve every `${key}` / `${key:default}` placeholder in `input`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnresolvedPlaceholder`] for a `${key}` with no
    /// default that is absent from both the overlay and the environment.
    pub fn resolve(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let inner = &after[..end];
            let (key, default) = match inner.split_once(':') {
                Some((k, d)) => (k, Some(d)),
                None => (inner, None),
            };
            out.push_str(&self.resolve_one(key, default)?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn resolve_one(&self, key: &str, default: Option<&str>) -> Result<String> {
        if let Some(value) = self.overlay.get(key) {
            return Ok(value.clone());
        }
        if let Ok(value) = env::var(key) {
            return Ok(value);
        }
        if let Some(default) = default {
            return Ok(default.to_string());
        }
        Err(GatewayError::UnresolvedPlaceholder(key.to_string()))
    }
}
