//! API-key ACL (spec §4.7 step 1).
//!
//! Treated as an opaque, already-parsed mapping per spec §1 ("the core
//! consumes them as already-parsed maps"): the JSON `apikeys.json` file
//! itself is `gateway-config`'s concern, not this crate's.

use std::collections::{HashMap, HashSet};

use gateway_core::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// One API key's authorization entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AclEntry {
    /// The user this key resolves to, stamped onto `Request::resolved_user_id`.
    pub user_id: String,
    /// Request types this key may invoke. Empty means "all" (a wildcard key).
    pub allowed_request_types: HashSet<String>,
}

impl AclEntry {
    /// `true` if this entry authorizes `request_type`.
    #[must_use]
    pub fn allows(&self, request_type: &str) -> bool {
        self.allowed_request_types.is_empty() || self.allowed_request_types.contains(request_type)
    }
}

/// `api_key → AclEntry`, validated on every [`crate::Dispatcher::submit`]
/// call (spec §4.7 step 1).
#[derive(Debug, Clone, Default)]
pub struct AclTable(HashMap<String, AclEntry>);

impl AclTable {
    /// Wrap an already-parsed mapping.
    #[must_use]
    pub fn new(entries: HashMap<String, AclEntry>) -> Self {
        Self(entries)
    }

    /// Validate `api_key` against `request_type`'s ACL, returning the
    /// resolved user id on success.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] if the key is unknown or not
    /// authorized for this request type.
    pub fn authorize(&self, api_key: &str, request_type: &str) -> Result<String> {
        match self.0.get(api_key) {
            Some(entry) if entry.allows(request_type) => Ok(entry.user_id.clone()),
            _ => Err(GatewayError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AclTable {
        let mut entries = HashMap::new();
        entries.insert(
            "dgf-scoped".to_string(),
            AclEntry { user_id: "alice".to_string(), allowed_request_types: HashSet::from(["ECHO".to_string()]) },
        );
        entries.insert("dgf-wildcard".to_string(), AclEntry { user_id: "bob".to_string(), allowed_request_types: HashSet::new() });
        AclTable::new(entries)
    }

    #[test]
    fn scoped_key_is_authorized_only_for_its_request_types() {
        let acl = table();
        assert_eq!(acl.authorize("dgf-scoped", "ECHO").unwrap(), "alice");
        assert!(acl.authorize("dgf-scoped", "ARITHMETIC").is_err());
    }

    #[test]
    fn wildcard_key_is_authorized_for_anything() {
        let acl = table();
        assert_eq!(acl.authorize("dgf-wildcard", "ANYTHING").unwrap(), "bob");
    }

    #[test]
    fn unknown_key_is_unauthorized() {
        assert!(table().authorize("dgf-unknown", "ECHO").is_err());
    }
}
