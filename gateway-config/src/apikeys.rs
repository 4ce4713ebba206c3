//! `apikeys.json` loading into [`AclTable`] (spec §4.7 step 1): the file is
//! a flat `api_key → {user_id, allowed_request_types}` mapping, treated by
//! `gateway-dispatch` as an opaque already-parsed table.

use std::collections::HashMap;

use gateway_dispatch::{AclEntry, AclTable};

use crate::loader::{load_json, ConfigError};

/// Load `apikeys.json` at `path` into an [`AclTable`].
///
/// # Errors
///
/// Returns [`ConfigError`] if the file can't be read or doesn't match the
/// `api_key → AclEntry` shape.
pub async fn load_acl_table(path: &str) -> Result<AclTable, ConfigError> {
    let entries: HashMap<String, AclEntry> = load_json(path).await?;
    Ok(AclTable::new(entries))
}
