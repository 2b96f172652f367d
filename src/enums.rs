//! NeoForge enum extension declarations.
//!
//! A mod names its declaration file through `enumExtensions` in
//! `neoforge.mods.toml`. The file holds an `entries` array; each entry adds one
//! constant to a game enum at load time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IndexResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumExtension {
    /// Internal name of the extended enum.
    #[serde(rename = "enum")]
    pub enum_name: String,
    pub name: String,
    pub constructor: String,
    /// Kept as written; its shape depends on the constructor.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Parses one declaration file. Entries that are not complete objects are
/// skipped; a file that is not JSON is an error.
pub fn parse(content: &[u8]) -> IndexResult<Vec<EnumExtension>> {
    let json: serde_json::Value = serde_json::from_slice(content)?;
    let Some(entries) = json.get("entries").and_then(|e| e.as_array()) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match EnumExtension::deserialize(entry) {
            Ok(extension) => out.push(extension),
            Err(e) => debug!(error = %e, "skipping enum extension entry"),
        }
    }
    Ok(out)
}
