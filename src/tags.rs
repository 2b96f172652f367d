//! Data-pack tag files bundled inside artifacts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFile {
    /// `namespace/path/inside/tags`, without the `.json` extension.
    pub name: String,
    pub replace: bool,
    pub entries: Vec<String>,
}

/// Splits `data/<namespace>/tags/<path>.json` into the tag name.
pub fn tag_name(entry: &str) -> Option<String> {
    let rest = entry.strip_prefix("data/")?;
    let (namespace, rest) = rest.split_once('/')?;
    let path = rest.strip_prefix("tags/")?.strip_suffix(".json")?;
    if namespace.is_empty() || path.is_empty() {
        return None;
    }
    Some(format!("{namespace}/{path}"))
}

fn qualify(entry: &str) -> String {
    if entry.contains(':') {
        return entry.to_string();
    }
    match entry.strip_prefix('#') {
        Some(tag) => format!("#minecraft:{tag}"),
        None => format!("minecraft:{entry}"),
    }
}

/// Parses one tag file. Files without a usable `values` array, or that are
/// not JSON at all, yield `None`.
pub fn parse(name: String, content: &[u8]) -> Option<TagFile> {
    let json: serde_json::Value = serde_json::from_slice(content).ok()?;
    let values = json.get("values")?.as_array()?;
    let entries: Vec<String> = values
        .iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(qualify(s)),
            serde_json::Value::Object(o) => o.get("id").and_then(|id| id.as_str()).map(qualify),
            _ => None,
        })
        .collect();
    if entries.is_empty() {
        return None;
    }
    let replace = json
        .get("replace")
        .and_then(|r| r.as_bool())
        .unwrap_or(false);
    Some(TagFile {
        name,
        replace,
        entries,
    })
}
