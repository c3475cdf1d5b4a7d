//! Loading of learner and setup configurations from JSON

use std::path::Path;

use serde::de::DeserializeOwned;

/// Parse a configuration from a JSON string.
///
/// Missing fields fall back to the config's `Default` when the struct is
/// annotated with `#[serde(default)]`, which all tabrl configs are.
pub fn from_json_str<T: DeserializeOwned>(json: &str) -> crate::Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Read and parse a configuration file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> crate::Result<T> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    from_json_str(&json)
}
