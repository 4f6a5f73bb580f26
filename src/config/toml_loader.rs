//! TOML file loading with typed errors.
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Deserialize `path`, or an empty document when the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read and
/// [`ConfigError::Parse`] if it is not valid TOML for `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        tracing::debug!("{} not found, using defaults", path.display());
        return parse_toml("", &path.display().to_string());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml(&content, &path.display().to_string())
}

/// Deserialize TOML text, naming `file` in any error.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] with the parser's message.
pub fn parse_toml<T: DeserializeOwned>(content: &str, file: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: file.to_string(),
        message: e.message().to_string(),
    })
}
