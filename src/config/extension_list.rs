//! The `extensions.txt` list format.
//!
//! ```text
//! # Language support
//! rust-lang.rust-analyzer
//! ms-python.python@2024.2.0
//! # !ms-python.vscode-pylance
//! ```
//!
//! Blank lines are ignored, `# !publisher.name` adds an exclusion, any other
//! line starting with `#` is a comment, and every remaining line is a wanted
//! identifier. Lines are kept as written; identifier validation happens
//! later so a malformed line fails on its own without rejecting the file.
use std::path::Path;

use crate::error::ConfigError;

/// Prefix of an exclusion line.
pub const EXCLUSION_MARKER: &str = "# !";

/// Wanted and excluded identifiers read from list files, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionList {
    /// Identifiers to install.
    pub wanted: Vec<String>,
    /// Identifiers never to install.
    pub excluded: Vec<String>,
}

impl ExtensionList {
    /// Parse list text.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut list = Self::default();
        for line in content.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if let Some(payload) = line.strip_prefix(EXCLUSION_MARKER) {
                push_nonempty(&mut list.excluded, payload);
            } else if !line.starts_with('#') {
                list.wanted.push(line.to_string());
            }
        }
        list
    }

    /// Parse an exclusion file: marker lines and bare lines are both
    /// exclusions.
    #[must_use]
    pub fn parse_exclusions(content: &str) -> Vec<String> {
        let list = Self::parse(content);
        let mut excluded = list.wanted;
        excluded.extend(list.excluded);
        excluded
    }

    /// Read and parse a list file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read(path).map(|content| Self::parse(&content))
    }

    /// Read and parse an exclusion file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn load_exclusions(path: &Path) -> Result<Vec<String>, ConfigError> {
        read(path).map(|content| Self::parse_exclusions(&content))
    }

    /// Append `other`'s entries after this list's.
    pub fn merge(&mut self, other: Self) {
        self.wanted.extend(other.wanted);
        self.excluded.extend(other.excluded);
    }
}

fn push_nonempty(into: &mut Vec<String>, payload: &str) {
    let payload = payload.trim();
    if !payload.is_empty() {
        into.push(payload.to_string());
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
