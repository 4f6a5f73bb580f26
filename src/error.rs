//! Domain-specific error types for the extension engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`CatalogError`], [`FetchError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ExtpackError
//! ├── Config(ConfigError)         — settings and list files
//! ├── Identifier(IdentifierError) — malformed `publisher.name` strings
//! ├── Catalog(CatalogError)       — marketplace lookups
//! └── Fetch(FetchError)           — download and unpack
//! ```
//!
//! Catalog and fetch failures are local to one identifier: the resolver
//! records them and keeps going, they never abort a run.

use thiserror::Error;

/// Top-level error type for the extension engine.
#[derive(Error, Debug)]
pub enum ExtpackError {
    /// Configuration-related error (settings file, list files).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An identifier string could not be parsed.
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),

    /// A catalog lookup failed.
    #[error("Catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    /// Downloading or unpacking an asset failed.
    #[error("Asset fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Errors that arise from settings and list files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An I/O error occurred while reading a config file.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file contains a syntax error that prevents parsing.
    #[error("Invalid syntax in {file}: {message}")]
    Parse {
        /// File being parsed.
        file: String,
        /// Parser message.
        message: String,
    },

    /// A setting has a value outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted settings key (e.g. `network.timeout_secs`).
        field: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The platform tag is not one the marketplace publishes.
    #[error("Unknown platform '{0}': must be one of darwin-arm64, darwin-x64, linux-arm64, linux-x64")]
    UnknownPlatform(String),
}

/// A malformed extension identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The input was empty or whitespace.
    #[error("identifier is empty")]
    Empty,

    /// No `.` between publisher and name.
    #[error("'{0}' is missing the publisher.name separator")]
    MissingSeparator(String),

    /// Nothing before the `.`.
    #[error("'{0}' has an empty publisher")]
    EmptyPublisher(String),

    /// Nothing after the `.`.
    #[error("'{0}' has an empty name")]
    EmptyName(String),

    /// Publisher or name contain `/`, `\`, `:`, `..`, or a control
    /// character.
    #[error("'{0}' contains a path separator, '..' or a control character")]
    UnsafeCharacters(String),

    /// A trailing `@` with no version after it.
    #[error("'{0}' has an empty version after '@'")]
    EmptyVersion(String),
}

/// Errors from the HTTP transport.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// The server answered with a non-2xx status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Connection, TLS, DNS or protocol failure.
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Transport error message.
        reason: String,
    },

    /// Writing the response body to disk failed.
    #[error("writing response from {url} failed: {source}")]
    Io {
        /// Requested URL.
        url: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl HttpError {
    /// Whether the failure is likely to go away on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Io { .. } => false,
        }
    }
}

/// Errors from catalog lookups. Callers treat every variant as "not found".
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The identifier was rejected before any request was made.
    #[error(transparent)]
    Malformed(#[from] IdentifierError),

    /// The query request failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The response body could not be decoded.
    #[error("invalid catalog response for {id}: {reason}")]
    InvalidResponse {
        /// Identifier being looked up.
        id: String,
        /// Decoder message.
        reason: String,
    },

    /// The catalog returned no extension or no versions.
    #[error("{0} not found in catalog")]
    NotFound(String),

    /// The chosen version has neither a platform nor a universal package.
    #[error("{id}@{version} has no downloadable package")]
    NoAsset {
        /// Identifier being looked up.
        id: String,
        /// Selected version.
        version: String,
    },
}

impl CatalogError {
    /// Whether the lookup failed for a reason other than the extension
    /// being absent. Informational only; both cases are handled the same.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors from downloading and unpacking a package.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The package could not be downloaded.
    #[error("download of {url} failed: {source}")]
    Download {
        /// Asset URL.
        url: String,
        /// Underlying transport error.
        source: HttpError,
    },

    /// The archive is corrupt or not a zip file.
    #[error("cannot unpack {archive}: {reason}")]
    Unpack {
        /// Staging file path.
        archive: String,
        /// Zip reader message.
        reason: String,
    },

    /// An archive entry or the install directory name would resolve
    /// outside the directory it belongs in.
    #[error("path '{0}' escapes the target directory")]
    PathEscape(String),

    /// A filesystem operation failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being written or removed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
