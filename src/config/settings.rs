//! The `extpack.toml` settings file.
//!
//! ```toml
//! [catalog]
//! query_url = "https://marketplace.visualstudio.com/_apis/public/gallery/extensionquery"
//!
//! [network]
//! timeout_secs = 30
//!
//! [install]
//! platform = "darwin-arm64"
//! jobs = 4
//! ```
//!
//! Every key is optional. Command-line flags override file values through
//! [`SettingsOverrides`].
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::toml_loader::{load_toml, parse_toml};
use crate::catalog::{CatalogEndpoints, DEFAULT_ASSET_URL_TEMPLATE, DEFAULT_QUERY_URL};
use crate::error::ConfigError;
use crate::platform::{Platform, PlatformTag};

/// Shortest request timeout accepted.
pub const MIN_TIMEOUT_SECS: u64 = 5;

/// Placeholders every asset URL template must contain.
const TEMPLATE_PLACEHOLDERS: [&str; 3] = ["{publisher}", "{name}", "{version}"];

/// All settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Catalog endpoints.
    pub catalog: CatalogSettings,
    /// HTTP behaviour.
    pub network: NetworkSettings,
    /// Install behaviour.
    pub install: InstallSettings,
}

/// `[catalog]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSettings {
    /// Gallery `extensionquery` URL.
    pub query_url: String,
    /// Platform package URL template.
    pub asset_url_template: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            query_url: DEFAULT_QUERY_URL.to_string(),
            asset_url_template: DEFAULT_ASSET_URL_TEMPLATE.to_string(),
        }
    }
}

/// `[network]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("extpack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// `[install]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSettings {
    /// Target platform tag; detected from the host when unset.
    pub platform: Option<String>,
    /// Probe for platform-specific packages.
    pub probe_platform: bool,
    /// Concurrent catalog lookups.
    pub jobs: usize,
    /// Directory for staging downloads; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            platform: None,
            probe_platform: true,
            jobs: 1,
            staging_dir: None,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// `--timeout`
    pub timeout_secs: Option<u64>,
    /// `--platform`
    pub platform: Option<String>,
    /// `--no-platform-probe` sets `Some(false)`.
    pub probe_platform: Option<bool>,
    /// `--jobs`
    pub jobs: Option<usize>,
}

impl Settings {
    /// Load settings from `path`, or defaults when `path` is `None` or the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        load_toml(path).with_context(|| format!("loading settings from {}", path.display()))
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        parse_toml(content, "<settings>")
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(timeout) = overrides.timeout_secs {
            self.network.timeout_secs = timeout;
        }
        if let Some(platform) = overrides.platform {
            self.install.platform = Some(platform);
        }
        if let Some(probe) = overrides.probe_platform {
            self.install.probe_platform = probe;
        }
        if let Some(jobs) = overrides.jobs {
            self.install.jobs = jobs;
        }
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.timeout_secs < MIN_TIMEOUT_SECS {
            return Err(invalid(
                "network.timeout_secs",
                format!(
                    "{} is below the minimum of {MIN_TIMEOUT_SECS} seconds",
                    self.network.timeout_secs
                ),
            ));
        }
        if self.network.user_agent.trim().is_empty() {
            return Err(invalid("network.user_agent", "must not be empty"));
        }
        if self.install.jobs == 0 {
            return Err(invalid("install.jobs", "must be at least 1"));
        }
        if !is_http_url(&self.catalog.query_url) {
            return Err(invalid("catalog.query_url", "must be an http(s) URL"));
        }
        if !is_http_url(&self.catalog.asset_url_template) {
            return Err(invalid("catalog.asset_url_template", "must be an http(s) URL"));
        }
        if let Some(missing) = TEMPLATE_PLACEHOLDERS
            .iter()
            .find(|p| !self.catalog.asset_url_template.contains(**p))
        {
            return Err(invalid(
                "catalog.asset_url_template",
                format!("missing placeholder {missing}"),
            ));
        }
        self.platform_tag().map(|_| ())
    }

    /// The platform to prefer packages for: the configured tag, else the
    /// host's.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPlatform`] for an unrecognised tag.
    pub fn platform_tag(&self) -> Result<Option<PlatformTag>, ConfigError> {
        self.install.platform.as_deref().map_or_else(
            || Ok(Platform::detect().target_tag()),
            |tag| tag.parse().map(Some),
        )
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    /// Catalog endpoints.
    #[must_use]
    pub fn endpoints(&self) -> CatalogEndpoints {
        CatalogEndpoints {
            query_url: self.catalog.query_url.clone(),
            asset_url_template: self.catalog.asset_url_template.clone(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}
