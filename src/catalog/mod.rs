//! Marketplace catalog lookups.
//!
//! A lookup turns one [`Identifier`] into a [`CatalogEntry`]: the version to
//! install, the URL of the package for this platform, and the identifiers it
//! pulls in.  Two lenient fallbacks are applied and recorded on the entry so
//! callers can tell which path was taken:
//!
//! - a pinned version that the catalog does not list falls back to the first
//!   (latest) version ([`VersionSelection::PinnedFallback`]);
//! - a platform package that fails its existence probe falls back to the
//!   universal package ([`AssetSource::Universal`]).
pub mod wire;

use std::sync::Arc;

use crate::error::{CatalogError, IdentifierError};
use crate::http::{self, HttpClient};
use crate::identifier::Identifier;
use crate::platform::PlatformTag;

use wire::{DEPENDENCIES_PROPERTY, PACK_PROPERTY, QueryRequest, QueryResponse, RawVersion};

/// Default gallery query endpoint.
pub const DEFAULT_QUERY_URL: &str =
    "https://marketplace.visualstudio.com/_apis/public/gallery/extensionquery";

/// Default package URL template; `{publisher}`, `{name}` and `{version}` are substituted.
pub const DEFAULT_ASSET_URL_TEMPLATE: &str = "https://{publisher}.gallery.vsassets.io/_apis/public/gallery/publisher/{publisher}/extension/{name}/{version}/assetbyname/Microsoft.VisualStudio.Services.VSIXPackage";

/// How the installed version was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelection {
    /// No version requested; the first listed version was used.
    Latest,
    /// The requested version was listed and used.
    Pinned,
    /// The requested version was not listed; the first listed version was used.
    PinnedFallback {
        /// Version the caller asked for.
        requested: String,
    },
}

/// Which package the asset URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    /// Platform-specific package whose existence probe succeeded.
    Platform(PlatformTag),
    /// Platform-independent package.
    Universal,
}

/// Resolved metadata for one identifier at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// The identifier that was looked up.
    pub id: Identifier,
    /// Catalog-assigned version string.
    pub version: String,
    /// URL of the package to download.
    pub asset_url: String,
    /// Whether `asset_url` is the platform or universal package.
    pub asset_source: AssetSource,
    /// How `version` was chosen.
    pub version_selection: VersionSelection,
    /// Hard dependencies, in catalog order.
    pub dependencies: Vec<String>,
    /// Extension pack members, in catalog order.
    pub bundle_members: Vec<String>,
}

impl CatalogEntry {
    /// Dependencies followed by bundle members.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .chain(&self.bundle_members)
            .map(String::as_str)
    }

    /// Directory the package unpacks into: `{publisher}.{name}-{version}`.
    #[must_use]
    pub fn directory_name(&self) -> String {
        format!("{}-{}", self.id.key(), self.version)
    }
}

/// Source of extension metadata.
pub trait Catalog: Send + Sync {
    /// Look up `id`, honouring its pinned version where the catalog lists it.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] when the extension cannot be found or the
    /// request fails; callers treat both the same way.
    fn lookup(&self, id: &Identifier) -> Result<CatalogEntry, CatalogError>;

    /// Parse `raw` and look it up. Malformed strings fail without a request.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Malformed`] for unparsable input, otherwise as
    /// [`Catalog::lookup`].
    fn lookup_str(&self, raw: &str) -> Result<CatalogEntry, CatalogError> {
        let id = Identifier::parse(raw).map_err(|e: IdentifierError| {
            tracing::warn!("rejecting identifier: {e}");
            CatalogError::Malformed(e)
        })?;
        self.lookup(&id)
    }
}

/// Catalog endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoints {
    /// URL of the `extensionquery` endpoint.
    pub query_url: String,
    /// Package URL template used for platform probes.
    pub asset_url_template: String,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            query_url: DEFAULT_QUERY_URL.to_string(),
            asset_url_template: DEFAULT_ASSET_URL_TEMPLATE.to_string(),
        }
    }
}

/// [`Catalog`] backed by the marketplace gallery API.
pub struct MarketplaceCatalog {
    http: Arc<dyn HttpClient>,
    endpoints: CatalogEndpoints,
    platform: Option<PlatformTag>,
    probe_platform: bool,
}

impl std::fmt::Debug for MarketplaceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceCatalog")
            .field("http", &"<dyn HttpClient>")
            .field("endpoints", &self.endpoints)
            .field("platform", &self.platform)
            .field("probe_platform", &self.probe_platform)
            .finish()
    }
}

impl MarketplaceCatalog {
    /// Create a catalog client with no platform; only universal packages are used.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, endpoints: CatalogEndpoints) -> Self {
        Self {
            http,
            endpoints,
            platform: None,
            probe_platform: true,
        }
    }

    /// Prefer packages built for `platform`.
    #[must_use]
    pub fn with_platform(mut self, platform: Option<PlatformTag>) -> Self {
        self.platform = platform;
        self
    }

    /// Enable or disable the platform package existence probe.
    #[must_use]
    pub fn with_probe(mut self, probe_platform: bool) -> Self {
        self.probe_platform = probe_platform;
        self
    }

    /// URL of the platform package for `id` at `version`.
    #[must_use]
    pub fn platform_asset_url(&self, id: &Identifier, version: &str, tag: PlatformTag) -> String {
        let base = self
            .endpoints
            .asset_url_template
            .replace("{publisher}", id.publisher())
            .replace("{name}", id.name())
            .replace("{version}", version);
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}targetPlatform={tag}")
    }

    fn query(&self, id: &Identifier) -> Result<Vec<RawVersion>, CatalogError> {
        let request = QueryRequest::for_extension(&id.qualified_name());
        let body = serde_json::to_string(&request).map_err(|e| CatalogError::InvalidResponse {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let text = self.http.post_json(&self.endpoints.query_url, &body)?;
        let response: QueryResponse =
            serde_json::from_str(&text).map_err(|e| CatalogError::InvalidResponse {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(response.into_versions())
    }

    /// Probe the platform package; `true` only on a 2xx answer.
    fn probe(&self, url: &str) -> bool {
        match self.http.head(url) {
            Ok(status) if http::is_success(status) => true,
            Ok(status) => {
                tracing::debug!("platform probe returned HTTP {status}: {url}");
                false
            }
            Err(e) => {
                tracing::debug!("platform probe failed: {e}");
                false
            }
        }
    }

    fn select_asset(
        &self,
        id: &Identifier,
        record: &RawVersion,
    ) -> Result<(String, AssetSource), CatalogError> {
        if self.probe_platform
            && let Some(tag) = self.platform
        {
            let url = self.platform_asset_url(id, &record.version, tag);
            if self.probe(&url) {
                tracing::debug!("{id}: using {tag} package");
                return Ok((url, AssetSource::Platform(tag)));
            }
            tracing::debug!("{id}: no {tag} package, falling back to universal");
        }

        record
            .package_source()
            .map(|url| (url.to_string(), AssetSource::Universal))
            .ok_or_else(|| CatalogError::NoAsset {
                id: id.to_string(),
                version: record.version.clone(),
            })
    }
}

impl Catalog for MarketplaceCatalog {
    fn lookup(&self, id: &Identifier) -> Result<CatalogEntry, CatalogError> {
        tracing::debug!("querying catalog for {id}");
        let versions = self.query(id)?;

        let Some((chosen, version_selection)) = select_version(&versions, id.pinned_version())
        else {
            return Err(CatalogError::NotFound(id.to_string()));
        };
        if let VersionSelection::PinnedFallback { requested } = &version_selection {
            tracing::warn!(
                "{} has no version {requested}, using latest {}",
                id.qualified_name(),
                chosen.version
            );
        }

        let record = pick_variant(&versions, chosen, self.platform);
        let (asset_url, asset_source) = self.select_asset(id, record)?;

        Ok(CatalogEntry {
            id: id.clone(),
            version: record.version.clone(),
            asset_url,
            asset_source,
            version_selection,
            dependencies: record.property_list(DEPENDENCIES_PROPERTY),
            bundle_members: record.property_list(PACK_PROPERTY),
        })
    }
}

/// Choose the version record: the pinned version if listed, otherwise the
/// first record. Returns `None` only when `versions` is empty.
fn select_version<'a>(
    versions: &'a [RawVersion],
    pinned: Option<&str>,
) -> Option<(&'a RawVersion, VersionSelection)> {
    let first = versions.first()?;
    let Some(requested) = pinned else {
        return Some((first, VersionSelection::Latest));
    };
    Some(versions.iter().find(|v| v.version == requested).map_or_else(
        || {
            (
                first,
                VersionSelection::PinnedFallback {
                    requested: requested.to_string(),
                },
            )
        },
        |v| (v, VersionSelection::Pinned),
    ))
}

/// Among records sharing `chosen`'s version string, prefer the one built
/// for `platform`, then a universal one, then `chosen` itself.
fn pick_variant<'a>(
    versions: &'a [RawVersion],
    chosen: &'a RawVersion,
    platform: Option<PlatformTag>,
) -> &'a RawVersion {
    let siblings = || versions.iter().filter(|v| v.version == chosen.version);
    platform
        .and_then(|tag| {
            siblings().find(|v| {
                v.target_platform
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(tag.as_str()))
            })
        })
        .or_else(|| siblings().find(|v| v.is_universal()))
        .unwrap_or(chosen)
}
