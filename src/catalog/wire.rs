//! Gallery `extensionquery` request and response shapes.
use serde::{Deserialize, Serialize};

/// `filterType` for "extension name" criteria.
pub const FILTER_TYPE_EXTENSION_NAME: u32 = 7;

/// Query flags: include versions, files, properties and asset URIs.
pub const QUERY_FLAGS: u32 = 914;

/// `assetType` of the installable package.
pub const VSIX_ASSET_TYPE: &str = "Microsoft.VisualStudio.Services.VSIXPackage";

/// Property key listing hard dependencies.
pub const DEPENDENCIES_PROPERTY: &str = "Microsoft.VisualStudio.Code.ExtensionDependencies";

/// Property key listing extension pack members.
pub const PACK_PROPERTY: &str = "Microsoft.VisualStudio.Code.ExtensionPack";

/// Request body for one lookup.
#[derive(Debug, Serialize)]
pub struct QueryRequest {
    filters: Vec<Filter>,
    flags: u32,
}

#[derive(Debug, Serialize)]
struct Filter {
    criteria: Vec<Criterion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Criterion {
    filter_type: u32,
    value: String,
}

impl QueryRequest {
    /// Build a query for a single `publisher.name`.
    #[must_use]
    pub fn for_extension(qualified_name: &str) -> Self {
        Self {
            filters: vec![Filter {
                criteria: vec![Criterion {
                    filter_type: FILTER_TYPE_EXTENSION_NAME,
                    value: qualified_name.to_string(),
                }],
            }],
            flags: QUERY_FLAGS,
        }
    }
}

/// Top-level response.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    /// One result set per filter.
    #[serde(default)]
    pub results: Vec<ResultSet>,
}

impl QueryResponse {
    /// Versions of the first extension in the first result set.
    #[must_use]
    pub fn into_versions(self) -> Vec<RawVersion> {
        self.results
            .into_iter()
            .next()
            .and_then(|r| r.extensions.into_iter().next())
            .map(|e| e.versions)
            .unwrap_or_default()
    }
}

/// Extensions matching one filter.
#[derive(Debug, Default, Deserialize)]
pub struct ResultSet {
    /// Matching extensions.
    #[serde(default)]
    pub extensions: Vec<RawExtension>,
}

/// One extension record.
#[derive(Debug, Default, Deserialize)]
pub struct RawExtension {
    /// Version records, latest first.
    #[serde(default)]
    pub versions: Vec<RawVersion>,
}

/// One version record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVersion {
    /// Catalog-assigned version string.
    pub version: String,
    /// Platform this record was published for; absent for universal packages.
    #[serde(default)]
    pub target_platform: Option<String>,
    /// Downloadable files.
    #[serde(default)]
    pub files: Vec<RawFile>,
    /// Key/value metadata.
    #[serde(default)]
    pub properties: Vec<RawProperty>,
}

impl RawVersion {
    /// Source URL of the package file, if listed.
    #[must_use]
    pub fn package_source(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.asset_type == VSIX_ASSET_TYPE)
            .map(|f| f.source.as_str())
            .filter(|s| !s.is_empty())
    }

    /// All identifiers listed under `key`, across every matching property.
    #[must_use]
    pub fn property_list(&self, key: &str) -> Vec<String> {
        self.properties
            .iter()
            .filter(|p| p.key == key)
            .filter_map(|p| p.value.as_deref())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Whether this record is not tied to a specific platform.
    #[must_use]
    pub fn is_universal(&self) -> bool {
        self.target_platform
            .as_deref()
            .is_none_or(|t| t.is_empty() || t.eq_ignore_ascii_case("universal"))
    }
}

/// A file attached to a version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFile {
    /// Discriminator such as [`VSIX_ASSET_TYPE`].
    #[serde(default)]
    pub asset_type: String,
    /// Download URL.
    #[serde(default)]
    pub source: String,
}

/// A metadata property.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProperty {
    /// Property key.
    #[serde(default)]
    pub key: String,
    /// Property value; the gallery sends `null` for some keys.
    #[serde(default)]
    pub value: Option<String>,
}
