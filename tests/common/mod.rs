// Shared helpers for integration tests.
//
// Provides an in-memory marketplace that speaks the gallery query protocol,
// a zip builder for package archives, and a temporary-directory-backed
// environment so each integration test runs the full install pipeline
// without touching the network.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use extpack_cli::catalog::DEFAULT_ASSET_URL_TEMPLATE;
use extpack_cli::cli::{DestinationOpts, GlobalOpts, InstallOpts};
use extpack_cli::config::Settings;
use extpack_cli::error::HttpError;
use extpack_cli::http::HttpClient;
use extpack_cli::platform::PlatformTag;
use serde_json::{Value, json};

/// Build a package archive from `(member, contents)` pairs.
pub fn vsix(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in files {
        writer.start_file(*name, options).expect("start zip entry");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// In-memory marketplace implementing [`HttpClient`].
///
/// Versions are listed in publication order, latest first, exactly as the
/// gallery returns them.
#[derive(Debug, Default)]
pub struct FakeMarketplace {
    versions: HashMap<String, Vec<Value>>,
    packages: HashMap<String, Vec<u8>>,
    platform_urls: HashSet<String>,
    queries: Mutex<Vec<String>>,
    probes: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeMarketplace {
    /// Publish `id` at `version` with a universal package.
    #[must_use]
    pub fn publish(self, id: &str, version: &str, deps: &[&str]) -> Self {
        self.publish_pack(id, version, deps, &[])
    }

    /// Publish `id` at `version` with dependencies and pack members.
    #[must_use]
    pub fn publish_pack(mut self, id: &str, version: &str, deps: &[&str], pack: &[&str]) -> Self {
        let key = id.to_lowercase();
        let url = format!("https://cdn.test/{key}/{version}.vsix");
        self.packages.insert(
            url.clone(),
            vsix(&[
                ("extension.vsixmanifest", "<PackageManifest/>"),
                (
                    "extension/package.json",
                    &format!("{{\"name\":\"{key}\",\"version\":\"{version}\"}}"),
                ),
                ("extension/universal.txt", "universal"),
            ]),
        );
        self.versions.entry(key).or_default().push(json!({
            "version": version,
            "files": [
                {"assetType": "Microsoft.VisualStudio.Services.VSIXPackage", "source": url}
            ],
            "properties": [
                {"key": "Microsoft.VisualStudio.Code.ExtensionDependencies", "value": deps.join(",")},
                {"key": "Microsoft.VisualStudio.Code.ExtensionPack", "value": pack.join(",")}
            ]
        }));
        self
    }

    /// Make a platform-specific package reachable for `id` at `version`.
    #[must_use]
    pub fn publish_platform(mut self, id: &str, version: &str, tag: PlatformTag) -> Self {
        let url = platform_url(id, version, tag);
        self.packages.insert(
            url.clone(),
            vsix(&[
                ("extension/package.json", "{}"),
                ("extension/platform.txt", tag.as_str()),
            ]),
        );
        self.platform_urls.insert(url);
        self
    }

    /// Keep the catalog record of `id` at `version` but stop serving its
    /// universal package.
    #[must_use]
    pub fn unserved(mut self, id: &str, version: &str) -> Self {
        let key = id.to_lowercase();
        self.packages
            .remove(&format!("https://cdn.test/{key}/{version}.vsix"));
        self
    }

    /// Identifiers queried, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("lock").clone()
    }

    /// URLs probed with HEAD, in order.
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().expect("lock").clone()
    }

    /// URLs downloaded, in order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().expect("lock").clone()
    }
}

impl HttpClient for FakeMarketplace {
    fn post_json(&self, _url: &str, body: &str) -> Result<String, HttpError> {
        let request: Value = serde_json::from_str(body).expect("query body is JSON");
        let name = request["filters"][0]["criteria"][0]["value"]
            .as_str()
            .expect("criteria value")
            .to_string();
        self.queries.lock().expect("lock").push(name.clone());

        let extensions = self
            .versions
            .get(&name.to_lowercase())
            .map_or_else(Vec::new, |versions| vec![json!({ "versions": versions })]);
        Ok(json!({ "results": [{ "extensions": extensions }] }).to_string())
    }

    fn head(&self, url: &str) -> Result<u16, HttpError> {
        self.probes.lock().expect("lock").push(url.to_string());
        Ok(if self.platform_urls.contains(url) {
            200
        } else {
            404
        })
    }

    fn download_to(&self, url: &str, dest: &Path) -> Result<u64, HttpError> {
        self.downloads.lock().expect("lock").push(url.to_string());
        let bytes = self.packages.get(url).ok_or_else(|| HttpError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        std::fs::write(dest, bytes).map_err(|source| HttpError::Io {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.len() as u64)
    }
}

/// The platform package URL the catalog client will probe.
pub fn platform_url(id: &str, version: &str, tag: PlatformTag) -> String {
    let (publisher, name) = id.split_once('.').expect("publisher.name");
    let base = DEFAULT_ASSET_URL_TEMPLATE
        .replace("{publisher}", publisher)
        .replace("{name}", name)
        .replace("{version}", version);
    format!("{base}?targetPlatform={tag}")
}

/// An isolated install destination backed by a [`tempfile::TempDir`].
#[derive(Debug)]
pub struct TestEnv {
    pub tmp: tempfile::TempDir,
    pub dest: PathBuf,
}

impl TestEnv {
    /// Create a fresh environment; `dest` does not exist yet.
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let dest = tmp.path().join("extensions");
        Self { tmp, dest }
    }

    /// Install options targeting this environment's `dest`.
    pub fn opts(&self, ids: &[&str], exclude: &[&str]) -> InstallOpts {
        InstallOpts {
            ids: ids.iter().map(ToString::to_string).collect(),
            lists: Vec::new(),
            exclude_files: Vec::new(),
            exclude: exclude.iter().map(ToString::to_string).collect(),
            destination: DestinationOpts {
                dest: Some(self.dest.clone()),
                portable_data: None,
            },
            platform: None,
            timeout: None,
            no_platform_probe: false,
            jobs: None,
        }
    }

    /// Settings with no platform preference and staging inside the temp dir.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.install.platform = Some(PlatformTag::LinuxX64.to_string());
        settings.install.probe_platform = false;
        settings.install.staging_dir = Some(self.tmp.path().to_path_buf());
        settings
    }

    /// Path of an installed extension directory.
    pub fn installed(&self, dir_name: &str) -> PathBuf {
        self.dest.join(dir_name)
    }
}

/// Global options for a normal (or dry) run.
pub fn global(dry_run: bool) -> GlobalOpts {
    GlobalOpts {
        config: None,
        dry_run,
    }
}

/// Wrap a marketplace for the install pipeline while keeping a handle for
/// assertions.
pub fn client(market: FakeMarketplace) -> (Arc<FakeMarketplace>, Arc<dyn HttpClient>) {
    let market = Arc::new(market);
    let http: Arc<dyn HttpClient> = Arc::clone(&market) as Arc<dyn HttpClient>;
    (market, http)
}
