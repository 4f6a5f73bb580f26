//! Downloading and unpacking extension packages.
//!
//! A package is a zip archive whose installable payload lives under
//! `extension/`.  [`VsixFetcher`] downloads it to a private staging file,
//! replaces `{destination}/{publisher}.{name}-{version}` wholesale with that
//! subtree, and removes the staging file again.
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::catalog::CatalogEntry;
use crate::error::FetchError;
use crate::http::HttpClient;

/// Prefix of the archive members that are installed.
const PAYLOAD_PREFIX: &str = "extension/";

/// Installs one resolved package.
pub trait AssetFetcher: Send + Sync {
    /// Download `entry` and unpack it below `destination`, returning the
    /// directory it was installed into.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the download, unpack, or any filesystem
    /// operation fails. A failure never leaves a half-written target.
    fn fetch_and_unpack(&self, entry: &CatalogEntry, destination: &Path)
    -> Result<PathBuf, FetchError>;
}

/// [`AssetFetcher`] that downloads over HTTP and unpacks the zip archive.
pub struct VsixFetcher {
    http: Arc<dyn HttpClient>,
    staging_dir: Option<PathBuf>,
}

impl std::fmt::Debug for VsixFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsixFetcher")
            .field("http", &"<dyn HttpClient>")
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl VsixFetcher {
    /// Create a fetcher that stages downloads in the system temp directory.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            staging_dir: None,
        }
    }

    /// Stage downloads in `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    fn staging_file(&self, entry: &CatalogEntry) -> Result<tempfile::NamedTempFile, FetchError> {
        let dir = self
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        tempfile::Builder::new()
            .prefix(&format!("{}.", entry.id.key()))
            .suffix(".vsix")
            .tempfile_in(&dir)
            .map_err(|source| FetchError::Io {
                path: dir.display().to_string(),
                source,
            })
    }
}

impl AssetFetcher for VsixFetcher {
    fn fetch_and_unpack(
        &self,
        entry: &CatalogEntry,
        destination: &Path,
    ) -> Result<PathBuf, FetchError> {
        let target = target_dir(entry, destination)?;
        let staging = self.staging_file(entry)?;
        let bytes = self
            .http
            .download_to(&entry.asset_url, staging.path())
            .map_err(|source| FetchError::Download {
                url: entry.asset_url.clone(),
                source,
            })?;
        tracing::debug!(
            "downloaded {bytes} bytes for {} to {}",
            entry.id,
            staging.path().display()
        );

        replace_dir(&target)?;

        if let Err(e) = unpack_vsix(staging.path(), &target) {
            if let Err(cleanup) = fs::remove_dir_all(&target) {
                tracing::warn!(
                    "could not remove partial install {}: {cleanup}",
                    target.display()
                );
            }
            return Err(e);
        }
        // `staging` is removed when dropped, on both paths.
        Ok(target)
    }
}

/// [`AssetFetcher`] for dry runs: reports the target directory and touches
/// nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanFetcher;

impl AssetFetcher for PlanFetcher {
    fn fetch_and_unpack(
        &self,
        entry: &CatalogEntry,
        destination: &Path,
    ) -> Result<PathBuf, FetchError> {
        target_dir(entry, destination)
    }
}

/// `{destination}/{publisher}.{name}-{version}`.
///
/// The version comes straight from the catalog, so the directory name must
/// be exactly one plain path component.
///
/// # Errors
///
/// Returns [`FetchError::PathEscape`] for any other directory name.
fn target_dir(entry: &CatalogEntry, destination: &Path) -> Result<PathBuf, FetchError> {
    let name = entry.directory_name();
    let mut components = Path::new(&name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part.to_str() == Some(name.as_str()) => {
            Ok(destination.join(&name))
        }
        _ => Err(FetchError::PathEscape(name)),
    }
}

/// Remove `target` if it exists and create it empty.
fn replace_dir(target: &Path) -> Result<(), FetchError> {
    let io_err = |source: io::Error| FetchError::Io {
        path: target.display().to_string(),
        source,
    };
    if target.exists() {
        tracing::debug!("replacing existing {}", target.display());
        fs::remove_dir_all(target).map_err(io_err)?;
    }
    fs::create_dir_all(target).map_err(io_err)
}

/// Map an archive member name to its path below the target, or `None` when
/// the member is outside the payload.
///
/// # Errors
///
/// Returns [`FetchError::PathEscape`] when the stripped path contains `..`,
/// a root, or a drive prefix.
fn payload_path(member: &str) -> Result<Option<PathBuf>, FetchError> {
    let Some(rest) = member.strip_prefix(PAYLOAD_PREFIX) else {
        return Ok(None);
    };
    let rel = Path::new(rest);
    if !rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(FetchError::PathEscape(member.to_string()));
    }
    if rel.components().next().is_none() {
        return Ok(None);
    }
    Ok(Some(rel.to_path_buf()))
}

/// Extract every `extension/` member of `archive` into `target`, stripping
/// the prefix. Other members are ignored.
///
/// # Errors
///
/// Returns [`FetchError::Unpack`] for unreadable archives,
/// [`FetchError::PathEscape`] for members that would land outside `target`,
/// and [`FetchError::Io`] for write failures.
pub fn unpack_vsix(archive: &Path, target: &Path) -> Result<usize, FetchError> {
    let unpack_err = |reason: String| FetchError::Unpack {
        archive: archive.display().to_string(),
        reason,
    };
    let file = File::open(archive).map_err(|source| FetchError::Io {
        path: archive.display().to_string(),
        source,
    })?;
    let mut zip =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| unpack_err(e.to_string()))?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut member = zip
            .by_index(index)
            .map_err(|e| unpack_err(e.to_string()))?;
        let Some(rel) = payload_path(member.name())? else {
            continue;
        };
        let out = target.join(&rel);
        let io_err = |source: io::Error| FetchError::Io {
            path: out.display().to_string(),
            source,
        };

        if member.is_dir() {
            fs::create_dir_all(&out).map_err(io_err)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut dest = File::create(&out).map_err(io_err)?;
        io::copy(&mut member, &mut dest).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                unpack_err(e.to_string())
            } else {
                io_err(e)
            }
        })?;

        #[cfg(unix)]
        if let Some(mode) = member.unix_mode() {
            use std::os::unix::fs::PermissionsExt as _;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))
                .map_err(io_err)?;
        }
        written += 1;
    }
    Ok(written)
}
