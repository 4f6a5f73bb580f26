//! Destination directory collaborators.
//!
//! The engine never decides where extensions live; a [`Packager`] hands it
//! the directory. Two layouts are provided: a plain directory and the
//! editor's portable-mode data directory (`{data}/extensions`).
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

/// Supplies the directory that packages are unpacked into.
pub trait Packager: Send + Sync {
    /// Return the destination directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or resolved.
    fn resolve_destination_extensions_dir(&self) -> Result<PathBuf>;
}

/// An explicit extensions directory.
#[derive(Debug, Clone)]
pub struct ExtensionsDir {
    path: PathBuf,
    create: bool,
}

impl ExtensionsDir {
    /// Use `path` as the extensions directory.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create: true,
        }
    }

    /// Whether a missing directory is created (`false` for dry runs).
    #[must_use]
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

impl Packager for ExtensionsDir {
    fn resolve_destination_extensions_dir(&self) -> Result<PathBuf> {
        prepare(&self.path, self.create)
    }
}

/// The `extensions` directory inside a portable-mode data directory.
#[derive(Debug, Clone)]
pub struct PortableDataDir {
    data_dir: PathBuf,
    create: bool,
}

impl PortableDataDir {
    /// Name of the extensions directory below the data directory.
    pub const EXTENSIONS: &'static str = "extensions";

    /// Use `{data_dir}/extensions` as the extensions directory.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            create: true,
        }
    }

    /// Whether missing directories are created (`false` for dry runs).
    #[must_use]
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

impl Packager for PortableDataDir {
    fn resolve_destination_extensions_dir(&self) -> Result<PathBuf> {
        prepare(&self.data_dir.join(Self::EXTENSIONS), self.create)
    }
}

fn prepare(dir: &Path, create: bool) -> Result<PathBuf> {
    if dir.exists() && !dir.is_dir() {
        anyhow::bail!("{} exists and is not a directory", dir.display());
    }
    if create {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating extensions directory {}", dir.display()))?;
    }
    if dir.exists() {
        dunce::canonicalize(dir).with_context(|| format!("resolving {}", dir.display()))
    } else {
        std::path::absolute(dir).with_context(|| format!("resolving {}", dir.display()))
    }
}
