//! Install coordination and the end-of-run report.
use anyhow::{Context as _, Result};

use crate::catalog::Catalog;
use crate::fetcher::AssetFetcher;
use crate::identifier::{ExclusionSet, Identifier};
use crate::logging::Log;
use crate::packager::Packager;
use crate::resolver::{CycleBreak, Outcome, ResolveOptions, Resolution, Resolver};

/// Aggregate result of one install run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    outcomes: Vec<Outcome>,
    cycle_breaks: Vec<CycleBreak>,
}

impl From<Resolution> for Report {
    fn from(resolution: Resolution) -> Self {
        Self {
            outcomes: resolution.outcomes,
            cycle_breaks: resolution.cycle_breaks,
        }
    }
}

impl Report {
    /// Every outcome, in resolution order.
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Dependency edges skipped to break cycles.
    #[must_use]
    pub fn cycle_breaks(&self) -> &[CycleBreak] {
        &self.cycle_breaks
    }

    /// Number of installed identifiers.
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Installed { .. }))
            .count()
    }

    /// `publisher.name` of every installed identifier.
    #[must_use]
    pub fn installed_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Installed { id, .. } => Some(id.qualified_name()),
                _ => None,
            })
            .collect()
    }

    /// `publisher.name` of every failed identifier, matching
    /// [`installed_ids`](Self::installed_ids). Malformed strings that never
    /// parsed are returned as written.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Failed { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// `publisher.name` of every excluded identifier.
    #[must_use]
    pub fn excluded_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Excluded { id } => Some(id.qualified_name()),
                _ => None,
            })
            .collect()
    }

    /// `true` when nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o, Outcome::Failed { .. }))
    }

    /// One line per identifier, in resolution order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| match o {
                Outcome::Installed { id, version, .. } => {
                    format!("installed {} {version}", id.qualified_name())
                }
                Outcome::Excluded { id } => format!("excluded  {}", id.qualified_name()),
                Outcome::Failed { id, reason } => format!("failed    {id}: {reason}"),
            })
            .collect()
    }

    /// `N installed, N failed, N excluded`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} installed, {} failed, {} excluded",
            self.installed_count(),
            self.failed_ids().len(),
            self.excluded_ids().len()
        )
    }
}

/// Drives the resolver over a list of wanted identifiers.
pub struct Installer<'a> {
    catalog: &'a dyn Catalog,
    fetcher: &'a dyn AssetFetcher,
    packager: &'a dyn Packager,
    log: &'a dyn Log,
    options: ResolveOptions,
}

impl std::fmt::Debug for Installer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Installer<'a> {
    /// Create an installer from its collaborators.
    #[must_use]
    pub fn new(
        catalog: &'a dyn Catalog,
        fetcher: &'a dyn AssetFetcher,
        packager: &'a dyn Packager,
        log: &'a dyn Log,
        options: ResolveOptions,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            packager,
            log,
            options,
        }
    }

    /// Install every wanted identifier and its dependencies, skipping
    /// anything matched by `exclude_patterns`.
    ///
    /// Individual failures are recorded in the report; they never abort the
    /// run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the destination directory cannot be
    /// resolved.
    pub fn run<W, X>(&self, wanted: &[W], exclude_patterns: &[X]) -> Result<Report>
    where
        W: AsRef<str>,
        X: AsRef<str>,
    {
        let (exclusions, ignored) = ExclusionSet::from_patterns(exclude_patterns);
        for (pattern, error) in &ignored {
            self.log
                .warn(&format!("ignoring exclusion '{pattern}': {error}"));
        }

        let destination = self
            .packager
            .resolve_destination_extensions_dir()
            .context("resolving destination extensions directory")?;

        self.log.stage(&format!(
            "Installing {} extension(s) into {}",
            wanted.len(),
            destination.display()
        ));
        if !exclusions.is_empty() {
            self.log
                .debug(&format!("{} identifier(s) excluded", exclusions.len()));
        }

        let mut resolver = Resolver::new(
            self.catalog,
            self.fetcher,
            &destination,
            exclusions,
            self.log,
            self.options,
        );
        for raw in wanted {
            let raw = raw.as_ref();
            match Identifier::parse(raw) {
                Ok(id) => {
                    resolver.resolve_root(&id);
                }
                Err(e) => resolver.reject(raw, e),
            }
        }

        let report = Report::from(resolver.finish());
        self.log.info(&report.summary());
        Ok(report)
    }
}
