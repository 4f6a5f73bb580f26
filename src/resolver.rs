//! Depth-first dependency resolution.
//!
//! Each identifier moves through a small state machine:
//!
//! ```text
//! unseen ──excluded──▶ excluded
//! unseen ──▶ in-flight ──▶ installed | failed
//! in-flight ──re-entered──▶ in-flight   (cycle: satisfied, no recursion)
//! installed | excluded | failed ──▶ same (short-circuit)
//! ```
//!
//! Children (dependencies, then bundle members, in catalog order) are
//! resolved before their parent is fetched, so a dependency is unpacked no
//! later than its dependent. A failed child never aborts its parent.
//!
//! With `jobs > 1` the catalog lookups of a node's unseen children are
//! issued up front on a bounded [`rayon`] pool. The walk itself, every
//! state change and every fetch stay on the calling thread.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{CatalogError, IdentifierError};
use crate::fetcher::AssetFetcher;
use crate::identifier::{ExclusionSet, Identifier};
use crate::logging::Log;

/// Tuning for one resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Maximum concurrent catalog lookups; `1` disables prefetching.
    pub jobs: usize,
    /// Log installs as dry-run actions.
    pub dry_run: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            dry_run: false,
        }
    }
}

/// Terminal outcome of one identifier, in the order it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Fetched and unpacked.
    Installed {
        /// The identifier.
        id: Identifier,
        /// Installed version.
        version: String,
        /// Directory it was unpacked into.
        path: PathBuf,
    },
    /// Matched the exclusion set; never looked up.
    Excluded {
        /// The identifier.
        id: Identifier,
    },
    /// Malformed, not found, or failed to fetch.
    Failed {
        /// `publisher.name` for well-formed identifiers; malformed strings
        /// are kept as written.
        id: String,
        /// Why it failed.
        reason: String,
    },
}

/// A dependency edge that pointed back into the active call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleBreak {
    /// Node whose child list contained the edge.
    pub from: Identifier,
    /// In-flight node the edge pointed at.
    pub to: Identifier,
}

/// Mutable per-run state, owned by one [`Resolver`].
#[derive(Debug, Default)]
pub struct VisitState {
    installed: HashSet<Identifier>,
    excluded: HashSet<Identifier>,
    failed: HashSet<Identifier>,
    in_flight: HashSet<Identifier>,
    rejected: Vec<(String, IdentifierError)>,
    outcomes: Vec<Outcome>,
    cycle_breaks: Vec<CycleBreak>,
}

impl VisitState {
    /// Identifiers installed so far.
    #[must_use]
    pub const fn installed(&self) -> &HashSet<Identifier> {
        &self.installed
    }

    /// Identifiers skipped because they are excluded.
    #[must_use]
    pub const fn excluded(&self) -> &HashSet<Identifier> {
        &self.excluded
    }

    /// Well-formed identifiers that failed lookup or fetch.
    #[must_use]
    pub const fn failed(&self) -> &HashSet<Identifier> {
        &self.failed
    }

    /// Identifiers currently on the resolution stack.
    #[must_use]
    pub const fn in_flight(&self) -> &HashSet<Identifier> {
        &self.in_flight
    }

    /// Malformed identifier strings, with the reason each was rejected.
    #[must_use]
    pub fn rejected(&self) -> &[(String, IdentifierError)] {
        &self.rejected
    }

    /// Whether `id` has reached installed, excluded or failed.
    #[must_use]
    pub fn is_terminal(&self, id: &Identifier) -> bool {
        self.installed.contains(id) || self.excluded.contains(id) || self.failed.contains(id)
    }

    fn is_seen(&self, id: &Identifier) -> bool {
        self.is_terminal(id) || self.in_flight.contains(id)
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Outcomes in the order each identifier reached a terminal state.
    pub outcomes: Vec<Outcome>,
    /// Edges skipped to break cycles.
    pub cycle_breaks: Vec<CycleBreak>,
}

/// Walks the dependency graph of a set of roots.
pub struct Resolver<'a> {
    catalog: &'a dyn Catalog,
    fetcher: &'a dyn AssetFetcher,
    destination: &'a Path,
    exclusions: ExclusionSet,
    log: &'a dyn Log,
    options: ResolveOptions,
    pool: Option<rayon::ThreadPool>,
    prefetched: HashMap<String, Result<CatalogEntry, CatalogError>>,
    state: VisitState,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("destination", &self.destination)
            .field("exclusions", &self.exclusions)
            .field("options", &self.options)
            .field("prefetched", &self.prefetched.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    /// Create a resolver that installs into `destination`.
    #[must_use]
    pub fn new(
        catalog: &'a dyn Catalog,
        fetcher: &'a dyn AssetFetcher,
        destination: &'a Path,
        exclusions: ExclusionSet,
        log: &'a dyn Log,
        options: ResolveOptions,
    ) -> Self {
        let pool = (options.jobs > 1)
            .then(|| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(options.jobs)
                    .thread_name(|i| format!("extpack-lookup-{i}"))
                    .build()
            })
            .and_then(|built| match built {
                Ok(pool) => Some(pool),
                Err(e) => {
                    log.warn(&format!("parallel lookups disabled: {e}"));
                    None
                }
            });
        Self {
            catalog,
            fetcher,
            destination,
            exclusions,
            log,
            options,
            pool,
            prefetched: HashMap::new(),
            state: VisitState::default(),
        }
    }

    /// Current state, for inspection between roots.
    #[must_use]
    pub const fn state(&self) -> &VisitState {
        &self.state
    }

    /// Resolve every root in order and return the combined outcome.
    #[must_use]
    pub fn resolve(mut self, roots: &[Identifier]) -> Resolution {
        for root in roots {
            self.resolve_root(root);
        }
        self.finish()
    }

    /// Resolve one root. Returns `false` only if `root` itself failed.
    pub fn resolve_root(&mut self, root: &Identifier) -> bool {
        let ok = self.visit(root, None);
        debug_assert!(self.state.in_flight.is_empty());
        ok
    }

    /// Record a malformed identifier string as failed.
    pub fn reject(&mut self, raw: &str, error: IdentifierError) {
        if self.state.rejected.iter().any(|(r, _)| r == raw) {
            return;
        }
        self.log.warn(&format!("skipping malformed identifier: {error}"));
        self.state.outcomes.push(Outcome::Failed {
            id: raw.to_string(),
            reason: error.to_string(),
        });
        self.state.rejected.push((raw.to_string(), error));
    }

    /// Consume the resolver and return what it produced.
    #[must_use]
    pub fn finish(self) -> Resolution {
        Resolution {
            outcomes: self.state.outcomes,
            cycle_breaks: self.state.cycle_breaks,
        }
    }

    fn visit(&mut self, id: &Identifier, parent: Option<&Identifier>) -> bool {
        if self.exclusions.contains(id) {
            if self.state.excluded.insert(id.clone()) {
                self.log.info(&format!("{} excluded", id.qualified_name()));
                self.state
                    .outcomes
                    .push(Outcome::Excluded { id: id.clone() });
            }
            return true;
        }
        if self.state.installed.contains(id) {
            return true;
        }
        if self.state.failed.contains(id) {
            return false;
        }
        if self.state.in_flight.contains(id) {
            if let Some(parent) = parent {
                self.log.debug(&format!(
                    "cycle: {} -> {} already in progress",
                    parent.qualified_name(),
                    id.qualified_name()
                ));
                self.state.cycle_breaks.push(CycleBreak {
                    from: parent.clone(),
                    to: id.clone(),
                });
            }
            return true;
        }

        self.state.in_flight.insert(id.clone());
        let ok = self.install_node(id);
        self.state.in_flight.remove(id);
        ok
    }

    /// Look up, recurse into children, then fetch. `id` is in flight.
    fn install_node(&mut self, id: &Identifier) -> bool {
        let entry = match self.lookup(id) {
            Ok(entry) => entry,
            Err(e) if e.is_transient() => {
                self.fail(id, &format!("lookup failed (transient): {e}"));
                return false;
            }
            Err(e) => {
                self.fail(id, &format!("lookup failed: {e}"));
                return false;
            }
        };
        self.log.debug(&format!(
            "{} resolved to {} ({} dependencies, {} pack members)",
            id.qualified_name(),
            entry.version,
            entry.dependencies.len(),
            entry.bundle_members.len()
        ));

        let children = self.parse_children(&entry);
        self.prefetch(&children);
        for child in &children {
            self.visit(child, Some(id));
        }

        match self.fetcher.fetch_and_unpack(&entry, self.destination) {
            Ok(path) => {
                let line = format!(
                    "{}@{} -> {}",
                    id.qualified_name(),
                    entry.version,
                    path.display()
                );
                if self.options.dry_run {
                    self.log.dry_run(&format!("would install {line}"));
                } else {
                    self.log.info(&format!("installed {line}"));
                }
                self.state.installed.insert(id.clone());
                self.state.outcomes.push(Outcome::Installed {
                    id: id.clone(),
                    version: entry.version,
                    path,
                });
                true
            }
            Err(e) => {
                self.fail(id, &format!("fetch failed: {e}"));
                false
            }
        }
    }

    fn fail(&mut self, id: &Identifier, reason: &str) {
        self.log.error(&format!("{}: {reason}", id.qualified_name()));
        self.state.failed.insert(id.clone());
        self.state.outcomes.push(Outcome::Failed {
            id: id.qualified_name(),
            reason: reason.to_string(),
        });
    }

    fn lookup(&mut self, id: &Identifier) -> Result<CatalogEntry, CatalogError> {
        self.prefetched
            .remove(&prefetch_key(id))
            .unwrap_or_else(|| self.catalog.lookup(id))
    }

    /// Parse the child strings of `entry`, rejecting malformed ones.
    fn parse_children(&mut self, entry: &CatalogEntry) -> Vec<Identifier> {
        let mut children = Vec::new();
        for raw in entry.children() {
            match Identifier::parse(raw) {
                Ok(child) => children.push(child),
                Err(e) => self.reject(raw, e),
            }
        }
        children
    }

    /// Issue lookups for the unseen, non-excluded children concurrently.
    fn prefetch(&mut self, children: &[Identifier]) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let mut keys = HashSet::new();
        let pending: Vec<&Identifier> = children
            .iter()
            .filter(|c| !self.exclusions.contains(c) && !self.state.is_seen(c))
            .filter(|c| !self.prefetched.contains_key(&prefetch_key(c)))
            .filter(|c| keys.insert(c.key().to_string()))
            .collect();
        if pending.len() < 2 {
            return;
        }

        let catalog = self.catalog;
        let results: Vec<(String, Result<CatalogEntry, CatalogError>)> = pool.install(|| {
            pending
                .par_iter()
                .map(|c| (prefetch_key(c), catalog.lookup(c)))
                .collect()
        });
        self.prefetched.extend(results);
    }
}

fn prefetch_key(id: &Identifier) -> String {
    format!("{}@{}", id.key(), id.pinned_version().unwrap_or_default())
}


#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::test_helpers::{FakeCatalog, FakeFetcher};
    use super::*;
    use crate::logging::test_helpers::RecordingLog;

    fn ids(raw: &[&str]) -> Vec<Identifier> {
        raw.iter().map(|r| Identifier::parse(r).unwrap()).collect()
    }

    fn keys(set: &HashSet<Identifier>) -> Vec<String> {
        let mut v: Vec<String> = set.iter().map(|i| i.key().to_string()).collect();
        v.sort();
        v
    }

    fn exclude(patterns: &[&str]) -> ExclusionSet {
        ExclusionSet::from_patterns(patterns).0
    }

    fn run(
        catalog: &FakeCatalog,
        fetcher: &FakeFetcher,
        roots: &[&str],
        excluded: &[&str],
        jobs: usize,
    ) -> (VisitState, Resolution) {
        let log = RecordingLog::default();
        let dest = Path::new("/ext");
        let mut resolver = Resolver::new(
            catalog,
            fetcher,
            dest,
            exclude(excluded),
            &log,
            ResolveOptions {
                jobs,
                dry_run: false,
            },
        );
        for root in ids(roots) {
            resolver.resolve_root(&root);
        }
        let state = std::mem::take(&mut resolver.state);
        let resolution = Resolution {
            outcomes: state.outcomes.clone(),
            cycle_breaks: state.cycle_breaks.clone(),
        };
        (state, resolution)
    }

    #[test]
    fn chain_fetches_leaves_first() {
        let catalog = FakeCatalog::default()
            .with("a.a", "1.0.0", &["b.b"])
            .with("b.b", "1.0.0", &["c.c"])
            .with("c.c", "1.0.0", &[]);
        let fetcher = FakeFetcher::default();
        let (state, _) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(fetcher.fetched(), vec!["c.c", "b.b", "a.a"]);
        assert_eq!(keys(state.installed()), vec!["a.a", "b.b", "c.c"]);
        assert!(state.in_flight().is_empty());
    }

    #[test]
    fn mutual_dependency_terminates_with_both_installed() {
        let catalog = FakeCatalog::default()
            .with("a.a", "1.0.0", &["b.b"])
            .with("b.b", "1.0.0", &["a.a"]);
        let fetcher = FakeFetcher::default();
        let (state, resolution) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(keys(state.installed()), vec!["a.a", "b.b"]);
        assert_eq!(fetcher.fetched(), vec!["b.b", "a.a"]);
        assert_eq!(catalog.lookups(), vec!["a.a", "b.b"]);
        assert_eq!(resolution.cycle_breaks.len(), 1);
        assert_eq!(resolution.cycle_breaks[0].from.key(), "b.b");
        assert_eq!(resolution.cycle_breaks[0].to.key(), "a.a");
    }

    #[test]
    fn self_dependency_is_a_cycle_break() {
        let catalog = FakeCatalog::default().with("a.a", "1.0.0", &["A.A"]);
        let fetcher = FakeFetcher::default();
        let (state, resolution) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(keys(state.installed()), vec!["a.a"]);
        assert_eq!(resolution.cycle_breaks.len(), 1);
    }

    #[test]
    fn excluded_dependency_is_never_looked_up() {
        let catalog = FakeCatalog::default()
            .with("pub.foo", "1.0.0", &["pub.baz", "pub.bar"])
            .with("pub.bar", "1.0.0", &[])
            .with("pub.baz", "1.0.0", &[]);
        let fetcher = FakeFetcher::default();
        let (state, _) = run(&catalog, &fetcher, &["pub.foo", "pub.bar"], &["PUB.BAR"], 1);
        assert!(!catalog.lookups().contains(&"pub.bar".to_string()));
        assert_eq!(keys(state.excluded()), vec!["pub.bar"]);
        assert_eq!(keys(state.installed()), vec!["pub.baz", "pub.foo"]);
        assert!(state.failed().is_empty());
    }

    #[test]
    fn failed_child_does_not_abort_parent() {
        let catalog = FakeCatalog::default()
            .with("a.a", "1.0.0", &["missing.dep", "b.b"])
            .with("b.b", "1.0.0", &[]);
        let fetcher = FakeFetcher::default();
        let (state, _) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(keys(state.installed()), vec!["a.a", "b.b"]);
        assert_eq!(keys(state.failed()), vec!["missing.dep"]);
    }

    #[test]
    fn fetch_failure_marks_only_that_node() {
        let catalog = FakeCatalog::default()
            .with("a.a", "1.0.0", &["b.b"])
            .with("b.b", "1.0.0", &[]);
        let fetcher = FakeFetcher::default().failing("b.b");
        let (state, resolution) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(keys(state.installed()), vec!["a.a"]);
        assert_eq!(keys(state.failed()), vec!["b.b"]);
        assert!(matches!(
            &resolution.outcomes[0],
            Outcome::Failed { id, reason } if id == "b.b" && reason.contains("fetch failed")
        ));
    }

    #[test]
    fn terminal_nodes_short_circuit() {
        let catalog = FakeCatalog::default()
            .with("a.a", "1.0.0", &["c.c"])
            .with("b.b", "1.0.0", &["c.c", "nope.nope"])
            .with("c.c", "1.0.0", &["nope.nope"]);
        let fetcher = FakeFetcher::default();
        let (_, _) = run(&catalog, &fetcher, &["a.a", "b.b", "a.a"], &[], 1);
        assert_eq!(catalog.lookups(), vec!["a.a", "c.c", "nope.nope", "b.b"]);
        assert_eq!(fetcher.fetched(), vec!["c.c", "a.a", "b.b"]);
    }

    #[test]
    fn malformed_child_is_rejected_and_recorded() {
        let catalog = FakeCatalog::default().with("a.a", "1.0.0", &["garbage"]);
        let fetcher = FakeFetcher::default();
        let (state, resolution) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(keys(state.installed()), vec!["a.a"]);
        assert_eq!(state.rejected().len(), 1);
        assert_eq!(catalog.lookups(), vec!["a.a"]);
        assert!(matches!(
            &resolution.outcomes[0],
            Outcome::Failed { id, .. } if id == "garbage"
        ));
    }

    #[test]
    fn dependency_naming_a_path_is_rejected() {
        let catalog = FakeCatalog::default().with("a.a", "1.0.0", &["evil/.x", "b.b/../c"]);
        let fetcher = FakeFetcher::default();
        let (state, resolution) = run(&catalog, &fetcher, &["a.a"], &[], 1);
        assert_eq!(keys(state.installed()), vec!["a.a"]);
        assert_eq!(catalog.lookups(), vec!["a.a"]);
        assert_eq!(fetcher.fetched(), vec!["a.a"]);
        assert!(
            state
                .rejected()
                .iter()
                .all(|(_, e)| matches!(e, IdentifierError::UnsafeCharacters(_)))
        );
        assert!(matches!(
            &resolution.outcomes[1],
            Outcome::Failed { id, .. } if id == "b.b/../c"
        ));
    }

    #[test]
    fn transient_lookup_failure_is_labelled() {
        let catalog = FakeCatalog::default()
            .with("a.a", "1.0.0", &["slow.one", "gone.gone"])
            .unreachable("slow.one");
        let fetcher = FakeFetcher::default();
        let log = RecordingLog::default();
        let resolution = Resolver::new(
            &catalog,
            &fetcher,
            Path::new("/ext"),
            ExclusionSet::default(),
            &log,
            ResolveOptions::default(),
        )
        .resolve(&ids(&["a.a"]));

        assert!(log.contains("error", "slow.one: lookup failed (transient): request to"));
        assert!(log.contains("error", "gone.gone: lookup failed: gone.gone not found"));
        assert!(matches!(
            &resolution.outcomes[0],
            Outcome::Failed { id, reason } if id == "slow.one" && reason.contains("timed out")
        ));
        assert_eq!(resolution.outcomes.len(), 3);
    }

    #[test]
    fn failed_pinned_identifier_is_reported_without_version() {
        let catalog = FakeCatalog::default();
        let fetcher = FakeFetcher::default();
        let (_, resolution) = run(&catalog, &fetcher, &["Pub.Missing@2.0.0"], &[], 1);
        assert!(matches!(
            &resolution.outcomes[0],
            Outcome::Failed { id, reason } if id == "Pub.Missing" && reason.contains("@2.0.0")
        ));
    }

    #[test]
    fn pack_members_follow_dependencies() {
        let catalog = FakeCatalog::default()
            .with_pack("pack.all", "1.0.0", &["d.one"], &["m.one", "m.two"])
            .with("d.one", "1.0.0", &[])
            .with("m.one", "1.0.0", &[])
            .with("m.two", "1.0.0", &[]);
        let fetcher = FakeFetcher::default();
        run(&catalog, &fetcher, &["pack.all"], &[], 1);
        assert_eq!(
            fetcher.fetched(),
            vec!["d.one", "m.one", "m.two", "pack.all"]
        );
    }

    #[test]
    fn dry_run_logs_plan() {
        let catalog = FakeCatalog::default().with("a.a", "1.0.0", &[]);
        let fetcher = FakeFetcher::default();
        let log = RecordingLog::default();
        let resolution = Resolver::new(
            &catalog,
            &fetcher,
            Path::new("/ext"),
            ExclusionSet::default(),
            &log,
            ResolveOptions {
                jobs: 1,
                dry_run: true,
            },
        )
        .resolve(&ids(&["a.a"]));
        assert_eq!(resolution.outcomes.len(), 1);
        assert!(log.contains("dry_run", "would install a.a@1.0.0"));
        assert!(log.at("info").is_empty());
    }

    #[test]
    fn parallel_prefetch_matches_sequential() {
        let build = || {
            FakeCatalog::default()
                .with("root.a", "1.0.0", &["d.one", "d.two", "d.three", "x.excluded"])
                .with("root.b", "1.0.0", &["d.two", "root.a"])
                .with("d.one", "1.0.0", &["d.two"])
                .with("d.two", "1.0.0", &["root.a"])
                .with("d.three", "1.0.0", &["gone.gone"])
                .with("x.excluded", "1.0.0", &[])
        };
        let (seq_catalog, seq_fetcher) = (build(), FakeFetcher::default());
        let (par_catalog, par_fetcher) = (build(), FakeFetcher::default());

        let (seq, seq_res) = run(
            &seq_catalog,
            &seq_fetcher,
            &["root.a", "root.b"],
            &["x.excluded"],
            1,
        );
        let (par, par_res) = run(
            &par_catalog,
            &par_fetcher,
            &["root.a", "root.b"],
            &["x.excluded"],
            4,
        );

        assert_eq!(keys(seq.installed()), keys(par.installed()));
        assert_eq!(keys(seq.failed()), keys(par.failed()));
        assert_eq!(keys(seq.excluded()), keys(par.excluded()));
        assert_eq!(seq_fetcher.fetched(), par_fetcher.fetched());
        assert_eq!(seq_res.outcomes, par_res.outcomes);
        assert!(!par_catalog.lookups().contains(&"x.excluded".to_string()));

        let mut seq_lookups = seq_catalog.lookups();
        let mut par_lookups = par_catalog.lookups();
        seq_lookups.sort();
        par_lookups.sort();
        assert_eq!(seq_lookups, par_lookups);
    }
}
