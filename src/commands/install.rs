//! Command: resolve and install extensions.
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::catalog::MarketplaceCatalog;
use crate::cli::{GlobalOpts, InstallOpts};
use crate::config::{ExtensionList, Settings};
use crate::fetcher::{AssetFetcher, PlanFetcher, VsixFetcher};
use crate::http::{HttpClient, UreqClient};
use crate::installer::{Installer, Report};
use crate::logging::Log;
use crate::packager::{ExtensionsDir, Packager, PortableDataDir};
use crate::resolver::ResolveOptions;

/// Run the install command.
///
/// # Errors
///
/// Returns an error if settings or list files cannot be loaded, the
/// destination cannot be prepared, or any extension failed to install.
pub fn run(global: &GlobalOpts, opts: &InstallOpts, log: &dyn Log) -> Result<()> {
    let settings = load_settings(global, opts)?;
    let http: Arc<dyn HttpClient> = Arc::new(UreqClient::new(
        settings.timeout(),
        &settings.network.user_agent,
    ));

    let report = execute(global, opts, &settings, http, log)?;
    print_report(&report);

    let failed = report.failed_ids();
    if !failed.is_empty() {
        anyhow::bail!(
            "{} extension(s) failed: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

/// Load the settings file and apply command-line overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or a value is invalid.
pub fn load_settings(global: &GlobalOpts, opts: &InstallOpts) -> Result<Settings> {
    let settings = Settings::load(global.config.as_deref())?.with_overrides(opts.overrides());
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

/// Gather wanted and excluded identifiers from arguments and files, in
/// that order.
///
/// # Errors
///
/// Returns an error if a list or exclusion file cannot be read.
pub fn read_inputs(opts: &InstallOpts) -> Result<ExtensionList> {
    let mut list = ExtensionList {
        wanted: opts.ids.clone(),
        excluded: opts.exclude.clone(),
    };
    for path in &opts.lists {
        let from_file = ExtensionList::load(path)
            .with_context(|| format!("reading extension list {}", path.display()))?;
        list.merge(from_file);
    }
    for path in &opts.exclude_files {
        let excluded = ExtensionList::load_exclusions(path)
            .with_context(|| format!("reading exclusion file {}", path.display()))?;
        list.excluded.extend(excluded);
    }
    Ok(list)
}

/// Resolve and install using `http` for every request.
///
/// # Errors
///
/// Returns an error if inputs cannot be read or the destination cannot be
/// prepared. Per-extension failures are reported, not returned.
pub fn execute(
    global: &GlobalOpts,
    opts: &InstallOpts,
    settings: &Settings,
    http: Arc<dyn HttpClient>,
    log: &dyn Log,
) -> Result<Report> {
    let inputs = read_inputs(opts)?;
    if inputs.wanted.is_empty() {
        log.warn("no extensions requested");
    }

    let platform = settings.platform_tag()?;
    match platform {
        Some(tag) => log.debug(&format!("target platform: {tag}")),
        None => log.debug("no platform-specific packages for this host"),
    }

    let catalog = MarketplaceCatalog::new(Arc::clone(&http), settings.endpoints())
        .with_platform(platform)
        .with_probe(settings.install.probe_platform);

    let fetcher: Box<dyn AssetFetcher> = if global.dry_run {
        Box::new(PlanFetcher)
    } else {
        Box::new(
            VsixFetcher::new(http).with_staging_dir(settings.install.staging_dir.clone()),
        )
    };

    let create = !global.dry_run;
    let packager: Box<dyn Packager> = match (&opts.destination.dest, &opts.destination.portable_data)
    {
        (Some(dir), _) => Box::new(ExtensionsDir::new(dir).with_create(create)),
        (None, Some(data)) => Box::new(PortableDataDir::new(data).with_create(create)),
        (None, None) => anyhow::bail!("one of --dest or --portable-data is required"),
    };

    let options = ResolveOptions {
        jobs: settings.install.jobs,
        dry_run: global.dry_run,
    };
    Installer::new(&catalog, fetcher.as_ref(), packager.as_ref(), log, options)
        .run(&inputs.wanted, &inputs.excluded)
}

#[allow(clippy::print_stdout)]
fn print_report(report: &Report) {
    for line in report.lines() {
        println!("{line}");
    }
}
