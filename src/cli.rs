use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::SettingsOverrides;

/// Top-level CLI entry point for the extension installer.
#[derive(Parser, Debug)]
#[command(
    name = "extpack",
    about = "Resolve and install editor extensions from the marketplace",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Settings file (TOML); defaults apply when omitted
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Resolve and report without downloading or writing anything
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install extensions and their dependencies
    Install(InstallOpts),
    /// Print a shell completion script
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
    /// Print version information
    Version,
}

/// Options for the `install` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InstallOpts {
    /// Extension identifiers (`publisher.name` or `publisher.name@version`)
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// Read identifiers from a list file (repeatable)
    #[arg(short = 'f', long = "list", value_name = "FILE")]
    pub lists: Vec<PathBuf>,

    /// Read exclusions from a file (repeatable)
    #[arg(short = 'x', long = "exclude-file", value_name = "FILE")]
    pub exclude_files: Vec<PathBuf>,

    /// Identifiers never to install
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    pub exclude: Vec<String>,

    #[command(flatten)]
    pub destination: DestinationOpts,

    /// Prefer packages for this platform (darwin-arm64, darwin-x64, linux-arm64, linux-x64)
    #[arg(long, value_name = "TAG")]
    pub platform: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Always use universal packages
    #[arg(long)]
    pub no_platform_probe: bool,

    /// Concurrent catalog lookups
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

impl InstallOpts {
    /// Settings overrides carried by these flags.
    #[must_use]
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            timeout_secs: self.timeout,
            platform: self.platform.clone(),
            probe_platform: self.no_platform_probe.then_some(false),
            jobs: self.jobs,
        }
    }
}

/// Where to install; exactly one is required.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct DestinationOpts {
    /// Install into this extensions directory
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Install into `DIR/extensions` of a portable-mode data directory
    #[arg(long, value_name = "DIR")]
    pub portable_data: Option<PathBuf>,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn install_opts(args: &[&str]) -> InstallOpts {
        let cli = Cli::parse_from(args);
        match cli.command {
            Command::Install(opts) => opts,
            other => panic!("expected install, got {other:?}"),
        }
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_install_ids_and_dest() {
        let opts = install_opts(&["extpack", "install", "pub.foo", "pub.bar@1.0.0", "--dest", "/x"]);
        assert_eq!(opts.ids, vec!["pub.foo", "pub.bar@1.0.0"]);
        assert_eq!(opts.destination.dest, Some(PathBuf::from("/x")));
        assert_eq!(opts.destination.portable_data, None);
    }

    #[test]
    fn parse_portable_data() {
        let opts = install_opts(&["extpack", "install", "--portable-data", "/data"]);
        assert_eq!(opts.destination.portable_data, Some(PathBuf::from("/data")));
    }

    #[test]
    fn destination_is_required() {
        assert!(Cli::try_parse_from(["extpack", "install", "pub.foo"]).is_err());
    }

    #[test]
    fn destinations_are_exclusive() {
        assert!(
            Cli::try_parse_from([
                "extpack",
                "install",
                "--dest",
                "/a",
                "--portable-data",
                "/b"
            ])
            .is_err()
        );
    }

    #[test]
    fn parse_lists_and_exclusions() {
        let opts = install_opts(&[
            "extpack",
            "install",
            "-f",
            "a.txt",
            "--list",
            "b.txt",
            "-x",
            "skip.txt",
            "--exclude",
            "pub.bar,pub.baz",
            "--dest",
            "/x",
        ]);
        assert_eq!(
            opts.lists,
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
        );
        assert_eq!(opts.exclude_files, vec![PathBuf::from("skip.txt")]);
        assert_eq!(opts.exclude, vec!["pub.bar", "pub.baz"]);
    }

    #[test]
    fn overrides_from_flags() {
        let opts = install_opts(&[
            "extpack",
            "install",
            "--dest",
            "/x",
            "--platform",
            "darwin-arm64",
            "--timeout",
            "10",
            "--no-platform-probe",
            "--jobs",
            "4",
        ]);
        let overrides = opts.overrides();
        assert_eq!(overrides.platform.as_deref(), Some("darwin-arm64"));
        assert_eq!(overrides.timeout_secs, Some(10));
        assert_eq!(overrides.probe_platform, Some(false));
        assert_eq!(overrides.jobs, Some(4));
    }

    #[test]
    fn no_flags_means_no_overrides() {
        let opts = install_opts(&["extpack", "install", "--dest", "/x"]);
        assert_eq!(opts.overrides(), SettingsOverrides::default());
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "extpack",
            "-v",
            "--config",
            "extpack.toml",
            "install",
            "-d",
            "--dest",
            "/x",
        ]);
        assert!(cli.verbose);
        assert!(cli.global.dry_run);
        assert_eq!(cli.global.config, Some(PathBuf::from("extpack.toml")));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["extpack", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["extpack", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Command::Completions {
                shell: clap_complete::Shell::Bash
            }
        ));
    }
}
