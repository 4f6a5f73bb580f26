use anyhow::Result;
use clap::Parser;

use extpack_cli::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Install(opts) => {
            logging::init_subscriber(args.verbose, "install");
            let log = logging::Logger::new("install");
            commands::install::run(&args.global, &opts, &log)
        }
        cli::Command::Completions { shell } => {
            commands::completions::run(shell);
            Ok(())
        }
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
