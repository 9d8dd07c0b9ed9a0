//! psfetch - install the latest Gerrit patchset of a storage driver
//!
//! DevStack plugin entry point and standalone CLI around `psfetch-core`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// psfetch - install the latest Gerrit patchset of a storage driver
#[derive(Parser, Debug)]
#[command(name = "psfetch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the plugin configuration file
    #[arg(short, long, default_value = "psfetch.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the latest patchset ref of the configured change
    Resolve(commands::resolve::ResolveArgs),

    /// Fetch the latest patchset and install the driver
    Install(commands::install::InstallArgs),

    /// DevStack hook: installs only on `stack install`
    Devstack(commands::devstack::DevstackArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(&cli.config, &args),
        Commands::Install(args) => commands::install::run(&cli.config, &args),
        Commands::Devstack(args) => commands::devstack::run(&cli.config, &args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_with_overrides() {
        let cli = Cli::try_parse_from([
            "psfetch",
            "--config",
            "/etc/psfetch.toml",
            "install",
            "--change",
            "617503",
            "--remote",
            "https://review.example.org/cinder",
            "--allow-missing",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/psfetch.toml"));
        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert!(args.allow_missing);
        assert_eq!(args.overrides.change.map(|c| c.get()), Some(617_503));
        assert_eq!(
            args.overrides.remote.as_deref(),
            Some("https://review.example.org/cinder")
        );
    }

    #[test]
    fn test_parse_devstack_positionals() {
        let cli = Cli::try_parse_from(["psfetch", "devstack", "stack", "install"]).unwrap();
        let Commands::Devstack(args) = cli.command else {
            panic!("expected devstack");
        };
        assert_eq!(args.mode, "stack");
        assert_eq!(args.phase.as_deref(), Some("install"));
    }

    #[test]
    fn test_parse_devstack_mode_only() {
        let cli = Cli::try_parse_from(["psfetch", "devstack", "source"]).unwrap();
        let Commands::Devstack(args) = cli.command else {
            panic!("expected devstack");
        };
        assert_eq!(args.mode, "source");
        assert_eq!(args.phase, None);
    }

    #[test]
    fn test_rejects_non_numeric_change() {
        assert!(Cli::try_parse_from(["psfetch", "resolve", "--change", "latest"]).is_err());
    }
}
