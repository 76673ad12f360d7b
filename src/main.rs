//! # sectionctl
//!
//! **sectionctl** triggers deployments of Section applications.
//!
//! Features:
//! - `sectionctl deploy` points an environment at an uploaded payload by
//!   committing to the application repository the platform deploys from
//! - `sectionctl config-path` prints where settings are read from
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use sectionctl::{DeployArgs, cmd_deploy, paths};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line interface definition.
///
/// Parsed using `clap` derive macros.
#[derive(Parser, Debug)]
#[command(
    name = "sectionctl",
    version,
    about = "sectionctl - deploy applications to Section",
    arg_required_else_help = true
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Make an uploaded payload live on an environment
    Deploy(DeployArgs),
    /// Print the path of the config file
    ConfigPath,
}

/// `RUST_LOG` wins; otherwise warnings only, or debug for this crate with
/// `--debug`.
fn init_logging(debug: bool) {
    let default = if debug { "warn,sectionctl=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Deploy(args) => cmd_deploy(args),
        Cmd::ConfigPath => {
            println!("{}", paths()?.config.display());
            Ok(())
        }
    }
}

/// CLI entry point.
///
/// Parses arguments with `clap`, sets up logging, and executes the selected
/// subcommand. Errors are printed with their full cause chain.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli.cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
