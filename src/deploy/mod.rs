mod orchestrator;
mod request;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::ProgressBar;
use std::time::Duration;

use crate::aperture::ApertureClient;
use crate::config::load_settings;
use crate::git::configure_transport_timeouts;
use crate::progress::{OutputMode, err_style, ok_style, spinner_style};

pub use orchestrator::{COMMIT_IDENTITY, Orchestrator, commit_message};
pub use request::{DeployTrigger, repository_url};

/// Arguments of `sectionctl deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Identifier of the uploaded payload to make live
    #[arg(long)]
    pub payload_id: String,
    /// Account the application belongs to (defaults to `account_id` in config)
    #[arg(short = 'a', long)]
    pub account_id: Option<u64>,
    /// Application to deploy (defaults to `application_id` in config)
    #[arg(short = 'i', long)]
    pub app_id: Option<u64>,
    /// Directory of the application inside its repository
    #[arg(long, default_value = "nodejs")]
    pub app_path: String,
    /// Environment (branch) to deploy to
    #[arg(short = 'e', long, default_value = "production")]
    pub environment: String,
    /// Suppress progress output; remote messages are still shown on failure
    #[arg(short, long)]
    pub quiet: bool,
    /// Give up after this many seconds (0 waits forever)
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Trigger a deployment of an already uploaded payload.
///
/// Flow:
/// 1. Load settings (config file, `SECTION_TOKEN`, then flags).
/// 2. Configure libgit2 socket timeouts from the deadline.
/// 3. Look up the application and run the [`Orchestrator`] with a spinner,
///    or silently in quiet mode.
pub fn cmd_deploy(args: DeployArgs) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(secs) = args.timeout {
        settings.timeout_secs = secs;
    }
    if let Some(timeout) = settings.timeout() {
        configure_transport_timeouts(timeout).context("failed to configure git timeouts")?;
    }

    let account_id = args
        .account_id
        .or(settings.account_id)
        .context("no account id: pass --account-id or set account_id in the config file")?;
    let app_id = args
        .app_id
        .or(settings.application_id)
        .context("no application id: pass --app-id or set application_id in the config file")?;
    let credential = settings.credential()?;

    let req = DeployTrigger {
        account_id,
        app_id,
        app_path: args.app_path,
        environment: args.environment,
        payload_id: args.payload_id,
    };

    let pb = (!args.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    });
    let output = match &pb {
        Some(pb) => OutputMode::Live(pb.clone()),
        None => OutputMode::Quiet,
    };

    let client = ApertureClient::new(&settings.api_url, credential.clone())?;
    let res = Orchestrator::new(client, &settings, credential, output).trigger(&req);

    if let Some(pb) = pb {
        match &res {
            Ok(()) => {
                pb.set_style(ok_style());
                pb.finish_with_message(format!(
                    "deployed {} to {} (app {})",
                    req.payload_id, req.environment, req.app_id
                ));
            }
            Err(_) => {
                pb.set_style(err_style());
                pb.finish_with_message(format!("deploying to {} failed", req.environment));
            }
        }
    }

    res.with_context(|| {
        format!(
            "failed to deploy payload {} to {}",
            req.payload_id, req.environment
        )
    })
}
