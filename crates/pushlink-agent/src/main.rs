//! # pushlink-agent
//!
//! Holds one long connection to the event gateway and logs every event it
//! receives. Exits 0 on Ctrl-C and 1 when the settings are unusable or the
//! server's reconnect budget runs out.

#![deny(unsafe_code)]

mod dispatcher;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pushlink_client::{Supervisor, SupervisorExit};
use pushlink_settings::PushlinkSettings;

use crate::dispatcher::{LoggingDispatcher, log_inbound};

/// Pushlink long-connection agent.
#[derive(Parser, Debug)]
#[command(name = "pushlink-agent", about = "Long-connection event gateway client")]
struct Cli {
    /// Settings file (default `~/.pushlink/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Application id (overrides settings).
    #[arg(long)]
    app_id: Option<String>,

    /// Open platform base URL (overrides settings).
    #[arg(long)]
    domain: Option<String>,

    /// Log filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log payload parse failures.
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(pushlink_settings::settings_path)
    }

    /// Load settings and layer the command-line flags on top.
    fn load_settings(&self) -> Result<PushlinkSettings> {
        let path = self.settings_path();
        let mut settings = pushlink_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut PushlinkSettings) {
        if let Some(app_id) = &self.app_id {
            settings.account.app_id.clone_from(app_id);
        }
        if let Some(domain) = &self.domain {
            settings.account.domain = domain.trim_end_matches('/').to_string();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.verbose {
            settings.connection.verbose = true;
        }
    }
}

fn spawn_signal_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("shutting down");
        cancel.cancel();
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    let settings = args.load_settings()?;
    pushlink_logging::init_subscriber(&settings.logging.level, settings.logging.format);
    settings.validate().context("Invalid settings")?;

    let supervisor = Supervisor::from_settings(&settings, Arc::new(LoggingDispatcher))
        .context("Failed to build endpoint client")?
        .with_status_sink(Arc::new(log_inbound));

    let cancel = CancellationToken::new();
    let signal = spawn_signal_handler(cancel.clone());

    tracing::info!(
        app_id = %settings.account.app_id,
        domain = %settings.account.domain,
        "starting long connection"
    );
    let exit = supervisor.run(&cancel).await;
    signal.abort();

    match exit {
        SupervisorExit::Cancelled => {
            tracing::info!("stopped");
            Ok(ExitCode::SUCCESS)
        }
        SupervisorExit::BudgetExhausted { attempts } => {
            tracing::error!(attempts, "connection abandoned; restart required");
            Ok(ExitCode::FAILURE)
        }
    }
}
