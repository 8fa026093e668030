//! Command-line front end for the autohomework client core.
//!
//! Talks to the local backend over REST only; a host shell embedding the
//! library installs its own bridge instead.

use anyhow::Context;
use autohomework::config::ClientConfig;
use autohomework::diagnostics::init_logging;
use autohomework::scheduler::fetch_status;
use autohomework::update::{ApplyOutcome, UpdateStatus};
use autohomework::{Client, FlowOutcome, LogUi};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Preview and send homework slide decks through the local backend.
#[derive(Parser)]
#[command(name = "autohomework", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the REST base address. An empty value disables REST.
    #[arg(long)]
    rest_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show transport readiness and scheduler state.
    Status,
    /// Print the backend settings as JSON.
    Config,
    /// Preview the saved (or a newly selected) slide deck.
    Preview,
    /// Preview, then send the homework.
    Send,
    /// Check for a newer release.
    CheckUpdate {
        /// Bypass the backend's release cache.
        #[arg(long)]
        force: bool,
    },
    /// Download and install the latest release. Ctrl-C cancels.
    Update,
    /// Show whether the UI starts at login.
    Autostart,
    /// Minimize the host window.
    Minimize,
    /// Hide the host window to the tray.
    Hide,
    /// Ask the host application to exit.
    Exit,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(ClientConfig::default_config_path);
    let mut config = ClientConfig::load_or_default(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    if let Some(base) = cli.rest_base {
        config.rest.base_url = base;
    }

    let _log_guard = init_logging(&config.logging).context("initialising logging")?;
    tracing::debug!(config = %path.display(), "configuration loaded");

    let client = Client::new(config, Arc::new(LogUi))?;
    let ok = match cli.command {
        Command::Status => status(&client).await,
        Command::Config => show_config(&client).await?,
        Command::Preview => preview(&client).await.is_some(),
        Command::Send => send(&client).await,
        Command::CheckUpdate { force } => client.check_update(force).await.is_ok(),
        Command::Update => update(&client).await,
        Command::Autostart => match client.session().autostart_status().await {
            Ok(status) => {
                println!("{}", status.label());
                true
            }
            Err(result) => report(result.error.as_deref()),
        },
        Command::Minimize => report(client.minimize_window().await.error.as_deref()),
        Command::Hide => report(client.close_window().await.error.as_deref()),
        Command::Exit => report(client.exit().await.error.as_deref()),
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn report(error: Option<&str>) -> bool {
    match error {
        Some(message) => {
            eprintln!("error: {message}");
            false
        }
        None => true,
    }
}

async fn status(client: &Client) -> bool {
    let ready = client.wait_ready().await;
    let state = client.resolver().resolve();
    println!(
        "REST: {}",
        state.rest_base.as_deref().unwrap_or("not configured")
    );
    println!("bridge: {}", if state.bridge_available { "installed" } else { "absent" });
    if !ready {
        eprintln!("error: no transport ready");
        return false;
    }

    let ping = client.ping().await;
    println!("backend: {}", if ping.success { "reachable" } else { "unreachable" });
    match fetch_status(client.dispatcher()).await {
        Ok(status) => {
            println!("{}", status.summary());
            true
        }
        Err(result) => report(result.error.as_deref()),
    }
}

async fn show_config(client: &Client) -> anyhow::Result<bool> {
    match client.session().load_settings().await {
        Ok(settings) => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(true)
        }
        Err(result) => Ok(report(result.error.as_deref())),
    }
}

async fn preview(client: &Client) -> Option<autohomework::Preview> {
    match client.session().select_and_preview().await {
        FlowOutcome::Previewed(preview) => {
            println!("== {} ==", preview.file_name);
            println!("{}", preview.content);
            Some(preview)
        }
        FlowOutcome::NoSelection => {
            eprintln!("no file selected");
            None
        }
        FlowOutcome::NotReady => {
            eprintln!("error: backend not ready");
            None
        }
        FlowOutcome::Failed(message) => {
            eprintln!("error: {message}");
            None
        }
        FlowOutcome::Skipped => None,
    }
}

async fn send(client: &Client) -> bool {
    if preview(client).await.is_none() {
        return false;
    }
    let result = client.session().confirm_send().await;
    if result.success {
        println!("sent");
    }
    report(result.error.as_deref())
}

async fn update(client: &Client) -> bool {
    match client.check_update(true).await {
        Ok(UpdateStatus::Available { latest, .. }) => println!("installing {latest}"),
        Ok(UpdateStatus::UpToDate { current }) => {
            println!("already up to date ({current})");
            return true;
        }
        Err(_) => return false,
    }

    let outcome = tokio::select! {
        outcome = client.apply_update() => outcome,
        _ = tokio::signal::ctrl_c() => {
            client.cancel_update().await;
            ApplyOutcome::Cancelled
        }
    };
    match outcome {
        ApplyOutcome::Accepted { last } => {
            println!("update accepted ({}%)", last.percent);
            true
        }
        ApplyOutcome::Cancelled => {
            println!("update cancelled");
            false
        }
        ApplyOutcome::Failed(result) => report(result.error.as_deref()),
    }
}
