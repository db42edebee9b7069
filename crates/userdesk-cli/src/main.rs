//! userdesk - command-line front end for the user-management API.
//!
//! Log in, inspect your profile, and (for admins) list, edit and delete
//! users. The session is renewed transparently when the access token
//! expires; when renewal fails you are asked to log in again.

mod commands;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Commands, Session};
use userdesk_core::Config;

/// Log file name in the cache directory
const LOG_FILE: &str = "userdesk.log";

#[derive(Parser)]
#[command(name = "userdesk")]
#[command(about = "Manage accounts on the user-management API")]
#[command(version)]
struct Cli {
    /// API base URL (overrides config and USERDESK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(config: &Config, no_file_log: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = if no_file_log {
        None
    } else {
        config.cache_dir().ok().and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            Some(tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE)))
        })
    };

    match file {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    let _log_guard = init_tracing(&config, cli.no_file_log);
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }
    info!(base_url = %config.base_url, "userdesk starting");

    let mut session = Session::open(config, cli.json)?;
    let result = cli.command.execute(&mut session).await;
    session.report_redirects();

    if let Err(ref e) = result {
        debug!(error = ?e, "Command failed");
    }
    result
}
