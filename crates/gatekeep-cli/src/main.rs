//! gatekeep - sign in to an account API from the terminal.
//!
//! Each invocation restores the stored session, refreshing it silently
//! when the access token has expired, then runs one account command.

mod commands;
mod prompt;
mod validation;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gatekeep_core::config::StorageKind;
use gatekeep_core::{Config, Navigator, SessionManager};

use commands::Command;

/// Log file prefix inside `GATEKEEP_LOG_DIR`
const LOG_FILE_PREFIX: &str = "gatekeep.log";

#[derive(Debug, Parser)]
#[command(name = "gatekeep", version, about = "Account and session management")]
struct Cli {
    /// Base URL of the account API
    #[arg(long, global = true, env = "GATEKEEP_API_URL")]
    api_url: Option<String>,

    /// Credential storage backend (file, keyring, memory)
    #[arg(long, global = true, env = "GATEKEEP_STORAGE")]
    storage: Option<StorageKind>,

    #[command(subcommand)]
    command: Command,
}

/// Tells the user once per run that their session is gone.
#[derive(Debug, Default)]
struct TerminalNavigator {
    notified: AtomicBool,
}

impl Navigator for TerminalNavigator {
    fn redirect_to_login(&self) {
        if !self.notified.swap(true, Ordering::SeqCst) {
            eprintln!("Your session has expired. Run `gatekeep login` to sign in again.");
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("GATEKEEP_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    config.apply_env()?;

    if let Some(ref url) = cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli)?;
    info!(api_url = %config.api_url, storage = ?config.storage, "gatekeep starting");

    let session = Arc::new(
        SessionManager::new(config.api_client()?, config.credential_store()?)
            .with_navigator(Arc::new(TerminalNavigator::default())),
    );

    commands::run(cli.command, &session, &mut config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login_flags() {
        let cli = Cli::try_parse_from([
            "gatekeep",
            "--storage",
            "memory",
            "login",
            "--email",
            "ada@example.com",
            "--remember-me",
        ])
        .unwrap();
        assert_eq!(cli.storage, Some(StorageKind::Memory));
        match cli.command {
            Command::Login { email, remember_me } => {
                assert_eq!(email.as_deref(), Some("ada@example.com"));
                assert!(remember_me);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_token_argument() {
        let cli = Cli::try_parse_from(["gatekeep", "verify-email", "abc.def"]).unwrap();
        assert!(matches!(cli.command, Command::VerifyEmail { ref token } if token == "abc.def"));
    }

    #[test]
    fn test_unknown_storage_rejected() {
        assert!(Cli::try_parse_from(["gatekeep", "--storage", "floppy", "status"]).is_err());
    }

    #[test]
    fn test_navigator_notifies_once() {
        let navigator = TerminalNavigator::default();
        navigator.redirect_to_login();
        navigator.redirect_to_login();
        assert!(navigator.notified.load(Ordering::SeqCst));
        assert!(!navigator.is_on_login());
    }
}
