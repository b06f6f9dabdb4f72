//! Lastbite bootstrap CLI - exercise the session bootstrap outside the app.

mod commands;
mod output;

use app_config_and_utils::{init_logging_for_service, Config, Paths, DEFAULT_LOG_LEVEL};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Lastbite bootstrap CLI - run deep-link sign-in and inspect routing.
#[derive(Parser)]
#[command(name = "lastbite-bootstrap")]
#[command(about = "Run the Lastbite session bootstrap from a terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the
    /// configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs (defaults to ~/.lastbite)
    #[arg(long, global = true, env = "LASTBITE_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle an OAuth callback deep link and print where it routes
    Open {
        /// Deep-link URL, e.g. lastbite://auth/callback#access_token=..&refresh_token=..
        url: String,
    },

    /// Evaluate the redirect decision for a profile without any network calls
    Decide {
        /// Role as returned by the API (customer, store_owner, ...)
        #[arg(long)]
        role: Option<String>,
        /// Phone number on the profile
        #[arg(long)]
        phone: Option<String>,
        /// Display name on the profile
        #[arg(long)]
        name: Option<String>,
        /// Mark the profile as complete
        #[arg(long)]
        profile_complete: bool,
    },

    /// Print the log-safe form of a URL
    Redact {
        url: String,
    },

    /// Show the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let paths = match Paths::resolve(cli.base_dir.clone()) {
        Ok(paths) => paths,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };

    let log_level = resolve_log_level(cli.log_level.clone(), &paths);
    init_logging_for_service("bootstrap-cli", &log_level, Some(&paths));
    debug!(base_dir = %paths.base_dir().display(), "Resolved paths");

    let result = match cli.command {
        Commands::Open { url } => commands::open(&url, &paths, &cli.format).await,
        Commands::Decide {
            role,
            phone,
            name,
            profile_complete,
        } => {
            commands::decide_offline(role, phone, name, profile_complete, &cli.format);
            Ok(())
        }
        Commands::Redact { url } => {
            commands::redact(&url, &cli.format);
            Ok(())
        }
        Commands::Config { write } => commands::show_config(&paths, write, &cli.format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}

/// `--log-level` wins, then the configured level. A config that fails to
/// load is reported by the command that needs it.
fn resolve_log_level(flag: Option<String>, paths: &Paths) -> String {
    match flag {
        Some(level) => level,
        None => Config::load(paths)
            .map(|config| config.log_level)
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
    }
}
