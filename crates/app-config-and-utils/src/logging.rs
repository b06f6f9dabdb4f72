//! Logging initialization on top of the observability crate.
//!
//! Log file precedence: `LASTBITE_LOG_FILE`, then the `Paths` log file, then
//! the observability default (`~/.lastbite/logs/dev.jsonl`).

use crate::Paths;
use observability::LogConfig;
use std::path::PathBuf;
use tracing::Level;

const ENV_LOG_FILE: &str = "LASTBITE_LOG_FILE";

/// Initialize logging for `service_name`. `RUST_LOG` overrides `level`.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: Option<&Paths>) {
    let env_file = std::env::var(ENV_LOG_FILE).ok();

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: normalize_level(level).into(),
        log_path: log_path(env_file.as_deref(), paths),
        also_stderr: true,
        ..Default::default()
    });
}

fn log_path(env_file: Option<&str>, paths: Option<&Paths>) -> Option<PathBuf> {
    env_file
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| paths.map(Paths::log_file))
}

fn normalize_level(level: &str) -> &'static str {
    parse_level(level).as_str()
}

/// Parse a level name. Unknown names fall back to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
