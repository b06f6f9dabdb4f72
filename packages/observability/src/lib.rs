//! Structured logging for the Lastbite bootstrap tooling.
//!
//! Binaries call [`init_with_config`] once and then use plain `tracing`
//! macros. Events land in a JSONL file (`~/.lastbite/logs/dev.jsonl` unless
//! overridden) and optionally on stderr in compact form.
//!
//! Both sinks render through [`SanitizedLayer`], so every message and field
//! passes through [`sanitize`] before it is written. Tokens carried in
//! deep-link fragments or query strings never reach the file or the terminal
//! even when a caller logs the raw value.

#[cfg(feature = "dev")]
mod dev;

mod layer;
pub mod sanitize;

pub use layer::{LineFormat, LogEntry, SanitizedLayer};

use std::path::PathBuf;

/// Rotate the JSONL file once it grows past this many bytes.
pub const DEFAULT_MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every JSONL line as `service`.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_level: String,
    /// JSONL destination. `None` means the default file under `~/.lastbite`.
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
    /// Size at which the file is rotated to `<name>.1` on startup.
    pub max_log_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "lastbite".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
        }
    }
}

/// Where events ended up after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    File(PathBuf),
    Stderr,
    /// A global subscriber was already installed.
    AlreadyInitialized,
}

/// Install the global subscriber. Never panics; a file that cannot be opened
/// degrades to stderr.
pub fn init_with_config(config: LogConfig) -> LogSink {
    #[cfg(feature = "dev")]
    {
        dev::install(&config)
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let installed = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_writer(std::io::stderr)
            .compact()
            .finish()
            .try_init();
        match installed {
            Ok(()) => LogSink::Stderr,
            Err(_) => LogSink::AlreadyInitialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "lastbite");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
        assert_eq!(config.max_log_bytes, DEFAULT_MAX_LOG_BYTES);
    }
}
