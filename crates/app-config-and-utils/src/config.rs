//! Client configuration: built-in endpoints, `~/.lastbite/config.json`, and
//! a couple of runtime environment overrides.
//!
//! Resolution order for [`Config::load`]: defaults, then the file (log level
//! and API URL only), then `LASTBITE_LOG_LEVEL` / `LASTBITE_API_URL`. The auth
//! backend endpoint and key are fixed at build time.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

macro_rules! build_default {
    ($var:tt, $fallback:tt) => {
        match option_env!($var) {
            Some(value) => value,
            None => $fallback,
        }
    };
}

/// Auth backend base URL, overridable when building via `SUPABASE_URL`.
pub const DEFAULT_SUPABASE_URL: &str =
    build_default!("SUPABASE_URL", "https://lastbite.supabase.co");

/// Public anon key sent as `apikey`, overridable via `SUPABASE_PUBLISHABLE_KEY`.
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str =
    build_default!("SUPABASE_PUBLISHABLE_KEY", "public-anon-key");

/// Marketplace REST API. `LASTBITE_API_URL` at build time or at runtime.
pub const DEFAULT_API_URL: &str =
    build_default!("LASTBITE_API_URL", "https://api.lastbite.app");

pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "LASTBITE_LOG_LEVEL";
const ENV_API_URL: &str = "LASTBITE_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// trace, debug, info, warn or error.
    pub log_level: String,
    pub supabase_url: String,
    /// Public key, safe to print.
    pub supabase_publishable_key: String,
    pub api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.into(),
            supabase_url: DEFAULT_SUPABASE_URL.into(),
            supabase_publishable_key: DEFAULT_SUPABASE_PUBLISHABLE_KEY.into(),
            api_url: DEFAULT_API_URL.into(),
        }
    }
}

impl Config {
    /// Resolve the effective configuration for `paths` and validate it.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let file = paths.config_file();
        let stored = match file.exists() {
            true => Some(Self::load_from_file(&file)?),
            false => None,
        };

        let mut config = Self::default();
        if let Some(stored) = stored {
            config.log_level = stored.log_level;
            config.api_url = stored.api_url;
        }
        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CoreError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let path = paths.config_file();
        let content = serde_json::to_string_pretty(self).map_err(|source| {
            CoreError::ParseConfig {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, content).map_err(|source| CoreError::WriteConfig { path, source })
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply runtime overrides from a variable lookup.
    ///
    /// Only `LASTBITE_LOG_LEVEL` and `LASTBITE_API_URL` are honored. Blank
    /// values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(log_level) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        if let Some(api_url) = non_empty(ENV_API_URL) {
            self.api_url = api_url.trim_end_matches('/').to_string();
        }
    }

    /// Check that both endpoints parse as URLs.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        self.api_url()?;
        if self.supabase_publishable_key.trim().is_empty() {
            return Err(CoreError::Invalid(
                "supabase_publishable_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(|source| CoreError::InvalidUrl {
            field: "supabase_url",
            source,
        })
    }

    /// Get the REST API URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(|source| CoreError::InvalidUrl {
            field: "api_url",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.api_url = "https://staging-api.lastbite.app".to_string();
        config.supabase_url = "https://ignored.supabase.co".to_string();

        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.api_url, "https://staging-api.lastbite.app");
    }

    #[test]
    fn test_load_keeps_file_api_url_but_not_auth_backend() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.supabase_url = "https://ignored.supabase.co".to_string();
        config.supabase_publishable_key = "ignored-key".to_string();
        config.api_url = "https://staging-api.lastbite.app".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(loaded.supabase_publishable_key, DEFAULT_SUPABASE_PUBLISHABLE_KEY);
        if std::env::var(ENV_API_URL).is_err() {
            assert_eq!(loaded.api_url, "https://staging-api.lastbite.app");
        }
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_overrides_apply_and_trim() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LASTBITE_LOG_LEVEL", "debug"),
            ("LASTBITE_API_URL", "http://localhost:4000/"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_url, "http://localhost:4000");
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("   ".to_string()));

        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_config_invalid_api_url() {
        let mut config = Config::default();
        config.api_url = "not a valid url".to_string();

        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidUrl { field: "api_url", .. })
        ));
    }

    #[test]
    fn test_malformed_config_file_names_path() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(paths.config_file(), "{ not json").unwrap();

        let err = Config::load(&paths).unwrap_err();
        assert!(matches!(err, CoreError::ParseConfig { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_config_empty_key_rejected() {
        let mut config = Config::default();
        config.supabase_publishable_key = " ".to_string();

        assert!(matches!(config.validate(), Err(CoreError::Invalid(_))));
    }
}
