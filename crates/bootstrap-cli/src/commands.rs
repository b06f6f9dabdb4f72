//! Command implementations.

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use app_config_and_utils::{Config, Paths};
use parking_lot::Mutex;
use serde::Serialize;
use session_bootstrap::{
    decide, redact_url, ApiClient, BootstrapOrchestrator, BootstrapOutcome, BootstrapSnapshot,
    BootstrapTrigger, NavigationTarget, Navigator, RedirectTarget, SupabaseSessionStore,
    UserProfile,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Navigator that records the chosen target instead of switching screens.
#[derive(Default)]
pub struct PrintNavigator {
    target: Mutex<Option<NavigationTarget>>,
}

impl PrintNavigator {
    pub fn target(&self) -> Option<NavigationTarget> {
        self.target.lock().clone()
    }
}

impl Navigator for PrintNavigator {
    fn navigate(&self, target: &NavigationTarget) {
        info!(target = %target, "Navigating");
        *self.target.lock() = Some(target.clone());
    }
}

#[derive(Serialize)]
struct OpenReport {
    url: String,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<NavigationTarget>,
    status: BootstrapSnapshot,
}

impl fmt::Display for OpenReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::row("url", &self.url))?;
        writeln!(f, "{}", output::row("outcome", &self.outcome))?;
        if let Some(target) = &self.target {
            writeln!(f, "{}", output::row("target", &target.to_string()))?;
            if let NavigationTarget::RetryableErrorView(view) = target {
                writeln!(f, "{}", output::row("message", &view.message))?;
            }
        }
        write!(
            f,
            "{}",
            output::row("state", &format!("{:?}", self.status.state))
        )
    }
}

/// Run one bootstrap for a deep-link URL against the configured backends.
pub async fn open(url: &str, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let config = Config::load(paths).context("Failed to load config")?;
    let supabase_url = config.supabase_url()?;
    let api_url = config.api_url()?;

    let store = Arc::new(SupabaseSessionStore::new(
        supabase_url.as_str(),
        config.supabase_publishable_key.clone(),
    ));
    let api = Arc::new(ApiClient::new(api_url.as_str()));
    let navigator = Arc::new(PrintNavigator::default());
    let orchestrator = BootstrapOrchestrator::new(store, api, navigator.clone());

    let outcome = orchestrator
        .handle(BootstrapTrigger::DeepLink(url.to_string()))
        .await;
    let outcome_label = match &outcome {
        BootstrapOutcome::Navigated(_) => "navigated".to_string(),
        BootstrapOutcome::Ignored(reason) => format!("ignored ({:?})", reason),
        BootstrapOutcome::Discarded => "discarded".to_string(),
    };

    let report = OpenReport {
        url: redact_url(url),
        outcome: outcome_label,
        target: navigator.target(),
        status: orchestrator.status(),
    };
    output::print(&report, format);
    Ok(())
}

#[derive(Serialize)]
struct DecideReport {
    target: RedirectTarget,
    role: &'static str,
}

impl fmt::Display for DecideReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::row("role", self.role))?;
        write!(
            f,
            "{}",
            output::row("target", &NavigationTarget::from(self.target).to_string())
        )
    }
}

/// Evaluate the redirect table for a hand-built profile.
pub fn decide_offline(
    role: Option<String>,
    phone: Option<String>,
    name: Option<String>,
    profile_complete: bool,
    format: &OutputFormat,
) {
    let profile = UserProfile {
        id: "offline".into(),
        email: String::new(),
        name,
        phone,
        role,
        profile_complete,
    };
    let report = DecideReport {
        target: decide(Some(&profile)),
        role: profile.role().as_str(),
    };
    output::print(&report, format);
}

#[derive(Serialize)]
struct RedactReport {
    url: String,
}

impl fmt::Display for RedactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Print the log-safe form of a URL.
pub fn redact(url: &str, format: &OutputFormat) {
    output::print(
        &RedactReport {
            url: redact_url(url),
        },
        format,
    );
}

#[derive(Serialize)]
struct ConfigReport {
    config_file: String,
    #[serde(flatten)]
    config: Config,
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::row("config file", &self.config_file))?;
        writeln!(f, "{}", output::row("log level", &self.config.log_level))?;
        writeln!(f, "{}", output::row("supabase url", &self.config.supabase_url))?;
        write!(f, "{}", output::row("api url", &self.config.api_url))
    }
}

/// Print the effective configuration, optionally persisting it.
pub fn show_config(paths: &Paths, write: bool, format: &OutputFormat) -> Result<()> {
    let config = Config::load(paths).context("Failed to load config")?;
    if write {
        config.save(paths).context("Failed to write config")?;
        info!(path = %paths.config_file().display(), "Config written");
    }
    output::print(
        &ConfigReport {
            config_file: paths.config_file().display().to_string(),
            config,
        },
        format,
    );
    Ok(())
}
