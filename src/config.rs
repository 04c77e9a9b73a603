use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Immutable run configuration, built once at startup and passed by
/// reference to every component.
///
/// Defaults match the storefront's tolerated pacing; any field can be
/// overridden through a `STEAM_`-prefixed environment variable, e.g.
/// `STEAM_REQUEST_INTERVAL_SECS=1.5` or `STEAM_OUTPUT_FILE=out.csv`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Static Web API key, sent with the app-list request when set.
    pub api_key: Option<String>,
    pub app_list_url: String,
    pub app_details_url: String,
    /// Minimum delay between consecutive storefront requests, in seconds.
    pub request_interval_secs: f64,
    /// Wait before retrying a rate-limited or timed-out request, in seconds.
    pub retry_delay_secs: f64,
    pub request_timeout_secs: f64,
    pub app_list_timeout_secs: f64,
    pub output_file: PathBuf,
    pub checkpoint_file: PathBuf,
    pub backup_dir: PathBuf,
    /// Crawl mode: processed candidates between checkpoint writes.
    pub save_interval: usize,
    /// From-list mode: appended rows between table flushes.
    pub list_save_interval: usize,
    /// Processed candidates between progress log lines.
    pub print_interval: usize,
    /// Language for localized text fields.
    pub language: String,
    /// Country context used for the canonical metadata fetch.
    pub canonical_region: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            app_list_url: "https://api.steampowered.com/ISteamApps/GetAppList/v2/".into(),
            app_details_url: "https://store.steampowered.com/api/appdetails/".into(),
            request_interval_secs: 0.75,
            retry_delay_secs: 50.0,
            request_timeout_secs: 15.0,
            app_list_timeout_secs: 30.0,
            output_file: PathBuf::from("steam_vr_data.csv"),
            checkpoint_file: PathBuf::from("last_app_id.txt"),
            backup_dir: PathBuf::from("vr_progress_backups"),
            save_interval: 500,
            list_save_interval: 5,
            print_interval: 50,
            language: "english".into(),
            canonical_region: "us".into(),
        }
    }
}

impl Config {
    /// Layer `STEAM_*` environment variables over the built-in defaults.
    pub fn load() -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::Environment::with_prefix("STEAM"))
            .build()
            .context("reading configuration from the environment")?;
        layered
            .try_deserialize()
            .context("invalid STEAM_* configuration value")
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs_f64(self.request_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    pub fn app_list_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.app_list_timeout_secs)
    }
}

// ── Tests ──
