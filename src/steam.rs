use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::shutdown::{Cancelled, Shutdown};

/// One entry of the enumeration universe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppEntry {
    pub appid: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct AppListResponse {
    applist: AppList,
}

#[derive(Debug, Deserialize)]
struct AppList {
    apps: Vec<AppEntry>,
}

/// Wrapper around one appdetails entry: `{"<appid>": {"success": .., "data": ..}}`.
/// A response that parses but reports `success: false` carries no data.
#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    success: bool,
    data: Option<AppDetails>,
}

/// Raw detail record for one app in one country context. Ephemeral; only
/// the extracted fields ever reach the output table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppDetails {
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Descriptor>,
    #[serde(default)]
    pub genres: Vec<Descriptor>,
    pub platforms: Option<Platforms>,
    pub release_date: Option<ReleaseDate>,
    pub metacritic: Option<Metacritic>,
    pub recommendations: Option<Recommendations>,
    pub achievements: Option<Achievements>,
    pub price_overview: Option<PriceOverview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Platforms {
    #[serde(default)]
    pub windows: bool,
    #[serde(default)]
    pub mac: bool,
    #[serde(default)]
    pub linux: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseDate {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Metacritic {
    pub score: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Recommendations {
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Achievements {
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PriceOverview {
    pub final_formatted: Option<String>,
    pub initial_formatted: Option<String>,
    pub discount_percent: Option<i64>,
}

/// Detail-fetch seam between the driver and the storefront.
#[async_trait]
pub trait DetailSource {
    /// Fetch details for one app in one country context. `None` means the
    /// storefront has no data for this app/context; transient failures are
    /// retried internally and never surface here.
    async fn app_details(&self, appid: u32, country: &str)
        -> Result<Option<AppDetails>, Cancelled>;
}

/// Outcome of a single request attempt.
enum Attempt {
    Hit(AppDetails),
    Absent,
    /// Rate-limited or timed out; the same request must be reissued.
    Retry(&'static str),
}

/// Storefront HTTP client. One in-flight request at a time; the caller
/// owes the configured pacing delay before every call.
pub struct SteamClient {
    http: reqwest::Client,
    app_list_url: String,
    app_details_url: String,
    api_key: Option<String>,
    language: String,
    retry_delay: Duration,
    app_list_timeout: Duration,
    shutdown: Shutdown,
}

impl SteamClient {
    pub fn new(cfg: &Config, shutdown: Shutdown) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .context("building the http client")?;
        Ok(Self {
            http,
            app_list_url: cfg.app_list_url.clone(),
            app_details_url: cfg.app_details_url.clone(),
            api_key: cfg.api_key.clone(),
            language: cfg.language.clone(),
            retry_delay: cfg.retry_delay(),
            app_list_timeout: cfg.app_list_timeout(),
            shutdown,
        })
    }

    /// Fetch the complete ordered app universe. Failure here is fatal to
    /// the run; there is nothing meaningful to collect without it.
    pub async fn app_list(&self) -> Result<Vec<AppEntry>> {
        info!(url = %self.app_list_url, "fetching the full app list");
        let mut req = self
            .http
            .get(&self.app_list_url)
            .timeout(self.app_list_timeout);
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }
        let resp = req
            .send()
            .await
            .context("requesting the app list")?
            .error_for_status()
            .context("app list request rejected")?;
        let body: AppListResponse = resp.json().await.context("decoding the app list")?;
        info!(apps = body.applist.apps.len(), "app list fetched");
        Ok(body.applist.apps)
    }

    async fn details_once(&self, appid: u32, country: &str) -> Attempt {
        let appid_s = appid.to_string();
        let req = self.http.get(&self.app_details_url).query(&[
            ("appids", appid_s.as_str()),
            ("l", self.language.as_str()),
            ("cc", country),
        ]);

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Attempt::Retry("timeout"),
            Err(e) => {
                warn!(appid, country, error = %e, "detail request failed");
                return Attempt::Absent;
            }
        };

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry("429");
        }
        if !resp.status().is_success() {
            warn!(appid, country, status = %resp.status(), "detail request rejected");
            return Attempt::Absent;
        }

        let mut body: HashMap<String, DetailEnvelope> = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(appid, country, error = %e, "undecodable detail response");
                return Attempt::Absent;
            }
        };

        match body.remove(&appid_s) {
            Some(envelope) if envelope.success => match envelope.data {
                Some(details) => Attempt::Hit(details),
                None => Attempt::Absent,
            },
            Some(_) => Attempt::Absent,
            None => {
                warn!(appid, country, "detail response missing the app entry");
                Attempt::Absent
            }
        }
    }
}

#[async_trait]
impl DetailSource for SteamClient {
    async fn app_details(
        &self,
        appid: u32,
        country: &str,
    ) -> Result<Option<AppDetails>, Cancelled> {
        retry_until_terminal(&self.shutdown, self.retry_delay, || {
            self.details_once(appid, country)
        })
        .await
    }
}

/// Drive `attempt` until it yields a terminal outcome, waiting out every
/// transient failure. Intentionally unbounded: the dataset must converge
/// to complete, so a rate-limited request is reissued until it goes
/// through or the run is cancelled mid-wait.
async fn retry_until_terminal<F, Fut>(
    shutdown: &Shutdown,
    delay: Duration,
    mut attempt: F,
) -> Result<Option<AppDetails>, Cancelled>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    loop {
        match attempt().await {
            Attempt::Hit(details) => return Ok(Some(details)),
            Attempt::Absent => return Ok(None),
            Attempt::Retry(why) => {
                warn!(why, delay_secs = delay.as_secs_f64(), "transient storefront failure, backing off");
                shutdown.delay(delay).await?;
            }
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn backoff_reissues_the_same_request_after_the_configured_wait() {
        let calls = Cell::new(0u32);
        let start = tokio::time::Instant::now();

        let out = retry_until_terminal(&Shutdown::never(), Duration::from_secs(50), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n == 1 {
                    Attempt::Retry("429")
                } else {
                    Attempt::Hit(AppDetails::default())
                }
            }
        })
        .await;

        assert!(matches!(out, Ok(Some(_))));
        assert_eq!(calls.get(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_the_backoff_wait() {
        let (signal, shutdown) = crate::shutdown::channel();
        signal.trigger();

        let out = retry_until_terminal(&shutdown, Duration::from_secs(50), || async {
            Attempt::Retry("timeout")
        })
        .await;

        assert!(matches!(out, Err(Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_outcome_is_terminal() {
        let calls = Cell::new(0u32);
        let out = retry_until_terminal(&Shutdown::never(), Duration::from_secs(50), || {
            calls.set(calls.get() + 1);
            async { Attempt::Absent }
        })
        .await;
        assert!(matches!(out, Ok(None)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn envelope_parses_success_and_failure_entries() {
        let json = r#"{
            "220": {"success": true, "data": {
                "is_free": false,
                "developers": ["Valve"],
                "categories": [{"id": 2, "description": "Single-player"}],
                "platforms": {"windows": true, "mac": true, "linux": true},
                "price_overview": {"currency": "USD", "final_formatted": "$9.99",
                                   "initial_formatted": "$19.99", "discount_percent": 50}
            }},
            "999999": {"success": false}
        }"#;
        let mut body: HashMap<String, DetailEnvelope> = serde_json::from_str(json).unwrap();

        let hit = body.remove("220").unwrap();
        assert!(hit.success);
        let details = hit.data.unwrap();
        assert_eq!(details.developers, vec!["Valve"]);
        assert_eq!(details.platforms.unwrap().linux, true);
        let price = details.price_overview.unwrap();
        assert_eq!(price.final_formatted.as_deref(), Some("$9.99"));
        assert_eq!(price.discount_percent, Some(50));

        let miss = body.remove("999999").unwrap();
        assert!(!miss.success);
        assert!(miss.data.is_none());
    }

    #[test]
    fn details_tolerate_sparse_bodies() {
        let details: AppDetails = serde_json::from_str(r#"{"is_free": true}"#).unwrap();
        assert!(details.is_free);
        assert!(details.categories.is_empty());
        assert!(details.price_overview.is_none());
    }
}
