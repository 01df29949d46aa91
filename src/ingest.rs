//! Where events come from: The Odds API or a persisted JSON snapshot.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::model::{MarketKind, OddsApiEvent, SportInfo};
use crate::params::{Params, Region};

pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// The Odds API client
pub struct OddsApiClient {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: DirectLimiter,
}

impl OddsApiClient {
    pub fn new(api_key: String, base_url: String, requests_per_minute: u32) -> Result<Self> {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        // Log API usage from headers
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string()
        };
        info!(
            "API requests remaining: {}, used: {}",
            header("x-requests-remaining"),
            header("x-requests-used")
        );

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Keys of sports without outright markets.
    pub async fn fetch_sports(&self) -> Result<Vec<String>> {
        let url = format!("{}/sports", self.base_url);
        let sports: Vec<SportInfo> = self.get_json(&url, &[]).await?;
        let keys: Vec<String> = sports
            .into_iter()
            .filter(|s| !s.has_outrights)
            .map(|s| s.key)
            .collect();
        info!("Discovered {} sports without outrights", keys.len());
        Ok(keys)
    }

    pub async fn fetch_sport_odds(
        &self,
        sport: &str,
        regions: &[Region],
        markets: &[MarketKind],
    ) -> Result<Vec<OddsApiEvent>> {
        let url = format!("{}/sports/{}/odds", self.base_url, sport);
        let query = [
            ("regions", join(regions.iter().map(Region::as_str))),
            ("markets", join(markets.iter().map(MarketKind::as_str))),
            ("oddsFormat", "american".to_string()),
            ("dateFormat", "iso".to_string()),
        ];
        self.get_json(&url, &query).await
    }

    /// Odds for every sport, one request each. A failing sport is skipped,
    /// but if every request fails the whole fetch is an error.
    pub async fn fetch_all(
        &self,
        sports: &[String],
        regions: &[Region],
        markets: &[MarketKind],
    ) -> Result<Vec<OddsApiEvent>> {
        let mut events = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0;
        for sport in sports {
            match self.fetch_sport_odds(sport, regions, markets).await {
                Ok(batch) => {
                    info!("Fetched {} events for {}", batch.len(), sport);
                    succeeded += 1;
                    events.extend(batch);
                }
                Err(e) => {
                    warn!("Failed to fetch odds for {}: {}", sport, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(last) if succeeded == 0 => Err(PipelineError::NothingFetched {
                attempted: sports.len(),
                last: last.to_string(),
            }),
            _ => Ok(events),
        }
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(",")
}

/// Read a JSON array of events written in the provider's shape.
pub async fn load_snapshot(path: &Path) -> Result<Vec<OddsApiEvent>> {
    let body = tokio::fs::read_to_string(path).await?;
    let events: Vec<OddsApiEvent> = serde_json::from_str(&body)?;
    info!("Loaded {} events from {}", events.len(), path.display());
    Ok(events)
}

pub enum DataSource {
    Live(OddsApiClient),
    Snapshot(PathBuf),
}

/// Events to price, plus a separate pull for the reference book's region
/// when the main pull does not cover it.
#[derive(Debug, Default)]
pub struct Ingested {
    pub events: Vec<OddsApiEvent>,
    pub reference_events: Option<Vec<OddsApiEvent>>,
}

pub async fn ingest(source: &DataSource, params: &Params) -> Result<Ingested> {
    match source {
        DataSource::Snapshot(path) => Ok(Ingested {
            events: load_snapshot(path).await?,
            reference_events: None,
        }),
        DataSource::Live(client) => {
            let sports = match &params.sports {
                Some(sports) => sports.clone(),
                None => client.fetch_sports().await?,
            };
            let events = client.fetch_all(&sports, &params.regions, &params.markets).await?;
            let reference_events = if params.needs_reference_top_up() {
                info!(
                    "Fetching {} region for reference book {}",
                    params.reference_region, params.reference_book
                );
                Some(
                    client
                        .fetch_all(&sports, &[params.reference_region], &params.markets)
                        .await?,
                )
            } else {
                None
            };
            Ok(Ingested {
                events,
                reference_events,
            })
        }
    }
}
