use std::env;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::ingest::{DataSource, OddsApiClient, DEFAULT_BASE_URL};

/// Configuration
#[derive(Clone)]
pub struct Config {
    pub odds_api_key: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub base_url: String,
    pub requests_per_minute: u32,
    pub poll_interval_seconds: u64,
    pub health_port: u16,
    /// If true, run once, print the table and exit (no polling loop)
    pub run_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let odds_api_key = non_empty(&lookup, "THE_ODDS_API_KEY")?;
        let snapshot_path = non_empty(&lookup, "ODDS_SNAPSHOT_PATH")?.map(PathBuf::from);

        if odds_api_key.is_none() && snapshot_path.is_none() {
            return Err(PipelineError::NoDataSource);
        }

        Ok(Self {
            odds_api_key,
            snapshot_path,
            base_url: lookup("ODDS_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            requests_per_minute: lookup("REQUESTS_PER_MINUTE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            poll_interval_seconds: lookup("POLL_INTERVAL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            health_port: lookup("HEALTH_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8083),
            run_once: lookup("RUN_ONCE")
                .unwrap_or_else(|| "true".to_string())
                .to_lowercase()
                == "true",
        })
    }

    /// A snapshot file wins over the live API when both are configured.
    pub fn data_source(&self) -> Result<DataSource> {
        if let Some(path) = &self.snapshot_path {
            return Ok(DataSource::Snapshot(path.clone()));
        }
        match &self.odds_api_key {
            Some(key) => Ok(DataSource::Live(OddsApiClient::new(
                key.clone(),
                self.base_url.clone(),
                self.requests_per_minute,
            )?)),
            None => Err(PipelineError::NoDataSource),
        }
    }
}

/// Unset is fine; set but blank is a mistake worth stopping for.
fn non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<String>> {
    match lookup(key) {
        Some(v) if v.trim().is_empty() => Err(PipelineError::InvalidList {
            field: key,
            reason: "is set but empty".to_string(),
        }),
        other => Ok(other.map(|v| v.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        Config::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn missing_both_sources_is_fatal() {
        assert!(matches!(config(&[]), Err(PipelineError::NoDataSource)));
    }

    #[test]
    fn blank_key_is_fatal() {
        assert!(matches!(
            config(&[("THE_ODDS_API_KEY", "  ")]),
            Err(PipelineError::InvalidList { field: "THE_ODDS_API_KEY", .. })
        ));
    }

    #[test]
    fn snapshot_takes_precedence() {
        let cfg =
            config(&[("THE_ODDS_API_KEY", "k"), ("ODDS_SNAPSHOT_PATH", "odds.json")]).unwrap();
        assert!(matches!(
            cfg.data_source().unwrap(),
            DataSource::Snapshot(p) if p == PathBuf::from("odds.json")
        ));
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("THE_ODDS_API_KEY", "k"), ("POLL_INTERVAL_SECONDS", "soon")]).unwrap();
        assert_eq!(cfg.poll_interval_seconds, 300);
        assert_eq!(cfg.health_port, 8083);
        assert!(cfg.run_once);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert!(matches!(cfg.data_source().unwrap(), DataSource::Live(_)));
    }
}
