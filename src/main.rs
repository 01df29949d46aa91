//! Odds EV service
//!
//! Pulls sportsbook odds (The Odds API or a JSON snapshot), prices every
//! outcome line against the cross-book average and a reference book, and
//! either prints one table (RUN_ONCE=true) or keeps a fresh table behind
//! `/ev` on a polling loop.

use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use odds_ev::config::Config;
use odds_ev::ingest::DataSource;
use odds_ev::params::RawParams;
use odds_ev::pipeline::{self, PipelineOutput};

#[derive(Clone)]
pub struct HealthState {
    pub last_run_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_row_count: Arc<RwLock<usize>>,
    pub error_count: Arc<RwLock<usize>>,
    pub latest: Arc<RwLock<Option<PipelineOutput>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            last_run_time: Arc::new(RwLock::new(None)),
            last_row_count: Arc::new(RwLock::new(0)),
            error_count: Arc::new(RwLock::new(0)),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_success(&self, output: PipelineOutput) {
        *self.last_run_time.write().await = Some(Utc::now());
        *self.last_row_count.write().await = output.table.len();
        *self.error_count.write().await = 0;
        *self.latest.write().await = Some(output);
    }

    pub async fn record_error(&self) {
        *self.error_count.write().await += 1;
    }
}

/// One pipeline pass with its outcome logged.
async fn run_logged(source: &DataSource, raw: &RawParams) -> odds_ev::Result<PipelineOutput> {
    let start = std::time::Instant::now();
    let output = pipeline::run(source, raw, Utc::now()).await?;

    let stats = &output.flatten;
    info!(
        "Run completed: {} events, {} rows kept, {} dropped, {} rows out, {} diagnostics in {:?}",
        stats.events,
        stats.rows,
        stats.dropped(),
        output.table.len(),
        output.diagnostics.len(),
        start.elapsed()
    );
    Ok(output)
}

async fn poll_loop(config: &Config, source: &DataSource, raw: &RawParams, health: &HealthState) {
    info!(
        "Starting EV loop (poll interval: {}s)",
        config.poll_interval_seconds
    );

    loop {
        match run_logged(source, raw).await {
            Ok(output) => health.record_success(output).await,
            Err(e) => {
                health.record_error().await;
                error!("Run failed: {}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(config.poll_interval_seconds)).await;
    }
}

/// Health check handler
async fn health_handler(
    axum::extract::State(health): axum::extract::State<HealthState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let last_run = health.last_run_time.read().await;
    let last_count = health.last_row_count.read().await;
    let errors = health.error_count.read().await;

    let status = if *errors > 5 { "degraded" } else { "ok" };

    let http_status = if *errors > 10 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": "odds-ev",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_run": last_run.map(|t| t.to_rfc3339()),
            "last_row_count": *last_count,
            "consecutive_errors": *errors
        })),
    )
}

/// Latest table with its diagnostics; 503 until the first run lands.
async fn ev_handler(
    axum::extract::State(health): axum::extract::State<HealthState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match health.latest.read().await.as_ref() {
        Some(output) => match serde_json::to_value(output) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ),
        },
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no completed run yet" })),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odds_ev=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Odds EV service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("invalid service configuration")?;
    let raw = RawParams::from_env();
    let source = config.data_source().context("failed to set up data source")?;

    if config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        let output = run_logged(&source, &raw).await.context("one-shot run failed")?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let health = HealthState::new();
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ev", get(ev_handler))
        .with_state(health.clone());

    let health_addr = format!("0.0.0.0:{}", config.health_port);
    info!("Health endpoint listening on {}", health_addr);

    let listener = tokio::net::TcpListener::bind(&health_addr)
        .await
        .with_context(|| format!("failed to bind {}", health_addr))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server error: {}", e);
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = poll_loop(&config, &source, &raw, &health) => {}
        _ = ctrl_c => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use odds_ev::ingest::Ingested;
    use odds_ev::params::Params;

    async fn fail(health: &HealthState, times: usize) {
        for _ in 0..times {
            health.record_error().await;
        }
    }

    #[test]
    fn health_degrades_after_five_errors_and_fails_after_ten() {
        tokio_test::block_on(async {
            let health = HealthState::new();

            fail(&health, 5).await;
            let (status, Json(body)) = health_handler(State(health.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");

            fail(&health, 1).await;
            let (status, Json(body)) = health_handler(State(health.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "degraded");
            assert_eq!(body["consecutive_errors"], 6);

            fail(&health, 4).await;
            let (status, _) = health_handler(State(health.clone())).await;
            assert_eq!(status, StatusCode::OK);

            fail(&health, 1).await;
            let (status, Json(body)) = health_handler(State(health.clone())).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["status"], "degraded");
        });
    }

    #[test]
    fn ev_is_unavailable_until_the_first_run() {
        tokio_test::block_on(async {
            let health = HealthState::new();
            fail(&health, 3).await;

            let (status, _) = ev_handler(State(health.clone())).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

            let output = pipeline::run_batch(Ingested::default(), Params::default(), Utc::now())
                .unwrap();
            health.record_success(output).await;

            let (status, Json(body)) = ev_handler(State(health.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body["table"].as_array().unwrap().is_empty());
            assert_eq!(body["reference_book"], "pinnacle");

            let (_, Json(body)) = health_handler(State(health.clone())).await;
            assert_eq!(body["consecutive_errors"], 0);
            assert!(body["last_run"].is_string());
        });
    }
}
