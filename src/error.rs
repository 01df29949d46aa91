use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No data source: set an Odds API key or a snapshot path")]
    NoDataSource,

    #[error("Invalid parameter '{field}': {reason}")]
    InvalidList { field: &'static str, reason: String },

    #[error("Unknown EV baseline mode '{0}' (expected one of: avg, reference, both)")]
    UnknownEvType(String),

    #[error("Merge cardinality violated for {baseline} baseline at {key}")]
    MergeCardinality { baseline: &'static str, key: String },

    #[error("All {attempted} odds requests failed, last error: {last}")]
    NothingFetched { attempted: usize, last: String },

    #[error("Odds API error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
