//! Sportsbook odds to expected value table.
//!
//! Nested provider quotes (event -> bookmaker -> market -> outcome) are
//! flattened into one row per outcome line, de-vigged per market, priced
//! against a cross-book average and a reference book, then filtered,
//! sorted and projected.

pub mod aggregate;
pub mod baseline;
pub mod config;
pub mod error;
pub mod ev;
pub mod filter;
pub mod flatten;
pub mod ingest;
pub mod model;
pub mod params;
pub mod pipeline;
pub mod project;

pub use error::{PipelineError, Result};
pub use pipeline::{run, run_batch, PipelineOutput};
