//! Top-level batch: ingest, flatten, aggregate, price, filter, sort, project.
//!
//! Each call works on a fully materialised batch and shares no state with
//! other calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use crate::aggregate::{aggregate_markets, AggregatedRow};
use crate::error::Result;
use crate::ev::compute_ev;
use crate::filter::{apply_filters, sort_records};
use crate::flatten::{flatten_events, FlattenStats};
use crate::ingest::{ingest, DataSource, Ingested};
use crate::model::OddsApiEvent;
use crate::params::{Diagnostic, Params, RawParams};
use crate::project::{project, Table};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Book behind every `reference` block, when that baseline was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_book: Option<String>,
    pub table: Table,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    pub flatten: FlattenStats,
}

/// Validate options, pull events from `source` and run the batch.
pub async fn run(
    source: &DataSource,
    raw: &RawParams,
    now: DateTime<Utc>,
) -> Result<PipelineOutput> {
    let (params, mut diagnostics) = raw.validate()?;
    let ingested = ingest(source, &params).await?;
    let mut output = run_batch(ingested, params, now)?;
    diagnostics.append(&mut output.diagnostics);
    output.diagnostics = diagnostics;
    Ok(output)
}

/// The synchronous core over already ingested events.
pub fn run_batch(
    ingested: Ingested,
    mut params: Params,
    now: DateTime<Utc>,
) -> Result<PipelineOutput> {
    let (rows, flatten) = prepare(&ingested.events);
    let reference_rows = ingested.reference_events.as_deref().map(|events| prepare(events).0);

    let records = compute_ev(
        rows,
        reference_rows.as_deref(),
        params.ev_type,
        &params.reference_book,
    )?;

    let known: BTreeSet<&str> = records.iter().map(|r| r.book.row.book_key.as_str()).collect();
    let diagnostics = params.retain_known_books(&known);

    let mut records = apply_filters(records, &params.filters, now);
    sort_records(&mut records, &params.sort);

    let table = project(records, params.ev_type, &params.reference_book, params.expanded);
    info!("Pipeline produced {} rows", table.len());
    Ok(PipelineOutput {
        reference_book: params.ev_type.wants_reference().then_some(params.reference_book),
        table,
        diagnostics,
        flatten,
    })
}

fn prepare(events: &[OddsApiEvent]) -> (Vec<AggregatedRow>, FlattenStats) {
    let (rows, stats) = flatten_events(events);
    (aggregate_markets(rows), stats)
}
