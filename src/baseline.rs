//! Reference probability sets each book's line is judged against.
//!
//! * average: mean of every numeric market field across all books quoting
//!   the same bet (same [`CoverageKey`]).
//! * reference: the market fields of one designated sharp book, keyed by the
//!   bet plus its outcome count. Book identity is not part of the key.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::aggregate::AggregatedRow;
use crate::error::{PipelineError, Result};
use crate::model::CoverageKey;

/// Market fields of a baseline. For the average baseline these are means;
/// optional fields average only the books where they are defined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    pub price: f64,
    pub num_outcomes: f64,
    pub num_books: f64,
    pub above_below: Option<f64>,
    pub width: Option<f64>,
    pub vig_win_prob: f64,
    pub fair_win_prob: f64,
    pub fair_price: f64,
    pub amount_to_win_price: f64,
    pub amount_to_win_fair: f64,
    pub vig_prob: f64,
    pub vig_pct: f64,
}

impl Baseline {
    fn from_row(row: &AggregatedRow) -> Self {
        Self {
            price: f64::from(row.row.price),
            num_outcomes: row.num_outcomes as f64,
            num_books: row.num_books as f64,
            above_below: row.above_below,
            width: row.width,
            vig_win_prob: row.vig_win_prob,
            fair_win_prob: row.fair_win_prob,
            fair_price: row.fair_price,
            amount_to_win_price: row.amount_to_win_price,
            amount_to_win_fair: row.amount_to_win_fair,
            vig_prob: row.vig_prob,
            vig_pct: row.vig_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceKey {
    pub coverage: CoverageKey,
    pub num_outcomes: usize,
}

impl ReferenceKey {
    pub fn of(row: &AggregatedRow) -> Self {
        Self {
            coverage: row.row.coverage_key(),
            num_outcomes: row.num_outcomes,
        }
    }
}

#[derive(Default)]
struct Accumulator {
    count: f64,
    price: f64,
    num_outcomes: f64,
    num_books: f64,
    above_below: OptionalMean,
    width: OptionalMean,
    vig_win_prob: f64,
    fair_win_prob: f64,
    fair_price: f64,
    amount_to_win_price: f64,
    amount_to_win_fair: f64,
    vig_prob: f64,
    vig_pct: f64,
}

#[derive(Default)]
struct OptionalMean {
    sum: f64,
    count: f64,
}

impl OptionalMean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1.0;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0.0).then(|| self.sum / self.count)
    }
}

impl Accumulator {
    fn push(&mut self, row: &AggregatedRow) {
        self.count += 1.0;
        self.price += f64::from(row.row.price);
        self.num_outcomes += row.num_outcomes as f64;
        self.num_books += row.num_books as f64;
        self.above_below.push(row.above_below);
        self.width.push(row.width);
        self.vig_win_prob += row.vig_win_prob;
        self.fair_win_prob += row.fair_win_prob;
        self.fair_price += row.fair_price;
        self.amount_to_win_price += row.amount_to_win_price;
        self.amount_to_win_fair += row.amount_to_win_fair;
        self.vig_prob += row.vig_prob;
        self.vig_pct += row.vig_pct;
    }

    fn finish(&self) -> Baseline {
        let n = self.count;
        Baseline {
            price: self.price / n,
            num_outcomes: self.num_outcomes / n,
            num_books: self.num_books / n,
            above_below: self.above_below.mean(),
            width: self.width.mean(),
            vig_win_prob: self.vig_win_prob / n,
            fair_win_prob: self.fair_win_prob / n,
            fair_price: self.fair_price / n,
            amount_to_win_price: self.amount_to_win_price / n,
            amount_to_win_fair: self.amount_to_win_fair / n,
            vig_prob: self.vig_prob / n,
            vig_pct: self.vig_pct / n,
        }
    }
}

/// Cross-book mean per bet. Rows are folded in input order.
pub fn average_baseline(rows: &[AggregatedRow]) -> BTreeMap<CoverageKey, Baseline> {
    let mut acc: BTreeMap<CoverageKey, Accumulator> = BTreeMap::new();
    for row in rows {
        acc.entry(row.row.coverage_key()).or_default().push(row);
    }
    let out: BTreeMap<CoverageKey, Baseline> =
        acc.into_iter().map(|(k, a)| (k, a.finish())).collect();
    info!("Average baseline: {} bets from {} rows", out.len(), rows.len());
    out
}

/// Market fields of `reference_book`, one entry per bet it quotes.
///
/// Two different lines from the reference book for the same key would make
/// the later merge ambiguous, so that aborts. Exact repeats collapse.
pub fn reference_baseline(
    rows: &[AggregatedRow],
    reference_book: &str,
) -> Result<BTreeMap<ReferenceKey, Baseline>> {
    let mut out: BTreeMap<ReferenceKey, Baseline> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.row.book_key == reference_book) {
        let key = ReferenceKey::of(row);
        let baseline = Baseline::from_row(row);
        match out.get(&key) {
            Some(existing) if *existing == baseline => {
                debug!("Collapsing repeated {} line at {}", reference_book, key.coverage);
            }
            Some(_) => {
                return Err(PipelineError::MergeCardinality {
                    baseline: "reference",
                    key: key.coverage.to_string(),
                });
            }
            None => {
                out.insert(key, baseline);
            }
        }
    }
    info!("Reference baseline ({}): {} bets", reference_book, out.len());
    Ok(out)
}
