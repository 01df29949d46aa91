//! Per (event, book, market) statistics broadcast back onto every row.
//!
//! Groups are walked in `AggregateKey` order and rows inside a group in input
//! order, so floating point sums are reproducible run to run.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::model::{AggregateKey, CoverageKey, FlatRow};

/// Vig-inclusive win probability implied by an American price.
pub fn implied_probability(price: f64) -> f64 {
    if price > 0.0 {
        100.0 / (price + 100.0)
    } else {
        price.abs() / (price.abs() + 100.0)
    }
}

/// American price for a win probability. Underdogs come out positive,
/// favourites negative; exactly 0.5 takes the favourite branch (-100).
pub fn fair_price(fair_prob: f64) -> f64 {
    if fair_prob < 0.5 {
        (100.0 / fair_prob) - 100.0
    } else {
        -(fair_prob * 100.0) / (1.0 - fair_prob)
    }
}

/// Profit on a 100 unit stake at an American price.
pub fn amount_to_win(price: f64) -> f64 {
    if price > 0.0 {
        price
    } else {
        (100.0 / price.abs()) * 100.0
    }
}

/// Signed distance of a price from even money.
pub fn above_below(price: f64) -> f64 {
    if price > 0.0 {
        price - 100.0
    } else {
        price + 100.0
    }
}

/// A flat row with its market statistics attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    #[serde(flatten)]
    pub row: FlatRow,
    pub num_outcomes: usize,
    pub num_books: usize,
    /// Only set for two-outcome markets.
    pub above_below: Option<f64>,
    /// Only set for two-outcome markets.
    pub width: Option<f64>,
    pub vig_win_prob: f64,
    pub fair_win_prob: f64,
    pub fair_price: f64,
    pub amount_to_win_price: f64,
    pub amount_to_win_fair: f64,
    pub vig_prob: f64,
    pub vig_pct: f64,
}

/// Attach market statistics and book coverage counts to every row.
/// Output order matches input order.
pub fn aggregate_markets(rows: Vec<FlatRow>) -> Vec<AggregatedRow> {
    let mut groups: BTreeMap<AggregateKey, Vec<usize>> = BTreeMap::new();
    let mut coverage: BTreeMap<CoverageKey, BTreeSet<&str>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry(row.aggregate_key()).or_default().push(idx);
        coverage
            .entry(row.coverage_key())
            .or_default()
            .insert(row.book_key.as_str());
    }

    let mut stats: Vec<Option<MarketStats>> = vec![None; rows.len()];
    for (key, members) in &groups {
        let prices: Vec<f64> = members.iter().map(|&i| f64::from(rows[i].price)).collect();
        for (slot, computed) in members.iter().zip(market_stats(&prices)) {
            stats[*slot] = Some(computed);
        }
        debug!(
            "Aggregated {}/{}/{}: {} outcomes",
            key.event_id,
            key.book_key,
            key.market,
            members.len()
        );
    }

    let num_books: Vec<usize> = rows
        .iter()
        .map(|row| coverage.get(&row.coverage_key()).map_or(0, BTreeSet::len))
        .collect();

    rows.into_iter()
        .zip(stats)
        .zip(num_books)
        .filter_map(|((row, stats), num_books)| {
            let s = stats?;
            Some(AggregatedRow {
                amount_to_win_price: amount_to_win(f64::from(row.price)),
                row,
                num_outcomes: s.num_outcomes,
                num_books,
                above_below: s.above_below,
                width: s.width,
                vig_win_prob: s.vig_win_prob,
                fair_win_prob: s.fair_win_prob,
                fair_price: s.fair_price,
                amount_to_win_fair: amount_to_win(s.fair_price),
                vig_prob: s.vig_prob,
                vig_pct: s.vig_prob * 100.0,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct MarketStats {
    num_outcomes: usize,
    above_below: Option<f64>,
    width: Option<f64>,
    vig_win_prob: f64,
    fair_win_prob: f64,
    fair_price: f64,
    vig_prob: f64,
}

/// Statistics for every outcome of one market, in the order given.
///
/// A market quoted on one side only de-vigs to certainty: fair probability 1,
/// fair price `-inf` (`null` in JSON) and a negative vig.
fn market_stats(prices: &[f64]) -> Vec<MarketStats> {
    let n = prices.len();
    let vig: Vec<f64> = prices.iter().map(|&p| implied_probability(p)).collect();
    let vig_sum: f64 = vig.iter().sum();
    let fair: Vec<f64> = vig.iter().map(|v| v / vig_sum).collect();
    let fair_sum: f64 = fair.iter().sum();

    let width = if n == 2 {
        Some(-(above_below(prices[0]) + above_below(prices[1])))
    } else {
        None
    };

    prices
        .iter()
        .zip(vig.iter().zip(&fair))
        .map(|(&price, (&vig_win_prob, &fair_win_prob))| MarketStats {
            num_outcomes: n,
            above_below: width.map(|_| above_below(price)),
            width,
            vig_win_prob,
            fair_win_prob,
            fair_price: fair_price(fair_win_prob),
            vig_prob: vig_sum - fair_sum,
        })
        .collect()
}
