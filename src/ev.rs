//! Expected value and Kelly stake of each book line against a baseline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::aggregate::AggregatedRow;
use crate::baseline::{average_baseline, reference_baseline, Baseline, ReferenceKey};
use crate::error::{PipelineError, Result};
use crate::model::{CoverageKey, RowKey};

/// Which baselines are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvType {
    #[serde(rename = "avg")]
    Average,
    Reference,
    Both,
}

impl EvType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "avg" | "average" => Some(EvType::Average),
            "pinnacle" | "reference" | "ref" => Some(EvType::Reference),
            "both" => Some(EvType::Both),
            _ => None,
        }
    }

    pub fn wants_average(&self) -> bool {
        matches!(self, EvType::Average | EvType::Both)
    }

    pub fn wants_reference(&self) -> bool {
        matches!(self, EvType::Reference | EvType::Both)
    }
}

impl fmt::Display for EvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvType::Average => write!(f, "avg"),
            EvType::Reference => write!(f, "reference"),
            EvType::Both => write!(f, "both"),
        }
    }
}

/// Expected profit per 100 staked at a line paying `amount_to_win`.
pub fn ev_pct(fair_prob: f64, amount_to_win: f64) -> f64 {
    fair_prob * amount_to_win - (1.0 - fair_prob) * 100.0
}

/// Kelly stake as a percentage of bankroll. Negative means no bet.
pub fn kelly_pct(fair_prob: f64, amount_to_win: f64) -> f64 {
    (fair_prob - (1.0 - fair_prob) / (amount_to_win / 100.0)) * 100.0
}

/// A baseline's market fields plus the book line's EV against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineEv {
    #[serde(flatten)]
    pub baseline: Baseline,
    pub ev_pct: f64,
    pub kelly_pct: f64,
}

impl BaselineEv {
    fn against(book: &AggregatedRow, baseline: &Baseline) -> Self {
        Self {
            ev_pct: ev_pct(baseline.fair_win_prob, book.amount_to_win_price),
            kelly_pct: kelly_pct(baseline.fair_win_prob, book.amount_to_win_price),
            baseline: baseline.clone(),
        }
    }
}

/// One book line with its EV against each requested baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvRecord {
    #[serde(flatten)]
    pub book: AggregatedRow,
    pub avg: Option<BaselineEv>,
    pub reference: Option<BaselineEv>,
}

impl EvRecord {
    pub fn baseline(&self, reference: bool) -> Option<&BaselineEv> {
        if reference {
            self.reference.as_ref()
        } else {
            self.avg.as_ref()
        }
    }
}

/// EV of every row against the cross-book mean of its own bet.
/// The result is aligned with `rows`.
pub fn average_ev(
    rows: &[AggregatedRow],
    baseline: &BTreeMap<CoverageKey, Baseline>,
) -> Result<Vec<BaselineEv>> {
    rows.iter()
        .map(|row| {
            let key = row.row.coverage_key();
            match baseline.get(&key) {
                Some(b) => Ok(BaselineEv::against(row, b)),
                None => Err(PipelineError::MergeCardinality {
                    baseline: "average",
                    key: key.to_string(),
                }),
            }
        })
        .collect()
}

/// EV of each row the reference book also quotes, keyed by the book line.
pub fn reference_ev(
    rows: &[AggregatedRow],
    baseline: &BTreeMap<ReferenceKey, Baseline>,
) -> Result<BTreeMap<RowKey, BaselineEv>> {
    let mut out = BTreeMap::new();
    for row in rows {
        let Some(b) = baseline.get(&ReferenceKey::of(row)) else {
            continue;
        };
        let ev = BaselineEv::against(row, b);
        let key = row.row.row_key();
        if let Some(existing) = out.get(&key) {
            if *existing != ev {
                return Err(PipelineError::MergeCardinality {
                    baseline: "reference",
                    key: key.to_string(),
                });
            }
            continue;
        }
        out.insert(key, ev);
    }
    Ok(out)
}

/// Left join: every row is kept, reference fields stay empty where the
/// reference book never quoted the bet.
pub fn merge_ev(
    rows: Vec<AggregatedRow>,
    average: Option<Vec<BaselineEv>>,
    reference: Option<&BTreeMap<RowKey, BaselineEv>>,
) -> Vec<EvRecord> {
    let mut average = average.map(Vec::into_iter);
    rows.into_iter()
        .map(|book| {
            let avg = average.as_mut().and_then(|it| it.next());
            let reference = reference.and_then(|r| r.get(&book.row.row_key()).cloned());
            EvRecord {
                book,
                avg,
                reference,
            }
        })
        .collect()
}

/// Run both baselines as requested and reconcile them into one record per row.
///
/// `reference_rows` is where the reference book's lines are looked up; it is
/// usually `rows` itself, or a separate pull covering the reference region.
pub fn compute_ev(
    rows: Vec<AggregatedRow>,
    reference_rows: Option<&[AggregatedRow]>,
    ev_type: EvType,
    reference_book: &str,
) -> Result<Vec<EvRecord>> {
    let average = if ev_type.wants_average() {
        let baseline = average_baseline(&rows);
        Some(average_ev(&rows, &baseline)?)
    } else {
        None
    };

    let reference = if ev_type.wants_reference() {
        let source = reference_rows.unwrap_or(&rows[..]);
        let baseline = reference_baseline(source, reference_book)?;
        let ev = reference_ev(&rows, &baseline)?;
        debug!("{} of {} rows covered by {}", ev.len(), rows.len(), reference_book);
        Some(ev)
    } else {
        None
    };

    let records = merge_ev(rows, average, reference.as_ref());
    info!("Computed EV ({}) for {} rows", ev_type, records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate_markets, amount_to_win, fair_price};
    use crate::model::{FlatRow, MarketKind};

    fn row(book: &str, position: &str, price: i32) -> FlatRow {
        FlatRow {
            event_id: "e1".to_string(),
            sport_key: "soccer_epl".to_string(),
            sport_title: "EPL".to_string(),
            commence_time: "2024-08-17T14:00:00Z".parse().unwrap(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            book_key: book.to_string(),
            book_title: book.to_string(),
            market: MarketKind::H2h,
            position: position.to_string(),
            price,
            point: None,
        }
    }

    #[test]
    fn ev_is_zero_at_the_fair_price() {
        for i in 1..200 {
            let p = f64::from(i) / 200.0;
            let atw = amount_to_win(fair_price(p));
            assert!(ev_pct(p, atw).abs() < 1e-9, "p={} ev={}", p, ev_pct(p, atw));
            assert!(kelly_pct(p, atw).abs() < 1e-9, "p={}", p);
        }
    }

    #[test]
    fn ev_and_kelly_for_a_plus_money_edge() {
        // 50% true probability at +110 pays 110 on 100.
        assert!((ev_pct(0.5, 110.0) - 5.0).abs() < 1e-12);
        assert!((kelly_pct(0.5, 110.0) - (0.5 - 0.5 / 1.1) * 100.0).abs() < 1e-12);
    }

    #[test]
    fn lone_book_average_ev_is_zero_against_itself_only_when_fair() {
        let rows =
            aggregate_markets(vec![row("fanduel", "Home", -150), row("fanduel", "Away", 130)]);
        let records = compute_ev(rows, None, EvType::Average, "pinnacle").unwrap();

        assert_eq!(records.len(), 2);
        for r in &records {
            let avg = r.avg.as_ref().unwrap();
            assert_eq!(avg.baseline.fair_win_prob, r.book.fair_win_prob);
            // Vig makes every side negative EV against its own fair price.
            assert!(avg.ev_pct < 0.0);
            assert!(r.reference.is_none());
        }
    }

    #[test]
    fn both_mode_keeps_rows_without_reference_coverage() {
        let rows = aggregate_markets(vec![
            row("pinnacle", "Home", -105),
            row("pinnacle", "Away", -105),
            row("fanduel", "Home", 110),
            row("fanduel", "Away", -130),
            row("fanduel", "Draw", 250),
        ]);
        let records = compute_ev(rows, None, EvType::Both, "pinnacle").unwrap();

        assert_eq!(records.len(), 5);
        // fanduel runs a three-way market, pinnacle a two-way one: no shared key.
        for r in records.iter().filter(|r| r.book.row.book_key == "fanduel") {
            assert!(r.avg.is_some());
            assert!(r.reference.is_none());
        }
        for r in records.iter().filter(|r| r.book.row.book_key == "pinnacle") {
            let reference = r.reference.as_ref().unwrap();
            assert!((reference.baseline.fair_win_prob - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn reference_ev_prices_against_the_reference_book() {
        let rows = aggregate_markets(vec![
            row("pinnacle", "Home", -105),
            row("pinnacle", "Away", -105),
            row("fanduel", "Home", 110),
            row("fanduel", "Away", -130),
        ]);
        let records = compute_ev(rows, None, EvType::Reference, "pinnacle").unwrap();

        let home = records
            .iter()
            .find(|r| r.book.row.book_key == "fanduel" && r.book.row.position == "Home")
            .unwrap();
        assert!(home.avg.is_none());
        let reference = home.reference.as_ref().unwrap();
        assert!((reference.ev_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn reference_rows_can_come_from_a_separate_pull() {
        let rows =
            aggregate_markets(vec![row("fanduel", "Home", 110), row("fanduel", "Away", -130)]);
        let eu =
            aggregate_markets(vec![row("pinnacle", "Home", -105), row("pinnacle", "Away", -105)]);
        let records = compute_ev(rows, Some(eu.as_slice()), EvType::Both, "pinnacle").unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.reference.is_some() && r.avg.is_some()));
    }

    #[test]
    fn one_sided_market_prices_as_a_sure_thing() {
        let rows = aggregate_markets(vec![row("fanduel", "Home", -110)]);
        let records = compute_ev(rows, None, EvType::Average, "pinnacle").unwrap();
        let avg = records[0].avg.as_ref().unwrap();

        assert!((avg.ev_pct - 100.0 * 100.0 / 110.0).abs() < 1e-9);
        assert!((avg.kelly_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ev_type_parses_aliases() {
        assert_eq!(EvType::parse("avg"), Some(EvType::Average));
        assert_eq!(EvType::parse("Pinnacle"), Some(EvType::Reference));
        assert_eq!(EvType::parse("reference"), Some(EvType::Reference));
        assert_eq!(EvType::Reference.to_string(), "reference");
        assert_eq!(EvType::parse("both"), Some(EvType::Both));
        assert_eq!(EvType::parse("either"), None);
    }
}
