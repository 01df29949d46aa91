//! Output table shapes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ev::{BaselineEv, EvRecord, EvType};
use crate::model::MarketKind;

/// EV columns shown for one baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEv {
    pub fair_line: f64,
    pub width: Option<f64>,
    pub vig_pct: f64,
    pub ev_pct: f64,
    pub kelly_pct: f64,
}

impl DisplayEv {
    fn from_baseline(ev: &BaselineEv) -> Self {
        Self {
            fair_line: round2(ev.baseline.fair_price),
            width: ev.baseline.width.map(round2),
            vig_pct: round2(ev.baseline.vig_pct),
            ev_pct: round2(ev.ev_pct),
            kelly_pct: round2(ev.kelly_pct),
        }
    }
}

/// Compact row. Baseline blocks are omitted when that baseline was not
/// requested, and `null` when it was requested but has no coverage. The
/// `reference` block is labelled with the book it was priced against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub book_title: String,
    pub market: MarketKind,
    pub position: String,
    pub line: i32,
    pub point: Option<f64>,
    pub num_books: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<Option<DisplayEv>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_book: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Option<DisplayEv>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Table {
    Expanded(Vec<EvRecord>),
    Display(Vec<DisplayRow>),
}

impl Table {
    pub fn len(&self) -> usize {
        match self {
            Table::Expanded(rows) => rows.len(),
            Table::Display(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn project(
    records: Vec<EvRecord>,
    ev_type: EvType,
    reference_book: &str,
    expanded: bool,
) -> Table {
    if expanded {
        return Table::Expanded(records);
    }
    let rows = records
        .iter()
        .map(|r| {
            let row = &r.book.row;
            DisplayRow {
                sport_title: row.sport_title.clone(),
                commence_time: row.commence_time,
                home_team: row.home_team.clone(),
                away_team: row.away_team.clone(),
                book_title: row.book_title.clone(),
                market: row.market,
                position: row.position.clone(),
                line: row.price,
                point: row.point.map(|p| p.value()),
                num_books: r.book.num_books,
                avg: ev_type
                    .wants_average()
                    .then(|| r.avg.as_ref().map(DisplayEv::from_baseline)),
                reference_book: ev_type.wants_reference().then(|| reference_book.to_string()),
                reference: ev_type
                    .wants_reference()
                    .then(|| r.reference.as_ref().map(DisplayEv::from_baseline)),
            }
        })
        .collect();
    Table::Display(rows)
}
