//! Provider wire types and the flat row / grouping keys the pipeline runs on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The Odds API event structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OddsApiEvent {
    pub id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    pub last_update: Option<DateTime<Utc>>,
    pub markets: Vec<Market>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub last_update: Option<DateTime<Utc>>,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Outcome {
    pub name: String,
    pub price: Option<i32>,
    pub point: Option<f64>,
}

/// Entry of `GET /sports`
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SportInfo {
    pub key: String,
    pub title: String,
    pub active: bool,
    pub has_outrights: bool,
}

/// Priced market types the pipeline understands. Lay markets are never mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    H2h,
    Spreads,
    Totals,
}

impl MarketKind {
    pub const ALL: [MarketKind; 3] = [MarketKind::H2h, MarketKind::Spreads, MarketKind::Totals];

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "h2h" => Some(MarketKind::H2h),
            "spreads" => Some(MarketKind::Spreads),
            "totals" => Some(MarketKind::Totals),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::H2h => "h2h",
            MarketKind::Spreads => "spreads",
            MarketKind::Totals => "totals",
        }
    }

    pub fn is_lay_key(key: &str) -> bool {
        key.ends_with("_lay")
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handicap / total line. Totally ordered so it can sit inside grouping keys;
/// `-0.0` is folded into `0.0` so both spellings land in the same group.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct Point(f64);

impl Point {
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            Point(0.0)
        } else {
            Point(value)
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outcome line with every ancestor attribute copied down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub book_key: String,
    pub book_title: String,
    pub market: MarketKind,
    pub position: String,
    pub price: i32,
    pub point: Option<Point>,
}

impl FlatRow {
    pub fn aggregate_key(&self) -> AggregateKey {
        AggregateKey {
            event_id: self.event_id.clone(),
            book_key: self.book_key.clone(),
            market: self.market,
        }
    }

    pub fn coverage_key(&self) -> CoverageKey {
        CoverageKey {
            event_id: self.event_id.clone(),
            sport_key: self.sport_key.clone(),
            sport_title: self.sport_title.clone(),
            commence_time: self.commence_time,
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            market: self.market,
            position: self.position.clone(),
            point: self.point,
        }
    }

    pub fn row_key(&self) -> RowKey {
        RowKey {
            event_id: self.event_id.clone(),
            book_key: self.book_key.clone(),
            market: self.market,
            position: self.position.clone(),
            price: self.price,
            point: self.point,
        }
    }
}

/// One priced market offered by one book for one event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregateKey {
    pub event_id: String,
    pub book_key: String,
    pub market: MarketKind,
}

/// "The same bet" across books. The point is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoverageKey {
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub market: MarketKind,
    pub position: String,
    pub point: Option<Point>,
}

impl fmt::Display for CoverageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.event_id, self.market, self.position)?;
        if let Some(point) = self.point {
            write!(f, "@{}", point)?;
        }
        Ok(())
    }
}

/// Book-level identity of one quoted line, used to reconcile baseline results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub event_id: String,
    pub book_key: String,
    pub market: MarketKind,
    pub position: String,
    pub price: i32,
    pub point: Option<Point>,
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{} {}",
            self.event_id, self.book_key, self.market, self.position, self.price
        )?;
        if let Some(point) = self.point {
            write!(f, "@{}", point)?;
        }
        Ok(())
    }
}
