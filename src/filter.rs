//! Row filters and single-key sort over the EV table.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::info;

use crate::ev::{BaselineEv, EvRecord};
use crate::model::MarketKind;

/// One of the two baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineSide {
    #[serde(rename = "avg")]
    Average,
    Reference,
}

impl BaselineSide {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "avg" | "average" => Some(BaselineSide::Average),
            "pinnacle" | "reference" | "ref" => Some(BaselineSide::Reference),
            _ => None,
        }
    }

    fn of(self, record: &EvRecord) -> Option<&BaselineEv> {
        record.baseline(self == BaselineSide::Reference)
    }
}

/// Which baselines a threshold filter is checked against. `Both` requires
/// the row to pass on each of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    #[serde(rename = "avg")]
    Average,
    Reference,
    Both,
}

impl Preference {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "both" => Some(Preference::Both),
            other => BaselineSide::parse(other).map(Preference::from),
        }
    }

    pub fn sides(&self) -> &'static [BaselineSide] {
        match self {
            Preference::Average => &[BaselineSide::Average],
            Preference::Reference => &[BaselineSide::Reference],
            Preference::Both => &[BaselineSide::Average, BaselineSide::Reference],
        }
    }
}

impl From<BaselineSide> for Preference {
    fn from(side: BaselineSide) -> Self {
        match side {
            BaselineSide::Average => Preference::Average,
            BaselineSide::Reference => Preference::Reference,
        }
    }
}

/// Optional predicates, ANDed. `None` disables a predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSet {
    pub sports: Option<Vec<String>>,
    pub markets: Option<Vec<MarketKind>>,
    pub days_from_now: Option<i64>,
    pub books: Option<Vec<String>>,
    pub min_odds: Option<f64>,
    pub max_odds: Option<f64>,
    pub max_width: Option<f64>,
    pub max_vig_pct: Option<f64>,
    pub min_ev_pct: Option<f64>,
    pub min_num_books: Option<f64>,
    pub preference: Preference,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self {
            sports: None,
            markets: None,
            days_from_now: None,
            books: None,
            min_odds: None,
            max_odds: None,
            max_width: None,
            max_vig_pct: None,
            min_ev_pct: None,
            min_num_books: None,
            preference: Preference::Both,
        }
    }
}

impl FilterSet {
    /// Whether `record` passes every enabled predicate, with the time
    /// horizon measured from `now`.
    pub fn matches(&self, record: &EvRecord, now: DateTime<Utc>) -> bool {
        let row = &record.book.row;

        if let Some(sports) = &self.sports {
            if !sports.iter().any(|s| *s == row.sport_key) {
                return false;
            }
        }
        if let Some(markets) = &self.markets {
            if !markets.contains(&row.market) {
                return false;
            }
        }
        if let Some(days) = self.days_from_now {
            if row.commence_time > now + Duration::days(days) {
                return false;
            }
        }
        if let Some(books) = &self.books {
            if !books.iter().any(|b| *b == row.book_key) {
                return false;
            }
        }

        let price = f64::from(row.price);
        if self.min_odds.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_odds.is_some_and(|max| price > max) {
            return false;
        }

        if let Some(max_width) = self.max_width {
            if record.book.num_outcomes != 2 {
                return false;
            }
            if !self.each_side(record, |b| b.baseline.width.is_some_and(|w| w <= max_width)) {
                return false;
            }
        }
        if let Some(max_vig) = self.max_vig_pct {
            if !self.each_side(record, |b| b.baseline.vig_pct <= max_vig) {
                return false;
            }
        }
        if let Some(min_ev) = self.min_ev_pct {
            if !self.each_side(record, |b| b.ev_pct >= min_ev) {
                return false;
            }
        }

        if let Some(min_books) = self.min_num_books {
            if (record.book.num_books as f64) < min_books {
                return false;
            }
        }
        true
    }

    fn each_side(&self, record: &EvRecord, check: impl Fn(&BaselineEv) -> bool) -> bool {
        self.preference
            .sides()
            .iter()
            .all(|side| side.of(record).is_some_and(&check))
    }
}

/// Keep the rows passing `filters`. Pure: the same input always gives the same output.
pub fn apply_filters(
    records: Vec<EvRecord>,
    filters: &FilterSet,
    now: DateTime<Utc>,
) -> Vec<EvRecord> {
    let before = records.len();
    let kept: Vec<EvRecord> = records
        .into_iter()
        .filter(|r| filters.matches(r, now))
        .collect();
    info!("Filters kept {}/{} rows", kept.len(), before);
    kept
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    CommenceTime,
    Line,
    Width,
    EvPct,
    KellyPct,
    Default,
}

impl SortBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "commence_time" => Some(SortBy::CommenceTime),
            "line" => Some(SortBy::Line),
            "width" => Some(SortBy::Width),
            "ev_pct" => Some(SortBy::EvPct),
            "kelly_pct" => Some(SortBy::KellyPct),
            "default" => Some(SortBy::Default),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub key: SortBy,
    pub ascending: bool,
    pub side: BaselineSide,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortBy::Default,
            ascending: false,
            side: BaselineSide::Average,
        }
    }
}

/// Stable sort by one key. Rows with no value for the key go last in
/// either direction. `Default` ignores `ascending`.
pub fn sort_records(records: &mut [EvRecord], order: &SortSpec) {
    let directed = |ord: Ordering| if order.ascending { ord } else { ord.reverse() };
    match order.key {
        SortBy::Default => records.sort_by(|a, b| {
            let (a, b) = (&a.book.row, &b.book.row);
            a.commence_time
                .cmp(&b.commence_time)
                .then_with(|| a.event_id.cmp(&b.event_id))
                .then_with(|| a.book_key.cmp(&b.book_key))
                .then_with(|| a.market.cmp(&b.market))
        }),
        SortBy::CommenceTime => records.sort_by(|a, b| {
            directed(a.book.row.commence_time.cmp(&b.book.row.commence_time))
        }),
        key => records.sort_by(|a, b| {
            match (sort_value(a, key, order.side), sort_value(b, key, order.side)) {
                (Some(x), Some(y)) => directed(x.total_cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }),
    }
}

fn sort_value(record: &EvRecord, key: SortBy, side: BaselineSide) -> Option<f64> {
    match key {
        SortBy::Line => Some(f64::from(record.book.row.price)),
        SortBy::Width => side.of(record).and_then(|b| b.baseline.width),
        SortBy::EvPct => side.of(record).map(|b| b.ev_pct),
        SortBy::KellyPct => side.of(record).map(|b| b.kelly_pct),
        SortBy::CommenceTime | SortBy::Default => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_markets;
    use crate::ev::{compute_ev, EvType};
    use crate::model::{FlatRow, Point};

    fn row(
        event: &str,
        start: &str,
        book: &str,
        market: MarketKind,
        position: &str,
        price: i32,
    ) -> FlatRow {
        let sport = if event.starts_with('n') { "basketball_nba" } else { "baseball_mlb" };
        FlatRow {
            event_id: event.to_string(),
            sport_key: sport.to_string(),
            sport_title: "Sport".to_string(),
            commence_time: start.parse().unwrap(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            book_key: book.to_string(),
            book_title: book.to_string(),
            market,
            position: position.to_string(),
            price,
            point: (market == MarketKind::Totals).then(|| Point::new(8.5)),
        }
    }

    fn table() -> Vec<EvRecord> {
        let t1 = "2024-05-01T23:00:00Z";
        let t2 = "2024-05-04T23:00:00Z";
        let rows = aggregate_markets(vec![
            row("n1", t1, "pinnacle", MarketKind::H2h, "Home", -105),
            row("n1", t1, "pinnacle", MarketKind::H2h, "Away", -105),
            row("n1", t1, "fanduel", MarketKind::H2h, "Home", 115),
            row("n1", t1, "fanduel", MarketKind::H2h, "Away", -140),
            row("n1", t1, "draftkings", MarketKind::H2h, "Home", -110),
            row("n1", t1, "draftkings", MarketKind::H2h, "Away", -110),
            row("m1", t2, "fanduel", MarketKind::Totals, "Over", -115),
            row("m1", t2, "fanduel", MarketKind::Totals, "Under", -105),
            row("m1", t2, "betmgm", MarketKind::Totals, "Over", 105),
            row("m1", t2, "betmgm", MarketKind::Totals, "Under", -125),
        ]);
        compute_ev(rows, None, EvType::Both, "pinnacle").unwrap()
    }

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    fn by(key: SortBy, ascending: bool, side: BaselineSide) -> SortSpec {
        SortSpec { key, ascending, side }
    }

    #[test]
    fn unset_filters_keep_everything() {
        let all = table();
        let kept = apply_filters(all.clone(), &FilterSet::default(), now());
        assert_eq!(kept, all);
    }

    #[test]
    fn allow_lists_and_price_range() {
        let filters = FilterSet {
            sports: Some(vec!["basketball_nba".to_string()]),
            books: Some(vec!["fanduel".to_string(), "draftkings".to_string()]),
            min_odds: Some(-110.0),
            max_odds: Some(115.0),
            ..FilterSet::default()
        };
        let kept = apply_filters(table(), &filters, now());
        let prices: Vec<i32> = kept.iter().map(|r| r.book.row.price).collect();
        assert_eq!(prices, vec![115, -110, -110]);
    }

    #[test]
    fn horizon_is_inclusive_of_the_cutoff() {
        let filters = FilterSet {
            days_from_now: Some(1),
            ..FilterSet::default()
        };
        let kept = apply_filters(table(), &filters, now());
        assert!(kept.iter().all(|r| r.book.row.event_id == "n1"));
        assert_eq!(kept.len(), 6);

        let exact: DateTime<Utc> = "2024-05-03T23:00:00Z".parse().unwrap();
        let one_day = FilterSet {
            days_from_now: Some(1),
            ..FilterSet::default()
        };
        let kept = apply_filters(table(), &one_day, exact);
        assert_eq!(kept.len(), 10);
    }

    #[test]
    fn both_preference_requires_every_baseline() {
        let both = FilterSet {
            min_ev_pct: Some(-100.0),
            preference: Preference::Both,
            ..FilterSet::default()
        };
        let avg_only = FilterSet {
            preference: Preference::Average,
            ..both.clone()
        };

        // Only the NBA moneyline is covered by the reference book.
        assert_eq!(apply_filters(table(), &both, now()).len(), 6);
        assert_eq!(apply_filters(table(), &avg_only, now()).len(), 10);
    }

    #[test]
    fn positive_ev_filter_finds_the_soft_line() {
        let filters = FilterSet {
            min_ev_pct: Some(1.0),
            preference: Preference::Reference,
            ..FilterSet::default()
        };
        let kept = apply_filters(table(), &filters, now());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].book.row.book_key, "fanduel");
        assert_eq!(kept[0].book.row.price, 115);
    }

    #[test]
    fn width_and_vig_thresholds() {
        // NBA moneyline widths 10, 25, 20 average to 18.33; MLB totals are 20 at both books.
        let filters = FilterSet {
            max_width: Some(19.0),
            preference: Preference::Average,
            ..FilterSet::default()
        };
        let kept = apply_filters(table(), &filters, now());
        assert_eq!(kept.len(), 6);
        assert!(kept.iter().all(|r| r.book.row.event_id == "n1"));

        let vig = FilterSet {
            max_vig_pct: Some(0.0),
            preference: Preference::Average,
            ..FilterSet::default()
        };
        assert!(apply_filters(table(), &vig, now()).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let filters = FilterSet {
            days_from_now: Some(2),
            min_num_books: Some(2.0),
            max_vig_pct: Some(5.0),
            ..FilterSet::default()
        };
        let once = apply_filters(table(), &filters, now());
        let twice = apply_filters(once.clone(), &filters, now());
        assert_eq!(once, twice);
    }

    #[test]
    fn default_sort_ignores_direction() {
        let mut asc = table();
        asc.reverse();
        let mut desc = asc.clone();
        sort_records(&mut asc, &by(SortBy::Default, true, BaselineSide::Average));
        sort_records(&mut desc, &by(SortBy::Default, false, BaselineSide::Average));
        assert_eq!(asc, desc);

        let keys: Vec<(String, String)> = asc
            .iter()
            .map(|r| (r.book.row.event_id.clone(), r.book.row.book_key.clone()))
            .collect();
        assert_eq!(keys[0], ("n1".to_string(), "draftkings".to_string()));
        assert_eq!(keys[9].0, "m1");
    }

    #[test]
    fn ev_sort_puts_missing_values_last() {
        let mut records = table();
        sort_records(&mut records, &by(SortBy::EvPct, false, BaselineSide::Reference));
        let evs: Vec<Option<f64>> = records
            .iter()
            .map(|r| r.reference.as_ref().map(|b| b.ev_pct))
            .collect();
        assert!(evs[..6].iter().all(Option::is_some));
        assert!(evs[6..].iter().all(Option::is_none));
        assert!(evs[..6].windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn width_sort_puts_multi_outcome_rows_last() {
        let t = "2024-05-02T19:00:00Z";
        let rows = aggregate_markets(vec![
            row("s1", t, "unibet", MarketKind::H2h, "Home", 150),
            row("s1", t, "unibet", MarketKind::H2h, "Away", 180),
            row("s1", t, "unibet", MarketKind::H2h, "Draw", 220),
            row("n1", t, "fanduel", MarketKind::H2h, "Home", 115),
            row("n1", t, "fanduel", MarketKind::H2h, "Away", -140),
            row("n2", t, "draftkings", MarketKind::H2h, "Home", -110),
            row("n2", t, "draftkings", MarketKind::H2h, "Away", -110),
        ]);
        let records = compute_ev(rows, None, EvType::Average, "pinnacle").unwrap();

        let events = |ascending: bool| {
            let mut sorted = records.clone();
            sort_records(&mut sorted, &by(SortBy::Width, ascending, BaselineSide::Average));
            sorted
                .iter()
                .map(|r| r.book.row.event_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(events(true), vec!["n2", "n2", "n1", "n1", "s1", "s1", "s1"]);
        assert_eq!(events(false), vec!["n1", "n1", "n2", "n2", "s1", "s1", "s1"]);
    }

    #[test]
    fn kelly_sort_follows_the_chosen_baseline() {
        let mut records = table();
        sort_records(&mut records, &by(SortBy::KellyPct, true, BaselineSide::Reference));
        let kelly: Vec<Option<f64>> = records
            .iter()
            .map(|r| r.reference.as_ref().map(|b| b.kelly_pct))
            .collect();
        assert!(kelly[..6].iter().all(Option::is_some));
        assert!(kelly[6..].iter().all(Option::is_none));
        assert!(kelly[..6].windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(records[5].book.row.price, 115);

        sort_records(&mut records, &by(SortBy::KellyPct, false, BaselineSide::Average));
        let kelly: Vec<f64> = records.iter().map(|r| r.avg.as_ref().unwrap().kelly_pct).collect();
        assert!(kelly.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn commence_time_sort_honours_direction() {
        let mut records = table();
        let latest_first = by(SortBy::CommenceTime, false, BaselineSide::Average);
        sort_records(&mut records, &latest_first);
        let events: Vec<&str> = records.iter().map(|r| r.book.row.event_id.as_str()).collect();
        assert_eq!(events[..4], ["m1"; 4]);
        assert_eq!(events[4..], ["n1"; 6]);

        let earliest_first = SortSpec { ascending: true, ..latest_first };
        sort_records(&mut records, &earliest_first);
        assert_eq!(records[0].book.row.event_id, "n1");
        assert_eq!(records[9].book.row.event_id, "m1");
    }

    #[test]
    fn line_sort_ascending() {
        let mut records = table();
        sort_records(&mut records, &by(SortBy::Line, true, BaselineSide::Average));
        let prices: Vec<i32> = records.iter().map(|r| r.book.row.price).collect();
        let mut expected = prices.clone();
        expected.sort();
        assert_eq!(prices, expected);
    }
}
