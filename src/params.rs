//! Pipeline options.
//!
//! Options arrive as strings (environment, query string). [`RawParams::validate`]
//! turns them into an immutable [`Params`] value, built fresh on every call:
//!
//! - structural problems (regions, markets, sports list, EV mode) are errors;
//! - a bad optional filter/sort option is dropped and reported as a
//!   [`Diagnostic`], and the run carries on with that option unset.

use serde::Serialize;
use std::collections::BTreeSet;
use std::env;
use std::fmt;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::ev::EvType;
use crate::filter::{BaselineSide, FilterSet, Preference, SortBy, SortSpec};
use crate::model::MarketKind;

pub const DEFAULT_REFERENCE_BOOK: &str = "pinnacle";

/// Longest accepted time horizon, in days.
const MAX_DAYS_FROM_NOW: f64 = 36_500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Us,
    Eu,
    Uk,
    Au,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Us, Region::Eu, Region::Uk, Region::Au];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "us" => Some(Region::Us),
            "eu" => Some(Region::Eu),
            "uk" => Some(Region::Uk),
            "au" => Some(Region::Au),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "us",
            Region::Eu => "eu",
            Region::Uk => "uk",
            Region::Au => "au",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An optional option that was dropped or coerced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub field: &'static str,
    pub message: String,
}

fn degrade(diagnostics: &mut Vec<Diagnostic>, field: &'static str, message: impl Into<String>) {
    let message = message.into();
    warn!("Parameter '{}' degraded: {}", field, message);
    diagnostics.push(Diagnostic { field, message });
}

/// Options as received, unparsed. Blank values count as unset.
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pub sports: Option<String>,
    pub regions: Option<String>,
    pub markets: Option<String>,
    pub ev_type: Option<String>,
    pub reference_book: Option<String>,
    pub reference_region: Option<String>,
    pub recommended: Option<String>,
    pub days_from_now: Option<String>,
    pub books: Option<String>,
    pub min_odds: Option<String>,
    pub max_odds: Option<String>,
    pub max_width: Option<String>,
    pub max_vig_pct: Option<String>,
    pub min_ev_pct: Option<String>,
    pub min_num_books: Option<String>,
    pub pref_ev_filter: Option<String>,
    pub sort_by: Option<String>,
    pub ascending: Option<String>,
    pub pref_ev_sort: Option<String>,
    pub expanded: Option<String>,
}

impl RawParams {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read `EV_*` options through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            sports: get("EV_SPORTS"),
            regions: get("EV_REGIONS"),
            markets: get("EV_MARKETS"),
            ev_type: get("EV_TYPE"),
            reference_book: get("EV_REFERENCE_BOOK"),
            reference_region: get("EV_REFERENCE_REGION"),
            recommended: get("EV_RECOMMENDED"),
            days_from_now: get("EV_DAYS_FROM_NOW"),
            books: get("EV_BOOKS"),
            min_odds: get("EV_MIN_ODDS"),
            max_odds: get("EV_MAX_ODDS"),
            max_width: get("EV_MAX_WIDTH"),
            max_vig_pct: get("EV_MAX_VIG_PCT"),
            min_ev_pct: get("EV_MIN_EV_PCT"),
            min_num_books: get("EV_MIN_NUM_BOOKS"),
            pref_ev_filter: get("EV_PREF_FILTER"),
            sort_by: get("EV_SORT_BY"),
            ascending: get("EV_ASCENDING"),
            pref_ev_sort: get("EV_PREF_SORT"),
            expanded: get("EV_EXPANDED"),
        }
    }

    pub fn validate(&self) -> Result<(Params, Vec<Diagnostic>)> {
        let mut diagnostics = Vec::new();

        let sports = match split_list(self.sports.as_deref()) {
            Some(list) if list.is_empty() => {
                return Err(PipelineError::InvalidList {
                    field: "sports",
                    reason: "must list at least one sport key".to_string(),
                })
            }
            other => other,
        };
        let regions =
            required_list("regions", self.regions.as_deref(), &Region::ALL, Region::parse)?;
        let markets = required_list("markets", self.markets.as_deref(), &MarketKind::ALL, |m| {
            MarketKind::from_key(m.trim())
        })?;
        let ev_type = match self.ev_type.as_deref() {
            None => EvType::Both,
            Some(raw) => EvType::parse(raw)
                .ok_or_else(|| PipelineError::UnknownEvType(raw.to_string()))?,
        };

        let reference_book = self
            .reference_book
            .as_deref()
            .map(|b| b.trim().to_string())
            .unwrap_or_else(|| DEFAULT_REFERENCE_BOOK.to_string());
        let reference_region = match self.reference_region.as_deref() {
            None => Region::Eu,
            Some(raw) => Region::parse(raw).unwrap_or_else(|| {
                let message = format!("'{}' is not a region, using eu", raw);
                degrade(&mut diagnostics, "reference_region", message);
                Region::Eu
            }),
        };

        let recommended = parse_flag("recommended", self.recommended.as_deref(), &mut diagnostics)
            .unwrap_or(false);

        let books = split_list(self.books.as_deref()).filter(|b| !b.is_empty());
        let mut filters = FilterSet {
            sports: sports.clone(),
            markets: Some(markets.clone()),
            books,
            max_vig_pct: parse_number(
                "max_vig_pct",
                self.max_vig_pct.as_deref(),
                &mut diagnostics,
            ),
            ..FilterSet::default()
        };
        let mut sort = SortSpec::default();
        let mut expanded = false;
        let requested_filter;
        let requested_side;

        if recommended {
            apply_recommended(&mut filters, &mut sort, &mut expanded);
            requested_filter = Some(filters.preference);
            requested_side = Some(sort.side);
        } else {
            let d = &mut diagnostics;
            filters.days_from_now = parse_days(self.days_from_now.as_deref(), d);
            filters.min_odds = parse_number("min_odds", self.min_odds.as_deref(), d);
            filters.max_odds = parse_number("max_odds", self.max_odds.as_deref(), d);
            filters.max_width = parse_number("max_width", self.max_width.as_deref(), d);
            filters.min_ev_pct = parse_number("min_ev_pct", self.min_ev_pct.as_deref(), d);
            filters.min_num_books = parse_number("min_num_books", self.min_num_books.as_deref(), d);

            requested_filter = self.pref_ev_filter.as_deref().and_then(|raw| {
                Preference::parse(raw).or_else(|| {
                    let message = format!("'{}' is not one of avg, reference, both", raw);
                    degrade(d, "pref_ev_filter", message);
                    None
                })
            });
            sort.key = match self.sort_by.as_deref() {
                None => SortBy::Default,
                Some(raw) => SortBy::parse(raw).unwrap_or_else(|| {
                    degrade(d, "sort_by", format!("'{}' is not a sort key, using default", raw));
                    SortBy::Default
                }),
            };
            sort.ascending = parse_flag("ascending", self.ascending.as_deref(), d).unwrap_or(false);
            requested_side = self.pref_ev_sort.as_deref().and_then(|raw| {
                BaselineSide::parse(raw).or_else(|| {
                    degrade(d, "pref_ev_sort", format!("'{}' must be avg or reference", raw));
                    None
                })
            });
            expanded = parse_flag("expanded", self.expanded.as_deref(), d).unwrap_or(false);
        }

        filters.preference =
            filter_preference(ev_type, requested_filter, &reference_book, &mut diagnostics);
        sort.side = sort_side(ev_type, requested_side, &reference_book, &mut diagnostics);

        let params = Params {
            sports,
            regions,
            markets,
            ev_type,
            reference_book,
            reference_region,
            recommended,
            filters,
            sort,
            expanded,
        };
        Ok((params, diagnostics))
    }
}

/// Validated options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Params {
    pub sports: Option<Vec<String>>,
    pub regions: Vec<Region>,
    pub markets: Vec<MarketKind>,
    pub ev_type: EvType,
    pub reference_book: String,
    pub reference_region: Region,
    pub recommended: bool,
    pub filters: FilterSet,
    pub sort: SortSpec,
    pub expanded: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            sports: None,
            regions: Region::ALL.to_vec(),
            markets: MarketKind::ALL.to_vec(),
            ev_type: EvType::Both,
            reference_book: DEFAULT_REFERENCE_BOOK.to_string(),
            reference_region: Region::Eu,
            recommended: false,
            filters: FilterSet::default(),
            sort: SortSpec::default(),
            expanded: false,
        }
    }
}

impl Params {
    /// A live pull must also cover the reference book's region.
    pub fn needs_reference_top_up(&self) -> bool {
        self.ev_type.wants_reference() && !self.regions.contains(&self.reference_region)
    }

    /// Drop allow-listed books that never appear in the data. An empty
    /// result disables the book filter.
    pub fn retain_known_books(&mut self, known: &BTreeSet<&str>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let Some(books) = self.filters.books.take() else {
            return diagnostics;
        };
        let mut kept = Vec::with_capacity(books.len());
        for book in books {
            if known.contains(book.as_str()) {
                kept.push(book);
            } else {
                let message = format!("'{}' is not a book in this data, ignored", book);
                degrade(&mut diagnostics, "books", message);
            }
        }
        self.filters.books = (!kept.is_empty()).then_some(kept);
        diagnostics
    }
}

/// Curated profile. Leaves the book allow-list and vig cap alone.
fn apply_recommended(filters: &mut FilterSet, sort: &mut SortSpec, expanded: &mut bool) {
    filters.days_from_now = Some(2);
    filters.min_odds = Some(-200.0);
    filters.max_odds = Some(200.0);
    filters.max_width = Some(45.0);
    filters.min_ev_pct = Some(1.0);
    filters.min_num_books = Some(4.0);
    filters.preference = Preference::Both;
    sort.key = SortBy::EvPct;
    sort.ascending = false;
    sort.side = BaselineSide::Average;
    *expanded = false;
}

fn filter_preference(
    ev_type: EvType,
    requested: Option<Preference>,
    reference_book: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Preference {
    match (ev_type, requested) {
        (EvType::Both, requested) => requested.unwrap_or(Preference::Both),
        (EvType::Average, Some(Preference::Reference)) => {
            degrade(
                diagnostics,
                "pref_ev_filter",
                format!("{} EV is not computed when ev_type is avg, using avg", reference_book),
            );
            Preference::Average
        }
        (EvType::Reference, Some(Preference::Average)) => {
            degrade(
                diagnostics,
                "pref_ev_filter",
                format!(
                    "avg EV is not computed when ev_type is reference, using {}",
                    reference_book
                ),
            );
            Preference::Reference
        }
        (EvType::Average, _) => Preference::Average,
        (EvType::Reference, _) => Preference::Reference,
    }
}

fn sort_side(
    ev_type: EvType,
    requested: Option<BaselineSide>,
    reference_book: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> BaselineSide {
    match (ev_type, requested) {
        (EvType::Average, Some(BaselineSide::Reference)) => {
            degrade(
                diagnostics,
                "pref_ev_sort",
                format!("{} EV is not computed when ev_type is avg, using avg", reference_book),
            );
            BaselineSide::Average
        }
        (EvType::Reference, Some(BaselineSide::Average)) => {
            degrade(
                diagnostics,
                "pref_ev_sort",
                format!(
                    "avg EV is not computed when ev_type is reference, using {}",
                    reference_book
                ),
            );
            BaselineSide::Reference
        }
        (EvType::Reference, None) => BaselineSide::Reference,
        (_, requested) => requested.unwrap_or(BaselineSide::Average),
    }
}

fn split_list(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

fn required_list<T: Copy + Ord>(
    field: &'static str,
    raw: Option<&str>,
    default: &[T],
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>> {
    let Some(items) = split_list(raw) else {
        return Ok(default.to_vec());
    };
    if items.is_empty() {
        return Err(PipelineError::InvalidList {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in &items {
        let value = parse(item).ok_or_else(|| PipelineError::InvalidList {
            field,
            reason: format!("'{}' is not recognised", item),
        })?;
        if !out.contains(&value) {
            out.push(value);
        }
    }
    Ok(out)
}

fn parse_number(
    field: &'static str,
    raw: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<f64> {
    let raw = raw?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            degrade(diagnostics, field, format!("'{}' is not a number, filter ignored", raw));
            None
        }
    }
}

fn parse_days(raw: Option<&str>, diagnostics: &mut Vec<Diagnostic>) -> Option<i64> {
    let days = parse_number("days_from_now", raw, diagnostics)?;
    if !(0.0..=MAX_DAYS_FROM_NOW).contains(&days) {
        let message = format!(
            "{} must be between 0 and {}, filter ignored",
            days, MAX_DAYS_FROM_NOW
        );
        degrade(diagnostics, "days_from_now", message);
        return None;
    }
    Some(days.trunc() as i64)
}

fn parse_flag(
    field: &'static str,
    raw: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<bool> {
    let raw = raw?;
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            degrade(diagnostics, field, format!("'{}' is not a boolean, using false", raw));
            None
        }
    }
}
