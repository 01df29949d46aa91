//! Event -> bookmaker -> market -> outcome expansion into [`FlatRow`]s.

use tracing::{debug, info, warn};

use crate::model::{Bookmaker, FlatRow, Market, MarketKind, OddsApiEvent, Point};

/// Outcome lines seen and why the ones that did not become rows were dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlattenStats {
    pub events: usize,
    pub outcomes_seen: usize,
    pub rows: usize,
    pub dropped_missing_event_id: usize,
    pub dropped_missing_start: usize,
    pub dropped_missing_book: usize,
    pub dropped_missing_market: usize,
    pub dropped_missing_price: usize,
    pub rejected_zero_price: usize,
    pub skipped_lay: usize,
    pub skipped_unknown_market: usize,
}

impl FlattenStats {
    pub fn dropped(&self) -> usize {
        self.outcomes_seen - self.rows
    }
}

/// Expand events into one row per outcome line.
pub fn flatten_events(events: &[OddsApiEvent]) -> (Vec<FlatRow>, FlattenStats) {
    let mut rows = Vec::new();
    let mut stats = FlattenStats {
        events: events.len(),
        ..FlattenStats::default()
    };

    for event in events {
        let outcome_count = count_outcomes(&event.bookmakers);
        stats.outcomes_seen += outcome_count;

        if event.id.trim().is_empty() {
            stats.dropped_missing_event_id += outcome_count;
            debug!("Dropping {} outcome lines of an event without id", outcome_count);
            continue;
        }
        let Some(commence_time) = event.commence_time else {
            stats.dropped_missing_start += outcome_count;
            debug!("Dropping event {}: no commence_time", event.id);
            continue;
        };

        for bookmaker in &event.bookmakers {
            if bookmaker.key.trim().is_empty() {
                stats.dropped_missing_book += count_outcomes(std::slice::from_ref(bookmaker));
                debug!("Dropping bookmaker without key on event {}", event.id);
                continue;
            }

            for market in &bookmaker.markets {
                let Some(kind) = classify_market(market, &mut stats) else {
                    continue;
                };

                for outcome in &market.outcomes {
                    let price = match outcome.price {
                        Some(0) => {
                            stats.rejected_zero_price += 1;
                            warn!(
                                "Rejecting zero price: event={} book={} market={} position={}",
                                event.id, bookmaker.key, kind, outcome.name
                            );
                            continue;
                        }
                        Some(p) => p,
                        None => {
                            stats.dropped_missing_price += 1;
                            continue;
                        }
                    };

                    rows.push(FlatRow {
                        event_id: event.id.clone(),
                        sport_key: event.sport_key.clone(),
                        sport_title: event.sport_title.clone(),
                        commence_time,
                        home_team: event.home_team.clone(),
                        away_team: event.away_team.clone(),
                        book_key: bookmaker.key.clone(),
                        book_title: bookmaker.title.clone(),
                        market: kind,
                        position: outcome.name.clone(),
                        price,
                        point: outcome.point.filter(|p| p.is_finite()).map(Point::new),
                    });
                }
            }
        }
    }

    stats.rows = rows.len();
    info!(
        "Flattened {} events into {} rows ({} outcome lines dropped)",
        stats.events,
        stats.rows,
        stats.dropped()
    );
    (rows, stats)
}

fn classify_market(market: &Market, stats: &mut FlattenStats) -> Option<MarketKind> {
    let n = market.outcomes.len();
    if market.key.trim().is_empty() {
        stats.dropped_missing_market += n;
        return None;
    }
    if MarketKind::is_lay_key(&market.key) {
        stats.skipped_lay += n;
        return None;
    }
    match MarketKind::from_key(&market.key) {
        Some(kind) => Some(kind),
        None => {
            stats.skipped_unknown_market += n;
            debug!("Skipping unsupported market '{}'", market.key);
            None
        }
    }
}

fn count_outcomes(bookmakers: &[Bookmaker]) -> usize {
    bookmakers
        .iter()
        .flat_map(|b| b.markets.iter())
        .map(|m| m.outcomes.len())
        .sum()
}
