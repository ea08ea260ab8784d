//! Hierarchical aggregates derived from the flat store.
//!
//! This module handles:
//! - Nested view types (match → markets → outcomes → offers)
//! - Pure build functions walking foreign keys in insertion order
//!
//! Aggregates are never stored; they are recomputed from store state on
//! demand and must tolerate partial graphs while records trickle in.

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::records::{
    BettingOfferRecord, EventCategoryRecord, LocationRecord, MainMarketRecord,
    MarketOutcomeRelationRecord, MarketRecord, MatchRecord, NextMatchesNumberRecord, OutcomeRecord,
    SportRecord, TournamentRecord,
};
use crate::store::EntityStore;

/// One side of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Participant id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
}

/// A priced offer attached to an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BettingOffer {
    /// Offer id.
    pub id: String,
    /// Decimal odds.
    pub odds: Decimal,
    /// Open for betting; absent on the wire means open.
    pub is_available: bool,
    /// Belongs to a live market.
    pub is_live: bool,
    /// Last odds change.
    pub last_changed: Option<OffsetDateTime>,
}

/// A selectable outcome with its current offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Outcome id.
    pub id: String,
    /// Display name (falls back to the outcome code).
    pub name: String,
    /// Stable outcome code (e.g. "1", "X", "2").
    pub code: Option<String>,
    /// Column header name for grid layouts.
    pub header: Option<String>,
    /// Offers in first-seen order.
    pub offers: Vec<BettingOffer>,
}

/// A market with its outcomes resolved through relation records.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    /// Market id.
    pub id: String,
    /// Display name (falls back to the betting type name).
    pub name: String,
    /// Betting type id.
    pub betting_type_id: Option<String>,
    /// Event part this market prices.
    pub event_part_id: Option<String>,
    /// Event part display name.
    pub event_part_name: Option<String>,
    /// Whether the market is open for betting.
    pub is_available: bool,
    /// Line value for handicap/total markets.
    pub line: Option<f64>,
    /// Outcomes in first-seen order.
    pub outcomes: Vec<Outcome>,
}

/// A match with its full market tree and resolved leaf references.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Match id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Scheduled start.
    pub start_time: Option<OffsetDateTime>,
    /// Textual status from the feed.
    pub status_name: Option<String>,
    /// Home side; absent for outrights.
    pub home: Option<Participant>,
    /// Away side; absent for outrights.
    pub away: Option<Participant>,
    /// Owning sport, when its record has arrived.
    pub sport: Option<SportRecord>,
    /// Venue, when its record has arrived.
    pub venue: Option<LocationRecord>,
    /// Category, when its record has arrived.
    pub category: Option<EventCategoryRecord>,
    /// Tournament, when its record has arrived.
    pub tournament: Option<TournamentRecord>,
    /// Whether live odds are offered.
    pub allows_live_odds: bool,
    /// Markets in first-seen order.
    pub markets: Vec<Market>,
}

/// A headline market column from the per-sport catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainMarket {
    /// Catalog entry id.
    pub id: String,
    /// Sport the column applies to.
    pub sport_id: String,
    /// Betting type the column selects.
    pub betting_type_id: String,
    /// Event part the column selects.
    pub event_part_id: String,
    /// Column display name.
    pub name: Option<String>,
    /// Applies to live events.
    pub live_market: bool,
}

/// Everything one feed emission carries.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    /// Matches in first-seen order.
    pub matches: Vec<Match>,
    /// Main-market columns in first-seen order.
    pub main_markets: Vec<MainMarket>,
    /// Events available beyond the current window, if advertised.
    pub upcoming_count: Option<u32>,
}

fn epoch_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

/// Build the aggregate for one match record.
pub fn build_match(store: &EntityStore, record: &MatchRecord) -> Match {
    let markets = store
        .all_ordered::<MarketRecord>()
        .into_iter()
        .filter(|m| m.event_id == record.id)
        .map(|m| build_market(store, &m))
        .collect();

    let participant = |id: &Option<String>, name: &Option<String>| {
        id.as_ref().map(|id| Participant {
            id: id.clone(),
            name: name.clone(),
        })
    };

    Match {
        id: record.id.clone(),
        name: record.name.clone(),
        start_time: epoch_ms(record.start_time),
        status_name: record.status_name.clone(),
        home: participant(&record.home_participant_id, &record.home_participant_name),
        away: participant(&record.away_participant_id, &record.away_participant_name),
        sport: store.get(&record.sport_id),
        venue: record.venue_id.as_deref().and_then(|id| store.get(id)),
        category: record.category_id.as_deref().and_then(|id| store.get(id)),
        tournament: record.parent_id.as_deref().and_then(|id| store.get(id)),
        allows_live_odds: record.allows_live_odds.unwrap_or(false),
        markets,
    }
}

/// Build the aggregate for a match id, if the match is known.
pub fn build_match_by_id(store: &EntityStore, id: &str) -> Option<Match> {
    let record: MatchRecord = store.get(id)?;
    Some(build_match(store, &record))
}

/// Build all known matches in first-seen order.
pub fn build_matches(store: &EntityStore) -> Vec<Match> {
    store
        .all_ordered::<MatchRecord>()
        .iter()
        .map(|record| build_match(store, record))
        .collect()
}

/// Build a market with outcomes resolved through relation records.
pub fn build_market(store: &EntityStore, record: &MarketRecord) -> Market {
    let related: Vec<String> = store
        .all::<MarketOutcomeRelationRecord>()
        .into_iter()
        .filter(|rel| rel.market_id == record.id)
        .map(|rel| rel.outcome_id)
        .collect();

    let outcomes = store
        .all_ordered::<OutcomeRecord>()
        .into_iter()
        .filter(|o| related.iter().any(|id| id == &o.id))
        .map(|o| build_outcome(store, &o))
        .collect();

    Market {
        id: record.id.clone(),
        name: record
            .name
            .clone()
            .or_else(|| record.betting_type_name.clone())
            .unwrap_or_default(),
        betting_type_id: record.betting_type_id.clone(),
        event_part_id: record.event_part_id.clone(),
        event_part_name: record.event_part_name.clone(),
        is_available: record.is_available.unwrap_or(true),
        line: record.param_float1,
        outcomes,
    }
}

/// Build an outcome with its offers in first-seen order.
pub fn build_outcome(store: &EntityStore, record: &OutcomeRecord) -> Outcome {
    let offers = store
        .all_ordered::<BettingOfferRecord>()
        .into_iter()
        .filter(|offer| offer.outcome_id == record.id)
        .map(|offer| BettingOffer {
            id: offer.id,
            odds: offer.odds,
            is_available: offer.is_available.unwrap_or(true),
            is_live: offer.is_live.unwrap_or(false),
            last_changed: offer.last_changed_time.and_then(epoch_ms),
        })
        .collect();

    Outcome {
        id: record.id.clone(),
        name: record
            .translated_name
            .clone()
            .or_else(|| record.code.clone())
            .unwrap_or_default(),
        code: record.code.clone(),
        header: record.header_name.clone(),
        offers,
    }
}

/// Build the full feed snapshot: matches plus the main-market catalog.
pub fn build_snapshot(store: &EntityStore) -> FeedSnapshot {
    let main_markets = store
        .all_ordered::<MainMarketRecord>()
        .into_iter()
        .map(|mm| MainMarket {
            id: mm.id,
            sport_id: mm.sport_id,
            betting_type_id: mm.betting_type_id,
            event_part_id: mm.event_part_id,
            name: mm.betting_type_name,
            live_market: mm.live_market.unwrap_or(false),
        })
        .collect();

    let upcoming_count = store
        .all_ordered::<NextMatchesNumberRecord>()
        .first()
        .and_then(|n| n.number_of_next_events);

    FeedSnapshot {
        matches: build_matches(store),
        main_markets,
        upcoming_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::EntityRecord;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn store_all(store: &EntityStore, records: Vec<EntityRecord>) {
        let mut txn = store.begin();
        for record in records {
            txn.insert(record);
        }
        txn.commit();
    }

    fn match_rec(id: &str, sport_id: &str) -> EntityRecord {
        MatchRecord {
            id: id.into(),
            sport_id: sport_id.into(),
            name: format!("match {id}"),
            short_name: None,
            start_time: 1_700_000_000_000,
            status_id: None,
            status_name: Some("Not started".into()),
            home_participant_id: Some("p1".into()),
            away_participant_id: Some("p2".into()),
            home_participant_name: Some("Alpha".into()),
            away_participant_name: Some("Beta".into()),
            venue_id: Some("loc1".into()),
            category_id: None,
            parent_id: Some("t1".into()),
            allows_live_odds: Some(true),
            number_of_markets: None,
        }
        .into()
    }

    fn market_rec(id: &str, event_id: &str) -> EntityRecord {
        MarketRecord {
            id: id.into(),
            event_id: event_id.into(),
            name: Some(format!("market {id}")),
            betting_type_id: Some("bt1".into()),
            betting_type_name: Some("Match Odds".into()),
            event_part_id: Some("2".into()),
            event_part_name: Some("Whole Match".into()),
            is_available: Some(true),
            main_line: None,
            param_float1: None,
        }
        .into()
    }

    fn outcome_rec(id: &str, event_id: &str, name: &str) -> EntityRecord {
        OutcomeRecord {
            id: id.into(),
            event_id: event_id.into(),
            translated_name: Some(name.into()),
            code: Some(name.into()),
            header_name: None,
            param_participant_id1: None,
            param_float1: None,
            status_id: None,
        }
        .into()
    }

    fn relation_rec(id: &str, market_id: &str, outcome_id: &str) -> EntityRecord {
        MarketOutcomeRelationRecord {
            id: id.into(),
            market_id: market_id.into(),
            outcome_id: outcome_id.into(),
        }
        .into()
    }

    fn offer_rec(id: &str, outcome_id: &str, odds: Decimal) -> EntityRecord {
        BettingOfferRecord {
            id: id.into(),
            outcome_id: outcome_id.into(),
            odds,
            is_available: Some(true),
            is_live: None,
            last_changed_time: Some(1_700_000_001_000),
            provider_id: None,
            status_id: None,
        }
        .into()
    }

    fn populated_store() -> EntityStore {
        let store = EntityStore::new();
        store_all(
            &store,
            vec![
                SportRecord {
                    id: "s1".into(),
                    name: "Football".into(),
                    short_name: None,
                    number_of_events: None,
                    number_of_live_events: None,
                }
                .into(),
                match_rec("m1", "s1"),
                market_rec("mk1", "m1"),
                market_rec("mk2", "m1"),
                outcome_rec("o1", "m1", "1"),
                outcome_rec("o2", "m1", "X"),
                outcome_rec("o3", "m1", "2"),
                relation_rec("r1", "mk1", "o1"),
                relation_rec("r2", "mk1", "o2"),
                relation_rec("r3", "mk1", "o3"),
                offer_rec("bo1", "o1", dec!(1.85)),
                offer_rec("bo2", "o2", dec!(3.40)),
                offer_rec("bo3", "o3", dec!(4.20)),
            ],
        );
        store
    }

    #[test]
    fn builds_full_tree_in_insertion_order() {
        let store = populated_store();
        let built = build_match_by_id(&store, "m1").unwrap();

        assert_eq!(built.name, "match m1");
        assert_eq!(built.sport.as_ref().unwrap().name, "Football");
        assert_eq!(built.home.as_ref().unwrap().name.as_deref(), Some("Alpha"));

        let ids: Vec<&str> = built.markets.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["mk1", "mk2"]);

        let mk1 = &built.markets[0];
        let outcome_ids: Vec<&str> = mk1.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(outcome_ids, vec!["o1", "o2", "o3"]);
        assert_eq!(mk1.outcomes[0].offers[0].odds, dec!(1.85));

        // mk2 has no relations yet
        assert!(built.markets[1].outcomes.is_empty());
    }

    #[test]
    fn tolerates_missing_leaf_records() {
        let store = EntityStore::new();
        store_all(&store, vec![match_rec("m1", "s-missing")]);

        let built = build_match_by_id(&store, "m1").unwrap();
        assert!(built.sport.is_none());
        assert!(built.venue.is_none());
        assert!(built.tournament.is_none());
        assert!(built.markets.is_empty());
    }

    #[test]
    fn relation_to_absent_outcome_is_skipped() {
        let store = EntityStore::new();
        store_all(
            &store,
            vec![
                match_rec("m1", "s1"),
                market_rec("mk1", "m1"),
                relation_rec("r1", "mk1", "o-missing"),
            ],
        );

        let built = build_match_by_id(&store, "m1").unwrap();
        assert!(built.markets[0].outcomes.is_empty());
    }

    #[test]
    fn building_is_pure_given_identical_store() {
        let store = populated_store();
        assert_eq!(build_matches(&store), build_matches(&store));
    }

    #[test]
    fn unknown_match_id_builds_nothing() {
        let store = EntityStore::new();
        assert!(build_match_by_id(&store, "nope").is_none());
    }

    #[test]
    fn snapshot_carries_main_market_catalog_in_order() {
        let store = populated_store();
        store_all(
            &store,
            vec![
                MainMarketRecord {
                    id: "mm2".into(),
                    sport_id: "s1".into(),
                    betting_type_id: "bt2".into(),
                    event_part_id: "2".into(),
                    betting_type_name: Some("Over/Under".into()),
                    event_part_name: None,
                    live_market: Some(false),
                    outright: None,
                }
                .into(),
                MainMarketRecord {
                    id: "mm1".into(),
                    sport_id: "s1".into(),
                    betting_type_id: "bt1".into(),
                    event_part_id: "2".into(),
                    betting_type_name: Some("Match Odds".into()),
                    event_part_name: None,
                    live_market: Some(false),
                    outright: None,
                }
                .into(),
                NextMatchesNumberRecord {
                    id: "n1".into(),
                    number_of_next_events: Some(42),
                }
                .into(),
            ],
        );

        let snapshot = build_snapshot(&store);
        let ids: Vec<&str> = snapshot.main_markets.iter().map(|m| m.id.as_str()).collect();
        // first-seen order, not id order
        assert_eq!(ids, vec!["mm2", "mm1"]);
        assert_eq!(snapshot.matches.len(), 1);
        assert_eq!(snapshot.upcoming_count, Some(42));
    }
}
