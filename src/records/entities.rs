//! Flat entity records as delivered by the feed.
//!
//! Every record is normalized: relationships are foreign-key id fields,
//! never embedded objects. The store keys records by `(kind, id)`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Entity kinds carried by the feed, tagged on the wire via `_type`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    /// A sport (football, tennis, ...).
    Sport,
    /// A match between two participants, or an outright event.
    Match,
    /// A betting market attached to a match.
    Market,
    /// A selectable outcome within a market.
    Outcome,
    /// A priced offer for one outcome.
    BettingOffer,
    /// A geographic location (country / region).
    Location,
    /// A grouping of tournaments below a sport.
    EventCategory,
    /// Join record linking a market to one of its outcomes.
    MarketOutcomeRelation,
    /// Per-sport catalog entry describing a headline market column.
    MainMarket,
    /// Free-form info blob attached to a market.
    MarketInfo,
    /// A tournament / league.
    Tournament,
    /// A live data point (score, card, clock, status) for one event.
    EventInfo,
    /// Display grouping of markets on detail surfaces.
    MarketGroup,
    /// Count of upcoming events for a filter.
    NextMatchesNumber,
}

/// A typed flat record with a stable id within its kind.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Kind this record type is stored under.
    const KIND: EntityKind;

    /// Record id, unique within the kind.
    fn id(&self) -> &str;

    /// Borrow this type out of a kind-erased record.
    fn from_record(record: &EntityRecord) -> Option<&Self>;

    /// Wrap into a kind-erased record.
    fn into_record(self) -> EntityRecord;
}

/// A sport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportRecord {
    /// Sport id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Abbreviated name.
    pub short_name: Option<String>,
    /// Total events currently offered.
    pub number_of_events: Option<u32>,
    /// Events currently live.
    pub number_of_live_events: Option<u32>,
}

/// A match (or outright event) within a sport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// Match id.
    pub id: String,
    /// Owning sport id.
    pub sport_id: String,
    /// Display name, usually "Home vs Away".
    pub name: String,
    /// Abbreviated name.
    pub short_name: Option<String>,
    /// Scheduled start (epoch milliseconds).
    pub start_time: i64,
    /// Status id from the feed.
    pub status_id: Option<String>,
    /// Textual status from the feed.
    pub status_name: Option<String>,
    /// Home participant id; absent for outrights.
    pub home_participant_id: Option<String>,
    /// Away participant id; absent for outrights.
    pub away_participant_id: Option<String>,
    /// Home participant display name.
    pub home_participant_name: Option<String>,
    /// Away participant display name.
    pub away_participant_name: Option<String>,
    /// Venue (Location) id.
    pub venue_id: Option<String>,
    /// EventCategory id.
    pub category_id: Option<String>,
    /// Owning tournament id.
    pub parent_id: Option<String>,
    /// Whether live odds are offered for this match.
    pub allows_live_odds: Option<bool>,
    /// Number of markets currently open.
    pub number_of_markets: Option<u32>,
}

/// A betting market attached to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    /// Market id.
    pub id: String,
    /// Owning match id.
    pub event_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Betting type id (e.g. "Match Odds").
    pub betting_type_id: Option<String>,
    /// Betting type display name.
    pub betting_type_name: Option<String>,
    /// Event part this market prices (e.g. whole match, 1st half).
    pub event_part_id: Option<String>,
    /// Event part display name.
    pub event_part_name: Option<String>,
    /// Whether the market is currently open for betting.
    pub is_available: Option<bool>,
    /// Whether this is the main line among same-typed markets.
    pub main_line: Option<bool>,
    /// Line value for handicap/total markets.
    pub param_float1: Option<f64>,
}

/// A selectable outcome within a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    /// Outcome id.
    pub id: String,
    /// Owning match id.
    pub event_id: String,
    /// Localized display name.
    pub translated_name: Option<String>,
    /// Stable outcome code (e.g. "1", "X", "2").
    pub code: Option<String>,
    /// Column header name for grid layouts.
    pub header_name: Option<String>,
    /// Participant this outcome refers to, if any.
    pub param_participant_id1: Option<String>,
    /// Line value echoed from the market.
    pub param_float1: Option<f64>,
    /// Status id from the feed.
    pub status_id: Option<String>,
}

/// A priced offer for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BettingOfferRecord {
    /// Offer id.
    pub id: String,
    /// Outcome this offer prices.
    pub outcome_id: String,
    /// Decimal odds.
    pub odds: Decimal,
    /// Whether the offer is open for betting.
    pub is_available: Option<bool>,
    /// Whether the offer belongs to a live market.
    pub is_live: Option<bool>,
    /// Last odds change (epoch milliseconds).
    pub last_changed_time: Option<i64>,
    /// Upstream provider id.
    pub provider_id: Option<String>,
    /// Status id from the feed.
    pub status_id: Option<String>,
}

/// A geographic location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Location id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Abbreviated name.
    pub short_name: Option<String>,
    /// ISO-ish country/region code.
    pub code: Option<String>,
}

/// A grouping of tournaments below a sport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCategoryRecord {
    /// Category id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning sport id.
    pub sport_id: Option<String>,
    /// Abbreviated name.
    pub short_name: Option<String>,
}

/// A tournament / league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRecord {
    /// Tournament id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning sport id.
    pub sport_id: Option<String>,
    /// Abbreviated name.
    pub short_name: Option<String>,
    /// First event start (epoch milliseconds).
    pub start_time: Option<i64>,
    /// Last event end (epoch milliseconds).
    pub end_time: Option<i64>,
}

/// Join record linking a market to one of its outcomes.
///
/// Outcome membership resolves through these rather than through fields
/// on the outcome itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOutcomeRelationRecord {
    /// Relation id.
    pub id: String,
    /// Market side of the join.
    pub market_id: String,
    /// Outcome side of the join.
    pub outcome_id: String,
}

/// Per-sport catalog entry describing a headline market column.
///
/// First-seen order of these records defines column layout downstream,
/// which is why the store preserves insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainMarketRecord {
    /// Catalog entry id.
    pub id: String,
    /// Sport this column applies to.
    pub sport_id: String,
    /// Betting type id the column selects.
    pub betting_type_id: String,
    /// Event part id the column selects.
    pub event_part_id: String,
    /// Betting type display name.
    pub betting_type_name: Option<String>,
    /// Event part display name.
    pub event_part_name: Option<String>,
    /// Whether the column applies to live events.
    pub live_market: Option<bool>,
    /// Whether the column applies to outrights.
    pub outright: Option<bool>,
}

/// Free-form info blob attached to a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfoRecord {
    /// Info id (matches the market id).
    pub id: String,
    /// Info text.
    pub market_info: Option<String>,
    /// Lookup key for localized rendering.
    pub display_key: Option<String>,
}

/// Display grouping of markets on detail surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketGroupRecord {
    /// Group id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Owning sport id.
    pub sport_id: Option<String>,
    /// Display position.
    pub position: Option<u32>,
}

/// A live data point for one event.
///
/// `type_id` selects the interpretation (score, card, clock, status,
/// serving side); the `param_*` fields are positional payload slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfoRecord {
    /// Record id.
    pub id: String,
    /// Event this data point belongs to.
    pub event_id: String,
    /// Data point type code.
    pub type_id: String,
    /// Event part id the value applies to.
    pub event_part_id: Option<String>,
    /// Event part display name.
    pub event_part_name: Option<String>,
    /// First numeric payload slot.
    pub param_float1: Option<f64>,
    /// Second numeric payload slot.
    pub param_float2: Option<f64>,
    /// First participant reference.
    pub param_participant_id1: Option<String>,
    /// Second participant reference.
    pub param_participant_id2: Option<String>,
    /// Textual status payload.
    pub param_event_status_name1: Option<String>,
    /// Part name accompanying a status payload (e.g. "2nd Half").
    pub param_event_part_name1: Option<String>,
}

/// Count of upcoming events for a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextMatchesNumberRecord {
    /// Record id.
    pub id: String,
    /// Number of events behind the current window.
    pub number_of_next_events: Option<u32>,
}

// One variant per entity kind; variant names deliberately mirror
// `EntityKind` so the macro can tie record types to their kind.
macro_rules! entity_records {
    ($($variant:ident($record:ty)),+ $(,)?) => {
        /// Kind-erased stored record.
        #[derive(Debug, Clone, PartialEq)]
        pub enum EntityRecord {
            $(
                #[doc = concat!("A `", stringify!($variant), "` record.")]
                $variant($record),
            )+
        }

        impl EntityRecord {
            /// Kind of the wrapped record.
            pub fn kind(&self) -> EntityKind {
                match self {
                    $(Self::$variant(_) => EntityKind::$variant,)+
                }
            }

            /// Id of the wrapped record.
            pub fn id(&self) -> &str {
                match self {
                    $(Self::$variant(r) => &r.id,)+
                }
            }

            /// Serialize the wrapped record to a JSON object.
            pub fn to_value(&self) -> serde_json::Result<Value> {
                match self {
                    $(Self::$variant(r) => serde_json::to_value(r),)+
                }
            }

            /// Decode a record of a known kind from a JSON value.
            ///
            /// Extra fields (including the wire `_type` tag) are ignored.
            pub fn from_tagged_value(kind: EntityKind, value: Value) -> serde_json::Result<Self> {
                Ok(match kind {
                    $(EntityKind::$variant => Self::$variant(serde_json::from_value(value)?),)+
                })
            }
        }

        $(
            impl Entity for $record {
                const KIND: EntityKind = EntityKind::$variant;

                fn id(&self) -> &str {
                    &self.id
                }

                fn from_record(record: &EntityRecord) -> Option<&Self> {
                    match record {
                        EntityRecord::$variant(r) => Some(r),
                        _ => None,
                    }
                }

                fn into_record(self) -> EntityRecord {
                    EntityRecord::$variant(self)
                }
            }

            impl From<$record> for EntityRecord {
                fn from(record: $record) -> Self {
                    EntityRecord::$variant(record)
                }
            }
        )+
    };
}

entity_records! {
    Sport(SportRecord),
    Match(MatchRecord),
    Market(MarketRecord),
    Outcome(OutcomeRecord),
    BettingOffer(BettingOfferRecord),
    Location(LocationRecord),
    EventCategory(EventCategoryRecord),
    MarketOutcomeRelation(MarketOutcomeRelationRecord),
    MainMarket(MainMarketRecord),
    MarketInfo(MarketInfoRecord),
    Tournament(TournamentRecord),
    EventInfo(EventInfoRecord),
    MarketGroup(MarketGroupRecord),
    NextMatchesNumber(NextMatchesNumberRecord),
}

impl EntityRecord {
    /// Apply a changed-fields overlay, leaving absent fields untouched.
    ///
    /// The record round-trips through JSON so the overlay can address
    /// fields by wire name. Fails if the merged object no longer decodes
    /// as the record's kind; callers treat that as a skippable anomaly.
    pub fn merged_with(
        &self,
        changes: &serde_json::Map<String, Value>,
    ) -> serde_json::Result<Self> {
        let mut value = self.to_value()?;
        if let Value::Object(fields) = &mut value {
            for (key, change) in changes {
                fields.insert(key.clone(), change.clone());
            }
        }
        Self::from_tagged_value(self.kind(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn kind_tags_round_trip() {
        assert_eq!(EntityKind::BettingOffer.to_string(), "BETTING_OFFER");
        assert_eq!(
            EntityKind::from_str("MARKET_OUTCOME_RELATION").unwrap(),
            EntityKind::MarketOutcomeRelation
        );
        assert_eq!(
            EntityKind::from_str("NEXT_MATCHES_NUMBER").unwrap(),
            EntityKind::NextMatchesNumber
        );
        assert!(EntityKind::from_str("HALF_TIME_SCORE").is_err());
    }

    #[test]
    fn record_kind_and_id_match_wrapped() {
        let record: EntityRecord = BettingOfferRecord {
            id: "bo1".into(),
            outcome_id: "o1".into(),
            odds: dec!(1.85),
            is_available: Some(true),
            is_live: None,
            last_changed_time: None,
            provider_id: None,
            status_id: None,
        }
        .into();

        assert_eq!(record.kind(), EntityKind::BettingOffer);
        assert_eq!(record.id(), "bo1");
    }

    #[test]
    fn from_tagged_value_ignores_wire_tag() {
        let record = EntityRecord::from_tagged_value(
            EntityKind::Sport,
            json!({"_type": "SPORT", "id": "s1", "name": "Football"}),
        )
        .unwrap();

        assert_eq!(record.id(), "s1");
        let sport = SportRecord::from_record(&record).unwrap();
        assert_eq!(sport.name, "Football");
    }

    #[test]
    fn merged_with_overlays_only_named_fields() {
        let offer: EntityRecord = BettingOfferRecord {
            id: "bo1".into(),
            outcome_id: "o1".into(),
            odds: dec!(1.85),
            is_available: Some(true),
            is_live: Some(true),
            last_changed_time: Some(1),
            provider_id: Some("p1".into()),
            status_id: None,
        }
        .into();

        let mut changes = serde_json::Map::new();
        changes.insert("odds".into(), json!(2.10));
        changes.insert("lastChangedTime".into(), json!(2));

        let merged = offer.merged_with(&changes).unwrap();
        let merged = BettingOfferRecord::from_record(&merged).unwrap();

        assert_eq!(merged.odds, dec!(2.10));
        assert_eq!(merged.last_changed_time, Some(2));
        // untouched fields survive
        assert_eq!(merged.is_available, Some(true));
        assert_eq!(merged.provider_id.as_deref(), Some("p1"));
    }

    #[test]
    fn merged_with_is_idempotent() {
        let offer: EntityRecord = BettingOfferRecord {
            id: "bo1".into(),
            outcome_id: "o1".into(),
            odds: dec!(1.85),
            is_available: None,
            is_live: None,
            last_changed_time: None,
            provider_id: None,
            status_id: None,
        }
        .into();

        let mut changes = serde_json::Map::new();
        changes.insert("odds".into(), json!(3.25));

        let once = offer.merged_with(&changes).unwrap();
        let twice = once.merged_with(&changes).unwrap();
        assert_eq!(once, twice);
    }
}
