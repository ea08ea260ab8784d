//! Live score and status derivation.
//!
//! This module handles:
//! - Folding all event info records for one event into a typed snapshot
//! - Participant-id resolution of values to the home or away side
//! - Status, clock, serving and card extraction by type code
//!
//! Event info rows are positional: `param_float1` belongs to
//! `param_participant_id1` and so on. The feed does not guarantee the
//! home side arrives in slot one, so values are mapped through the
//! owning match's participant ids whenever the match is available.

pub mod parts;

use std::collections::BTreeMap;

use tracing::debug;

use crate::records::{EventInfoRecord, MatchRecord};
use crate::store::EntityStore;
use parts::PartKind;

/// Type code for score rows.
pub const TYPE_SCORE: &str = "1";
/// Type code for yellow card counts.
pub const TYPE_YELLOW_CARDS: &str = "2";
/// Type code for second-yellow red card counts.
pub const TYPE_YELLOW_RED_CARDS: &str = "3";
/// Type code for straight red card counts.
pub const TYPE_RED_CARDS: &str = "4";
/// Type code for the serving side.
pub const TYPE_SERVING: &str = "37";
/// Type code for the textual event status.
pub const TYPE_EVENT_STATUS: &str = "92";
/// Type code for elapsed match time.
pub const TYPE_MATCH_TIME: &str = "95";

/// One side of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The home participant.
    Home,
    /// The away participant.
    Away,
}

/// Lifecycle phase of a live event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPhase {
    /// Not yet under way.
    NotStarted,
    /// Running; carries the current part name when the feed names one.
    InProgress(String),
    /// Over, one way or another; carries the closing reason.
    Ended(String),
}

/// Score entry for one named event part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartScore {
    /// The whole-match score line.
    Full {
        /// Home tally, when resolved.
        home: Option<u32>,
        /// Away tally, when resolved.
        away: Option<u32>,
    },
    /// A set or inning score with its ordinal index.
    Part {
        /// 1-based part index.
        index: u32,
        /// Home tally, when resolved.
        home: Option<u32>,
        /// Away tally, when resolved.
        away: Option<u32>,
    },
}

/// Card counts per side for one card color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardCounts {
    /// Cards shown to the home side.
    pub home: Option<u32>,
    /// Cards shown to the away side.
    pub away: Option<u32>,
}

impl CardCounts {
    /// True when at least one side has a count.
    pub fn any(&self) -> bool {
        self.home.is_some() || self.away.is_some()
    }
}

/// Everything currently known about one live event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSnapshot {
    /// Event id the snapshot describes.
    pub event_id: String,
    /// Primary home score (whole-match line).
    pub home_score: Option<u32>,
    /// Primary away score (whole-match line).
    pub away_score: Option<u32>,
    /// Elapsed minutes for clock-driven sports.
    pub clock_minutes: Option<u32>,
    /// Lifecycle phase, when the feed has reported one.
    pub phase: Option<EventPhase>,
    /// Per-part scores keyed by part display name.
    pub scores: BTreeMap<String, PartScore>,
    /// Which side is serving, for racquet sports.
    pub serving: Option<Side>,
    /// Yellow cards per side.
    pub yellow_cards: Option<CardCounts>,
    /// Second-yellow reds per side.
    pub yellow_red_cards: Option<CardCounts>,
    /// Straight reds per side.
    pub red_cards: Option<CardCounts>,
}

impl LiveSnapshot {
    fn empty(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            home_score: None,
            away_score: None,
            clock_minutes: None,
            phase: None,
            scores: BTreeMap::new(),
            serving: None,
            yellow_cards: None,
            yellow_red_cards: None,
            red_cards: None,
        }
    }

    /// Cards of all colors summed per side, if any were reported.
    pub fn total_cards(&self) -> Option<CardCounts> {
        let mut total = CardCounts::default();
        for counts in [self.yellow_cards, self.yellow_red_cards, self.red_cards]
            .into_iter()
            .flatten()
        {
            if let Some(home) = counts.home {
                total.home = Some(total.home.unwrap_or(0) + home);
            }
            if let Some(away) = counts.away {
                total.away = Some(total.away.unwrap_or(0) + away);
            }
        }
        total.any().then_some(total)
    }
}

/// Derive the live snapshot for an event from store state.
///
/// Returns `None` when no event info rows are known for the id. The
/// owning match record is looked up for participant resolution but is
/// not required.
pub fn derive(store: &EntityStore, event_id: &str) -> Option<LiveSnapshot> {
    let infos: Vec<EventInfoRecord> = store
        .all_ordered::<EventInfoRecord>()
        .into_iter()
        .filter(|info| info.event_id == event_id)
        .collect();
    if infos.is_empty() {
        return None;
    }
    let owner: Option<MatchRecord> = store.get(event_id);
    Some(build(event_id, &infos, owner.as_ref()))
}

/// Fold event info rows into a snapshot, in delivery order.
pub fn build(event_id: &str, infos: &[EventInfoRecord], owner: Option<&MatchRecord>) -> LiveSnapshot {
    let mut snapshot = LiveSnapshot::empty(event_id);

    for info in infos {
        match info.type_id.as_str() {
            TYPE_SCORE => apply_score(info, owner, &mut snapshot),
            TYPE_YELLOW_CARDS => snapshot.yellow_cards = card_counts(info, owner),
            TYPE_YELLOW_RED_CARDS => snapshot.yellow_red_cards = card_counts(info, owner),
            TYPE_RED_CARDS => snapshot.red_cards = card_counts(info, owner),
            TYPE_SERVING => snapshot.serving = serving_side(info, owner),
            TYPE_EVENT_STATUS => snapshot.phase = event_phase(info),
            TYPE_MATCH_TIME => snapshot.clock_minutes = info.param_float1.map(|m| m as u32),
            other => {
                debug!(type_id = other, event_id, "ignoring unknown event info type");
            }
        }
    }

    snapshot
}

/// Fold one score row into the snapshot.
///
/// Rows often carry a single side's value, so part entries merge: a row
/// that resolves only the away value must not wipe a previously seen
/// home value for the same part.
fn apply_score(info: &EventInfoRecord, owner: Option<&MatchRecord>, snapshot: &mut LiveSnapshot) {
    let (home, away) = participant_values(info, owner);

    match parts::classify(info.event_part_id.as_deref(), info.event_part_name.as_deref()) {
        PartKind::WholeMatch => {
            let name = info
                .event_part_name
                .clone()
                .unwrap_or_else(|| parts::WHOLE_MATCH_NAME.to_string());
            let entry = snapshot
                .scores
                .entry(name)
                .or_insert(PartScore::Full { home: None, away: None });
            if let PartScore::Full { home: h, away: a } = entry {
                if home.is_some() {
                    *h = home;
                }
                if away.is_some() {
                    *a = away;
                }
                snapshot.home_score = *h;
                snapshot.away_score = *a;
            }
        }
        PartKind::Set(index) | PartKind::Inning(index) => {
            let Some(name) = info.event_part_name.clone() else {
                return;
            };
            let entry = snapshot.scores.entry(name).or_insert(PartScore::Part {
                index,
                home: None,
                away: None,
            });
            if let PartScore::Part { home: h, away: a, .. } = entry {
                if home.is_some() {
                    *h = home;
                }
                if away.is_some() {
                    *a = away;
                }
            }
        }
        PartKind::Unrecognized => {}
    }
}

/// Resolve a row's positional values to sides.
///
/// With the match at hand, values are assigned strictly by participant
/// id; a value whose participant matches neither side is dropped.
/// Without the match, slot one is taken as home.
fn participant_values(
    info: &EventInfoRecord,
    owner: Option<&MatchRecord>,
) -> (Option<u32>, Option<u32>) {
    let Some(owner) = owner else {
        return (
            info.param_float1.map(|v| v as u32),
            info.param_float2.map(|v| v as u32),
        );
    };

    let mut home = None;
    let mut away = None;
    let slots = [
        (info.param_participant_id1.as_deref(), info.param_float1),
        (info.param_participant_id2.as_deref(), info.param_float2),
    ];
    for (participant, value) in slots {
        let (Some(participant), Some(value)) = (participant, value) else {
            continue;
        };
        match side_of(participant, owner) {
            Some(Side::Home) => home = Some(value as u32),
            Some(Side::Away) => away = Some(value as u32),
            None => {
                debug!(
                    participant,
                    event_id = %info.event_id,
                    "event info participant matches neither side"
                );
            }
        }
    }
    (home, away)
}

fn side_of(participant_id: &str, owner: &MatchRecord) -> Option<Side> {
    if owner.home_participant_id.as_deref() == Some(participant_id) {
        return Some(Side::Home);
    }
    if owner.away_participant_id.as_deref() == Some(participant_id) {
        return Some(Side::Away);
    }
    None
}

/// Card rows have no positional fallback: without the match they stay unmapped.
fn card_counts(info: &EventInfoRecord, owner: Option<&MatchRecord>) -> Option<CardCounts> {
    owner?;
    let (home, away) = participant_values(info, owner);
    let counts = CardCounts { home, away };
    counts.any().then_some(counts)
}

fn serving_side(info: &EventInfoRecord, owner: Option<&MatchRecord>) -> Option<Side> {
    side_of(info.param_participant_id1.as_deref()?, owner?)
}

fn event_phase(info: &EventInfoRecord) -> Option<EventPhase> {
    let status = info.param_event_status_name1.as_deref()?.to_lowercase();
    let reason = || {
        info.param_event_part_name1
            .clone()
            .unwrap_or_else(|| status.clone())
    };
    Some(match status.as_str() {
        "pending" | "not started" | "not_started" => EventPhase::NotStarted,
        "ended" | "interrupted" | "canceled" | "cancelled" | "walkover" | "abandoned"
        | "retired" => EventPhase::Ended(reason()),
        _ => EventPhase::InProgress(reason()),
    })
}
