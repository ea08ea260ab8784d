//! Event part classification for live score records.
//!
//! This module handles:
//! - Recognizing which event part a score record describes
//! - Extracting the ordinal index from part names ("2nd Set" → 2)
//!
//! The feed identifies parts by numeric id plus a free-text name. Only
//! parts we explicitly recognize become typed scores; anything else is
//! dropped rather than guessed at. The whole-match part id below comes
//! from the upstream part catalog and holds across the sports we carry
//! today; new sports should be validated against their own catalogs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Part id the feed reserves for the whole-match score line.
pub const WHOLE_MATCH_PART_ID: &str = "2";

/// Canonical display name used when a whole-match record omits its part name.
pub const WHOLE_MATCH_NAME: &str = "Whole Match";

static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// How a score record's event part is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// The primary match score line.
    WholeMatch,
    /// One set, carrying its ordinal index.
    Set(u32),
    /// One inning, carrying its ordinal index.
    Inning(u32),
    /// A part we do not map to a typed score (games, tie-breaks, halves).
    Unrecognized,
}

/// Classify an event part by id and display name.
///
/// The id check catches whole-match records that arrive without a name;
/// everything else is matched on the name text. Game and tie-break parts
/// are excluded before the set check because tennis part names nest, as
/// in "4th Game (2nd Set)".
pub fn classify(part_id: Option<&str>, part_name: Option<&str>) -> PartKind {
    if part_id == Some(WHOLE_MATCH_PART_ID) {
        return PartKind::WholeMatch;
    }

    let Some(name) = part_name else {
        return PartKind::Unrecognized;
    };
    let lowered = name.to_lowercase();

    if lowered == "whole match" {
        return PartKind::WholeMatch;
    }
    if is_game(&lowered) || is_tie_break(&lowered) {
        return PartKind::Unrecognized;
    }
    if lowered.contains("set") {
        return PartKind::Set(ordinal(name));
    }
    if lowered.contains("inning") {
        return PartKind::Inning(ordinal(name));
    }

    PartKind::Unrecognized
}

/// First integer appearing in a part name, defaulting to 1.
pub fn ordinal(name: &str) -> u32 {
    ORDINAL
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

fn is_game(lowered: &str) -> bool {
    lowered.contains("game")
}

fn is_tie_break(lowered: &str) -> bool {
    let squashed: String = lowered.chars().filter(|c| c.is_alphanumeric()).collect();
    squashed.contains("tiebreak")
}
