//! Wire-level record model for the feed.
//!
//! This module handles:
//! - Flat entity record types and the kind enum
//! - The tagged record union with an open unknown variant
//! - Change records and the batch envelope

pub mod batch;
pub mod entities;

pub use batch::{ChangeKind, ChangeRecord, FeedRecord, RecordBatch, INITIAL_DUMP_TAG, UPDATE_TAG};
pub use entities::{
    BettingOfferRecord, Entity, EntityKind, EntityRecord, EventCategoryRecord, EventInfoRecord,
    LocationRecord, MainMarketRecord, MarketGroupRecord, MarketInfoRecord,
    MarketOutcomeRelationRecord, MarketRecord, MatchRecord, NextMatchesNumberRecord, OutcomeRecord,
    SportRecord, TournamentRecord,
};
