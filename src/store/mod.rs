//! Normalized storage for feed entities.
//!
//! This module handles:
//! - The keyed entity store with insertion order and observation
//! - Batch application of CREATE/UPDATE/DELETE deltas

pub mod applier;
pub mod entity_store;

pub use applier::{ApplyStats, ChangeApplier};
pub use entity_store::{EntityStore, StoreTxn};
