//! Applies feed record batches to a session's store(s).
//!
//! Interprets full snapshots vs change records, enforces the per-kind
//! merge policy, and keeps a live session's mirror store in step with
//! the main store for the kinds both index.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::metrics;
use crate::records::{ChangeKind, ChangeRecord, EntityKind, FeedRecord, RecordBatch};
use crate::store::entity_store::{EntityStore, StoreTxn};

/// Kinds a live session's mirror store indexes alongside the main one.
const MIRROR_KINDS: [EntityKind; 2] = [EntityKind::Match, EntityKind::EventInfo];

/// Counters for one batch application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Full snapshots and CREATEs inserted.
    pub inserted: usize,
    /// UPDATEs merged into existing records.
    pub merged: usize,
    /// DELETEs that removed an existing record.
    pub deleted: usize,
    /// Records dropped by policy or malformed deltas.
    pub skipped: usize,
    /// Records of kinds this build does not know.
    pub unknown: usize,
}

impl fmt::Display for ApplyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} merged, {} deleted, {} skipped, {} unknown",
            self.inserted, self.merged, self.deleted, self.skipped, self.unknown
        )
    }
}

/// Interprets CREATE/UPDATE/DELETE batches against a session's stores.
pub struct ChangeApplier {
    store: Arc<EntityStore>,
    mirror: Option<Arc<EntityStore>>,
}

impl ChangeApplier {
    /// Applier writing to a single store.
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            mirror: None,
        }
    }

    /// Applier that additionally keeps a mirror store in step for
    /// Match and EventInfo records.
    pub fn with_mirror(store: Arc<EntityStore>, mirror: Arc<EntityStore>) -> Self {
        Self {
            store,
            mirror: Some(mirror),
        }
    }

    /// Whether UPDATE deltas of this kind may mutate stored records.
    ///
    /// Odds-bearing offers and live event info are the only kinds
    /// merged in place; everything else stays as created until the feed
    /// replaces it wholesale.
    fn merge_allowed(kind: EntityKind, changes: &serde_json::Map<String, serde_json::Value>) -> bool {
        match kind {
            EntityKind::BettingOffer => changes.contains_key("odds"),
            EntityKind::EventInfo => true,
            _ => false,
        }
    }

    fn is_mirrored(kind: EntityKind) -> bool {
        MIRROR_KINDS.contains(&kind)
    }

    /// Apply one batch atomically; readers of either store never see it
    /// half-applied. Returns what happened for logging.
    #[instrument(skip(self, batch), fields(records = batch.len()))]
    pub fn apply(&self, batch: &RecordBatch) -> ApplyStats {
        let mut stats = ApplyStats::default();
        // Lock order is fixed: main store, then mirror.
        let mut txn = self.store.begin();
        let mut mirror_txn = self.mirror.as_deref().map(EntityStore::begin);

        for record in &batch.records {
            match record {
                FeedRecord::Entity(entity) => {
                    if Self::is_mirrored(entity.kind()) {
                        if let Some(mirror) = mirror_txn.as_mut() {
                            mirror.insert(entity.clone());
                        }
                    }
                    txn.insert(entity.clone());
                    stats.inserted += 1;
                }
                FeedRecord::Change(change) => {
                    self.apply_change(&mut txn, &mut mirror_txn, change, &mut stats);
                }
                FeedRecord::Unknown(tag) => {
                    debug!(tag, "unknown record kind, ignoring");
                    metrics::inc_unknown_records();
                    stats.unknown += 1;
                }
            }
        }

        txn.commit();
        if let Some(mirror) = mirror_txn {
            mirror.commit();
        }

        metrics::inc_batches_applied();
        if stats.skipped > 0 {
            metrics::inc_records_skipped(stats.skipped as u64);
        }
        stats
    }

    fn apply_change(
        &self,
        txn: &mut StoreTxn<'_>,
        mirror_txn: &mut Option<StoreTxn<'_>>,
        change: &ChangeRecord,
        stats: &mut ApplyStats,
    ) {
        let Some(kind) = change.kind() else {
            debug!(tag = %change.entity_type, id = %change.id, "change for unknown kind, ignoring");
            metrics::inc_unknown_records();
            stats.unknown += 1;
            return;
        };

        match change.change_type {
            ChangeKind::Create => match change.entity_record() {
                Some(Ok(entity)) => {
                    if Self::is_mirrored(kind) {
                        if let Some(mirror) = mirror_txn.as_mut() {
                            mirror.insert(entity.clone());
                        }
                    }
                    txn.insert(entity);
                    stats.inserted += 1;
                }
                Some(Err(err)) => {
                    warn!(kind = %kind, id = %change.id, error = %err, "undecodable create entity, skipping");
                    stats.skipped += 1;
                }
                None => {
                    warn!(kind = %kind, id = %change.id, "create without entity, skipping");
                    stats.skipped += 1;
                }
            },
            ChangeKind::Update => {
                let Some(changes) = change.changed_fields.as_ref() else {
                    warn!(kind = %kind, id = %change.id, "update without changed fields, skipping");
                    stats.skipped += 1;
                    return;
                };
                if !Self::merge_allowed(kind, changes) {
                    debug!(kind = %kind, id = %change.id, "update for non-merged kind, dropping");
                    stats.skipped += 1;
                    return;
                }
                if Self::is_mirrored(kind) {
                    if let Some(mirror) = mirror_txn.as_mut() {
                        mirror.merge(kind, &change.id, changes);
                    }
                }
                if txn.merge(kind, &change.id, changes) {
                    stats.merged += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            ChangeKind::Delete => {
                if Self::is_mirrored(kind) {
                    if let Some(mirror) = mirror_txn.as_mut() {
                        mirror.remove(kind, &change.id);
                    }
                }
                if txn.remove(kind, &change.id) {
                    stats.deleted += 1;
                } else {
                    stats.skipped += 1;
                }
            }
        }
    }
}
