//! Normalized keyed store with insertion order and per-id observation.
//!
//! One store instance belongs to exactly one subscription session. All
//! mutation goes through a [`StoreTxn`] so a whole delta batch lands
//! under one write lock and readers never see a half-applied batch;
//! observer notifications flush on commit, after the lock is released.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use futures::Stream;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::records::{Entity, EntityKind, EntityRecord};

type ObserverKey = (EntityKind, String);

#[derive(Default)]
struct Tables {
    /// Records keyed by kind then id.
    records: HashMap<EntityKind, HashMap<String, EntityRecord>>,
    /// First-seen id order per kind; append on first insert only.
    order: HashMap<EntityKind, Vec<String>>,
}

/// Keyed table of flat records with per-id and per-kind observation.
pub struct EntityStore {
    tables: RwLock<Tables>,
    /// Conflating per-id observers; entries outlive `clear()` so that a
    /// pagination restart does not flap attached consumers.
    observers: DashMap<ObserverKey, watch::Sender<Option<EntityRecord>>>,
    /// Monotonic per-kind version, bumped once per committed batch that
    /// touched the kind. Collection-level observation hangs off this.
    versions: DashMap<EntityKind, watch::Sender<u64>>,
}

impl EntityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            observers: DashMap::new(),
            versions: DashMap::new(),
        }
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a write transaction covering one delta batch.
    ///
    /// Holds the write lock until [`StoreTxn::commit`]; dropping the
    /// transaction without committing discards its notifications but
    /// keeps its mutations.
    pub fn begin(&self) -> StoreTxn<'_> {
        StoreTxn {
            store: self,
            guard: self.write_tables(),
            touched: Vec::new(),
        }
    }

    /// Insert or replace a single record.
    pub fn insert(&self, record: EntityRecord) {
        let mut txn = self.begin();
        txn.insert(record);
        txn.commit();
    }

    /// Partially merge changed fields into one record.
    ///
    /// Returns `false` (and leaves the store untouched) when the id is
    /// unknown or the merged record fails to decode.
    pub fn merge(&self, kind: EntityKind, id: &str, changes: &serde_json::Map<String, Value>) -> bool {
        let mut txn = self.begin();
        let applied = txn.merge(kind, id, changes);
        txn.commit();
        applied
    }

    /// Remove a single record; returns whether it existed.
    pub fn remove(&self, kind: EntityKind, id: &str) -> bool {
        let mut txn = self.begin();
        let existed = txn.remove(kind, id);
        txn.commit();
        existed
    }

    /// Drop all records and ordering state.
    ///
    /// Observer registrations stay attached and are not notified; the
    /// next insert of an observed id delivers its fresh value.
    pub fn clear(&self) {
        let mut tables = self.write_tables();
        tables.records.clear();
        tables.order.clear();
    }

    /// Tear down all observer registrations; attached streams end.
    pub fn close(&self) {
        self.observers.clear();
        self.versions.clear();
    }

    /// Current record for an id, typed.
    pub fn get<T: Entity>(&self, id: &str) -> Option<T> {
        let tables = self.read_tables();
        tables
            .records
            .get(&T::KIND)?
            .get(id)
            .and_then(T::from_record)
            .cloned()
    }

    /// Current record for an id, kind-erased.
    pub fn get_record(&self, kind: EntityKind, id: &str) -> Option<EntityRecord> {
        let tables = self.read_tables();
        tables.records.get(&kind)?.get(id).cloned()
    }

    /// All records of a kind, unordered.
    pub fn all<T: Entity>(&self) -> Vec<T> {
        let tables = self.read_tables();
        tables
            .records
            .get(&T::KIND)
            .map(|by_id| {
                by_id
                    .values()
                    .filter_map(|r| T::from_record(r).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All records of a kind in first-seen order.
    pub fn all_ordered<T: Entity>(&self) -> Vec<T> {
        let tables = self.read_tables();
        let Some(by_id) = tables.records.get(&T::KIND) else {
            return Vec::new();
        };
        tables
            .order
            .get(&T::KIND)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| by_id.get(id))
                    .filter_map(|r| T::from_record(r).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of a kind in first-seen order.
    pub fn ids_ordered(&self, kind: EntityKind) -> Vec<String> {
        let tables = self.read_tables();
        tables.order.get(&kind).cloned().unwrap_or_default()
    }

    /// Ids of a kind as a set, for structural comparison.
    pub fn id_set(&self, kind: EntityKind) -> BTreeSet<String> {
        let tables = self.read_tables();
        tables
            .records
            .get(&kind)
            .map(|by_id| by_id.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records of a kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        let tables = self.read_tables();
        tables.records.get(&kind).map_or(0, HashMap::len)
    }

    /// Observe one id: yields the current value immediately, then the
    /// latest value after each mutation of that id (`None` after a
    /// delete). Conflating; the stream ends when the store is closed.
    pub fn observe<T: Entity>(&self, id: &str) -> impl Stream<Item = Option<T>> + Send + Unpin {
        let mut rx = self.entity_watch(T::KIND, id);
        Box::pin(async_stream::stream! {
            loop {
                let current = {
                    let value = rx.borrow_and_update();
                    value.as_ref().and_then(T::from_record).cloned()
                };
                yield current;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Version watch for a kind; the value bumps once per committed
    /// batch that touched the kind.
    pub fn kind_watch(&self, kind: EntityKind) -> watch::Receiver<u64> {
        self.versions
            .entry(kind)
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    fn entity_watch(&self, kind: EntityKind, id: &str) -> watch::Receiver<Option<EntityRecord>> {
        // Register under the read lock so a concurrent commit either
        // lands in the initial value or reaches the fresh sender.
        let tables = self.read_tables();
        let current = tables.records.get(&kind).and_then(|m| m.get(id)).cloned();
        self.observers
            .entry((kind, id.to_owned()))
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    fn notify(&self, touched: Vec<(EntityKind, String, Option<EntityRecord>)>) {
        if touched.is_empty() {
            return;
        }

        let mut kinds = BTreeSet::new();
        let mut dead = Vec::new();
        for (kind, id, value) in touched {
            kinds.insert(kind);
            let key = (kind, id);
            if let Some(sender) = self.observers.get(&key) {
                if sender.is_closed() {
                    dead.push(key.clone());
                } else {
                    sender.send_replace(value);
                }
            }
        }

        // Lazily drop registrations whose receivers are all gone.
        for key in dead {
            self.observers.remove_if(&key, |_, sender| sender.is_closed());
        }

        for kind in kinds {
            if let Some(version) = self.versions.get(&kind) {
                version.send_modify(|v| *v += 1);
            }
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Write transaction over the store; see [`EntityStore::begin`].
pub struct StoreTxn<'a> {
    store: &'a EntityStore,
    guard: RwLockWriteGuard<'a, Tables>,
    touched: Vec<(EntityKind, String, Option<EntityRecord>)>,
}

impl StoreTxn<'_> {
    /// Insert or replace a record; first insert appends to kind order.
    pub fn insert(&mut self, record: EntityRecord) {
        let kind = record.kind();
        let id = record.id().to_owned();
        let tables = &mut *self.guard;
        let first = tables
            .records
            .entry(kind)
            .or_default()
            .insert(id.clone(), record.clone())
            .is_none();
        if first {
            tables.order.entry(kind).or_default().push(id.clone());
        }
        self.touched.push((kind, id, Some(record)));
    }

    /// Partially merge changed fields into an existing record.
    pub fn merge(
        &mut self,
        kind: EntityKind,
        id: &str,
        changes: &serde_json::Map<String, Value>,
    ) -> bool {
        let tables = &mut *self.guard;
        let Some(existing) = tables.records.get_mut(&kind).and_then(|m| m.get_mut(id)) else {
            debug!(kind = %kind, id, "update for unknown id, skipping");
            return false;
        };

        match existing.merged_with(changes) {
            Ok(merged) => {
                *existing = merged.clone();
                self.touched.push((kind, id.to_owned(), Some(merged)));
                true
            }
            Err(err) => {
                warn!(kind = %kind, id, error = %err, "merge produced an undecodable record, keeping previous");
                false
            }
        }
    }

    /// Remove a record and its order slot; returns whether it existed.
    pub fn remove(&mut self, kind: EntityKind, id: &str) -> bool {
        let tables = &mut *self.guard;
        let existed = tables
            .records
            .get_mut(&kind)
            .and_then(|m| m.remove(id))
            .is_some();
        if existed {
            if let Some(order) = tables.order.get_mut(&kind) {
                order.retain(|ordered| ordered != id);
            }
            self.touched.push((kind, id.to_owned(), None));
        }
        existed
    }

    /// Release the write lock, then flush observer notifications.
    pub fn commit(self) {
        let StoreTxn {
            store,
            guard,
            touched,
        } = self;
        drop(guard);
        store.notify(touched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BettingOfferRecord, MatchRecord, SportRecord};
    use futures::StreamExt;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sport(id: &str, name: &str) -> EntityRecord {
        SportRecord {
            id: id.into(),
            name: name.into(),
            short_name: None,
            number_of_events: None,
            number_of_live_events: None,
        }
        .into()
    }

    fn offer(id: &str, odds: rust_decimal::Decimal) -> EntityRecord {
        BettingOfferRecord {
            id: id.into(),
            outcome_id: "o1".into(),
            odds,
            is_available: Some(true),
            is_live: None,
            last_changed_time: None,
            provider_id: None,
            status_id: None,
        }
        .into()
    }

    fn basic_match(id: &str) -> EntityRecord {
        MatchRecord {
            id: id.into(),
            sport_id: "s1".into(),
            name: format!("match {id}"),
            short_name: None,
            start_time: 0,
            status_id: None,
            status_name: None,
            home_participant_id: None,
            away_participant_id: None,
            home_participant_name: None,
            away_participant_name: None,
            venue_id: None,
            category_id: None,
            parent_id: None,
            allows_live_odds: None,
            number_of_markets: None,
        }
        .into()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = EntityStore::new();
        store.insert(sport("s1", "Football"));

        let got: SportRecord = store.get("s1").unwrap();
        assert_eq!(got.name, "Football");
        assert!(store.get::<SportRecord>("s2").is_none());
    }

    #[test]
    fn insertion_order_is_first_seen_only() {
        let store = EntityStore::new();
        store.insert(sport("s1", "Football"));
        store.insert(sport("s2", "Tennis"));
        store.insert(sport("s1", "Football (renamed)"));

        assert_eq!(store.ids_ordered(EntityKind::Sport), vec!["s1", "s2"]);
        let ordered = store.all_ordered::<SportRecord>();
        assert_eq!(ordered[0].name, "Football (renamed)");
    }

    #[test]
    fn merge_on_unknown_id_is_inert() {
        let store = EntityStore::new();
        let mut changes = serde_json::Map::new();
        changes.insert("odds".into(), json!(2.0));

        assert!(!store.merge(EntityKind::BettingOffer, "ghost", &changes));
        assert_eq!(store.count(EntityKind::BettingOffer), 0);
        assert!(store.get::<BettingOfferRecord>("ghost").is_none());
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let store = EntityStore::new();
        store.insert(offer("bo1", dec!(1.50)));

        let mut changes = serde_json::Map::new();
        changes.insert("odds".into(), json!(1.65));
        assert!(store.merge(EntityKind::BettingOffer, "bo1", &changes));

        let got: BettingOfferRecord = store.get("bo1").unwrap();
        assert_eq!(got.odds, dec!(1.65));
        assert_eq!(got.is_available, Some(true));
    }

    #[test]
    fn remove_drops_record_and_order_slot() {
        let store = EntityStore::new();
        store.insert(basic_match("m1"));
        store.insert(basic_match("m2"));

        assert!(store.remove(EntityKind::Match, "m1"));
        assert!(!store.remove(EntityKind::Match, "m1"));
        assert_eq!(store.ids_ordered(EntityKind::Match), vec!["m2"]);
        assert!(store.get::<MatchRecord>("m1").is_none());
    }

    #[test]
    fn reinsert_after_remove_appends_to_order() {
        let store = EntityStore::new();
        store.insert(basic_match("m1"));
        store.insert(basic_match("m2"));
        store.remove(EntityKind::Match, "m1");
        store.insert(basic_match("m1"));

        assert_eq!(store.ids_ordered(EntityKind::Match), vec!["m2", "m1"]);
    }

    #[test]
    fn clear_wipes_tables_but_not_observers() {
        let store = EntityStore::new();
        store.insert(sport("s1", "Football"));
        let _stream = store.observe::<SportRecord>("s1");

        store.clear();
        assert_eq!(store.count(EntityKind::Sport), 0);
        assert_eq!(store.observers.len(), 1);
    }

    #[test]
    fn fold_consistency_across_chunkings() {
        // Same delta sequence, applied one-per-txn vs all-in-one-txn,
        // must converge to the same record.
        let deltas = |store: &EntityStore, chunked: bool| {
            let mut changes1 = serde_json::Map::new();
            changes1.insert("odds".into(), json!(1.70));
            let mut changes2 = serde_json::Map::new();
            changes2.insert("odds".into(), json!(1.90));
            changes2.insert("isAvailable".into(), json!(false));

            if chunked {
                store.insert(offer("bo1", dec!(1.50)));
                store.merge(EntityKind::BettingOffer, "bo1", &changes1);
                store.merge(EntityKind::BettingOffer, "bo1", &changes2);
            } else {
                let mut txn = store.begin();
                txn.insert(offer("bo1", dec!(1.50)));
                txn.merge(EntityKind::BettingOffer, "bo1", &changes1);
                txn.merge(EntityKind::BettingOffer, "bo1", &changes2);
                txn.commit();
            }
        };

        let chunked = EntityStore::new();
        deltas(&chunked, true);
        let single = EntityStore::new();
        deltas(&single, false);

        let a: BettingOfferRecord = chunked.get("bo1").unwrap();
        let b: BettingOfferRecord = single.get("bo1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.odds, dec!(1.90));
        assert_eq!(a.is_available, Some(false));
    }

    #[tokio::test]
    async fn observe_yields_current_then_updates_then_none() {
        let store = EntityStore::new();
        store.insert(offer("bo1", dec!(1.50)));

        let mut stream = store.observe::<BettingOfferRecord>("bo1");
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.odds, dec!(1.50));

        let mut changes = serde_json::Map::new();
        changes.insert("odds".into(), json!(1.80));
        store.merge(EntityKind::BettingOffer, "bo1", &changes);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.odds, dec!(1.80));

        store.remove(EntityKind::BettingOffer, "bo1");
        let third = stream.next().await.unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn observe_unknown_id_yields_none_immediately() {
        let store = EntityStore::new();
        let mut stream = store.observe::<MatchRecord>("nope");
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn observe_conflates_rapid_updates() {
        let store = EntityStore::new();
        store.insert(offer("bo1", dec!(1.10)));

        let mut stream = store.observe::<BettingOfferRecord>("bo1");
        assert!(stream.next().await.unwrap().is_some());

        for odds in ["1.20", "1.30", "1.40"] {
            let mut changes = serde_json::Map::new();
            changes.insert("odds".into(), json!(odds));
            store.merge(EntityKind::BettingOffer, "bo1", &changes);
        }

        // A consumer that was busy sees only the latest value.
        let latest = stream.next().await.unwrap().unwrap();
        assert_eq!(latest.odds, dec!(1.40));
    }

    #[tokio::test]
    async fn close_ends_observer_streams() {
        let store = EntityStore::new();
        store.insert(offer("bo1", dec!(1.50)));

        let mut stream = store.observe::<BettingOfferRecord>("bo1");
        assert!(stream.next().await.unwrap().is_some());

        store.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn kind_watch_bumps_once_per_commit() {
        let store = EntityStore::new();
        let mut rx = store.kind_watch(EntityKind::Match);
        assert_eq!(*rx.borrow_and_update(), 0);

        let mut txn = store.begin();
        txn.insert(basic_match("m1"));
        txn.insert(basic_match("m2"));
        txn.commit();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
