//! Paginated feed subscription session.
//!
//! This module handles:
//! - The subscribe / paginate / unsubscribe lifecycle for one topic
//! - Pumping transport batches into the session's entity stores
//! - Structural change detection and snapshot emission
//! - Fine-grained observation of markets, outcomes, and live state
//!
//! A session owns two stores: the main store holding every record of
//! the current window, and a mirror indexing only Match and EventInfo
//! records so live-state observers never contend with odds traffic.
//! Pre-match topics carry no live state, so their mirror stays empty.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::{Stream, StreamExt};
use strum::Display;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregate::{self, FeedSnapshot, Market, Outcome};
use crate::diff::StructuralDiff;
use crate::error::{Result, SessionError, TransportError};
use crate::live::{self, LiveSnapshot};
use crate::metrics;
use crate::records::{BettingOfferRecord, EntityKind, MarketRecord, OutcomeRecord};
use crate::store::{ChangeApplier, EntityStore};
use crate::transport::{LiveStatus, SubscriptionHandle, TopicDescriptor, Transport, TransportEvent};

/// How many session updates may queue before the pump backpressures.
const UPDATE_BUFFER: usize = 64;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    /// Constructed, not yet subscribed.
    Idle,
    /// Subscribe sent, waiting for the transport to connect.
    Subscribing,
    /// Receiving dumps and updates for the current window.
    Active,
    /// Window widened, waiting for the replacement dump.
    Paginating,
    /// Torn down. Terminal.
    Unsubscribed,
}

/// Page sizing for the event window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Events requested on the first subscribe.
    pub initial: u32,
    /// Events added per pagination step.
    pub increment: u32,
    /// Hard ceiling the limit never exceeds.
    pub max: u32,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            initial: 10,
            increment: 10,
            max: 100,
        }
    }
}

/// Updates a session delivers on its main channel.
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    /// Transport-level subscription established (or re-established).
    Connected(SubscriptionHandle),
    /// Full rebuild of the window after a dump or a structural update.
    Snapshot(FeedSnapshot),
    /// Transport dropped; it will retry behind the same handle.
    Disconnected,
    /// Unrecoverable transport failure. Terminal.
    Failed(TransportError),
}

/// State behind the session mutex. Never held across an await.
struct State {
    phase: SessionPhase,
    limit: u32,
    has_more: bool,
    handle: Option<SubscriptionHandle>,
    pump: Option<JoinHandle<()>>,
    waiter: Option<oneshot::Sender<std::result::Result<bool, TransportError>>>,
    output: Option<mpsc::Receiver<FeedUpdate>>,
}

/// Parts shared between the session and its pump task.
struct Shared {
    store: Arc<EntityStore>,
    mirror: Arc<EntityStore>,
    /// Whether the mirror is fed at all; false for pre-match topics.
    mirrors_live: bool,
    out: mpsc::Sender<FeedUpdate>,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One subscription to a paginated match window.
///
/// Drives a [`Transport`] subscription, folds its batches into the
/// session stores, and emits [`FeedUpdate`]s whenever the set of root
/// matches changes. Leaf-only updates (odds ticks) are absorbed by the
/// store and visible through the observers without a rebuild.
pub struct MatchFeedSession {
    transport: Arc<dyn Transport>,
    topic: TopicDescriptor,
    window: PageWindow,
    shared: Arc<Shared>,
}

impl MatchFeedSession {
    /// Session with the default page window.
    pub fn new(transport: Arc<dyn Transport>, topic: TopicDescriptor) -> Self {
        Self::with_window(transport, topic, PageWindow::default())
    }

    /// Session with explicit page sizing.
    pub fn with_window(
        transport: Arc<dyn Transport>,
        topic: TopicDescriptor,
        window: PageWindow,
    ) -> Self {
        let (out, output) = mpsc::channel(UPDATE_BUFFER);
        let mirrors_live = topic.live_status != LiveStatus::Prematch;
        Self {
            transport,
            topic,
            window,
            shared: Arc::new(Shared {
                store: Arc::new(EntityStore::new()),
                mirror: Arc::new(EntityStore::new()),
                mirrors_live,
                out,
                state: Mutex::new(State {
                    phase: SessionPhase::Idle,
                    limit: window.initial,
                    has_more: true,
                    handle: None,
                    pump: None,
                    waiter: None,
                    output: Some(output),
                }),
            }),
        }
    }

    /// Open the subscription and return the update channel.
    ///
    /// Fails if the session has already been subscribed; a transport
    /// rejection leaves the session idle so the call can be retried.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<FeedUpdate>> {
        {
            let mut state = self.shared.lock();
            if state.phase != SessionPhase::Idle {
                return Err(SessionError::AlreadySubscribed { phase: state.phase }.into());
            }
            state.phase = SessionPhase::Subscribing;
            state.limit = self.window.initial;
            state.has_more = true;
        }
        self.shared.store.clear();
        self.shared.mirror.clear();

        let topic = self.topic.clone().with_event_limit(self.window.initial);
        let events = match self.transport.subscribe(&topic).await {
            Ok(events) => events,
            Err(err) => {
                self.shared.lock().phase = SessionPhase::Idle;
                return Err(err.into());
            }
        };
        info!(sport_id = %self.topic.sport_id, limit = self.window.initial, "feed session subscribed");

        let task = tokio::spawn(Self::pump(events, Arc::clone(&self.shared)));
        let mut state = self.shared.lock();
        state.pump = Some(task);
        match state.output.take() {
            Some(output) => Ok(output),
            None => Err(SessionError::AlreadySubscribed { phase: state.phase }.into()),
        }
    }

    /// Widen the window by one increment and reload it.
    ///
    /// Returns whether more events remain after the reload. Requests
    /// made while not active, while a page is already loading, at the
    /// limit ceiling, or past the end of data resolve to `false`
    /// without touching the transport. The result resolves when the
    /// replacement dump lands.
    pub async fn load_next_page(&self) -> Result<bool> {
        let rx = {
            let mut state = self.shared.lock();
            if state.phase != SessionPhase::Active {
                debug!(phase = %state.phase, "page request outside active phase, ignoring");
                return Ok(false);
            }
            if state.limit >= self.window.max {
                state.has_more = false;
                return Ok(false);
            }
            if !state.has_more {
                return Ok(false);
            }
            state.phase = SessionPhase::Paginating;
            state.limit = (state.limit + self.window.increment).min(self.window.max);
            if let Some(stale) = state.waiter.take() {
                let _ = stale.send(Ok(false));
            }
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            metrics::inc_paginations();
            info!(limit = state.limit, "expanding feed window");
            rx
        };

        self.restart_subscription().await?;
        match rx.await {
            Ok(outcome) => outcome.map_err(Into::into),
            Err(_) => Err(SessionError::Unsubscribed.into()),
        }
    }

    /// Tear down the transport subscription and resubscribe at the
    /// current limit. The pump is aborted first so the stale stream
    /// can never race the replacement dump into the stores.
    async fn restart_subscription(&self) -> Result<()> {
        let (pump, handle) = {
            let mut state = self.shared.lock();
            (state.pump.take(), state.handle.take())
        };
        if let Some(task) = pump {
            task.abort();
        }
        if let Some(handle) = handle {
            self.transport.unsubscribe(handle).await;
        }
        self.shared.store.clear();
        self.shared.mirror.clear();

        let limit = self.shared.lock().limit;
        let topic = self.topic.clone().with_event_limit(limit);
        match self.transport.subscribe(&topic).await {
            Ok(events) => {
                let task = tokio::spawn(Self::pump(events, Arc::clone(&self.shared)));
                self.shared.lock().pump = Some(task);
                Ok(())
            }
            Err(err) => {
                let waiter = {
                    let mut state = self.shared.lock();
                    state.phase = SessionPhase::Unsubscribed;
                    state.waiter.take()
                };
                if let Some(tx) = waiter {
                    let _ = tx.send(Err(err.clone()));
                }
                let _ = self.shared.out.send(FeedUpdate::Failed(err.clone())).await;
                Err(err.into())
            }
        }
    }

    /// Tear down the session. Terminal; both stores are cleared and
    /// every attached observer stream ends.
    pub async fn unsubscribe(&self) {
        let (pump, handle, waiter) = {
            let mut state = self.shared.lock();
            if state.phase == SessionPhase::Unsubscribed {
                return;
            }
            state.phase = SessionPhase::Unsubscribed;
            state.has_more = false;
            (state.pump.take(), state.handle.take(), state.waiter.take())
        };
        if let Some(task) = pump {
            task.abort();
        }
        if let Some(tx) = waiter {
            let _ = tx.send(Ok(false));
        }
        if let Some(handle) = handle {
            self.transport.unsubscribe(handle).await;
        }
        self.shared.store.clear();
        self.shared.store.close();
        self.shared.mirror.clear();
        self.shared.mirror.close();
        info!("feed session unsubscribed");
    }

    /// Folds transport events into the stores and emits updates.
    ///
    /// Sole writer to the session stores while it runs; pagination
    /// aborts it before opening the replacement subscription.
    async fn pump(mut events: mpsc::Receiver<TransportEvent>, shared: Arc<Shared>) {
        let applier = if shared.mirrors_live {
            ChangeApplier::with_mirror(Arc::clone(&shared.store), Arc::clone(&shared.mirror))
        } else {
            ChangeApplier::new(Arc::clone(&shared.store))
        };
        let out = shared.out.clone();

        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected(handle) => {
                    shared.lock().handle = Some(handle);
                    if out.send(FeedUpdate::Connected(handle)).await.is_err() {
                        return;
                    }
                }
                TransportEvent::InitialDump(batch) => {
                    let started = Instant::now();
                    // A dump replaces the window wholesale, including
                    // after a transport-level reconnect replay.
                    shared.store.clear();
                    shared.mirror.clear();
                    let stats = applier.apply(&batch);
                    metrics::record_batch_apply_latency(started);
                    debug!(%stats, "initial dump applied");

                    let count = shared.store.count(EntityKind::Match) as u32;
                    let (waiter, has_more) = {
                        let mut state = shared.lock();
                        if count < state.limit {
                            state.has_more = false;
                        }
                        state.phase = SessionPhase::Active;
                        (state.waiter.take(), state.has_more)
                    };
                    if let Some(tx) = waiter {
                        let _ = tx.send(Ok(has_more));
                    }

                    let snapshot = aggregate::build_snapshot(&shared.store);
                    metrics::inc_snapshots_emitted();
                    if out.send(FeedUpdate::Snapshot(snapshot)).await.is_err() {
                        return;
                    }
                }
                TransportEvent::UpdatedBatch(batch) => {
                    let before = shared.store.id_set(EntityKind::Match);
                    let started = Instant::now();
                    let stats = applier.apply(&batch);
                    metrics::record_batch_apply_latency(started);
                    let after = shared.store.id_set(EntityKind::Match);

                    let diff = StructuralDiff::between(&before, &after);
                    if diff.is_structural() {
                        debug!(%diff, %stats, "root set changed, rebuilding");
                        let snapshot = aggregate::build_snapshot(&shared.store);
                        metrics::inc_snapshots_emitted();
                        if out.send(FeedUpdate::Snapshot(snapshot)).await.is_err() {
                            return;
                        }
                    } else {
                        metrics::inc_rebuilds_suppressed();
                    }
                }
                TransportEvent::Disconnected => {
                    if out.send(FeedUpdate::Disconnected).await.is_err() {
                        return;
                    }
                }
                TransportEvent::Failed(err) => {
                    warn!(error = %err, "transport failed, session is terminal");
                    let waiter = {
                        let mut state = shared.lock();
                        state.phase = SessionPhase::Unsubscribed;
                        state.handle.take();
                        state.waiter.take()
                    };
                    if let Some(tx) = waiter {
                        let _ = tx.send(Err(err.clone()));
                    }
                    let _ = out.send(FeedUpdate::Failed(err)).await;
                    return;
                }
            }
        }
    }

    /// Observe one market, rebuilt from the store on every change to
    /// its record. `None` after the market is deleted.
    pub fn observe_market(&self, market_id: &str) -> impl Stream<Item = Option<Market>> + Send + Unpin {
        let shared = Arc::clone(&self.shared);
        self.shared
            .store
            .observe::<MarketRecord>(market_id)
            .map(move |record| record.map(|r| aggregate::build_market(&shared.store, &r)))
    }

    /// Observe one outcome with its offers.
    pub fn observe_outcome(&self, outcome_id: &str) -> impl Stream<Item = Option<Outcome>> + Send + Unpin {
        let shared = Arc::clone(&self.shared);
        self.shared
            .store
            .observe::<OutcomeRecord>(outcome_id)
            .map(move |record| record.map(|r| aggregate::build_outcome(&shared.store, &r)))
    }

    /// Observe the outcome that owns a betting offer, keyed by the
    /// offer's id. Odds ticks on the offer re-emit the parent outcome.
    pub fn observe_offer_outcome(
        &self,
        offer_id: &str,
    ) -> impl Stream<Item = Option<Outcome>> + Send + Unpin {
        let shared = Arc::clone(&self.shared);
        self.shared
            .store
            .observe::<BettingOfferRecord>(offer_id)
            .map(move |record| {
                let offer = record?;
                let Some(outcome) = shared.store.get::<OutcomeRecord>(&offer.outcome_id) else {
                    warn!(offer = %offer.id, outcome = %offer.outcome_id, "parent outcome missing for offer");
                    return None;
                };
                Some(aggregate::build_outcome(&shared.store, &outcome))
            })
    }

    /// Observe the derived live state of one event.
    ///
    /// Emits whenever a committed batch touched EventInfo or Match
    /// records and the derived snapshot actually changed. Ends when
    /// the session unsubscribes. Sessions opened with a pre-match
    /// topic keep no live mirror, so their streams stay silent.
    pub fn observe_live(&self, event_id: &str) -> impl Stream<Item = LiveSnapshot> + Send + Unpin {
        let shared = Arc::clone(&self.shared);
        let event_id = event_id.to_owned();
        let mut info_watch = shared.mirror.kind_watch(EntityKind::EventInfo);
        let mut match_watch = shared.mirror.kind_watch(EntityKind::Match);
        Box::pin(async_stream::stream! {
            let mut last: Option<LiveSnapshot> = None;
            loop {
                if let Some(snapshot) = live::derive(&shared.mirror, &event_id) {
                    if last.as_ref() != Some(&snapshot) {
                        last = Some(snapshot.clone());
                        yield snapshot;
                    }
                }
                tokio::select! {
                    changed = info_watch.changed() => if changed.is_err() { break },
                    changed = match_watch.changed() => if changed.is_err() { break },
                }
            }
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    /// Event limit of the current window.
    pub fn current_limit(&self) -> u32 {
        self.shared.lock().limit
    }

    /// Whether the feed reported more events beyond the window.
    pub fn has_more(&self) -> bool {
        self.shared.lock().has_more
    }

    /// Whether a pagination request would do anything right now.
    pub fn can_load_more(&self) -> bool {
        let state = self.shared.lock();
        state.phase == SessionPhase::Active && state.has_more && state.limit < self.window.max
    }

    /// Matches currently held in the window.
    pub fn match_count(&self) -> usize {
        self.shared.store.count(EntityKind::Match)
    }
}

impl Drop for MatchFeedSession {
    fn drop(&mut self) {
        if let Some(task) = self.shared.lock().pump.take() {
            task.abort();
        }
    }
}
