//! Real-time sports market-data synchronization engine.
//!
//! This library keeps a client-side copy of a bookmaker's match window in
//! step with a remote feed: a subscription yields one initial dump and then
//! incremental change batches, and the engine folds both into flat entity
//! stores from which nested aggregates are rebuilt on demand.
//!
//! # Rebuild policy
//!
//! Most feed traffic is odds ticks on existing offers. Rebuilding the whole
//! match tree for each tick is wasted work, so batches are split by effect:
//!
//! ```text
//! initial dump:   MATCH, MARKET, OUTCOME, BETTING_OFFER, ...  -> snapshot
//! odds tick:      CHANGE UPDATE on a BETTING_OFFER            -> absorbed
//! match appears:  CHANGE CREATE on a MATCH                    -> snapshot
//! ```
//!
//! Absorbed changes stay visible through per-id observers, so a consumer
//! tracking one market or one live score sees every tick without the feed
//! ever re-emitting the window.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`records`]: Wire-level entity and change records
//! - [`store`]: Flat entity store and change applier
//! - [`aggregate`]: Nested match/market/outcome builder
//! - [`live`]: Live score and status derivation
//! - [`diff`]: Structural change detection
//! - [`session`]: Paginated subscription session
//! - [`transport`]: Feed transport trait, socket and scripted implementations
//! - [`metrics`]: Metric names and helpers

pub mod aggregate;
pub mod config;
pub mod diff;
pub mod error;
pub mod live;
pub mod metrics;
pub mod records;
pub mod session;
pub mod store;
pub mod transport;

pub use config::Config;
pub use error::{FeedError, Result};
