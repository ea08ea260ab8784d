//! Transport abstraction over the remote feed.
//!
//! This module handles:
//! - The `Transport` trait the session consumes
//! - Topic descriptors for opening and widening subscriptions
//! - The event stream shape (connected, dumps, updates, failures)
//!
//! Reconnection and backoff live behind the trait; the session treats
//! the event channel as an opaque ordered stream.

pub mod scripted;
pub mod socket;

pub use scripted::{ScriptedConfig, ScriptedTransport};
pub use socket::{ReconnectConfig, SocketTransport};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::records::RecordBatch;

/// Default page size for a fresh subscription.
pub const DEFAULT_EVENT_LIMIT: u32 = 10;

/// Default number of headline markets requested per event.
pub const DEFAULT_MAIN_MARKETS_LIMIT: u32 = 5;

/// Opaque identifier for one open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which event lifecycle states a subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveStatus {
    /// In-play events only.
    Live,
    /// Upcoming events only.
    Prematch,
    /// No lifecycle filter.
    Any,
}

/// Everything needed to open one feed subscription.
///
/// All parameters except `event_limit` are fixed for a session's
/// lifetime; widening a page re-opens the same topic with a larger
/// limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDescriptor {
    /// Operator the subscription is billed to.
    pub operator_id: String,
    /// Language for translated names.
    pub language: String,
    /// Sport the window covers.
    pub sport_id: String,
    /// Optional location filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Optional tournament filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    /// Optional start-time window, in hours from now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_interval: Option<u32>,
    /// Optional server-side sort key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_events_by: Option<String>,
    /// Lifecycle filter.
    pub live_status: LiveStatus,
    /// Page size: how many events the window holds.
    pub event_limit: u32,
    /// How many headline markets each event carries.
    pub main_markets_limit: u32,
    /// Optional user id for personalized windows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TopicDescriptor {
    /// Descriptor with default window sizing and no filters.
    pub fn new(
        operator_id: impl Into<String>,
        language: impl Into<String>,
        sport_id: impl Into<String>,
    ) -> Self {
        Self {
            operator_id: operator_id.into(),
            language: language.into(),
            sport_id: sport_id.into(),
            location_id: None,
            tournament_id: None,
            hours_interval: None,
            sort_events_by: None,
            live_status: LiveStatus::Any,
            event_limit: DEFAULT_EVENT_LIMIT,
            main_markets_limit: DEFAULT_MAIN_MARKETS_LIMIT,
            user_id: None,
        }
    }

    /// Same topic with a different lifecycle filter.
    pub fn with_live_status(mut self, live_status: LiveStatus) -> Self {
        self.live_status = live_status;
        self
    }

    /// Same topic with a different page size.
    pub fn with_event_limit(mut self, event_limit: u32) -> Self {
        self.event_limit = event_limit;
        self
    }

    /// Same topic with a different headline-market count.
    pub fn with_main_markets_limit(mut self, main_markets_limit: u32) -> Self {
        self.main_markets_limit = main_markets_limit;
        self
    }
}

/// One event on a subscription's channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The subscription is open; carries the handle to close it with.
    Connected(SubscriptionHandle),
    /// Full snapshot of the subscribed window.
    InitialDump(RecordBatch),
    /// Incremental changes against the current window.
    UpdatedBatch(RecordBatch),
    /// The remote side closed the subscription.
    Disconnected,
    /// The transport failed; no further events will arrive.
    Failed(TransportError),
}

/// A connection to the remote feed.
///
/// One `subscribe` call opens one independent event channel. Events
/// arrive in delivery order; after `Disconnected` or `Failed` the
/// channel ends.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a subscription for the given topic.
    ///
    /// Resolves once the subscription request is on the wire; the
    /// `Connected` event with the handle is the channel's first item.
    async fn subscribe(
        &self,
        topic: &TopicDescriptor,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Close a subscription. Safe to call with an already-closed handle.
    async fn unsubscribe(&self, handle: SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_serializes_with_wire_names() {
        let topic = TopicDescriptor::new("op-1", "en", "sport-5")
            .with_live_status(LiveStatus::Live)
            .with_event_limit(20);

        let value = serde_json::to_value(&topic).unwrap();
        assert_eq!(
            value,
            json!({
                "operatorId": "op-1",
                "language": "en",
                "sportId": "sport-5",
                "liveStatus": "LIVE",
                "eventLimit": 20,
                "mainMarketsLimit": 5
            })
        );
    }

    #[test]
    fn optional_filters_appear_when_set() {
        let mut topic = TopicDescriptor::new("op-1", "en", "sport-5");
        topic.location_id = Some("loc-9".into());
        topic.hours_interval = Some(48);

        let value = serde_json::to_value(&topic).unwrap();
        assert_eq!(value["locationId"], json!("loc-9"));
        assert_eq!(value["hoursInterval"], json!(48));
    }

    #[test]
    fn live_status_parses_case_insensitively() {
        assert_eq!("live".parse::<LiveStatus>().unwrap(), LiveStatus::Live);
        assert_eq!("PREMATCH".parse::<LiveStatus>().unwrap(), LiveStatus::Prematch);
        assert!("sometimes".parse::<LiveStatus>().is_err());
    }
}
