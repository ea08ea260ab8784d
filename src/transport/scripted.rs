//! Scripted transport for unit testing.
//!
//! This module provides a transport that replays pre-scripted event
//! runs without opening real network connections. Each `subscribe`
//! call consumes the next scripted run; later events can be pushed
//! into the live subscription from the test body.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{SubscriptionHandle, TopicDescriptor, Transport, TransportEvent};
use crate::error::TransportError;

/// Buffered events per scripted subscription channel.
const EVENT_BUFFER: usize = 64;

/// Configuration for scripted transport behavior.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfig {
    /// Whether to reject subscribe calls.
    pub fail_subscribe: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// Transport that replays scripted event runs, for tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    /// Behavior configuration.
    config: ScriptedConfig,
    /// Pending event runs, one consumed per subscribe call.
    scripts: Arc<Mutex<VecDeque<Vec<TransportEvent>>>>,
    /// Sender for the most recent subscription.
    live: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    /// Topics captured per subscribe call, in order.
    topics: Arc<Mutex<Vec<TopicDescriptor>>>,
    /// Handles passed to unsubscribe, in order.
    closed: Arc<Mutex<Vec<SubscriptionHandle>>>,
    /// Handle allocator.
    next_handle: Arc<AtomicU64>,
}

impl ScriptedTransport {
    /// Create a scripted transport with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scripted transport with custom configuration.
    pub fn with_config(config: ScriptedConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Queue one event run for the next subscribe call.
    pub fn script(&self, run: Vec<TransportEvent>) {
        self.scripts.lock().unwrap().push_back(run);
    }

    /// Push an event into the most recent subscription.
    pub async fn push(&self, event: TransportEvent) {
        let sender = self.live.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Topics seen so far, one per subscribe call.
    pub fn topics(&self) -> Vec<TopicDescriptor> {
        self.topics.lock().unwrap().clone()
    }

    /// How many subscribe calls have been made.
    pub fn subscribe_count(&self) -> usize {
        self.topics.lock().unwrap().len()
    }

    /// Handles passed to unsubscribe so far.
    pub fn closed_handles(&self) -> Vec<SubscriptionHandle> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn subscribe(
        &self,
        topic: &TopicDescriptor,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.fail_subscribe {
            return Err(TransportError::SubscriptionRejected {
                topic: topic.sport_id.clone(),
                reason: "scripted rejection".to_string(),
            });
        }

        self.topics.lock().unwrap().push(topic.clone());

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let _ = tx.send(TransportEvent::Connected(handle)).await;

        let run = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        for event in run {
            let _ = tx.send(event).await;
        }

        *self.live.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.closed.lock().unwrap().push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordBatch;

    #[tokio::test]
    async fn replays_connected_then_scripted_run() {
        let transport = ScriptedTransport::new();
        transport.script(vec![TransportEvent::InitialDump(RecordBatch::default())]);

        let topic = TopicDescriptor::new("op", "en", "s1");
        let mut rx = transport.subscribe(&topic).await.unwrap();

        assert!(matches!(rx.recv().await, Some(TransportEvent::Connected(_))));
        assert!(matches!(rx.recv().await, Some(TransportEvent::InitialDump(_))));
        assert_eq!(transport.subscribe_count(), 1);
    }

    #[tokio::test]
    async fn pushes_reach_the_live_subscription() {
        let transport = ScriptedTransport::new();
        let topic = TopicDescriptor::new("op", "en", "s1");
        let mut rx = transport.subscribe(&topic).await.unwrap();
        let _ = rx.recv().await; // connected

        transport.push(TransportEvent::Disconnected).await;
        assert!(matches!(rx.recv().await, Some(TransportEvent::Disconnected)));
    }

    #[tokio::test]
    async fn failure_mode_rejects_subscribe() {
        let transport = ScriptedTransport::with_config(ScriptedConfig {
            fail_subscribe: true,
            ..Default::default()
        });

        let topic = TopicDescriptor::new("op", "en", "s1");
        let result = transport.subscribe(&topic).await;
        assert!(matches!(
            result,
            Err(TransportError::SubscriptionRejected { .. })
        ));
    }

    #[tokio::test]
    async fn records_unsubscribed_handles() {
        let transport = ScriptedTransport::new();
        transport
            .unsubscribe(SubscriptionHandle(7))
            .await;
        assert_eq!(transport.closed_handles(), vec![SubscriptionHandle(7)]);
    }
}
