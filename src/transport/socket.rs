//! WebSocket transport for the remote feed.
//!
//! Features:
//! - One socket per subscription, torn down by handle
//! - Automatic reconnection with exponential backoff
//! - Frame decoding into record batches

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::{SubscriptionHandle, TopicDescriptor, Transport, TransportEvent};
use crate::error::TransportError;
use crate::metrics;
use crate::records::RecordBatch;

/// Frame type tag for opening a subscription.
const SUBSCRIBE_TYPE: &str = "SUBSCRIBE";

/// Buffered events per subscription channel.
const EVENT_BUFFER: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Subscription request frame sent after connecting.
#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    /// Frame type tag.
    #[serde(rename = "type")]
    message_type: &'static str,
    /// Topic parameters, flattened into the frame.
    #[serde(flatten)]
    topic: &'a TopicDescriptor,
}

/// Reconnection configuration for the feed socket.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Feed transport over a WebSocket connection.
///
/// Each subscription dials its own socket and sends one subscribe
/// frame. A dropped socket is re-dialed with backoff behind the same
/// handle; the channel sees `Disconnected` for the gap and a fresh
/// `Connected` plus initial dump once the new socket is up.
pub struct SocketTransport {
    /// Feed endpoint URL.
    ws_url: String,
    /// Reconnection configuration.
    reconnect: ReconnectConfig,
    /// Handle allocator.
    next_handle: AtomicU64,
    /// Reader tasks by handle, for teardown.
    readers: DashMap<u64, JoinHandle<()>>,
}

impl SocketTransport {
    /// Create a transport for the given endpoint.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self::with_reconnect(ws_url, ReconnectConfig::default())
    }

    /// Create with custom reconnection config.
    pub fn with_reconnect(ws_url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect,
            next_handle: AtomicU64::new(1),
            readers: DashMap::new(),
        }
    }

    /// Number of currently open subscriptions.
    pub fn open_subscriptions(&self) -> usize {
        self.readers.len()
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn subscribe(
        &self,
        topic: &TopicDescriptor,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let url = Url::parse(&self.ws_url)
            .map_err(|e| TransportError::ConnectionFailed(format!("bad feed url: {e}")))?;
        let frame = encode_subscribe(topic)?;

        info!(url = %url, sport = %topic.sport_id, limit = topic.event_limit, "opening feed subscription");
        let stream = dial(url.as_str(), &frame).await?;

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let _ = tx.send(TransportEvent::Connected(handle)).await;

        let reader = tokio::spawn(run_subscription(
            stream,
            url.to_string(),
            frame,
            tx,
            handle,
            self.reconnect.clone(),
        ));
        self.readers.insert(handle.0, reader);

        Ok(rx)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        match self.readers.remove(&handle.0) {
            Some((_, reader)) => {
                reader.abort();
                debug!(%handle, "feed subscription closed");
            }
            None => debug!(%handle, "unsubscribe for unknown handle"),
        }
    }
}

fn encode_subscribe(topic: &TopicDescriptor) -> Result<String, TransportError> {
    serde_json::to_string(&SubscribeFrame {
        message_type: SUBSCRIBE_TYPE,
        topic,
    })
    .map_err(|e| TransportError::SendFailed(e.to_string()))
}

/// Connect and send the subscribe frame.
async fn dial(url: &str, subscribe_frame: &str) -> Result<WsStream, TransportError> {
    let (mut stream, _) = connect_async(url).await?;
    stream
        .send(Message::Text(subscribe_frame.to_string()))
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    Ok(stream)
}

/// Why the frame pump stopped.
enum PumpEnd {
    /// The receiver side of the channel is gone.
    ReceiverGone,
    /// The socket ended, cleanly or not.
    SocketGone,
}

/// Reader loop for one subscription. Lives until the channel closes.
async fn run_subscription(
    mut stream: WsStream,
    url: String,
    subscribe_frame: String,
    tx: mpsc::Sender<TransportEvent>,
    handle: SubscriptionHandle,
    reconnect: ReconnectConfig,
) {
    loop {
        if let PumpEnd::ReceiverGone = pump_frames(&mut stream, &tx).await {
            return;
        }
        if tx.send(TransportEvent::Disconnected).await.is_err() {
            return;
        }

        // Re-dial behind the same handle. The remote replays a full
        // initial dump on the new socket.
        let mut attempt = 0u32;
        stream = loop {
            let delay = reconnect.next_delay(attempt);
            info!(%handle, delay_ms = delay.as_millis() as u64, "reconnecting feed socket");
            metrics::inc_socket_reconnects();
            tokio::time::sleep(delay).await;

            match dial(&url, &subscribe_frame).await {
                Ok(stream) => break stream,
                Err(err) => warn!(error = %err, attempt, "feed reconnect failed"),
            }
            if tx.is_closed() {
                return;
            }
            attempt = attempt.saturating_add(1);
        };

        if tx.send(TransportEvent::Connected(handle)).await.is_err() {
            return;
        }
    }
}

async fn pump_frames(stream: &mut WsStream, tx: &mpsc::Sender<TransportEvent>) -> PumpEnd {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Some(event) = decode_frame(&text) {
                    if tx.send(event).await.is_err() {
                        return PumpEnd::ReceiverGone;
                    }
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("feed heartbeat");
            }
            Ok(Message::Close(frame)) => {
                warn!(frame = ?frame, "feed socket closed by remote");
                return PumpEnd::SocketGone;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "feed socket error");
                return PumpEnd::SocketGone;
            }
        }
    }
    PumpEnd::SocketGone
}

/// Decode one text frame into a transport event.
///
/// Undecodable frames are counted and dropped so an unknown envelope
/// from a newer feed version cannot kill the subscription.
fn decode_frame(text: &str) -> Option<TransportEvent> {
    match serde_json::from_str::<RecordBatch>(text) {
        Ok(batch) => {
            metrics::inc_frames_received();
            if batch.is_initial_dump() {
                Some(TransportEvent::InitialDump(batch))
            } else {
                Some(TransportEvent::UpdatedBatch(batch))
            }
        }
        Err(err) => {
            metrics::inc_frame_decode_failures();
            debug!(error = %err, "undecodable feed frame");
            None
        }
    }
}
