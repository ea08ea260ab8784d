//! Unified error types for the feed engine.

use thiserror::Error;

use crate::session::SessionPhase;

/// Unified error type for the feed engine.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session lifecycle error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport connection and message errors.
///
/// `Clone` so a single failure can finish both a pending pagination
/// waiter and the session output channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Send failed.
    #[error("failed to send feed message: {0}")]
    SendFailed(String),

    /// The remote rejected the subscription topic.
    #[error("subscription rejected for topic {topic}: {reason}")]
    SubscriptionRejected {
        /// Topic that was rejected.
        topic: String,
        /// Rejection reason from the remote.
        reason: String,
    },
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::ConnectionFailed(err.to_string())
    }
}

/// Session lifecycle misuse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `subscribe` called on a session that is not idle.
    #[error("session already subscribed (phase: {phase})")]
    AlreadySubscribed {
        /// Phase the session was in.
        phase: SessionPhase,
    },

    /// Operation on a session that has been unsubscribed.
    #[error("session is unsubscribed")]
    Unsubscribed,
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, FeedError>;
