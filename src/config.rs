//! Application configuration loaded from environment variables.

use serde::Deserialize;

use crate::session::PageWindow;
use crate::transport::ReconnectConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Feed Endpoint ===
    /// Feed socket URL.
    #[serde(default = "default_ws_url")]
    pub feed_ws_url: String,

    /// Operator id sent with every subscription topic.
    #[serde(default = "default_operator_id")]
    pub operator_id: String,

    /// Language code for translated names.
    #[serde(default = "default_language")]
    pub language: String,

    /// Optional user id forwarded to the feed.
    #[serde(default)]
    pub user_id: Option<String>,

    // === Subscription Defaults ===
    /// Sport id subscribed when the caller gives none.
    #[serde(default = "default_sport_id")]
    pub sport_id: String,

    /// Main markets resolved per match.
    #[serde(default = "default_main_markets_limit")]
    pub main_markets_limit: u32,

    // === Pagination ===
    /// Events requested on the first subscribe.
    #[serde(default = "default_initial_event_limit")]
    pub initial_event_limit: u32,

    /// Events added per pagination step.
    #[serde(default = "default_event_limit_increment")]
    pub event_limit_increment: u32,

    /// Hard ceiling on the event window.
    #[serde(default = "default_max_event_limit")]
    pub max_event_limit: u32,

    // === Reconnect ===
    /// Delay before the first redial, in milliseconds.
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,

    /// Ceiling on the redial delay, in seconds.
    #[serde(default = "default_reconnect_max_delay_s")]
    pub reconnect_max_delay_s: u64,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_ws_url() -> String {
    "wss://sportsapi-betsson-stage.everymatrix.com/v2".to_string()
}

fn default_operator_id() -> String {
    "4093".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_sport_id() -> String {
    "1".to_string() // football
}

fn default_main_markets_limit() -> u32 {
    5
}

fn default_initial_event_limit() -> u32 {
    10
}

fn default_event_limit_increment() -> u32 {
    10
}

fn default_max_event_limit() -> u32 {
    100
}

fn default_reconnect_initial_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_s() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.feed_ws_url.starts_with("wss://") && !self.feed_ws_url.starts_with("ws://") {
            return Err("FEED_WS_URL must start with ws:// or wss://".to_string());
        }

        if self.operator_id.is_empty() {
            return Err("OPERATOR_ID is required".to_string());
        }

        if self.initial_event_limit == 0 {
            return Err("INITIAL_EVENT_LIMIT must be at least 1".to_string());
        }

        if self.event_limit_increment == 0 {
            return Err("EVENT_LIMIT_INCREMENT must be at least 1".to_string());
        }

        if self.max_event_limit < self.initial_event_limit {
            return Err("MAX_EVENT_LIMIT must not be below INITIAL_EVENT_LIMIT".to_string());
        }

        Ok(())
    }

    /// Page sizing for new sessions.
    pub fn page_window(&self) -> PageWindow {
        PageWindow {
            initial: self.initial_event_limit,
            increment: self.event_limit_increment,
            max: self.max_event_limit,
        }
    }

    /// Redial policy for the socket transport.
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay_ms: self.reconnect_initial_delay_ms,
            max_delay_s: self.reconnect_max_delay_s,
            ..Default::default()
        }
    }
}
