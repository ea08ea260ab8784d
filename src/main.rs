//! Sports feed synchronization engine entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oddsfeed::aggregate::FeedSnapshot;
use oddsfeed::config::Config;
use oddsfeed::metrics;
use oddsfeed::session::{FeedUpdate, MatchFeedSession};
use oddsfeed::transport::{LiveStatus, SocketTransport, TopicDescriptor};

/// Real-time sports market-data synchronization engine.
#[derive(Parser, Debug)]
#[command(name = "oddsfeed")]
#[command(about = "Subscribe to a sports feed and keep a match window in sync")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Sport id to subscribe (defaults to SPORT_ID).
    #[arg(short, long)]
    sport: Option<String>,

    /// Only in-play matches.
    #[arg(long)]
    live: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a match window and print snapshots (default).
    Tail {
        /// Sport id to subscribe (defaults to SPORT_ID).
        #[arg(short, long)]
        sport: Option<String>,

        /// Only in-play matches.
        #[arg(long)]
        live: bool,

        /// Size of the initial window.
        #[arg(short, long)]
        limit: Option<u32>,

        /// Pages to load after the first dump.
        #[arg(short, long, default_value = "0")]
        pages: u32,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("oddsfeed=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Tail { sport, live, limit, pages }) => cmd_tail(sport, live, limit, pages).await,
        None => cmd_tail(args.sport, args.live, None, 0).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("ODDSFEED - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Check feed endpoint
    print!("Checking feed endpoint... ");
    match url::Url::parse(&config.feed_ws_url) {
        Ok(url) => {
            println!("OK");
            println!("  Host: {}", url.host_str().unwrap_or("-"));
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Feed URL invalid"));
        }
    }

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Operator: {}", config.operator_id);
    println!("  Language: {}", config.language);
    println!("  Default Sport: {}", config.sport_id);
    println!(
        "  Event Window: {} events, +{} per page, max {}",
        config.initial_event_limit, config.event_limit_increment, config.max_event_limit
    );
    println!("  Main Markets Per Match: {}", config.main_markets_limit);
    println!(
        "  Reconnect: {}ms initial delay, {}s ceiling",
        config.reconnect_initial_delay_ms, config.reconnect_max_delay_s
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Subscribe to a match window and print every emitted snapshot.
async fn cmd_tail(
    sport: Option<String>,
    live: bool,
    limit: Option<u32>,
    pages: u32,
) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let sport_id = sport.unwrap_or_else(|| config.sport_id.clone());
    let mut window = config.page_window();
    if let Some(limit) = limit {
        window.initial = limit.min(window.max);
    }

    let mut topic = TopicDescriptor::new(&config.operator_id, &config.language, &sport_id)
        .with_live_status(if live { LiveStatus::Live } else { LiveStatus::Any })
        .with_main_markets_limit(config.main_markets_limit);
    topic.user_id = config.user_id.clone();

    let transport = Arc::new(SocketTransport::with_reconnect(
        config.feed_ws_url.clone(),
        config.reconnect(),
    ));
    let session = MatchFeedSession::with_window(transport, topic, window);

    info!("========================================");
    info!("FEED TAIL STARTED");
    info!("========================================");
    info!("Endpoint: {}", config.feed_ws_url);
    info!("Sport: {}", sport_id);
    info!("Live only: {}", live);
    info!("Window: {} events (max {})", window.initial, window.max);
    info!("========================================");

    let mut updates = session.subscribe().await?;
    let mut pages_left = pages;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(FeedUpdate::Connected(handle)) => {
                    info!("Feed connected ({})", handle);
                }
                Some(FeedUpdate::Snapshot(snapshot)) => {
                    print_snapshot(&snapshot);
                    if pages_left > 0 && session.can_load_more() {
                        pages_left -= 1;
                        let more = session.load_next_page().await?;
                        info!(
                            "Window expanded to {} events (more available: {})",
                            session.current_limit(),
                            more
                        );
                    }
                }
                Some(FeedUpdate::Disconnected) => {
                    warn!("Feed disconnected, transport is retrying...");
                }
                Some(FeedUpdate::Failed(e)) => {
                    error!("Feed failed: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                session.unsubscribe().await;
                break;
            }
        }
    }

    Ok(())
}

/// Print one snapshot of the window.
fn print_snapshot(snapshot: &FeedSnapshot) {
    info!("----------------------------------------");
    info!(
        "SNAPSHOT: {} matches, {} main market kinds",
        snapshot.matches.len(),
        snapshot.main_markets.len()
    );
    if let Some(upcoming) = snapshot.upcoming_count {
        info!("Upcoming beyond window: {}", upcoming);
    }
    for m in &snapshot.matches {
        let status = m.status_name.as_deref().unwrap_or("-");
        info!("  [{}] {} | {} | {} markets", m.id, m.name, status, m.markets.len());
    }
    info!("----------------------------------------");
}
