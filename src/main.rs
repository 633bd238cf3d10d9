//! # PCM Stream Bridge - Main Application Entry Point
//!
//! Runs both halves of a PCM streaming link in one Actix-web server:
//!
//! ## Sending side:
//! A [`StreamPlayer`] accepts 16-bit PCM over HTTP, converts it to float32 and
//! forwards it over a WebSocket to the configured upstream receiver. Tracks can
//! be interrupted, after which their buffers are dropped.
//!
//! ## Receiving side:
//! `/ws/audio` accepts the same wire format (binary float32 frames plus
//! `{"event":"interrupt"}`), queues the frames and plays them out into an
//! analyser so the received audio can be inspected over HTTP.
//!
//! ## Modules:
//! - **config**: TOML file + environment variables
//! - **state**: shared player, ingest hub and metrics
//! - **audio**: PCM conversion, spectrum analysis, player, queue and playout
//! - **transport**: outgoing WebSocket connection
//! - **websocket**: incoming WebSocket connections
//! - **health**, **handlers**, **middleware**, **error**: HTTP surface

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod transport;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use audio::player::StreamPlayer;
use audio::playout::{spawn_playout, IngestHub};
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{Transport, WebSocketTransport};

/// Global shutdown flag, set once SIGINT or SIGTERM arrives.
///
/// An `AtomicBool` can be read and written from any thread without a lock,
/// which is all the signal task and the main task need to share.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The application entry point.
///
/// ## Startup order:
/// 1. `.env`, tracing, configuration
/// 2. Upstream connection (optional; failure leaves the player without one)
/// 3. Player `connect()`, which builds the analysis context
/// 4. Ingest hub and its playout task
/// 5. HTTP server, until it exits or a shutdown signal arrives
///
/// ## Rust Concepts:
/// - `#[actix_web::main]`: starts the actix system and its tokio runtime
/// - `?`: any startup failure (bad config, port in use) returns early and the
///   process exits with the error
/// - `move ||`: the server factory runs once per worker thread, so it owns a
///   clone of the state and every worker shares the same `Arc`s inside it
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let upstream = connect_upstream(&config).await;
    let transport = upstream.clone().map(|t| t as Arc<dyn Transport>);

    let mut player = StreamPlayer::new(config.player.sample_rate, transport);
    player.connect().await?;

    let ingest = Arc::new(IngestHub::new(&config.ingest));
    let playout = spawn_playout(ingest.clone());

    let app_state = AppState::new(config.clone(), player, ingest);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/pcm", web::post().to(handlers::add_pcm))
                    .route("/pcm/raw", web::post().to(handlers::add_pcm_raw))
                    .route("/interrupt", web::post().to(handlers::interrupt))
                    .route("/frequencies", web::get().to(handlers::get_frequencies))
                    .route("/player", web::get().to(handlers::player_status))
                    .route("/ingest", web::get().to(handlers::ingest_stats))
                    .route("/ingest/frequencies", web::get().to(handlers::ingest_frequencies)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/ws/audio", web::get().to(websocket::audio_websocket))
            .default_service(web::to(handlers::not_found))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    playout.abort();
    if let Some(upstream) = upstream {
        info!(url = %upstream.url(), "Closing upstream connection");
        upstream.close();
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Open the upstream WebSocket if it is enabled.
///
/// ## What this does:
/// - Returns `None` straight away when `upstream.enabled` is false
/// - Otherwise connects to `upstream.url`, giving up after
///   `upstream.connect_timeout_secs`
///
/// ## Failure handling:
/// A failed connection is logged and the player runs without a transport.
/// Buffers are still accepted, they just go nowhere. There is no reconnect;
/// restart the service once the receiver is up.
async fn connect_upstream(config: &AppConfig) -> Option<Arc<WebSocketTransport>> {
    if !config.upstream.enabled {
        info!("Upstream disabled, audio will not be forwarded");
        return None;
    }

    let timeout = Duration::from_secs(config.upstream.connect_timeout_secs);
    match WebSocketTransport::connect(&config.upstream.url, timeout).await {
        Ok(transport) => {
            info!(url = %config.upstream.url, "Connected to upstream");
            Some(Arc::new(transport))
        }
        Err(e) => {
            warn!(url = %config.upstream.url, "Upstream unavailable, continuing without it: {}", e);
            None
        }
    }
}

/// Initialize the tracing (logging) system.
///
/// ## What this does:
/// - Sets up structured logging to the console through the `fmt` layer
/// - Picks log levels from `RUST_LOG` when it is set
///
/// ## Environment Variables:
/// - `RUST_LOG`: e.g. `pcm_stream_bridge=trace` to see every forwarded frame
/// - If not set, defaults to `pcm_stream_bridge=debug,actix_web=info`
///
/// ## Rust Concepts:
/// - **Builder pattern**: layers are stacked with `.with(..)` and installed
///   with `.init()`
/// - **unwrap_or_else**: falls back to the default filter when `RUST_LOG` is
///   missing or unparsable
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcm_stream_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown.
///
/// ## What this does:
/// - Listens for SIGTERM (sent by process managers and containers)
/// - Listens for SIGINT (Ctrl+C)
/// - Sets [`SHUTDOWN_SIGNAL`] when either arrives
///
/// ## Failure handling:
/// If the handlers cannot be installed the error is logged and the task ends.
/// The server keeps running; it just cannot be stopped by signal.
///
/// ## Rust Concepts:
/// - **tokio::spawn**: runs the listener as its own task
/// - **tokio::select!**: waits for whichever signal comes first
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait until [`SHUTDOWN_SIGNAL`] is set.
///
/// ## What this does:
/// - Checks the flag every 100ms with an async sleep, so the thread is free
///   for other tasks between checks
///
/// ## Why polling:
/// The signal task and `main` only share one boolean. A channel would work
/// too, but the flag keeps both sides trivial.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
