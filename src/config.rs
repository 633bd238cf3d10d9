//! # Configuration Management
//!
//! Loads the bridge configuration from several sources:
//! - Default values (the `Default` impl below)
//! - An optional `config.toml` next to the binary
//! - Environment variables prefixed with `APP` (nested keys joined with `__`)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms set these)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_UPSTREAM__URL`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main configuration, grouped by concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub player: PlayerConfig,
    pub ingest: IngestConfig,
}

/// Where the HTTP / WebSocket service listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote endpoint that the stream player forwards audio to.
///
/// ## Fields:
/// - `enabled`: when false the player runs without a transport and every
///   send is skipped silently
/// - `url`: `ws://` or `wss://` address of the receiving server
/// - `connect_timeout_secs`: how long the initial handshake may take
///
/// There is no reconnect: if the handshake fails at startup the player keeps
/// running without a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub enabled: bool,
    pub url: String,
    pub connect_timeout_secs: u64,
}

/// Settings for the outgoing stream player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Sample rate used by the analysis context (Hz)
    pub sample_rate: u32,
}

/// Settings for the receiving (`/ws/audio`) side.
///
/// ## Fields:
/// - `sample_rate`: rate the incoming float frames are assumed to have
/// - `max_queued_frames`: frame queue capacity, oldest frames are dropped
///   once it is reached
/// - `heartbeat_interval_secs` / `client_timeout_secs`: ping cadence and the
///   silence after which a connection is closed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub sample_rate: u32,
    pub max_queued_frames: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            upstream: UpstreamConfig {
                enabled: true,
                url: "ws://localhost:8765".to_string(),
                connect_timeout_secs: 10,
            },
            player: PlayerConfig {
                sample_rate: 44100,
            },
            ingest: IngestConfig {
                sample_rate: 24000,
                max_queued_frames: 1024,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_UPSTREAM__URL=ws://10.0.0.5:8765`: forward audio elsewhere
    /// - `APP_UPSTREAM__ENABLED=false`: run without a transport
    /// - `APP_PLAYER__SAMPLE_RATE=24000`: analysis sample rate
    /// - `HOST=0.0.0.0` / `PORT=3000`: deployment platform overrides
    ///
    /// The nested separator is `__` so that keys containing `_`
    /// (`sample_rate`, `max_queued_frames`) survive the mapping.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Both sample rates are non-zero
    /// - The ingest queue can hold at least one frame
    /// - The heartbeat fires more often than the client timeout
    /// - An enabled upstream has a `ws://` or `wss://` URL
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.player.sample_rate == 0 {
            return Err(anyhow::anyhow!("Player sample rate must be greater than 0"));
        }

        if self.ingest.sample_rate == 0 {
            return Err(anyhow::anyhow!("Ingest sample rate must be greater than 0"));
        }

        if self.ingest.max_queued_frames == 0 {
            return Err(anyhow::anyhow!("Max queued frames must be greater than 0"));
        }

        if self.ingest.heartbeat_interval_secs == 0
            || self.ingest.heartbeat_interval_secs >= self.ingest.client_timeout_secs
        {
            return Err(anyhow::anyhow!(
                "Heartbeat interval must be non-zero and shorter than the client timeout"
            ));
        }

        if self.upstream.enabled {
            let url = self.upstream.url.trim();
            if url.is_empty() {
                return Err(anyhow::anyhow!("Upstream URL cannot be empty when upstream is enabled"));
            }
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(anyhow::anyhow!(
                    "Upstream URL must start with ws:// or wss://, got {}",
                    url
                ));
            }
        }

        Ok(())
    }
}
