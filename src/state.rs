//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor.
//!
//! ## What is shared:
//! - **config**: the effective configuration (`Arc<RwLock<AppConfig>>`)
//! - **metrics**: request counters updated by the metrics middleware
//! - **player**: the one stream player, behind an async mutex so concurrent
//!   requests take turns using it
//! - **ingest**: the receiving side's queue, sessions and analyser
//!
//! ## Why the player uses `tokio::sync::Mutex`:
//! `StreamPlayer::connect` awaits while holding `&mut self`, and a std mutex
//! guard must not be held across an `.await`.

use crate::audio::player::StreamPlayer;
use crate::audio::playout::IngestHub;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Request metrics, updated on every HTTP request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// The outgoing stream player; callers serialize access through the mutex
    pub player: Arc<Mutex<StreamPlayer>>,

    /// Receiving side (`/ws/audio`)
    pub ingest: Arc<IngestHub>,

    /// When the service started
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since start
    pub request_count: u64,

    /// Requests that ended in a 4xx/5xx or a handler error
    pub error_count: u64,

    /// Currently open ingest WebSocket connections
    pub active_sessions: u32,

    /// Per-endpoint statistics keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Statistics for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total processing time (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,

    /// Sum of declared request body sizes; PCM uploads dominate this
    pub total_request_bytes: u64,
}

impl AppState {
    pub fn new(config: AppConfig, player: StreamPlayer, ingest: Arc<IngestHub>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            player: Arc::new(Mutex::new(player)),
            ingest,
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration.
    ///
    /// Cloning releases the read lock right away.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.error_count += 1;
    }

    /// Record one finished request against `endpoint` (e.g. "POST /api/v1/pcm").
    pub fn record_endpoint_request(
        &self,
        endpoint: &str,
        duration_ms: u64,
        request_bytes: u64,
        is_error: bool,
    ) {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        endpoint_metric.total_request_bytes += request_bytes;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// An ingest connection opened.
    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.active_sessions += 1;
    }

    /// An ingest connection closed; never goes below zero.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
    }

    /// Consistent copy of the metrics for serialization.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap_or_else(|e| e.into_inner());
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    /// Errors over requests, 0.0 before the first request.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let config = AppConfig::default();
        let ingest = Arc::new(IngestHub::new(&config.ingest));
        let player = StreamPlayer::new(config.player.sample_rate, None);
        AppState::new(config, player, ingest)
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state();
        state.record_endpoint_request("POST /api/v1/pcm/raw", 10, 4096, false);
        state.record_endpoint_request("POST /api/v1/pcm/raw", 30, 4096, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /api/v1/pcm/raw"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.total_request_bytes, 8192);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let state = state();
        state.decrement_active_sessions();
        state.increment_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 1);
        state.decrement_active_sessions();
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }
}
