use crate::config::AppConfig;
use crate::state::AppState;
use crate::transport::TransportState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

/// `GET /health` and `GET /api/v1/health`
///
/// Always 200 while the process serves requests. A missing or closed upstream
/// shows up as `"degraded"` in the body rather than as an error status, since
/// the player keeps accepting audio either way.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    let (connected, transport_state) = {
        let player = state.player.lock().await;
        (player.is_connected(), player.transport_state())
    };
    let ingest = state.ingest.stats();

    HttpResponse::Ok().json(json!({
        "status": overall_status(&config, transport_state),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": metrics.active_sessions
        },
        "memory": get_memory_info(),
        "player": {
            "connected": connected,
            "sample_rate": config.player.sample_rate,
            "upstream": {
                "enabled": config.upstream.enabled,
                "url": config.upstream.url,
                "state": transport_state.map(|s| s.as_str())
            }
        },
        "ingest": {
            "sample_rate": ingest.sample_rate,
            "sessions": ingest.sessions.len(),
            "queued_frames": ingest.queued_frames,
            "queue_usage_percent": queue_usage_percent(ingest.queued_frames, ingest.queue_capacity),
            "dropped_frames": ingest.dropped_frames
        }
    }))
}

/// `GET /api/v1/metrics`
pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms,
                "total_request_bytes": metric.total_request_bytes
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    let total_request_bytes: u64 = metrics
        .endpoint_metrics
        .values()
        .map(|m| m.total_request_bytes)
        .sum();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": metrics.active_sessions,
            "total_request_bytes": total_request_bytes,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "ingest": state.ingest.stats()
    }))
}

fn overall_status(config: &AppConfig, transport_state: Option<TransportState>) -> &'static str {
    if !config.upstream.enabled {
        return "healthy";
    }
    match transport_state {
        Some(TransportState::Open) => "healthy",
        _ => "degraded",
    }
}

fn queue_usage_percent(queued: usize, capacity: usize) -> f64 {
    if capacity > 0 {
        (queued as f64 / capacity as f64 * 100.0).round()
    } else {
        0.0
    }
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                let kb = || {
                    line.split_whitespace()
                        .nth(1)
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0)
                        * 1024
                };
                if line.starts_with("VmRSS:") {
                    vm_rss = kb();
                } else if line.starts_with("VmSize:") {
                    vm_size = kb();
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": format!("Memory info not available for pid {}", process::id())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::StreamPlayer;
    use crate::audio::playout::IngestHub;
    use actix_web::App;
    use serde_json::Value;
    use std::sync::Arc;

    #[test]
    fn test_overall_status() {
        let mut config = AppConfig::default();
        assert_eq!(overall_status(&config, None), "degraded");
        assert_eq!(overall_status(&config, Some(TransportState::Closed)), "degraded");
        assert_eq!(overall_status(&config, Some(TransportState::Open)), "healthy");

        config.upstream.enabled = false;
        assert_eq!(overall_status(&config, None), "healthy");
    }

    #[test]
    fn test_queue_usage_percent() {
        assert_eq!(queue_usage_percent(0, 0), 0.0);
        assert_eq!(queue_usage_percent(256, 1024), 25.0);
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let mut config = AppConfig::default();
        config.upstream.enabled = false;
        let ingest = Arc::new(IngestHub::new(&config.ingest));
        let player = StreamPlayer::new(config.player.sample_rate, None);
        let state = web::Data::new(AppState::new(config, player, ingest));

        let app = actix_web::test::init_service(
            App::new()
                .app_data(state)
                .route("/health", web::get().to(health_check))
                .route("/api/v1/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = actix_web::test::TestRequest::get().uri("/health").to_request();
        let body: Value = actix_web::test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["player"]["connected"], false);
        assert_eq!(body["player"]["upstream"]["state"], Value::Null);
        assert_eq!(body["ingest"]["sessions"], 0);

        let req = actix_web::test::TestRequest::get().uri("/api/v1/metrics").to_request();
        let body: Value = actix_web::test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["overall"]["total_request_bytes"], 0);
        assert_eq!(body["ingest"]["queue_capacity"], 1024);
    }
}
