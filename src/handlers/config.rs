use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: the effective configuration after file and
/// environment layering.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "upstream": {
                "enabled": config.upstream.enabled,
                "url": config.upstream.url,
                "connect_timeout_secs": config.upstream.connect_timeout_secs
            },
            "player": {
                "sample_rate": config.player.sample_rate
            },
            "ingest": {
                "sample_rate": config.ingest.sample_rate,
                "max_queued_frames": config.ingest.max_queued_frames,
                "heartbeat_interval_secs": config.ingest.heartbeat_interval_secs,
                "client_timeout_secs": config.ingest.client_timeout_secs
            }
        }
    })))
}
