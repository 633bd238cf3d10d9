//! # Player and Ingest Handlers
//!
//! HTTP front for the stream player and the receiving side.
//!
//! ## Endpoints:
//! - `POST /api/v1/pcm`: JSON `{"samples": [..], "track_id": ".."}`
//! - `POST /api/v1/pcm/raw?track_id=..`: little-endian 16-bit PCM body
//! - `POST /api/v1/interrupt`: optional `{"track_id": ".."}`
//! - `GET /api/v1/frequencies`: spectrum of the forwarded audio
//! - `GET /api/v1/player`: player status
//! - `GET /api/v1/ingest` and `GET /api/v1/ingest/frequencies`: receiving side

use crate::audio::frequencies::{AnalysisType, DEFAULT_MAX_DECIBELS, DEFAULT_MIN_DECIBELS};
use crate::audio::pcm::{self, PcmBuffer, DEFAULT_TRACK_ID};
use crate::audio::player::StreamPlayer;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transport::TransportState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Result of one `add_16bit_pcm` call.
#[derive(Debug, Serialize)]
pub struct PcmResponse {
    /// `false` when the track is interrupted and the buffer was dropped
    pub accepted: bool,
    pub track_id: String,
    pub sample_count: usize,
    /// Whether the transport was open, i.e. the buffer actually went out
    pub forwarded: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawPcmQuery {
    pub track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FrequencyQuery {
    #[serde(default)]
    pub analysis_type: AnalysisType,
    pub min_decibels: Option<f32>,
    pub max_decibels: Option<f32>,
}

impl FrequencyQuery {
    /// Reject an inverted or empty decibel range.
    ///
    /// A missing bound takes its default first, so `min_decibels=-20` alone
    /// is checked against the default maximum of -30.
    fn validate(&self) -> AppResult<()> {
        let min = self.min_decibels.unwrap_or(DEFAULT_MIN_DECIBELS);
        let max = self.max_decibels.unwrap_or(DEFAULT_MAX_DECIBELS);
        if min >= max {
            return Err(AppError::BadRequest(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                min, max
            )));
        }
        Ok(())
    }
}

fn transport_open(player: &StreamPlayer) -> bool {
    player.transport_state() == Some(TransportState::Open)
}

fn pcm_response(track_id: String, outcome: Option<Vec<i16>>, forwarded: bool) -> PcmResponse {
    match outcome {
        Some(samples) => PcmResponse {
            accepted: true,
            track_id,
            sample_count: samples.len(),
            forwarded,
        },
        None => PcmResponse {
            accepted: false,
            track_id,
            sample_count: 0,
            forwarded: false,
        },
    }
}

/// `POST /api/v1/pcm`
///
/// `samples` must be an array of 16-bit integers; anything else (floats,
/// strings, out-of-range numbers) is a type mismatch and returns 400.
pub async fn add_pcm(state: web::Data<AppState>, body: web::Json<Value>) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let samples = body.get("samples").unwrap_or(&Value::Null);
    let track_id = body.get("track_id");

    let resolved = pcm::track_id_from_json(track_id)?;
    let mut player = state.player.lock().await;
    let forwarded = transport_open(&player);
    let outcome = player.add_16bit_pcm_json(samples, track_id)?;

    Ok(HttpResponse::Ok().json(pcm_response(resolved, outcome, forwarded)))
}

/// `POST /api/v1/pcm/raw`
pub async fn add_pcm_raw(
    state: web::Data<AppState>,
    query: web::Query<RawPcmQuery>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let track_id = query
        .into_inner()
        .track_id
        .unwrap_or_else(|| DEFAULT_TRACK_ID.to_string());
    debug!(track_id = %track_id, bytes = body.len(), "Raw PCM upload");

    let mut player = state.player.lock().await;
    let forwarded = transport_open(&player);
    let outcome = player.add_16bit_pcm(PcmBuffer::Bytes(body.to_vec()), Some(&track_id))?;

    Ok(HttpResponse::Ok().json(pcm_response(track_id, outcome, forwarded)))
}

/// `POST /api/v1/interrupt`
///
/// Without a body, or without `track_id`, playback is interrupted and no
/// track is marked. A `track_id` that is not a string is a type mismatch and
/// nothing is interrupted.
pub async fn interrupt(
    state: web::Data<AppState>,
    body: Option<web::Json<Value>>,
) -> AppResult<HttpResponse> {
    let track_id = match body.as_deref().and_then(|b| b.get("track_id")) {
        None | Some(Value::Null) => None,
        Some(value) => Some(pcm::track_id_from_json(Some(value))?),
    };

    let mut player = state.player.lock().await;
    let event_sent = transport_open(&player);
    player.interrupt(track_id.as_deref());

    Ok(HttpResponse::Ok().json(json!({
        "interrupted": true,
        "track_id": track_id,
        "event_sent": event_sent,
        "interrupted_tracks": player.interrupted_tracks()
    })))
}

/// `GET /api/v1/frequencies`
pub async fn get_frequencies(
    state: web::Data<AppState>,
    query: web::Query<FrequencyQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    query.validate()?;
    let mut player = state.player.lock().await;
    let output = player.get_frequencies(query.analysis_type, query.min_decibels, query.max_decibels)?;

    Ok(HttpResponse::Ok().json(json!({
        "analysis_type": query.analysis_type,
        "values": output.values,
        "frequencies": output.frequencies,
        "labels": output.labels
    })))
}

/// `GET /api/v1/player`
pub async fn player_status(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let player = state.player.lock().await;

    Ok(HttpResponse::Ok().json(json!({
        "connected": player.is_connected(),
        "sample_rate": player.sample_rate(),
        "transport": {
            "enabled": config.upstream.enabled,
            "url": config.upstream.url,
            "state": player.transport_state().map(|s| s.as_str())
        },
        "interrupted_tracks": player.interrupted_tracks(),
        "track_sample_offsets": player.track_sample_offsets()
    })))
}

/// `GET /api/v1/ingest`
pub async fn ingest_stats(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.ingest.stats()))
}

/// `GET /api/v1/ingest/frequencies`
pub async fn ingest_frequencies(
    state: web::Data<AppState>,
    query: web::Query<FrequencyQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    query.validate()?;

    let output = state
        .ingest
        .frequencies(query.analysis_type, query.min_decibels, query.max_decibels);
    Ok(HttpResponse::Ok().json(json!({
        "analysis_type": query.analysis_type,
        "sample_rate": state.ingest.sample_rate(),
        "values": output.values,
        "frequencies": output.frequencies,
        "labels": output.labels
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playout::IngestHub;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    fn app_state() -> web::Data<AppState> {
        let config = AppConfig::default();
        let ingest = Arc::new(IngestHub::new(&config.ingest));
        let player = StreamPlayer::new(config.player.sample_rate, None);
        web::Data::new(AppState::new(config, player, ingest))
    }

    macro_rules! player_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .route("/api/v1/pcm", web::post().to(add_pcm))
                    .route("/api/v1/pcm/raw", web::post().to(add_pcm_raw))
                    .route("/api/v1/interrupt", web::post().to(interrupt))
                    .route("/api/v1/frequencies", web::get().to(get_frequencies))
                    .route("/api/v1/player", web::get().to(player_status))
                    .route("/api/v1/ingest", web::get().to(ingest_stats))
                    .route("/api/v1/ingest/frequencies", web::get().to(ingest_frequencies)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_pcm_accepted_without_transport() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm")
            .set_json(json!({"samples": [0, 16384, -32768]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["accepted"], true);
        assert_eq!(body["track_id"], "default");
        assert_eq!(body["sample_count"], 3);
        assert_eq!(body["forwarded"], false);
    }

    #[actix_web::test]
    async fn test_float_samples_are_rejected() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm")
            .set_json(json!({"samples": [0.5, -0.5]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_non_string_track_id_is_rejected() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm")
            .set_json(json!({"samples": [1, 2], "track_id": 7}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_raw_pcm_odd_length_is_rejected() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm/raw?track_id=t1")
            .set_payload(vec![0u8, 1, 2])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm/raw?track_id=t1")
            .set_payload(vec![0u8, 0, 0xff, 0x7f])
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["accepted"], true);
        assert_eq!(body["track_id"], "t1");
        assert_eq!(body["sample_count"], 2);
    }

    #[actix_web::test]
    async fn test_interrupted_track_drops_later_buffers() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/interrupt")
            .set_json(json!({"track_id": "reply-1"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["interrupted"], true);
        assert_eq!(body["event_sent"], false);
        assert_eq!(body["interrupted_tracks"], json!(["reply-1"]));

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm")
            .set_json(json!({"samples": [1, 2, 3], "track_id": "reply-1"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["accepted"], false);
        assert_eq!(body["sample_count"], 0);

        let req = test::TestRequest::post()
            .uri("/api/v1/pcm")
            .set_json(json!({"samples": [1, 2, 3], "track_id": "reply-2"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["accepted"], true);
    }

    #[actix_web::test]
    async fn test_interrupt_rejects_non_string_track_id() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/interrupt")
            .set_json(json!({"track_id": 42}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
        assert!(state.player.lock().await.interrupted_tracks().is_empty());
    }

    #[actix_web::test]
    async fn test_interrupt_without_body() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::post().uri("/api/v1/interrupt").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["interrupted"], true);
        assert_eq!(body["track_id"], Value::Null);
        assert_eq!(body["interrupted_tracks"], json!([]));
    }

    #[actix_web::test]
    async fn test_frequencies_require_connect() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::get().uri("/api/v1/frequencies").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.player.lock().await.connect().await.unwrap();

        let req = test::TestRequest::get()
            .uri("/api/v1/frequencies?analysis_type=music")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["analysis_type"], "music");
        assert_eq!(body["values"].as_array().unwrap().len(), 96);
        assert_eq!(body["labels"][0], "C1");
    }

    #[actix_web::test]
    async fn test_single_decibel_bound_is_checked_against_default() {
        let state = app_state();
        let app = player_app!(state);

        // -20 against the default maximum of -30 is inverted.
        let req = test::TestRequest::get()
            .uri("/api/v1/ingest/frequencies?min_decibels=-20")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // -110 against the default minimum of -100 is inverted too.
        let req = test::TestRequest::get()
            .uri("/api/v1/ingest/frequencies?max_decibels=-110")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/v1/ingest/frequencies?min_decibels=-90")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_player_status() {
        let state = app_state();
        let app = player_app!(state);

        let req = test::TestRequest::get().uri("/api/v1/player").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["connected"], false);
        assert_eq!(body["sample_rate"], 44100);
        assert_eq!(body["transport"]["state"], Value::Null);
        assert_eq!(body["track_sample_offsets"], json!({}));
    }

    #[actix_web::test]
    async fn test_ingest_endpoints() {
        let state = app_state();
        state.ingest.queue.push(vec![0.0; 240]);
        let app = player_app!(state);

        let req = test::TestRequest::get().uri("/api/v1/ingest").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["sample_rate"], 24000);
        assert_eq!(body["queued_frames"], 1);
        assert_eq!(body["queued_samples"], 240);

        let req = test::TestRequest::get()
            .uri("/api/v1/ingest/frequencies?analysis_type=voice&min_decibels=-20&max_decibels=-80")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/v1/ingest/frequencies?analysis_type=voice")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["analysis_type"], "voice");
        assert_eq!(body["sample_rate"], 24000);
    }
}
