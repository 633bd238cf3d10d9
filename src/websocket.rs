//! # Ingest WebSocket Handler
//!
//! Receives what a stream player sends. Clients connect to `/ws/audio`.
//!
//! ## WebSocket Protocol:
//! 1. **Audio**: binary messages of little-endian f32 samples
//! 2. **Control**: text messages with a JSON event, currently only
//!    `{"event":"interrupt"}`
//! 3. **Heartbeat**: the server pings periodically and closes connections that
//!    stay silent past the client timeout
//!
//! Each connection gets an [`IngestSession`]; frames go to the shared
//! [`IngestHub`] queue.

use crate::audio::pcm::decode_float32_le;
use crate::audio::playout::IngestHub;
use crate::audio::session::IngestSession;
use crate::state::AppState;
use crate::transport::ControlEvent;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What a text message turned out to be.
#[derive(Debug, PartialEq)]
pub enum ControlMessage {
    Event(ControlEvent),
    /// Valid JSON, but not an event we know
    Unknown(serde_json::Value),
    /// Not JSON at all
    Invalid(String),
}

/// Classify an incoming text message.
pub fn parse_control_message(text: &str) -> ControlMessage {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => match serde_json::from_value::<ControlEvent>(value.clone()) {
            Ok(event) => ControlMessage::Event(event),
            Err(_) => ControlMessage::Unknown(value),
        },
        Err(e) => ControlMessage::Invalid(e.to_string()),
    }
}

/// Decode one binary message and queue it on `hub`.
///
/// Returns `false` when the message is not a whole number of f32 samples; the
/// session counts it as rejected and nothing is queued.
pub fn ingest_audio(hub: &IngestHub, session: &IngestSession, data: &[u8]) -> bool {
    match decode_float32_le(data) {
        Some(samples) => {
            debug!(
                session_id = %session.session_id,
                samples = samples.len(),
                "Received audio frame"
            );
            session.record_frame(samples.len());
            hub.queue.push(samples);
            true
        }
        None => {
            session.record_rejected();
            warn!(
                session_id = %session.session_id,
                bytes = data.len(),
                "Dropping binary message that is not a whole number of f32 samples"
            );
            false
        }
    }
}

/// Act on one text message. An interrupt empties the queue.
pub fn ingest_control(hub: &IngestHub, session: &IngestSession, text: &str) -> ControlMessage {
    let message = parse_control_message(text);
    match &message {
        ControlMessage::Event(ControlEvent::Interrupt) => {
            info!(session_id = %session.session_id, "Interruption received");
            session.record_interrupt();
            hub.queue.interrupt();
        }
        ControlMessage::Unknown(value) => {
            debug!("Received unknown message: {}", value);
        }
        ControlMessage::Invalid(err) => {
            warn!("Received invalid JSON message: {} ({})", text, err);
        }
    }
    message
}

/// One ingest connection.
pub struct IngestWebSocket {
    hub: Arc<IngestHub>,
    session: Arc<IngestSession>,
    app_state: web::Data<AppState>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
}

impl IngestWebSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        let config = app_state.get_config();
        Self {
            hub: app_state.ingest.clone(),
            session: Arc::new(IngestSession::new()),
            app_state,
            heartbeat_interval: Duration::from_secs(config.ingest.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.ingest.client_timeout_secs),
            last_heartbeat: Instant::now(),
        }
    }

    /// Ping the client every `heartbeat_interval`.
    ///
    /// ## What this does:
    /// - Any message from the client (audio, text, ping or pong) refreshes
    ///   `last_heartbeat`
    /// - If nothing arrived within `client_timeout`, the actor stops, which
    ///   closes the connection and its session
    ///
    /// ## Rust Concepts:
    /// - `run_interval` takes a closure that gets the actor (`act`) and its
    ///   context back on every tick, so no shared state is needed
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(session_id = %act.session.session_id, "Ingest heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for IngestWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session.session_id, "Client connected");
        self.hub.register_session(self.session.clone());
        self.app_state.increment_active_sessions();
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.close_session(&self.session.session_id);
        self.app_state.decrement_active_sessions();

        let snapshot = self.session.snapshot();
        info!(
            session_id = %snapshot.session_id,
            frames = snapshot.frames,
            samples = snapshot.samples,
            interrupts = snapshot.interrupts,
            "Client disconnected"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for IngestWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                ingest_audio(&self.hub, &self.session, &data);
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                ingest_control(&self.hub, &self.session, &text);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// `GET /ws/audio`: upgrade to an ingest connection.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    debug!(
        "New ingest connection request from: {:?}",
        req.connection_info().peer_addr()
    );
    ws::start(IngestWebSocket::new(app_state), &req, stream)
}
