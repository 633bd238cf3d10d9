//! # Stream Player
//!
//! Accepts 16-bit PCM buffers, normalizes them to floats and forwards them to
//! the upstream transport. Delivery is fire-and-forget: when there is no
//! transport, or it is not open, buffers are accepted and nothing is sent.
//!
//! ## Interrupted tracks:
//! Every buffer carries a track id (`"default"` when omitted). Once a track id
//! has been interrupted, later buffers for it are dropped silently for the
//! lifetime of the player. Nothing un-interrupts a track.
//!
//! ## Analysis:
//! `connect()` creates the analysis context. Every buffer that is actually
//! sent is also written into it, so `get_frequencies()` describes the audio
//! that went out.

use crate::audio::analyser::AnalysisContext;
use crate::audio::frequencies::{self, AnalysisType, FrequencyOutput};
use crate::audio::pcm::{self, PcmBuffer, DEFAULT_TRACK_ID};
use crate::error::PlayerError;
use crate::transport::{ControlEvent, Frame, Transport, TransportState};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends PCM audio to a remote endpoint and exposes its spectrum.
pub struct StreamPlayer {
    sample_rate: u32,
    transport: Option<Arc<dyn Transport>>,
    analyser: Option<AnalysisContext>,
    /// Reserved for per-track playback positions; never written.
    track_sample_offsets: HashMap<String, u64>,
    interrupted_track_ids: HashSet<String>,
}

impl StreamPlayer {
    /// Create a player. `transport` may be `None`, in which case every send is
    /// skipped.
    pub fn new(sample_rate: u32, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            sample_rate,
            transport,
            analyser: None,
            track_sample_offsets: HashMap::new(),
            interrupted_track_ids: HashSet::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether `connect()` has completed.
    pub fn is_connected(&self) -> bool {
        self.analyser.is_some()
    }

    /// State of the transport, or `None` when the player has none.
    pub fn transport_state(&self) -> Option<TransportState> {
        self.transport.as_ref().map(|t| t.state())
    }

    fn open_transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref().filter(|t| t.is_open())
    }

    pub fn is_interrupted(&self, track_id: &str) -> bool {
        self.interrupted_track_ids.contains(track_id)
    }

    /// Interrupted track ids, sorted.
    pub fn interrupted_tracks(&self) -> Vec<String> {
        let mut tracks: Vec<String> = self.interrupted_track_ids.iter().cloned().collect();
        tracks.sort();
        tracks
    }

    pub fn track_sample_offsets(&self) -> &HashMap<String, u64> {
        &self.track_sample_offsets
    }

    /// Create the analysis context and return `true` once it is ready.
    ///
    /// The FFT plan is built on the blocking pool. Calling this again keeps
    /// the existing context.
    pub async fn connect(&mut self) -> Result<bool, PlayerError> {
        if self.analyser.is_some() {
            debug!("Analysis context already exists, keeping it");
            return Ok(true);
        }

        let sample_rate = self.sample_rate;
        let context = tokio::task::spawn_blocking(move || AnalysisContext::new(sample_rate))
            .await
            .map_err(|e| PlayerError::Analysis(e.to_string()))?;

        info!(
            sample_rate = sample_rate,
            fft_size = context.fft_size(),
            smoothing = context.smoothing_time_constant(),
            "Analysis context ready"
        );
        self.analyser = Some(context);
        Ok(true)
    }

    /// Current spectrum of the forwarded audio.
    ///
    /// ## Errors:
    /// `NotConnected` until `connect()` has completed.
    pub fn get_frequencies(
        &mut self,
        analysis_type: AnalysisType,
        min_decibels: Option<f32>,
        max_decibels: Option<f32>,
    ) -> Result<FrequencyOutput, PlayerError> {
        let sample_rate = self.sample_rate;
        let analyser = self.analyser.as_mut().ok_or(PlayerError::NotConnected)?;
        Ok(frequencies::get_frequencies(
            analyser,
            sample_rate,
            None,
            analysis_type,
            min_decibels.unwrap_or(frequencies::DEFAULT_MIN_DECIBELS),
            max_decibels.unwrap_or(frequencies::DEFAULT_MAX_DECIBELS),
        ))
    }

    /// Accept a PCM buffer for `track_id` (default track when `None`).
    ///
    /// ## Returns:
    /// - `Ok(None)`: the track is interrupted and the buffer was dropped
    /// - `Ok(Some(samples))`: the accepted samples, whether or not they could
    ///   be sent
    ///
    /// ## Errors:
    /// `TypeMismatch` when a raw byte buffer has an odd length.
    pub fn add_16bit_pcm(
        &mut self,
        buffer: PcmBuffer,
        track_id: Option<&str>,
    ) -> Result<Option<Vec<i16>>, PlayerError> {
        let track_id = track_id.unwrap_or(DEFAULT_TRACK_ID);
        if self.is_interrupted(track_id) {
            debug!(track_id = track_id, "Dropping buffer for interrupted track");
            return Ok(None);
        }

        let samples = buffer.into_samples()?;
        self.forward(&samples, track_id);
        Ok(Some(samples))
    }

    /// Same as [`add_16bit_pcm`](Self::add_16bit_pcm) for loosely typed input.
    ///
    /// The track id is checked first, then the interruption table, then the
    /// buffer, so a buffer for an interrupted track is dropped even when it is
    /// malformed.
    pub fn add_16bit_pcm_json(
        &mut self,
        buffer: &Value,
        track_id: Option<&Value>,
    ) -> Result<Option<Vec<i16>>, PlayerError> {
        let track_id = pcm::track_id_from_json(track_id)?;
        if self.is_interrupted(&track_id) {
            debug!(track_id = %track_id, "Dropping buffer for interrupted track");
            return Ok(None);
        }

        let buffer = PcmBuffer::from_json(buffer)?;
        self.add_16bit_pcm(buffer, Some(&track_id))
    }

    /// Normalize and send, only when the transport is open.
    fn forward(&mut self, samples: &[i16], track_id: &str) {
        let Some(transport) = self.open_transport().cloned() else {
            debug!(track_id = track_id, samples = samples.len(), "Transport not open, skipping send");
            return;
        };

        let floats = pcm::pcm_to_float(samples);
        let frame = Frame::Binary(pcm::float32_payload(&floats));
        let bytes = frame.len();
        match transport.send(frame) {
            Ok(()) => debug!(track_id = track_id, bytes = bytes, "Forwarded PCM buffer"),
            Err(e) => warn!(track_id = track_id, "PCM buffer not delivered: {}", e),
        }

        if let Some(analyser) = self.analyser.as_mut() {
            analyser.write(&floats);
        }
    }

    /// Tell the remote end to stop playback.
    ///
    /// Sends `{"event":"interrupt"}` when the transport is open. When a
    /// `track_id` is given it is also marked as interrupted, so later buffers
    /// for it are dropped; this happens even if nothing could be sent.
    pub fn interrupt(&mut self, track_id: Option<&str>) {
        if let Some(track_id) = track_id {
            if self.interrupted_track_ids.insert(track_id.to_string()) {
                info!(track_id = track_id, "Track interrupted");
            }
        }

        let Some(transport) = self.open_transport() else {
            debug!("Transport not open, interrupt event not sent");
            return;
        };

        if let Err(e) = transport.send(ControlEvent::Interrupt.to_frame()) {
            warn!("Interrupt event not delivered: {}", e);
        }
    }
}
