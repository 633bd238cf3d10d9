//! # Ingest Playout
//!
//! The receiving half of the protocol. Ingest WebSocket connections push
//! decoded float frames into the hub's [`FrameQueue`]; a single playout task
//! drains the queue into a receiver-side [`AnalysisContext`] so the received
//! audio can be visualized.
//!
//! ## Interrupts:
//! An interrupt from any connection empties the queue. The playout task sees
//! the flag on its next wake-up, resets the analyser and carries on with
//! whatever arrives afterwards.

use crate::audio::analyser::AnalysisContext;
use crate::audio::frequencies::{self, AnalysisType, FrequencyOutput};
use crate::audio::queue::FrameQueue;
use crate::audio::session::{IngestSession, SessionSnapshot};
use crate::config::IngestConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// State shared by ingest connections, the playout task and HTTP handlers.
pub struct IngestHub {
    pub queue: FrameQueue,
    sample_rate: u32,
    analyser: Mutex<AnalysisContext>,
    sessions: RwLock<HashMap<String, Arc<IngestSession>>>,
    played_samples: AtomicU64,
    interrupts_handled: AtomicU64,
}

/// Summary returned by `GET /api/v1/ingest`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub sample_rate: u32,
    pub queued_frames: usize,
    pub queued_samples: usize,
    pub queued_seconds: f64,
    pub queue_capacity: usize,
    pub dropped_frames: u64,
    pub played_samples: u64,
    pub interrupts_handled: u64,
    pub sessions: Vec<SessionSnapshot>,
}

impl IngestHub {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            queue: FrameQueue::new(config.max_queued_frames),
            sample_rate: config.sample_rate,
            analyser: Mutex::new(AnalysisContext::new(config.sample_rate)),
            sessions: RwLock::new(HashMap::new()),
            played_samples: AtomicU64::new(0),
            interrupts_handled: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn analyser(&self) -> MutexGuard<'_, AnalysisContext> {
        self.analyser.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember the session of a newly started connection.
    pub fn register_session(&self, session: Arc<IngestSession>) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.session_id.clone(), session);
    }

    /// Forget a closed connection's session.
    pub fn close_session(&self, session_id: &str) -> Option<Arc<IngestSession>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        if let Some(session) = &removed {
            session.close();
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Spectrum of the audio played out so far.
    pub fn frequencies(
        &self,
        analysis_type: AnalysisType,
        min_decibels: Option<f32>,
        max_decibels: Option<f32>,
    ) -> FrequencyOutput {
        let mut analyser = self.analyser();
        frequencies::get_frequencies(
            &mut analyser,
            self.sample_rate,
            None,
            analysis_type,
            min_decibels.unwrap_or(frequencies::DEFAULT_MIN_DECIBELS),
            max_decibels.unwrap_or(frequencies::DEFAULT_MAX_DECIBELS),
        )
    }

    pub fn stats(&self) -> IngestStats {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|s| s.snapshot())
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        IngestStats {
            sample_rate: self.sample_rate,
            queued_frames: self.queue.len(),
            queued_samples: self.queue.queued_samples(),
            queued_seconds: self.queue.duration_seconds(self.sample_rate),
            queue_capacity: self.queue.capacity(),
            dropped_frames: self.queue.dropped_frames(),
            played_samples: self.played_samples.load(Ordering::Relaxed),
            interrupts_handled: self.interrupts_handled.load(Ordering::Relaxed),
            sessions,
        }
    }

    /// Handle a pending interrupt and drain every queued frame.
    ///
    /// Returns the number of samples played out.
    pub fn play_pending(&self) -> usize {
        if self.queue.take_interrupt() {
            self.analyser().reset();
            self.interrupts_handled.fetch_add(1, Ordering::Relaxed);
            info!("Interrupt received, stopping audio stream");
        }

        let mut played = 0;
        while let Some(frame) = self.queue.pop() {
            self.analyser().write(&frame);
            played += frame.len();
        }

        if played > 0 {
            self.played_samples.fetch_add(played as u64, Ordering::Relaxed);
            debug!(samples = played, "Played out received audio");
        }
        played
    }
}

/// Run the playout loop until the returned handle is aborted.
pub fn spawn_playout(hub: Arc<IngestHub>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Playout task started");
        loop {
            hub.queue.wait().await;
            hub.play_pending();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::time::Duration;

    fn hub() -> Arc<IngestHub> {
        Arc::new(IngestHub::new(&AppConfig::default().ingest))
    }

    #[test]
    fn test_play_pending_drains_queue() {
        let hub = hub();
        hub.queue.push(vec![0.25; 100]);
        hub.queue.push(vec![-0.25; 50]);

        assert_eq!(hub.play_pending(), 150);
        assert!(hub.queue.is_empty());
        assert_eq!(hub.stats().played_samples, 150);
    }

    #[test]
    fn test_interrupt_discards_queued_audio() {
        let hub = hub();
        hub.queue.push(vec![0.5; 100]);
        hub.queue.interrupt();

        assert_eq!(hub.play_pending(), 0);
        let stats = hub.stats();
        assert_eq!(stats.interrupts_handled, 1);
        assert_eq!(stats.played_samples, 0);
    }

    #[test]
    fn test_sessions_are_tracked() {
        let hub = hub();
        let session = Arc::new(IngestSession::new());
        hub.register_session(session.clone());
        assert_eq!(hub.session_count(), 1);
        assert_eq!(hub.stats().sessions[0].session_id, session.session_id);

        let closed = hub.close_session(&session.session_id).unwrap();
        assert_eq!(closed.status().as_str(), "closed");
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_frequencies_of_received_audio() {
        let hub = hub();
        let out = hub.frequencies(AnalysisType::Voice, None, None);
        assert!(out.values.iter().all(|&v| v == 0.0));
        assert_eq!(out.values.len(), out.frequencies.len());
    }

    #[tokio::test]
    async fn test_playout_task_consumes_frames() {
        let hub = hub();
        let handle = spawn_playout(hub.clone());

        hub.queue.push(vec![0.1; 64]);
        for _ in 0..50 {
            if hub.stats().played_samples == 64 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.stats().played_samples, 64);
        handle.abort();
    }
}
