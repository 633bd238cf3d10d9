//! # Ingest Session Tracking
//!
//! One [`IngestSession`] exists per `/ws/audio` connection. It records what
//! the connection delivered so the status endpoints and logs can report it.
//! Counters are atomics because the actor updates them while HTTP handlers
//! may read a snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Connected and receiving
    Streaming,
    /// The last control message was an interrupt
    Interrupted,
    /// Connection closed
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Streaming => "streaming",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::Closed => "closed",
        }
    }
}

/// Per-connection counters.
pub struct IngestSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    status: RwLock<SessionStatus>,
    frames: AtomicU64,
    samples: AtomicU64,
    rejected_frames: AtomicU64,
    interrupts: AtomicU64,
}

/// Point-in-time copy of a session, serializable for the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub frames: u64,
    pub samples: u64,
    pub rejected_frames: u64,
    pub interrupts: u64,
}

impl IngestSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            status: RwLock::new(SessionStatus::Streaming),
            frames: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            rejected_frames: AtomicU64::new(0),
            interrupts: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// A decoded audio frame arrived; audio after an interrupt resumes streaming.
    pub fn record_frame(&self, samples: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(samples as u64, Ordering::Relaxed);
        if self.status() == SessionStatus::Interrupted {
            self.set_status(SessionStatus::Streaming);
        }
    }

    /// A binary message could not be decoded.
    pub fn record_rejected(&self) {
        self.rejected_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
        self.set_status(SessionStatus::Interrupted);
    }

    pub fn close(&self) {
        self.set_status(SessionStatus::Closed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            status: self.status(),
            created_at: self.created_at,
            frames: self.frames.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
        }
    }
}

impl Default for IngestSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let session = IngestSession::new();
        assert_eq!(session.status(), SessionStatus::Streaming);
        assert!(Uuid::parse_str(&session.session_id).is_ok());

        session.record_frame(480);
        session.record_frame(480);
        session.record_rejected();
        let snap = session.snapshot();
        assert_eq!(snap.frames, 2);
        assert_eq!(snap.samples, 960);
        assert_eq!(snap.rejected_frames, 1);
    }

    #[test]
    fn test_interrupt_then_audio_resumes_streaming() {
        let session = IngestSession::new();
        session.record_interrupt();
        assert_eq!(session.status(), SessionStatus::Interrupted);
        assert_eq!(session.snapshot().interrupts, 1);

        session.record_frame(10);
        assert_eq!(session.status(), SessionStatus::Streaming);

        session.close();
        assert_eq!(session.status().as_str(), "closed");
    }
}
