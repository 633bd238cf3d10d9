//! # Received Frame Queue
//!
//! Holds float frames that arrived on the ingest WebSocket until the playout
//! task picks them up.
//!
//! ## Key Features:
//! - **Bounded**: once `max_frames` is reached the oldest frame is dropped
//! - **Interruptible**: an interrupt empties the queue and raises a flag the
//!   playout task consumes with [`FrameQueue::take_interrupt`]
//! - **Async wake-up**: [`FrameQueue::wait`] resolves when a frame or an
//!   interrupt arrives

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::warn;

/// Shared queue between ingest connections and the playout task.
pub struct FrameQueue {
    frames: Mutex<VecDeque<Vec<f32>>>,
    max_frames: usize,
    interrupted: AtomicBool,
    dropped_frames: AtomicU64,
    notify: Notify,
}

impl FrameQueue {
    pub fn new(max_frames: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(max_frames.min(1024))),
            max_frames: max_frames.max(1),
            interrupted: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<f32>>> {
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a frame, evicting the oldest one when full.
    pub fn push(&self, frame: Vec<f32>) {
        {
            let mut frames = self.lock();
            if frames.len() >= self.max_frames {
                frames.pop_front();
                let dropped = self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped_frames = dropped, "Frame queue full, dropped oldest frame");
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<Vec<f32>> {
        self.lock().pop_front()
    }

    /// Discard everything queued and flag the interruption.
    pub fn interrupt(&self) {
        self.lock().clear();
        self.interrupted.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Returns `true` once per interrupt.
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_frames
    }

    /// Frames evicted because the queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Total samples across all queued frames.
    pub fn queued_samples(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    /// Duration of the queued audio at `sample_rate`.
    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.queued_samples() as f64 / sample_rate as f64
    }

    /// Wait until something was pushed or an interrupt arrived.
    pub async fn wait(&self) {
        if !self.is_empty() || self.interrupted.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}
