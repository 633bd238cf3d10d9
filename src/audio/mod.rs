//! # Audio Module
//!
//! Everything that touches samples.
//!
//! ## Sending side:
//! - **pcm**: 16-bit buffer resolution and float conversion
//! - **player**: the stream player that forwards PCM upstream
//!
//! ## Analysis:
//! - **analyser**: windowed FFT with smoothing, output in decibels
//! - **frequencies**: bucketing into bins or musical notes for display
//!
//! ## Receiving side:
//! - **queue**: bounded frame queue with interrupt support
//! - **session**: per-connection counters
//! - **playout**: drains the queue into the receiver analyser
//!
//! ## Wire format:
//! - Audio: little-endian 32-bit floats in [-1.0, 1.0), one binary message per buffer
//! - Control: `{"event":"interrupt"}` as a text message

// The ingest WebSocket actor lives in src/websocket.rs at the root level
pub mod analyser;
pub mod frequencies;
pub mod pcm;
pub mod player;
pub mod playout;
pub mod queue;
pub mod session;
