//! # PCM Buffers and Sample Conversion
//!
//! Resolves incoming audio into 16-bit samples and converts them into the
//! 32-bit float wire format.
//!
//! ## Formats:
//! - **Input**: signed 16-bit PCM, either already typed (`Vec<i16>`) or as raw
//!   little-endian bytes
//! - **Wire**: 32-bit little-endian floats in [-1.0, 1.0), one binary frame
//!   per buffer
//!
//! ## The API edge:
//! Loosely typed input (JSON) is resolved into a [`PcmBuffer`] exactly once by
//! [`PcmBuffer::from_json`] and [`track_id_from_json`]. Past that point the
//! player only deals with the typed enum.

use crate::error::PlayerError;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use serde_json::Value;
use std::io::Cursor;

/// Track used when the caller does not name one.
pub const DEFAULT_TRACK_ID: &str = "default";

/// Divisor mapping i16 onto [-1.0, 1.0).
pub const PCM16_SCALE: f32 = 32768.0;

/// An audio buffer handed to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum PcmBuffer {
    /// Samples that are already 16-bit integers
    Samples(Vec<i16>),

    /// Raw bytes reinterpreted as little-endian i16
    Bytes(Vec<u8>),
}

impl PcmBuffer {
    /// Resolve the buffer into its 16-bit samples.
    ///
    /// ## Errors:
    /// A raw byte buffer whose length is not a multiple of two cannot be
    /// viewed as i16 samples and fails with `TypeMismatch`.
    pub fn into_samples(self) -> Result<Vec<i16>, PlayerError> {
        match self {
            PcmBuffer::Samples(samples) => Ok(samples),
            PcmBuffer::Bytes(bytes) => decode_pcm16_le(&bytes),
        }
    }

    /// Resolve a JSON value into a buffer.
    ///
    /// Only an array of integers that all fit in i16 is accepted. Anything
    /// else (floats, strings, objects, out-of-range integers) is a
    /// `TypeMismatch`.
    pub fn from_json(value: &Value) -> Result<Self, PlayerError> {
        let items = value.as_array().ok_or_else(|| {
            PlayerError::TypeMismatch(format!(
                "argument must be an array of 16-bit integers or raw bytes, got {}",
                json_kind(value)
            ))
        })?;

        let mut samples = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let sample = item
                .as_i64()
                .and_then(|n| i16::try_from(n).ok())
                .ok_or_else(|| {
                    PlayerError::TypeMismatch(format!(
                        "sample {} is not a 16-bit integer: {}",
                        index, item
                    ))
                })?;
            samples.push(sample);
        }

        Ok(PcmBuffer::Samples(samples))
    }
}

impl From<Vec<i16>> for PcmBuffer {
    fn from(samples: Vec<i16>) -> Self {
        PcmBuffer::Samples(samples)
    }
}

impl From<Vec<u8>> for PcmBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        PcmBuffer::Bytes(bytes)
    }
}

/// Resolve an optional JSON track id; absent or `null` means the default track.
pub fn track_id_from_json(value: Option<&Value>) -> Result<String, PlayerError> {
    match value {
        None | Some(Value::Null) => Ok(DEFAULT_TRACK_ID.to_string()),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(PlayerError::TypeMismatch(format!(
            "trackId must be a string, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read little-endian 16-bit samples out of a byte slice.
pub fn decode_pcm16_le(data: &[u8]) -> Result<Vec<i16>, PlayerError> {
    if data.len() % 2 != 0 {
        return Err(PlayerError::TypeMismatch(format!(
            "byte buffer length must be a multiple of 2, got {}",
            data.len()
        )));
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    Ok(samples)
}

/// Convert 16-bit PCM samples to floats via `sample / 32768.0`.
///
/// No clamping is needed: -32768 maps to exactly -1.0 and 32767 to just
/// under 1.0.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / PCM16_SCALE).collect()
}

/// Serialize floats as the raw little-endian bytes of an f32 array.
pub fn float32_payload(samples: &[f32]) -> Vec<u8> {
    let mut payload = vec![0u8; samples.len() * 4];
    LittleEndian::write_f32_into(samples, &mut payload);
    payload
}

/// Decode a binary frame of little-endian f32 samples.
///
/// Returns `None` when the length is not a multiple of four.
pub fn decode_float32_le(data: &[u8]) -> Option<Vec<f32>> {
    if data.len() % 4 != 0 {
        return None;
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 4);
    while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
        samples.push(sample);
    }
    Some(samples)
}
