//! Frequency-domain output shaping for visualizers.
//!
//! Turns the raw decibel spectrum of an [`AnalysisContext`] into normalized
//! values plus the frequency and label for each value. `music` and `voice`
//! collapse the spectrum onto musical notes; `frequency` keeps every bin.

use super::analyser::AnalysisContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// Highest octave of the note table, in Hz.
static OCTAVE_8_FREQUENCIES: [f32; 12] = [
    4186.01, 4434.92, 4698.63, 4978.03, 5274.04, 5587.65, 5919.91, 6271.93, 6644.88, 7040.0,
    7458.62, 7902.13,
];

static NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Notes strictly inside this range make up the voice table.
const VOICE_RANGE_HZ: (f32, f32) = (32.0, 2000.0);

/// How the spectrum is bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// One value per FFT bin
    #[default]
    Frequency,
    /// One value per note, octaves 1 through 8
    Music,
    /// One value per note in the speaking range
    Voice,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Frequency => "frequency",
            AnalysisType::Music => "music",
            AnalysisType::Voice => "voice",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frequency" => Ok(AnalysisType::Frequency),
            "music" => Ok(AnalysisType::Music),
            "voice" => Ok(AnalysisType::Voice),
            other => Err(format!(
                "unknown analysis type '{}', expected frequency, music or voice",
                other
            )),
        }
    }
}

/// Shaped spectrum: `values[i]` in [0, 1] belongs to `frequencies[i]` / `labels[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyOutput {
    pub values: Vec<f32>,
    pub frequencies: Vec<f32>,
    pub labels: Vec<String>,
}

/// A note frequency paired with its label (e.g. `440.0`, `"A4"`).
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub frequency: f32,
    pub label: String,
}

/// All notes from C1 to B8.
pub fn note_table() -> Vec<Note> {
    (1..=8)
        .flat_map(|octave| {
            let divisor = 2f32.powi(8 - octave);
            OCTAVE_8_FREQUENCIES
                .iter()
                .zip(NOTE_NAMES)
                .map(move |(&freq, name)| Note {
                    frequency: freq / divisor,
                    label: format!("{}{}", name, octave),
                })
        })
        .collect()
}

/// Notes inside the speaking range.
pub fn voice_table() -> Vec<Note> {
    note_table()
        .into_iter()
        .filter(|note| note.frequency > VOICE_RANGE_HZ.0 && note.frequency < VOICE_RANGE_HZ.1)
        .collect()
}

/// Shape the spectrum of `analyser` for display.
///
/// `fft_result` lets a caller pass decibel data it already has; when `None`
/// the analyser is queried. `min_decibels` / `max_decibels` define the range
/// mapped onto [0, 1].
pub fn get_frequencies(
    analyser: &mut AnalysisContext,
    sample_rate: u32,
    fft_result: Option<&[f32]>,
    analysis_type: AnalysisType,
    min_decibels: f32,
    max_decibels: f32,
) -> FrequencyOutput {
    let spectrum = match fft_result {
        Some(data) => data.to_vec(),
        None => analyser.float_frequency_data(),
    };
    shape_spectrum(&spectrum, sample_rate, analysis_type, min_decibels, max_decibels)
}

/// Bucket and normalize a decibel spectrum.
pub fn shape_spectrum(
    spectrum: &[f32],
    sample_rate: u32,
    analysis_type: AnalysisType,
    min_decibels: f32,
    max_decibels: f32,
) -> FrequencyOutput {
    let nyquist = sample_rate as f32 / 2.0;
    let step = if spectrum.is_empty() {
        0.0
    } else {
        nyquist / spectrum.len() as f32
    };

    let (raw, frequencies, labels) = match analysis_type {
        AnalysisType::Music | AnalysisType::Voice => {
            let notes = if analysis_type == AnalysisType::Voice {
                voice_table()
            } else {
                note_table()
            };
            let mut aggregate = vec![min_decibels; notes.len()];
            for (i, &amplitude) in spectrum.iter().enumerate() {
                let frequency = i as f32 * step;
                // Highest note strictly below this bin's frequency.
                if let Some(n) = notes.iter().rposition(|note| frequency > note.frequency) {
                    aggregate[n] = aggregate[n].max(amplitude);
                }
            }
            let frequencies = notes.iter().map(|n| n.frequency).collect();
            let labels = notes.into_iter().map(|n| n.label).collect();
            (aggregate, frequencies, labels)
        }
        AnalysisType::Frequency => {
            let frequencies: Vec<f32> = (0..spectrum.len()).map(|i| i as f32 * step).collect();
            let labels = frequencies.iter().map(|f| format!("{:.2} Hz", f)).collect();
            (spectrum.to_vec(), frequencies, labels)
        }
    };

    let range = max_decibels - min_decibels;
    let values = raw
        .iter()
        .map(|&v| ((v - min_decibels) / range).clamp(0.0, 1.0))
        .map(|v| if v.is_nan() { 0.0 } else { v })
        .collect();

    FrequencyOutput {
        values,
        frequencies,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_tables() {
        let notes = note_table();
        assert_eq!(notes.len(), 96);
        assert_eq!(notes[0].label, "C1");
        assert!((notes[0].frequency - 32.7032).abs() < 0.001);
        let a4 = notes.iter().find(|n| n.label == "A4").unwrap();
        assert!((a4.frequency - 440.0).abs() < 1e-3);
        assert_eq!(notes[95].label, "B8");

        let voice = voice_table();
        assert!(voice.iter().all(|n| n.frequency > 32.0 && n.frequency < 2000.0));
        assert_eq!(voice.first().unwrap().label, "C1");
        assert_eq!(voice.last().unwrap().label, "B6");
    }

    #[test]
    fn frequency_mode_keeps_every_bin() {
        let spectrum = vec![-100.0, -65.0, -30.0, -10.0];
        let out = shape_spectrum(&spectrum, 8000, AnalysisType::Frequency, -100.0, -30.0);
        assert_eq!(out.values, vec![0.0, 0.5, 1.0, 1.0]);
        assert_eq!(out.frequencies, vec![0.0, 1000.0, 2000.0, 3000.0]);
        assert_eq!(out.labels[1], "1000.00 Hz");
    }

    #[test]
    fn silence_normalizes_to_zero() {
        let spectrum = vec![f32::NEG_INFINITY; 16];
        let out = shape_spectrum(&spectrum, 44100, AnalysisType::Frequency, -100.0, -30.0);
        assert!(out.values.iter().all(|&v| v == 0.0));

        let out = shape_spectrum(&spectrum, 44100, AnalysisType::Music, -100.0, -30.0);
        assert_eq!(out.values.len(), 96);
        assert!(out.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn music_mode_takes_loudest_bin_per_note() {
        // 4096 bins at 44.1 kHz gives ~5.38 Hz per bin.
        let sample_rate = 44100;
        let bins = 4096;
        let step = sample_rate as f32 / 2.0 / bins as f32;
        let mut spectrum = vec![-120.0f32; bins];
        let loud_bin = (441.0 / step).round() as usize;
        spectrum[loud_bin] = -40.0;

        let out = shape_spectrum(&spectrum, sample_rate, AnalysisType::Music, -100.0, -30.0);
        let a4 = out.labels.iter().position(|l| l == "A4").unwrap();
        assert!((out.values[a4] - 60.0 / 70.0).abs() < 1e-5);
        assert_eq!(out.values.iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn analysis_type_parsing() {
        assert_eq!("music".parse::<AnalysisType>().unwrap(), AnalysisType::Music);
        assert_eq!("VOICE".parse::<AnalysisType>().unwrap(), AnalysisType::Voice);
        assert!("spectrum".parse::<AnalysisType>().is_err());
        assert_eq!(AnalysisType::default(), AnalysisType::Frequency);
    }
}
