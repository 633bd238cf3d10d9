//! Spectral analysis context.
//!
//! Mirrors the behaviour of a browser analyser node: a window of the most
//! recent samples, a Blackman-windowed forward FFT, exponential smoothing of
//! bin magnitudes across calls, and output in decibels.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

/// Transform size used by every analysis context.
pub const FFT_SIZE: usize = 8192;

/// Weight of the previous magnitude when smoothing (0.0 = no smoothing).
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.1;

const BLACKMAN_A0: f32 = 0.42;
const BLACKMAN_A1: f32 = 0.5;
const BLACKMAN_A2: f32 = 0.08;

/// Holds the time-domain window and smoothing history for one audio stream.
pub struct AnalysisContext {
    sample_rate: u32,
    fft_size: usize,
    smoothing: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
    samples_written: u64,
}

impl AnalysisContext {
    /// Plan the FFT and allocate buffers.
    ///
    /// Planning an 8192-point transform is the expensive part; callers on an
    /// async runtime build this inside `spawn_blocking`.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_params(sample_rate, FFT_SIZE, SMOOTHING_TIME_CONSTANT)
    }

    pub(crate) fn with_params(sample_rate: u32, fft_size: usize, smoothing: f32) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / fft_size as f32;
                BLACKMAN_A0 - BLACKMAN_A1 * phase.cos() + BLACKMAN_A2 * (2.0 * phase).cos()
            })
            .collect();

        Self {
            sample_rate,
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            fft,
            window,
            samples: std::iter::repeat(0.0).take(fft_size).collect(),
            smoothed: vec![0.0; fft_size / 2],
            samples_written: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of output bins (`fft_size / 2`).
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn smoothing_time_constant(&self) -> f32 {
        self.smoothing
    }

    /// Total samples pushed through this context since creation or reset.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Append played-out samples, keeping only the last `fft_size`.
    pub fn write(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.samples.pop_front();
            self.samples.push_back(sample);
        }
        self.samples_written += samples.len() as u64;
    }

    /// Forget all samples and smoothing history.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
        self.samples_written = 0;
    }

    /// Current spectrum in decibels, one value per bin.
    ///
    /// Silent bins come out as negative infinity. Each call folds the new
    /// magnitudes into the smoothing history.
    pub fn float_frequency_data(&mut self) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = self
            .samples
            .iter()
            .zip(&self.window)
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let scale = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        self.smoothed
            .iter_mut()
            .zip(&buffer)
            .map(|(previous, bin)| {
                let magnitude = bin.norm() * scale;
                *previous = tau * *previous + (1.0 - tau) * magnitude;
                20.0 * previous.log10()
            })
            .collect()
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("samples_written", &self.samples_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn silence_is_negative_infinity() {
        let mut ctx = AnalysisContext::with_params(8000, 256, 0.1);
        let data = ctx.float_frequency_data();
        assert_eq!(data.len(), 128);
        assert!(data.iter().all(|v| v.is_infinite() && v.is_sign_negative()));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let sample_rate = 8000;
        let size = 1024;
        let mut ctx = AnalysisContext::with_params(sample_rate, size, 0.0);
        // 1000 Hz lands exactly on bin 128 (8000 / 1024 = 7.8125 Hz per bin).
        ctx.write(&sine(1000.0, sample_rate, size));

        let data = ctx.float_frequency_data();
        let peak = data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 128);
    }

    #[test]
    fn smoothing_blends_with_history() {
        let mut ctx = AnalysisContext::with_params(8000, 256, 0.5);
        ctx.write(&sine(500.0, 8000, 256));
        let first = ctx.float_frequency_data();

        let mut unsmoothed = AnalysisContext::with_params(8000, 256, 0.0);
        unsmoothed.write(&sine(500.0, 8000, 256));
        let reference = unsmoothed.float_frequency_data();

        // With tau = 0.5 and an empty history the first call is the raw
        // magnitude halved, i.e. about 6 dB lower.
        let bin = 16;
        assert!((reference[bin] - first[bin] - 6.0206).abs() < 0.01);
    }

    #[test]
    fn write_keeps_only_latest_window() {
        let mut ctx = AnalysisContext::with_params(8000, 64, 0.1);
        ctx.write(&vec![1.0; 100]);
        ctx.write(&[0.25]);
        assert_eq!(ctx.samples.len(), 64);
        assert_eq!(ctx.samples.back(), Some(&0.25));
        assert_eq!(ctx.samples_written(), 101);

        ctx.reset();
        assert_eq!(ctx.samples_written(), 0);
        assert!(ctx.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn defaults_match_analyser_settings() {
        let ctx = AnalysisContext::new(44100);
        assert_eq!(ctx.fft_size(), 8192);
        assert_eq!(ctx.frequency_bin_count(), 4096);
        assert_eq!(ctx.smoothing_time_constant(), 0.1);
    }
}
