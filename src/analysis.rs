//! Analysis node
//!
//! Keeps the most recent `fft_size` samples of the live tap and produces the
//! two byte buffers the visualizer draws from: frequency magnitudes and the
//! time-domain waveform, both in `[0, 255]`.

use rtrb::Consumer;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Default transform size.
pub const DEFAULT_FFT_SIZE: usize = 2048;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;
/// Decibel range mapped onto byte magnitudes.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// One draw tick's snapshot of the analysis buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizerFrame {
    pub frequency: Vec<u8>,
    pub time_domain: Vec<u8>,
}

impl VisualizerFrame {
    /// No energy and a flat center line.
    pub fn silent(len: usize) -> Self {
        Self {
            frequency: vec![0; len],
            time_domain: vec![128; len],
        }
    }
}

pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    /// Blackman window coefficients
    window: Vec<f32>,
    /// Circular sample history, oldest sample at `write`
    history: Vec<f32>,
    write: usize,
    scratch: Vec<Complex<f32>>,
    frame: VisualizerFrame,
}

impl Analyser {
    /// `fft_size` is rounded up to a power of two in `[32, 32768]`.
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        Self {
            fft,
            window,
            history: vec![0.0; fft_size],
            write: 0,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            frame: VisualizerFrame::silent(fft_size / 2),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    /// Length of both output buffers.
    pub fn frequency_bin_count(&self) -> usize {
        self.history.len() / 2
    }

    pub fn push(&mut self, samples: impl IntoIterator<Item = f32>) {
        let len = self.history.len();
        for sample in samples {
            self.history[self.write] = sample;
            self.write = (self.write + 1) % len;
        }
    }

    /// Pull everything currently queued on the tap. Returns the sample count.
    pub fn drain(&mut self, tap: &mut Consumer<f32>) -> usize {
        let available = tap.slots();
        self.push(std::iter::from_fn(|| tap.pop().ok()).take(available));
        available
    }

    /// Recompute both buffers from the current history.
    pub fn update(&mut self) -> &VisualizerFrame {
        let len = self.history.len();
        for i in 0..len {
            let sample = self.history[(self.write + i) % len];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);
        let bins = self.frequency_bin_count();
        for (byte, bin) in self.frame.frequency.iter_mut().zip(&self.scratch[..bins]) {
            let magnitude = bin.norm() / len as f32;
            let db = 20.0 * magnitude.max(1e-12).log10();
            *byte = (scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8;
        }

        // most recent `bins` samples
        for (i, byte) in self.frame.time_domain.iter_mut().enumerate() {
            let sample = self.history[(self.write + len - bins + i) % len];
            *byte = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }

        &self.frame
    }

    pub fn frame(&self) -> &VisualizerFrame {
        &self.frame
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtrb::RingBuffer;

    #[test]
    fn silence_is_flat_and_empty() {
        let mut analyser = Analyser::default();
        let frame = analyser.update();

        assert_eq!(frame.frequency.len(), 1024);
        assert_eq!(frame.time_domain.len(), 1024);
        assert!(frame.frequency.iter().all(|&b| b == 0));
        assert!(frame.time_domain.iter().all(|&b| b == 128));
    }

    #[test]
    fn bin_centered_sine_peaks_in_its_bin() {
        let mut analyser = Analyser::new(1024);
        let bin = 64;
        analyser.push((0..1024).map(|n| {
            (2.0 * std::f32::consts::PI * bin as f32 * n as f32 / 1024.0).sin()
        }));

        let frame = analyser.update();
        let peak = frame
            .frequency
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();

        assert_eq!(frame.frequency[bin], 255);
        assert!(peak.abs_diff(bin) <= 2);
        assert_eq!(frame.frequency[bin + 20], 0);
        assert_eq!(frame.frequency[bin - 20], 0);
    }

    #[test]
    fn time_domain_maps_and_clamps() {
        let mut analyser = Analyser::new(32);
        analyser.push([0.0, 0.5, -1.0, 2.0, -2.0]);
        let frame = analyser.update();

        let tail = &frame.time_domain[frame.time_domain.len() - 5..];
        assert_eq!(tail, &[128, 192, 0, 255, 0]);
    }

    #[test]
    fn drains_tap_into_history() {
        let (mut tx, mut rx) = RingBuffer::new(8);
        for _ in 0..5 {
            tx.push(1.0f32).unwrap();
        }
        let mut analyser = Analyser::new(32);

        assert_eq!(analyser.drain(&mut rx), 5);
        assert_eq!(rx.slots(), 0);
        let frame = analyser.update();
        assert!(frame.time_domain[11..].iter().all(|&b| b == 255));
        assert!(frame.time_domain[..11].iter().all(|&b| b == 128));
    }

    #[test]
    fn fft_size_is_normalized() {
        assert_eq!(Analyser::new(1000).fft_size(), 1024);
        assert_eq!(Analyser::new(1).fft_size(), 32);
        assert_eq!(Analyser::new(1 << 20).fft_size(), 32_768);
    }
}
