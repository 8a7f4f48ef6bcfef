//! Remote photoplethysmography (rPPG) over the forehead of the tracked face.
//!
//! Live skin shows a faint periodic colour change at the heart rate. The
//! analyzer buffers the mean forehead colour per frame, extracts a pulse
//! signal with the chrominance (CHROM) method and measures how much of its
//! spectrum falls in the cardiac band. Weak or absent pulse energy scores
//! towards 1.

use std::collections::VecDeque;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::inference::domain::face_detector::FaceBox;
use crate::shared::frame::Frame;

/// ~10 s at 30 Hz.
pub const MAX_SAMPLES: usize = 300;
pub const MIN_SAMPLES: usize = 60;

/// Score returned while fewer than `MIN_SAMPLES` have been buffered.
const WARMUP_SCORE: f64 = 0.0;
/// Score returned when the forehead cannot be sampled.
const UNKNOWN_SCORE: f64 = 0.5;

const FOREHEAD_HEIGHT_FRACTION: f64 = 0.15;
const FOREHEAD_X_FRACTION: (f64, f64) = (0.25, 0.75);

/// 40 to 200 BPM.
const CARDIAC_BAND_HZ: (f64, f64) = (0.67, 3.33);

pub struct PpgAnalyzer {
    sample_rate_hz: f64,
    samples: VecDeque<[f64; 3]>,
    planner: FftPlanner<f64>,
}

impl PpgAnalyzer {
    pub fn new(sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            planner: FftPlanner::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Samples the forehead of `face` in `frame` and returns the current
    /// anomaly score in `[0, 1]`.
    pub fn analyze(&mut self, frame: &Frame, face: &FaceBox) -> f64 {
        self.observe(forehead_mean_rgb(frame, face))
    }

    /// Buffers one mean-RGB sample (if any) and scores the buffer.
    pub fn observe(&mut self, rgb: Option<[f64; 3]>) -> f64 {
        let Some(rgb) = rgb else {
            return UNKNOWN_SCORE;
        };
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(rgb);
        if self.samples.len() < MIN_SAMPLES {
            return WARMUP_SCORE;
        }
        self.score()
    }

    fn score(&mut self) -> f64 {
        let n = self.samples.len();
        let channel = |c: usize| -> Vec<f64> {
            let values: Vec<f64> = self.samples.iter().map(|s| s[c]).collect();
            let m = mean(&values) + 1e-6;
            values.into_iter().map(|v| v / m).collect()
        };
        let (r, g, b) = (channel(0), channel(1), channel(2));

        let x: Vec<f64> = (0..n).map(|i| 3.0 * r[i] - 2.0 * g[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| 1.5 * r[i] + g[i] - 1.5 * b[i]).collect();
        let alpha = std_dev(&x) / (std_dev(&y) + 1e-9);

        let mut spectrum: Vec<Complex<f64>> = x
            .iter()
            .zip(&y)
            .map(|(xi, yi)| Complex::new(xi - alpha * yi, 0.0))
            .collect();
        self.planner.plan_fft_forward(n).process(&mut spectrum);

        // One-sided spectrum, bins 0..=n/2.
        let bin_hz = self.sample_rate_hz / n as f64;
        let (lo, hi) = CARDIAC_BAND_HZ;
        let mut in_band = 0.0;
        let mut total = 1e-9;
        for (k, c) in spectrum.iter().take(n / 2 + 1).enumerate() {
            let magnitude = c.norm();
            let freq = k as f64 * bin_hz;
            if (lo..=hi).contains(&freq) {
                in_band += magnitude;
            }
            total += magnitude;
        }
        let snr = in_band / total;
        let anomaly = (1.0 - 3.0 * snr).clamp(0.0, 1.0);
        log::trace!("rPPG snr={snr:.3} anomaly={anomaly:.3}");
        anomaly
    }
}

/// Mean RGB of the top 15% of `face`, middle half horizontally, clamped to
/// the frame. `None` if the region is empty.
pub fn forehead_mean_rgb(frame: &Frame, face: &FaceBox) -> Option<[f64; 3]> {
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    let (x, y) = (face.x as i64, face.y as i64);
    let (w, h) = (face.width as i64, face.height as i64);

    let y0 = y.max(0);
    let y1 = (y + ((h as f64 * FOREHEAD_HEIGHT_FRACTION) as i64).max(1)).min(fh);
    let x0 = (x + (w as f64 * FOREHEAD_X_FRACTION.0) as i64).max(0);
    let x1 = (x + (w as f64 * FOREHEAD_X_FRACTION.1) as i64).min(fw);
    if y1 <= y0 || x1 <= x0 {
        return None;
    }

    let pixels = frame.as_ndarray();
    let mut sum = [0.0f64; 3];
    for row in y0..y1 {
        for col in x0..x1 {
            for (c, acc) in sum.iter_mut().enumerate() {
                *acc += pixels[[row as usize, col as usize, c]] as f64;
            }
        }
    }
    let count = ((y1 - y0) * (x1 - x0)) as f64;
    Some(sum.map(|s| s / count))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len().max(1) as f64).sqrt()
}
