use std::collections::VecDeque;

use crate::analysis::domain::ppg_analyzer::std_dev;

pub const DEFAULT_WINDOW: usize = 30;
const MIN_SAMPLES: usize = 3;

/// Scores how erratic the classifier output is across recent frames.
///
/// Real footage gives a steady probability; face swaps tend to flicker as
/// blending fails on individual frames. Score is
/// `clamp(2 * stddev + mean |delta|, 0, 1)` over the window.
#[derive(Clone, Debug)]
pub struct TemporalConsistency {
    window: usize,
    history: VecDeque<f64>,
}

impl TemporalConsistency {
    pub fn new(window: usize) -> Self {
        let window = window.max(MIN_SAMPLES);
        Self {
            window,
            history: VecDeque::with_capacity(window),
        }
    }

    pub fn update(&mut self, confidence: f64) -> f64 {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(confidence);
        self.score()
    }

    pub fn score(&self) -> f64 {
        if self.history.len() < MIN_SAMPLES {
            return 0.0;
        }
        let values: Vec<f64> = self.history.iter().copied().collect();
        let jitter = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
            / (values.len() - 1) as f64;
        (2.0 * std_dev(&values) + jitter).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for TemporalConsistency {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
