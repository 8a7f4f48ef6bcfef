use std::time::Instant;

use crate::analysis::domain::ppg_analyzer::PpgAnalyzer;
use crate::analysis::domain::score_fusion::decisive_confidence;
use crate::analysis::domain::temporal_consistency::TemporalConsistency;
use crate::capture::domain::face_crop::crop_face;
use crate::capture::domain::latency_window::LatencyWindow;
use crate::capture::domain::pipeline_logger::PipelineLogger;
use crate::inference::domain::face_detector::{select_primary_face, FaceBox};
use crate::inference::domain::models::Models;
use crate::messaging::domain::messages::SamplingConfig;
use crate::shared::detection_result::{AuxiliarySignals, DetectionResult};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::shared::settings::{ScoringMode, Settings};

/// Turns one full-resolution frame into one [`DetectionResult`].
///
/// Without models every frame yields a no-face result, so counters keep
/// moving while the classifier is unavailable.
pub struct FrameAnalyzer {
    models: Option<Models>,
    logger: Box<dyn PipelineLogger>,
    scoring_mode: ScoringMode,
    min_face_score: f64,
    next_frame_number: u64,
    ppg: PpgAnalyzer,
    temporal: TemporalConsistency,
    latency: LatencyWindow,
}

impl FrameAnalyzer {
    pub fn new(models: Option<Models>, logger: Box<dyn PipelineLogger>) -> Self {
        let defaults = SamplingConfig::from_settings(&Settings::default());
        Self {
            models,
            logger,
            scoring_mode: defaults.scoring_mode,
            min_face_score: defaults.quality_tier.detector_confidence(),
            next_frame_number: 0,
            ppg: PpgAnalyzer::new(defaults.sampling_rate_hz),
            temporal: TemporalConsistency::default(),
            latency: LatencyWindow::default(),
        }
    }

    pub fn install_models(&mut self, models: Models) {
        self.models = Some(models);
    }

    pub fn has_models(&self) -> bool {
        self.models.is_some()
    }

    pub fn backend(&self) -> Option<&str> {
        self.models.as_ref().map(|m| m.backend())
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        self.latency.average()
    }

    /// Clears all per-stream state and applies `config`.
    pub fn reset(&mut self, config: &SamplingConfig) {
        self.scoring_mode = config.scoring_mode;
        self.min_face_score = config.quality_tier.detector_confidence();
        self.next_frame_number = 0;
        self.ppg = PpgAnalyzer::new(config.sampling_rate_hz);
        self.temporal.reset();
        self.latency.clear();
        self.logger.reset();
    }

    pub fn finish(&self) {
        self.logger.summary();
    }

    /// Analyzes `frame`. `hint` only biases which face is chosen; detection
    /// always covers the whole frame.
    pub fn analyze(
        &mut self,
        frame: &Frame,
        hint: Option<&Region>,
    ) -> Result<DetectionResult, Box<dyn std::error::Error>> {
        let started = Instant::now();
        let frame_number = self.next_frame_number;

        let result = match self.models.as_mut() {
            None => DetectionResult::no_face(frame_number, 0, 0.0),
            Some(models) => {
                let t = Instant::now();
                let faces: Vec<FaceBox> = models
                    .detector
                    .detect(frame)?
                    .into_iter()
                    .filter(|f| f.score >= self.min_face_score)
                    .collect();
                self.logger.timing("detect", elapsed_ms(t));
                self.logger.metric("faces", faces.len() as f64);

                let face = select_primary_face(&faces, hint);
                let crop = face.and_then(|f| {
                    crop_face(frame, &f, models.classifier.input_size()).map(|c| (f, c))
                });
                match crop {
                    None => DetectionResult::no_face(frame_number, faces.len(), elapsed_ms(started)),
                    Some((face, crop)) => {
                        let t = Instant::now();
                        let probability = models.classifier.predict(&crop)?;
                        self.logger.timing("classify", elapsed_ms(t));
                        if !probability.is_finite() {
                            return Err(format!(
                                "classifier returned {probability} for frame {frame_number}"
                            )
                            .into());
                        }
                        let model_confidence = probability.clamp(0.0, 1.0);

                        let signals = match self.scoring_mode {
                            ScoringMode::ModelOnly => None,
                            ScoringMode::Fused => Some(AuxiliarySignals {
                                model_confidence,
                                pulse_anomaly: self.ppg.analyze(frame, &face),
                                temporal_inconsistency: self.temporal.update(model_confidence),
                            }),
                        };
                        let confidence = signals
                            .as_ref()
                            .map(|s| decisive_confidence(self.scoring_mode, s))
                            .unwrap_or(model_confidence);
                        DetectionResult::scored(
                            frame_number,
                            confidence,
                            faces.len(),
                            elapsed_ms(started),
                            signals,
                        )
                    }
                }
            }
        };

        self.next_frame_number += 1;
        self.latency.push(result.inference_latency_ms);
        self.logger.timing("inference", result.inference_latency_ms);
        self.logger.frame(frame_number);
        log::trace!(
            "Frame {frame_number}: {} ({:.3}) faces={} latency={:.1}ms",
            result.threat_level,
            result.raw_confidence,
            result.face_count,
            result.inference_latency_ms
        );
        Ok(result)
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
