use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::inference::domain::classification::{classify, Classification, ThreatLevel};

/// Scores computed alongside the classifier probability.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuxiliarySignals {
    /// Classifier probability before fusion.
    pub model_confidence: f64,
    /// 0 = plausible pulse, 1 = absent or anomalous.
    pub pulse_anomaly: f64,
    /// 0 = stable across frames, 1 = erratic.
    pub temporal_inconsistency: f64,
}

/// Verdict for one analyzed frame. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame_number: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Probability of manipulation, the value the threat level was derived from.
    pub raw_confidence: f64,
    pub face_detected: bool,
    pub face_count: usize,
    pub classification: Classification,
    pub threat_level: ThreatLevel,
    pub inference_latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<AuxiliarySignals>,
}

impl DetectionResult {
    /// Result for a classified face; the bands come from `raw_confidence`.
    pub fn scored(
        frame_number: u64,
        raw_confidence: f64,
        face_count: usize,
        inference_latency_ms: f64,
        signals: Option<AuxiliarySignals>,
    ) -> Self {
        // NaN survives `clamp`.
        let raw_confidence = if raw_confidence.is_finite() {
            raw_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (classification, threat_level) = classify(raw_confidence);
        Self {
            frame_number,
            timestamp_ms: now_ms(),
            raw_confidence,
            face_detected: true,
            face_count,
            classification,
            threat_level,
            inference_latency_ms,
            signals,
        }
    }

    /// Result for a frame without an analyzable face. Informative, never a threat.
    pub fn no_face(frame_number: u64, face_count: usize, inference_latency_ms: f64) -> Self {
        Self {
            frame_number,
            timestamp_ms: now_ms(),
            raw_confidence: 0.0,
            face_detected: false,
            face_count,
            classification: Classification::Real,
            threat_level: ThreatLevel::Safe,
            inference_latency_ms,
            signals: None,
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
