use serde::Serialize;

use crate::inference::domain::classification::{classify, Classification, ThreatLevel};
use crate::shared::detection_result::DetectionResult;

/// Aggregate verdict over a run of results.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub frames: usize,
    pub face_frames: usize,
    pub mean_confidence: f64,
    pub classification: Classification,
    pub threat_level: ThreatLevel,
    pub peak_threat: ThreatLevel,
}

/// Averages the confidence of face-bearing frames. `None` when no frame had
/// a face.
pub fn summarize(results: &[DetectionResult]) -> Option<Verdict> {
    let faces: Vec<&DetectionResult> = results.iter().filter(|r| r.face_detected).collect();
    if faces.is_empty() {
        return None;
    }
    let mean_confidence =
        faces.iter().map(|r| r.raw_confidence).sum::<f64>() / faces.len() as f64;
    let (classification, threat_level) = classify(mean_confidence);
    let peak_threat = faces
        .iter()
        .map(|r| r.threat_level)
        .max()
        .unwrap_or(ThreatLevel::Safe);
    Some(Verdict {
        frames: results.len(),
        face_frames: faces.len(),
        mean_confidence,
        classification,
        threat_level,
        peak_threat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_no_faces_gives_no_verdict() {
        let results = vec![DetectionResult::no_face(0, 0, 1.0)];
        assert!(summarize(&results).is_none());
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_no_face_frames_are_excluded_from_mean() {
        let results = vec![
            DetectionResult::scored(0, 0.2, 1, 1.0, None),
            DetectionResult::no_face(1, 0, 1.0),
            DetectionResult::scored(2, 0.6, 1, 1.0, None),
        ];
        let v = summarize(&results).unwrap();
        assert_eq!(v.frames, 3);
        assert_eq!(v.face_frames, 2);
        assert_relative_eq!(v.mean_confidence, 0.4);
        assert_eq!(v.threat_level, ThreatLevel::Warning);
        assert_eq!(v.peak_threat, ThreatLevel::Warning);
    }

    #[test]
    fn test_peak_threat_tracks_worst_frame() {
        let results = vec![
            DetectionResult::scored(0, 0.1, 1, 1.0, None),
            DetectionResult::scored(1, 0.1, 1, 1.0, None),
            DetectionResult::scored(2, 0.9, 1, 1.0, None),
        ];
        let v = summarize(&results).unwrap();
        // Mean 0.367 lands in the middle band even though one frame is Danger.
        assert_eq!(v.classification, Classification::Suspicious);
        assert_eq!(v.peak_threat, ThreatLevel::Danger);
    }
}
