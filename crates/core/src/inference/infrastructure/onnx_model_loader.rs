use crate::inference::domain::models::{ModelLoader, Models};
use crate::inference::infrastructure::onnx_blazeface_detector::{
    OnnxBlazefaceDetector, SCORE_FLOOR,
};
use crate::inference::infrastructure::onnx_deepfake_classifier::OnnxDeepfakeClassifier;
use crate::shared::constants::{CLASSIFIER_MODEL_NAME, DETECTOR_MODEL_NAME};
use crate::shared::model_resolver::ModelLocations;

/// Resolves both model files and opens ONNX sessions for them.
pub struct OnnxModelLoader {
    locations: ModelLocations,
}

impl OnnxModelLoader {
    pub fn new(locations: ModelLocations) -> Self {
        Self { locations }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&mut self) -> Result<Models, Box<dyn std::error::Error>> {
        let detector_path = self.locations.resolve(DETECTOR_MODEL_NAME, None)?;
        let classifier_path = self.locations.resolve(CLASSIFIER_MODEL_NAME, None)?;
        log::info!(
            "Loading models: detector {}, classifier {}",
            detector_path.display(),
            classifier_path.display()
        );
        Ok(Models {
            detector: Box::new(OnnxBlazefaceDetector::new(&detector_path, SCORE_FLOOR)?),
            classifier: Box::new(OnnxDeepfakeClassifier::new(&classifier_path)?),
        })
    }
}
