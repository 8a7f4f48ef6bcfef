use crate::inference::domain::deepfake_classifier::DeepfakeClassifier;
use crate::inference::domain::face_detector::FaceDetector;

/// The detector and classifier a pipeline runs with.
pub struct Models {
    pub detector: Box<dyn FaceDetector>,
    pub classifier: Box<dyn DeepfakeClassifier>,
}

impl Models {
    pub fn backend(&self) -> &str {
        self.classifier.backend()
    }
}

/// Loads models inside the processing context, once per context lifetime.
pub trait ModelLoader: Send {
    fn load(&mut self) -> Result<Models, Box<dyn std::error::Error>>;
}
