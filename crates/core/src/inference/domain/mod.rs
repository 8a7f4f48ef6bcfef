pub mod classification;
pub mod deepfake_classifier;
pub mod face_detector;
pub mod models;
