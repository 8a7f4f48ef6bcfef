pub mod execution_provider;
pub mod onnx_blazeface_detector;
pub mod onnx_deepfake_classifier;
pub mod onnx_model_loader;
