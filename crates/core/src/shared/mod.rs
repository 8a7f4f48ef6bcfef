pub mod constants;
pub mod detection_result;
pub mod frame;
pub mod model_resolver;
pub mod region;
pub mod settings;
pub mod timer;
