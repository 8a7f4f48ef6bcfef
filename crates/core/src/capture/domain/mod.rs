pub mod face_crop;
pub mod frame_analyzer;
pub mod latency_window;
pub mod media_stream;
pub mod pipeline_logger;
