pub mod ffmpeg_stream;
pub mod pipeline_worker;
