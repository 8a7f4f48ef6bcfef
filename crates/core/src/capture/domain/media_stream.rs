use thiserror::Error;

use crate::messaging::domain::messages::StreamId;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied for {0}")]
    PermissionDenied(String),
    #[error("source is gone: {0}")]
    SourceGone(String),
    #[error("failed to decode stream: {0}")]
    Decode(String),
}

/// A live media stream owned by the frame pipeline.
pub trait MediaStream: Send {
    /// Native decoded size, `None` until the first frame's metadata is known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Latest decoded frame, `None` if nothing new has arrived yet.
    fn current_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Releases the underlying tracks. Safe to call more than once.
    fn stop(&mut self);
}

/// Resolves an opaque stream reference into a live stream.
pub trait StreamProvider: Send {
    fn acquire(&mut self, stream_id: &StreamId) -> Result<Box<dyn MediaStream>, CaptureError>;
}
