use serde::{Deserialize, Serialize};

use crate::shared::region::Region;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    None,
    /// A live stream (camera, WebRTC track).
    Live,
    /// A file or URL-backed source.
    File,
}

/// Computed visibility styles of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceStyle {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f64,
}

impl Default for SurfaceStyle {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
        }
    }
}

/// Vertical extent of the visible part of the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub scroll_y: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(scroll_y: i32, height: i32) -> Self {
        Self { scroll_y, height }
    }
}

/// A video element as seen in one scan of the host document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoSurface {
    /// Bounding box in document coordinates.
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub style: SurfaceStyle,
    pub source: MediaSource,
    #[serde(default)]
    pub has_error: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub ended: bool,
    /// Decoded frame size; absent until the first frame renders.
    #[serde(default)]
    pub decoded_size: Option<(u32, u32)>,
}

impl VideoSurface {
    /// A visible, playing, live surface at the given box.
    pub fn live(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            style: SurfaceStyle::default(),
            source: MediaSource::Live,
            has_error: false,
            paused: false,
            ended: false,
            decoded_size: None,
        }
    }

    /// Eligible for analysis.
    ///
    /// Decoded dimensions are deliberately not required: live sources report
    /// metadata before their first frame renders.
    pub fn is_qualifying(&self, viewport: &Viewport) -> bool {
        self.width > 0
            && self.height > 0
            && !self.style.display_none
            && !self.style.visibility_hidden
            && self.style.opacity > 0.0
            && self.source != MediaSource::None
            && !self.has_error
            && self.intersects_vertically(viewport)
    }

    fn intersects_vertically(&self, viewport: &Viewport) -> bool {
        let top = viewport.scroll_y;
        let bottom = viewport.scroll_y + viewport.height;
        self.y < bottom && self.y + self.height > top
    }

    pub fn region(&self) -> Region {
        Region::new(
            self.x,
            self.y,
            self.width,
            self.height,
            !self.paused && !self.ended,
        )
    }
}
