use serde::{Deserialize, Serialize};

use crate::shared::constants::REGION_TOLERANCE_PX;

/// Bounding box of the qualifying video surface, in document coordinates.
///
/// Regions are immutable values: a changed surface produces a new `Region`
/// that replaces the previous one wholesale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub is_playing: bool,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32, is_playing: bool) -> Self {
        Self {
            x,
            y,
            width,
            height,
            is_playing,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// `[left, top, right, bottom]`.
    pub fn edges(&self) -> [i32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    pub fn contains_point(&self, px: f64, py: f64) -> bool {
        px >= self.x as f64
            && py >= self.y as f64
            && px < (self.x + self.width) as f64
            && py < (self.y + self.height) as f64
    }

    /// True when any edge moved by more than `tolerance` pixels or the
    /// playing flag flipped.
    pub fn differs_beyond(&self, other: &Region, tolerance: i32) -> bool {
        if self.is_playing != other.is_playing {
            return true;
        }
        self.edges()
            .iter()
            .zip(other.edges().iter())
            .any(|(a, b)| (a - b).abs() > tolerance)
    }

    /// Whether `self` should replace `previous` under the default tolerance.
    pub fn is_change_from(&self, previous: Option<&Region>) -> bool {
        previous.map_or(true, |p| self.differs_beyond(p, REGION_TOLERANCE_PX))
    }
}
