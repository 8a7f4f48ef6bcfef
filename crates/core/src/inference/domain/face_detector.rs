use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// A detected face in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub score: f64,
}

impl FaceBox {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Domain interface for face detection.
///
/// Implementations may keep per-stream state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}

/// Picks the face to analyze: the largest one, preferring faces whose
/// center lies inside `hint` when a hint is given and any face does.
pub fn select_primary_face(faces: &[FaceBox], hint: Option<&Region>) -> Option<FaceBox> {
    if let Some(region) = hint {
        let inside = faces.iter().filter(|f| {
            let (cx, cy) = f.center();
            region.contains_point(cx, cy)
        });
        if let Some(face) = largest(inside) {
            return Some(face);
        }
    }
    largest(faces.iter())
}

fn largest<'a>(candidates: impl Iterator<Item = &'a FaceBox>) -> Option<FaceBox> {
    candidates
        .max_by(|a, b| {
            a.area()
                .partial_cmp(&b.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()
}
