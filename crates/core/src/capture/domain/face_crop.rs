use crate::inference::domain::face_detector::FaceBox;
use crate::shared::constants::{FACE_CROP_PADDING, MIN_FACE_CROP};
use crate::shared::frame::Frame;

/// Pixel rectangle inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Expands `face` by `padding` of its size on each side and clamps it to the
/// frame. Returns `None` when the result is smaller than the minimum crop.
pub fn padded_crop_rect(
    face: &FaceBox,
    frame_width: u32,
    frame_height: u32,
    padding: f64,
) -> Option<CropRect> {
    let pad_x = face.width * padding;
    let pad_y = face.height * padding;
    let x0 = (face.x - pad_x).floor().max(0.0);
    let y0 = (face.y - pad_y).floor().max(0.0);
    let x1 = (face.x + face.width + pad_x).ceil().min(frame_width as f64);
    let y1 = (face.y + face.height + pad_y).ceil().min(frame_height as f64);
    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    let rect = CropRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    };
    (rect.width >= MIN_FACE_CROP && rect.height >= MIN_FACE_CROP).then_some(rect)
}

/// Crops the padded face and resizes it to the classifier's square input.
pub fn crop_face(frame: &Frame, face: &FaceBox, input_size: u32) -> Option<Frame> {
    let rect = padded_crop_rect(face, frame.width(), frame.height(), FACE_CROP_PADDING)?;
    Some(
        frame
            .crop(rect.x, rect.y, rect.width, rect.height)
            .resize(input_size, input_size),
    )
}
