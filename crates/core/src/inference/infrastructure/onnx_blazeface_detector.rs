//! BlazeFace short-range face detector on ONNX Runtime.
//!
//! Boxes are decoded from the 896 anchors, thresholded at a permissive floor
//! and de-duplicated with NMS. The quality tier's stricter threshold is
//! applied by the frame analyzer.
use std::path::Path;

use crate::inference::domain::face_detector::{FaceBox, FaceDetector};
use crate::inference::infrastructure::execution_provider::session_builder;
use crate::shared::frame::Frame;

const INPUT_SIZE: u32 = 128;

/// Lowest tier threshold; weaker anchors are discarded before NMS.
pub const SCORE_FLOOR: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.3;

const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    score_floor: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, score_floor: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = session_builder()?.commit_from_file(model_path)?;
        Ok(Self {
            session,
            score_floor,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        let input = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))?;
        let outputs = self.session.run(ort::inputs![input])?;

        // regressors [1, 896, 16], classificators [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let logits = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut candidates = decode(
            &self.anchors,
            reg,
            logits,
            self.score_floor,
            frame.width() as f64,
            frame.height() as f64,
        );
        Ok(nms(&mut candidates, NMS_IOU_THRESH))
    }
}

/// Nearest-neighbour resize to `size × size`, scaled to `[0, 1]`, NCHW.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let (src_w, src_h) = (frame.width() as usize, frame.height() as usize);
    let s = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let sy = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let sx = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Anchor centers for the short-range model: a 16×16 grid with 2 anchors per
/// cell, then an 8×8 grid with 6.
fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in [(8usize, 2usize), (16, 6)] {
        let grid = INPUT_SIZE as usize / stride;
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

/// Converts raw model outputs into frame-space boxes above `floor`.
fn decode(
    anchors: &[[f32; 2]],
    reg: &[f32],
    logits: &[f32],
    floor: f64,
    frame_w: f64,
    frame_h: f64,
) -> Vec<FaceBox> {
    let size = INPUT_SIZE as f64;
    anchors
        .iter()
        .zip(logits)
        .enumerate()
        .filter_map(|(i, (anchor, &logit))| {
            let score = sigmoid(logit as f64);
            let offset = i * REGRESSOR_STRIDE;
            if score < floor || offset + 4 > reg.len() {
                return None;
            }
            let cx = anchor[0] as f64 + reg[offset] as f64 / size;
            let cy = anchor[1] as f64 + reg[offset + 1] as f64 / size;
            let w = reg[offset + 2] as f64 / size;
            let h = reg[offset + 3] as f64 / size;

            let x1 = ((cx - w / 2.0) * frame_w).max(0.0);
            let y1 = ((cy - h / 2.0) * frame_h).max(0.0);
            let x2 = ((cx + w / 2.0) * frame_w).min(frame_w);
            let y2 = ((cy + h / 2.0) * frame_h).min(frame_h);
            (x2 > x1 && y2 > y1).then_some(FaceBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                score,
            })
        })
        .collect()
}

fn nms(boxes: &mut [FaceBox], iou_thresh: f64) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes.iter() {
        if keep.iter().all(|k| iou(k, candidate) <= iou_thresh) {
            keep.push(*candidate);
        }
    }
    keep
}

fn iou(a: &FaceBox, b: &FaceBox) -> f64 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);
    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    inter / (a.area() + b.area() - inter)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
