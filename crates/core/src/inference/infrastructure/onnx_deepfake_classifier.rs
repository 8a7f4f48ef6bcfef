use std::path::Path;

use crate::inference::domain::deepfake_classifier::DeepfakeClassifier;
use crate::inference::infrastructure::execution_provider::{backend_name, session_builder};
use crate::shared::constants::{CLASSIFIER_INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD};
use crate::shared::frame::Frame;

/// Binary real/fake classifier on ONNX Runtime.
///
/// Expects an ImageNet-normalized NCHW float tensor. Two output logits are
/// read as `[real, fake]`; a single output is read as a fake logit.
pub struct OnnxDeepfakeClassifier {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxDeepfakeClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = session_builder()?.commit_from_file(model_path)?;
        Ok(Self {
            session,
            input_size: CLASSIFIER_INPUT_SIZE,
        })
    }
}

impl DeepfakeClassifier for OnnxDeepfakeClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn backend(&self) -> &str {
        backend_name()
    }

    fn predict(&mut self, face: &Frame) -> Result<f64, Box<dyn std::error::Error>> {
        if face.width() != self.input_size || face.height() != self.input_size {
            return Err(format!(
                "classifier expects {0}x{0} input, got {1}x{2}",
                self.input_size,
                face.width(),
                face.height()
            )
            .into());
        }
        let input = ort::value::Tensor::from_array(preprocess(face))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let logits = outputs[0].try_extract_array::<f32>()?;
        let logits = logits.as_slice().ok_or("Cannot get logit slice")?;
        fake_probability(logits)
    }
}

/// ImageNet mean/std normalization into a `[1, 3, h, w]` tensor.
fn preprocess(face: &Frame) -> ndarray::Array4<f32> {
    let src = face.as_ndarray();
    let (w, h) = (face.width() as usize, face.height() as usize);
    ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        (src[[y, x, c]] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    })
}

fn fake_probability(logits: &[f32]) -> Result<f64, Box<dyn std::error::Error>> {
    match logits {
        [fake] => Ok(1.0 / (1.0 + (-(*fake as f64)).exp())),
        [real, fake, ..] => {
            let (real, fake) = (*real as f64, *fake as f64);
            let max = real.max(fake);
            let (er, ef) = ((real - max).exp(), (fake - max).exp());
            Ok(ef / (er + ef))
        }
        [] => Err("classifier produced no output".into()),
    }
}
