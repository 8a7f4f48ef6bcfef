use crate::shared::frame::Frame;

/// Opaque scoring function: probability that a face crop was synthetically
/// manipulated.
pub trait DeepfakeClassifier: Send {
    /// Square input resolution the face crop is resized to before `predict`.
    fn input_size(&self) -> u32;

    /// Identifier of the accelerator backend the model runs on.
    fn backend(&self) -> &str;

    /// Returns a probability in `[0, 1]`; `face` is already `input_size` square.
    fn predict(&mut self, face: &Frame) -> Result<f64, Box<dyn std::error::Error>>;
}
