use image::{imageops, RgbImage};
use ndarray::ArrayView3;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Pixel-format conversion happens where frames enter the system (stream
/// decoders); everything downstream treats the buffer as packed RGB24.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: u64,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position of this frame in its source stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, Self::CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Copies the `w × h` rectangle at `(x, y)` into a new frame.
    ///
    /// The rectangle must lie inside the frame.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Frame {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let stride = self.width as usize * Self::CHANNELS;
        let row_len = w as usize * Self::CHANNELS;
        let mut data = Vec::with_capacity(row_len * h as usize);
        for row in y as usize..(y + h) as usize {
            let start = row * stride + x as usize * Self::CHANNELS;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Frame::new(data, w, h, self.index)
    }

    /// Bilinear resize to exactly `w × h`.
    pub fn resize(&self, w: u32, h: u32) -> Frame {
        if w == self.width && h == self.height {
            return self.clone();
        }
        let resized = imageops::resize(&self.to_rgb_image(), w, h, imageops::FilterType::Triangle);
        Frame::new(resized.into_raw(), w, h, self.index)
    }

    fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .expect("Frame data length must match dimensions")
    }
}
