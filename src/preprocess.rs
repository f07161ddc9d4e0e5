//! Image preprocessing for classifier inference.
//!
//! Turns uploaded image bytes into the `1x3x256x256` CHW tensor the model was
//! trained on: decode to RGB, direct resize (aspect ratio is not preserved),
//! scale to [0, 1], then per-channel mean/std normalization.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbImage;

/// Square side length of the model input
pub const INPUT_SIZE: u32 = 256;

/// Number of colour channels fed to the model
pub const CHANNELS: usize = 3;

/// Per-channel mean (ImageNet statistics)
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation (ImageNet statistics)
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed, deterministic preprocessing pipeline.
///
/// Normalization is folded into `value * alpha + beta` with
/// `alpha = 1 / (255 * std)` and `beta = -mean / std`.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    size: u32,
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl ImagePreprocessor {
    /// Create the preprocessor used by the served model.
    pub fn new() -> Self {
        Self {
            size: INPUT_SIZE,
            alpha: std::array::from_fn(|c| 1.0 / (255.0 * STD[c])),
            beta: std::array::from_fn(|c| -MEAN[c] / STD[c]),
        }
    }

    /// Tensor shape expected by the model: `[batch, channels, height, width]`.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, CHANNELS, self.size as usize, self.size as usize]
    }

    /// Decode any format the `image` crate understands into RGB8.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        let image = image::load_from_memory(bytes).context("Failed to decode uploaded image")?;
        Ok(image.to_rgb8())
    }

    /// Decode and convert raw upload bytes into a model input tensor.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let image = self.decode(bytes)?;
        Ok(self.to_tensor(&image))
    }

    /// Resize and normalize an RGB image into a CHW tensor.
    pub fn to_tensor(&self, image: &RgbImage) -> Vec<f32> {
        let resized;
        let image = if image.dimensions() == (self.size, self.size) {
            image
        } else {
            resized = image::imageops::resize(image, self.size, self.size, FilterType::Triangle);
            &resized
        };

        let side = self.size as usize;
        let plane = side * side;
        let mut tensor = vec![0.0f32; CHANNELS * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for c in 0..CHANNELS {
                tensor[c * plane + offset] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
            }
        }

        tensor
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}
