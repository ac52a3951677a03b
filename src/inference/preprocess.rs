//! Image Decoder/Normalizer
//!
//! Turns encoded image bytes (JPEG, PNG, ...) into the `[1, size, size, 3]`
//! tensor both classifiers consume. Steps run in a fixed order matching
//! training-time preprocessing: decode, drop alpha, bilinear resize, add the
//! batch dimension. Each intermediate buffer is consumed by the next step,
//! so only the final tensor outlives the call.

use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage, RgbImage};
use tracing::debug;

use super::tensor::{ImageTensor, PixelScale, TensorTracker};
use crate::config::PreprocessConfig;
use crate::utils::error::{PlantIdError, Result};

/// Decoder/normalizer configured for one deployed model
#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_size: u32,
    scale: PixelScale,
    tracker: Option<Arc<TensorTracker>>,
}

impl Preprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            input_size: config.input_size,
            scale: config.pixel_scale,
            tracker: None,
        }
    }

    /// Count every tensor this preprocessor produces
    pub fn with_tracker(mut self, tracker: Arc<TensorTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn scale(&self) -> PixelScale {
        self.scale
    }

    pub fn tracker(&self) -> Option<&Arc<TensorTracker>> {
        self.tracker.as_ref()
    }

    /// Decode and normalize an encoded image
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor> {
        let decoded = image::load_from_memory(bytes).map_err(PlantIdError::Decode)?;
        debug!(
            "Image decoded: {}x{} ({:?})",
            decoded.width(),
            decoded.height(),
            decoded.color()
        );
        self.preprocess_image(decoded)
    }

    /// Normalize an already decoded image
    pub fn preprocess_image(&self, decoded: DynamicImage) -> Result<ImageTensor> {
        if self.input_size == 0 {
            return Err(PlantIdError::Preprocess(
                "input size must be greater than 0".to_string(),
            ));
        }
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PlantIdError::Preprocess(format!(
                "image has no pixels ({}x{})",
                decoded.width(),
                decoded.height()
            )));
        }

        let rgb = strip_alpha(decoded);
        let resized = resize_bilinear(rgb, self.input_size);

        let size = self.input_size as usize;
        let data: Vec<f32> = resized
            .into_raw()
            .into_iter()
            .map(|v| self.scale.from_byte(v))
            .collect();

        let tensor = ImageTensor::new(data, [1, size, size, 3], self.scale, self.tracker.clone())?;
        debug!("Image preprocessed, tensor shape: {:?}", tensor.shape());
        Ok(tensor)
    }
}

/// Keep exactly three channels
fn strip_alpha(image: DynamicImage) -> RgbImage {
    image.into_rgb8()
}

/// Resize to `size`x`size` with a triangle (bilinear) filter
fn resize_bilinear(image: RgbImage, size: u32) -> RgbImage {
    image::imageops::resize(&image, size, size, FilterType::Triangle)
}
