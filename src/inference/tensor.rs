//! Image tensors passed between pipeline stages
//!
//! An [`ImageTensor`] is a dense `f32` array in NHWC layout. Each tensor is
//! owned by exactly one stage at a time and is released when dropped. When a
//! [`TensorTracker`] is attached, every allocation and release is counted so
//! callers can verify that a code path neither leaks nor double-frees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantIdError, Result};

/// Pixel intensity range a model was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelScale {
    /// Raw 0-255 intensities
    #[default]
    Raw,
    /// Intensities divided by 255 into 0-1
    Unit,
}

impl PixelScale {
    /// Largest value a pixel can take in this scale
    pub fn max_value(self) -> f32 {
        match self {
            PixelScale::Raw => 255.0,
            PixelScale::Unit => 1.0,
        }
    }

    /// Map a raw 0-255 byte into this scale
    pub fn from_byte(self, value: u8) -> f32 {
        match self {
            PixelScale::Raw => value as f32,
            PixelScale::Unit => value as f32 / 255.0,
        }
    }

    /// Factor that converts a value in `self` into `target`
    pub fn factor_to(self, target: PixelScale) -> f32 {
        target.max_value() / self.max_value()
    }
}

/// Counts tensor allocations and releases
#[derive(Debug, Default)]
pub struct TensorTracker {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl TensorTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Tensors currently alive
    pub fn live(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }

    fn on_allocate(&self) {
        self.allocated.fetch_add(1, Ordering::SeqCst);
    }

    fn on_release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Dense NHWC image tensor
#[derive(Debug)]
pub struct ImageTensor {
    data: Vec<f32>,
    shape: [usize; 4],
    scale: PixelScale,
    tracker: Option<Arc<TensorTracker>>,
}

impl ImageTensor {
    /// Build a tensor from raw values; `data.len()` must equal the shape's element count.
    pub fn new(
        data: Vec<f32>,
        shape: [usize; 4],
        scale: PixelScale,
        tracker: Option<Arc<TensorTracker>>,
    ) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(PlantIdError::Preprocess(format!(
                "tensor data has {} values but shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }

        if let Some(tracker) = &tracker {
            tracker.on_allocate();
        }

        Ok(Self {
            data,
            shape,
            scale,
            tracker,
        })
    }

    /// Zero-filled `[1, size, size, 3]` tensor, used for warm-up runs
    pub fn zeros(size: usize, scale: PixelScale, tracker: Option<Arc<TensorTracker>>) -> Self {
        let shape = [1, size, size, 3];
        let data = vec![0.0; shape.iter().product()];
        if let Some(tracker) = &tracker {
            tracker.on_allocate();
        }
        Self {
            data,
            shape,
            scale,
            tracker,
        }
    }

    /// Shape as `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn scale(&self) -> PixelScale {
        self.scale
    }

    /// Check that this tensor is `[1, size, size, 3]`
    pub fn expect_input(&self, size: usize) -> Result<()> {
        let expected = [1, size, size, 3];
        if self.shape != expected {
            return Err(PlantIdError::Inference(format!(
                "expected input shape {:?}, got {:?}",
                expected, self.shape
            )));
        }
        Ok(())
    }

    /// Values converted to `target` scale
    pub fn values_in(&self, target: PixelScale) -> Vec<f32> {
        let factor = self.scale.factor_to(target);
        if factor == 1.0 {
            self.data.clone()
        } else {
            self.data.iter().map(|v| v * factor).collect()
        }
    }
}

impl Drop for ImageTensor {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            tracker.on_release();
        }
    }
}
