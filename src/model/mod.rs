//! Model module for the CNN and the loaded-model seam
//!
//! This module provides:
//! - The convolutional species classifier built with Burn
//! - The `ImageModel` trait both classifiers run through
//! - Loading a model and its labels from bundled storage

pub mod cnn;
pub mod loader;

// Re-export main types for convenience
pub use cnn::{ConvClassifier, ConvClassifierConfig};
pub use loader::{BurnImageModel, BurnModelLoader, ImageModel, ModelLoader};
