//! Inference module: from image bytes to a ranked species list
//!
//! This module provides:
//! - Decoding and normalizing images into tensors
//! - The plant-presence gate
//! - The species classifier with its demo fallback
//! - The orchestrator that sequences them
//!
//! ## Flow
//!
//! bytes → `Preprocessor` → `PlantDetector` → (rejected | `SpeciesService`) → `Outcome`

pub mod detector;
pub mod pipeline;
pub mod prediction;
pub mod preprocess;
pub mod species;
pub mod tensor;

// Re-export main types for convenience
pub use detector::{GateDecision, KeywordPolicy, PlantDetector, DEFAULT_PLANT_KEYWORDS};
pub use pipeline::{Outcome, PlantIdentifier, Stage};
pub use prediction::{ClassPrediction, ConfidenceLevel, RankedPredictions};
pub use preprocess::Preprocessor;
pub use species::{ClassifierMode, DemoClassifier, DemoSettings, RealClassifier, SpeciesClassifier, SpeciesService};
pub use tensor::{ImageTensor, PixelScale, TensorTracker};
