//! # Plant Identification
//!
//! A Rust library that identifies plant species from a photo using the Burn framework.
//! A general-purpose classifier first checks that the photo shows a plant at all;
//! only then does the species classifier rank its classes.
//!
//! ## Features
//!
//! - **Plant-presence gate** with keyword matching over a general classifier's labels
//! - **Species classifier** with a demo fallback when the model is unavailable
//! - **Single-flight model loading** so concurrent initialization loads each model once
//! - **Tensor accounting** to check that every code path releases what it allocates
//!
//! ## Modules
//!
//! - `inference`: Preprocessing, gate, species classifier, and the orchestrator
//! - `model`: CNN architecture built with Burn and the model loading seam
//! - `dataset`: Bundled label lists and the plant metadata catalog
//! - `assistant`: Q&A provider boundary for follow-up questions
//! - `utils`: Logging, error handling, and single-flight loading
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plant_id::config::PipelineConfig;
//! use plant_id::inference::{Outcome, PlantIdentifier};
//!
//! let pipeline = PlantIdentifier::from_config(&PipelineConfig::default());
//! pipeline.initialize().await?;
//!
//! match pipeline.classify(&std::fs::read("photo.jpg")?)? {
//!     Outcome::Accepted { top, .. } => println!("{}", top[0].class_name),
//!     Outcome::Rejected(gate) => println!("Not a plant"),
//! }
//! ```

pub mod assistant;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::PipelineConfig;
pub use dataset::{PlantCatalog, PlantRecord};
pub use inference::{
    ClassPrediction, ClassifierMode, GateDecision, Outcome, PlantIdentifier, RankedPredictions,
};
pub use utils::error::{PlantIdError, Result};

/// Number of species the bundled classifier knows
pub const NUM_CLASSES: usize = 86;

/// Square input size both classifiers expect
pub const INPUT_SIZE: usize = 224;

/// Predictions listed under the main match
pub const TOP_K: usize = 3;

/// Predictions handed to the result view
pub const PRESENTATION_TOP_K: usize = 5;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
