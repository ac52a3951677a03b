//! Bundled data: model label lists and the plant metadata catalog

pub mod catalog;
pub mod labels;

// Re-export main types for convenience
pub use catalog::{PlantCatalog, PlantRecord};
pub use labels::{load_labels, parse_labels, validate_labels};
