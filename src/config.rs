//! Pipeline Configuration Module
//!
//! Configuration for preprocessing, both classifiers, presentation, and the
//! bundled resources they read. Serialized as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::inference::detector::DEFAULT_PLANT_KEYWORDS;
use crate::inference::tensor::PixelScale;
use crate::utils::error::{PlantIdError, Result};
use crate::{INPUT_SIZE, NUM_CLASSES, PRESENTATION_TOP_K, TOP_K};

/// Complete configuration for the identification pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub gate: GateConfig,
    pub species: SpeciesConfig,
    pub presentation: PresentationConfig,
    /// Plant metadata file keyed by class name
    pub catalog_path: Option<PathBuf>,
}

/// Image decoder/normalizer settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Square input size in pixels
    pub input_size: u32,
    /// Intensity scale of the produced tensor (the species model's contract)
    pub pixel_scale: PixelScale,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: INPUT_SIZE as u32,
            pixel_scale: PixelScale::Raw,
        }
    }
}

/// Plant-presence gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Burn record of the general-purpose classifier
    pub model_path: PathBuf,
    /// Label list of the general-purpose classifier
    pub labels_path: PathBuf,
    /// Intensity scale the general-purpose classifier expects
    pub pixel_scale: PixelScale,
    /// How many top predictions are checked for keywords
    pub top_n: usize,
    /// Ordered keyword rules
    pub keywords: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/models/detector.mpk"),
            labels_path: PathBuf::from("assets/imagenet_labels.json"),
            pixel_scale: PixelScale::Unit,
            top_n: 5,
            keywords: DEFAULT_PLANT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Species classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub pixel_scale: PixelScale,
    pub num_classes: usize,
    /// Fixed seed for demo-mode predictions; random when absent
    pub demo_seed: Option<u64>,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/models/species.mpk"),
            labels_path: PathBuf::from("assets/labels.json"),
            pixel_scale: PixelScale::Raw,
            num_classes: NUM_CLASSES,
            demo_seed: None,
        }
    }
}

/// How results are cut down for display
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Entries listed under the main match
    pub top_k: usize,
    /// Entries handed to the result view
    pub max_results: usize,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            top_k: TOP_K,
            max_results: PRESENTATION_TOP_K,
        }
    }
}

impl PipelineConfig {
    /// Resolve every relative resource path against `root`
    pub fn with_asset_root(mut self, root: &Path) -> Self {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        };
        resolve(&mut self.gate.model_path);
        resolve(&mut self.gate.labels_path);
        resolve(&mut self.species.model_path);
        resolve(&mut self.species.labels_path);
        if let Some(catalog) = self.catalog_path.as_mut() {
            resolve(catalog);
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.preprocess.input_size == 0 {
            return Err(PlantIdError::Config(
                "preprocess.input_size must be greater than 0".to_string(),
            ));
        }
        if self.gate.top_n == 0 {
            return Err(PlantIdError::Config(
                "gate.top_n must be greater than 0".to_string(),
            ));
        }
        if self.gate.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(PlantIdError::Config(
                "gate.keywords must contain at least one keyword".to_string(),
            ));
        }
        if self.species.num_classes == 0 {
            return Err(PlantIdError::Config(
                "species.num_classes must be greater than 0".to_string(),
            ));
        }
        if self.species.pixel_scale != self.preprocess.pixel_scale {
            return Err(PlantIdError::Config(format!(
                "preprocess.pixel_scale ({:?}) must match species.pixel_scale ({:?})",
                self.preprocess.pixel_scale, self.species.pixel_scale
            )));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
