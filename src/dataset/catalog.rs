//! Plant metadata catalog
//!
//! Maps a species class name to its descriptive record. Lookups are by exact
//! class name; a missing entry is not an error and callers fall back to the
//! raw class name.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Descriptive record for one species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRecord {
    pub id: u32,
    pub turkish_name: String,
    pub scientific_name: String,
    pub toxicity: String,
    pub edible: String,
    pub geography: String,
    pub description: String,
}

/// Class name → record lookup loaded from bundled data
#[derive(Debug, Clone, Default)]
pub struct PlantCatalog {
    records: HashMap<String, PlantRecord>,
}

impl PlantCatalog {
    /// Parse a JSON object keyed by class name
    pub fn from_json(json: &str) -> Result<Self> {
        let records: HashMap<String, PlantRecord> = serde_json::from_str(json)?;
        Ok(Self { records })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        tracing::debug!("Loaded {} plant records from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn get(&self, class_name: &str) -> Option<&PlantRecord> {
        self.records.get(class_name)
    }

    /// Local name of the plant, or the raw class name when unknown
    pub fn display_name<'a>(&'a self, class_name: &'a str) -> &'a str {
        self.get(class_name)
            .map(|record| record.turkish_name.as_str())
            .unwrap_or(class_name)
    }

    /// Scientific name, or `fallback` when unknown
    pub fn scientific_name_or<'a>(&'a self, class_name: &str, fallback: &'a str) -> &'a str {
        self.get(class_name)
            .map(|record| record.scientific_name.as_str())
            .unwrap_or(fallback)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
