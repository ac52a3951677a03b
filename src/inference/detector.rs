//! Plant-presence gate
//!
//! Runs a general-purpose image classifier and decides from its top labels
//! whether the photo shows a plant at all. The decision itself is a pure
//! function of the ranked labels ([`KeywordPolicy::decide`]) so it can be
//! tested without a model.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::prediction::{ClassPrediction, RankedPredictions};
use super::tensor::ImageTensor;
use crate::config::GateConfig;
use crate::model::{ImageModel, ModelLoader};
use crate::utils::error::{PlantIdError, Result};
use crate::utils::logging::InferenceTimer;
use crate::utils::single_flight::{FlightStatus, SingleFlight};

/// Labels of the general classifier that indicate a plant or nature subject
pub const DEFAULT_PLANT_KEYWORDS: &[&str] = &[
    // Trees & plants
    "plant", "tree", "flower", "leaf", "bush", "shrub", "vine", "fern", "moss", "grass",
    "oak", "pine", "palm", "fig", "maple", "willow", "birch", "cedar", "cypress", "spruce",
    "acacia", "eucalyptus", "bamboo", "cactus", "succulent",
    // Flowers
    "daisy", "rose", "tulip", "sunflower", "dandelion", "lily", "orchid", "iris",
    "poppy", "lavender", "carnation", "marigold", "daffodil", "peony", "chrysanthemum",
    "hibiscus", "jasmine", "magnolia", "lotus", "violet", "buttercup",
    // Fruits & vegetables
    "apple", "orange", "banana", "grape", "strawberry", "cherry", "peach", "pear",
    "lemon", "lime", "mango", "pineapple", "watermelon", "pomegranate",
    "tomato", "pepper", "cucumber", "corn", "pumpkin", "squash", "cabbage",
    "broccoli", "cauliflower", "carrot", "potato", "onion", "garlic",
    // Mushrooms
    "mushroom", "fungus", "agaric", "bolete", "chanterelle", "toadstool",
    // Nature & garden
    "garden", "forest", "woodland", "meadow", "pot", "vase", "bouquet",
    "greenhouse", "botanical", "herb", "foliage", "blossom", "petal", "stem",
    "acorn", "seed", "berry", "nut", "cone", "bark",
];

/// Outcome of the plant-presence check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub is_plant: bool,
    /// Keyword that matched, if any
    pub matched_keyword: Option<String>,
    /// Probability of the matching label; 0 when nothing matched
    pub confidence: f32,
    /// The labels that were checked, best first
    pub top_predictions: RankedPredictions,
}

impl GateDecision {
    /// What the general classifier thinks the image shows
    pub fn top_guess(&self) -> Option<&ClassPrediction> {
        self.top_predictions.first()
    }
}

/// Ordered keyword rules applied to the top-N labels.
///
/// Substring matching is an approximation: a keyword such as `nut` also
/// matches unrelated words that happen to contain it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordPolicy {
    keywords: Vec<String>,
    top_n: usize,
}

impl KeywordPolicy {
    /// Keywords are lowercased; blanks and repeats are dropped, first occurrence kept.
    pub fn new<I, S>(keywords: I, top_n: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }

        Self {
            keywords: normalized,
            top_n,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(&config.keywords, config.top_n)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Keyword found in `label`.
    ///
    /// When several keywords occur, the one starting earliest wins, then the
    /// longer one, then the one listed first.
    pub fn match_label(&self, label: &str) -> Option<&str> {
        let label = label.to_lowercase();
        self.keywords
            .iter()
            .enumerate()
            .filter_map(|(order, keyword)| label.find(keyword.as_str()).map(|pos| (pos, order, keyword)))
            .min_by_key(|&(pos, order, keyword)| (pos, Reverse(keyword.len()), order))
            .map(|(_, _, keyword)| keyword.as_str())
    }

    /// Decide plant presence from a ranked label list.
    ///
    /// Only the first `top_n` entries are considered. The first entry in rank
    /// order whose label matches decides, regardless of later entries.
    pub fn decide(&self, ranked: &RankedPredictions) -> GateDecision {
        let top = RankedPredictions::from_ordered(ranked.top_k(self.top_n).to_vec());

        let matched = top.iter().find_map(|prediction| {
            self.match_label(&prediction.class_name)
                .map(|keyword| (keyword.to_string(), prediction.confidence))
        });

        match matched {
            Some((keyword, confidence)) => GateDecision {
                is_plant: true,
                matched_keyword: Some(keyword),
                confidence,
                top_predictions: top,
            },
            None => GateDecision {
                is_plant: false,
                matched_keyword: None,
                confidence: 0.0,
                top_predictions: top,
            },
        }
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PLANT_KEYWORDS, 5)
    }
}

/// Gate classifier service
pub struct PlantDetector {
    loader: Arc<dyn ModelLoader>,
    policy: KeywordPolicy,
    model: SingleFlight<Arc<dyn ImageModel>>,
}

impl PlantDetector {
    pub fn new(loader: Arc<dyn ModelLoader>, policy: KeywordPolicy) -> Self {
        Self {
            loader,
            policy,
            model: SingleFlight::new(),
        }
    }

    pub fn policy(&self) -> &KeywordPolicy {
        &self.policy
    }

    /// Load the general classifier once.
    ///
    /// Concurrent calls share one load. A failure is returned to every waiting
    /// caller and leaves the detector unloaded, so a later call retries.
    pub async fn initialize(&self) -> Result<()> {
        if self.model.get().is_some() {
            debug!("Plant detector already loaded");
            return Ok(());
        }

        let loader = Arc::clone(&self.loader);
        self.model
            .get_or_load(move || async move { loader.load().await })
            .await?;

        info!("Plant detector ready");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.status() == FlightStatus::Ready
    }

    /// Check whether `tensor` shows a plant or nature subject
    pub fn is_plant_image(&self, tensor: &ImageTensor) -> Result<GateDecision> {
        let model = self.model.get().ok_or_else(|| {
            PlantIdError::NotLoaded(format!("Plant detector ({})", self.loader.name()))
        })?;

        let timer = InferenceTimer::start("plant detection");
        let probabilities = model.probabilities(tensor)?;
        let ranked = RankedPredictions::from_probabilities(&probabilities, model.labels());
        let decision = self.policy.decide(&ranked);
        timer.finish();

        for (rank, prediction) in decision.top_predictions.iter().enumerate() {
            debug!(
                "  {}. {} ({:.1}%)",
                rank + 1,
                prediction.class_name,
                prediction.confidence * 100.0
            );
        }

        match &decision.matched_keyword {
            Some(keyword) => info!("Plant detected, matched \"{}\"", keyword),
            None => info!("No plant detected in image"),
        }

        Ok(decision)
    }

    /// Release the loaded model; the next `initialize` loads it again
    pub fn dispose(&self) {
        if self.model.reset().is_some() {
            info!("Plant detector disposed");
        }
    }
}
