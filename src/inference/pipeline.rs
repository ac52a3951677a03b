//! Inference orchestrator
//!
//! Sequences decode → gate → species for one image:
//!
//! ```text
//! Idle -> Preprocessing -> Gating -> Rejected
//!                                 -> SpeciesClassifying -> Accepted
//! ```
//!
//! The preprocessed tensor is released exactly once on every path: right
//! after a rejection, right after species classification, or when a stage
//! fails. Failures propagate as the stage's own error and the orchestrator
//! returns to `Idle`. A finished classification rests in its terminal stage
//! until the next one starts.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::detector::{GateDecision, KeywordPolicy, PlantDetector};
use super::prediction::{ClassPrediction, RankedPredictions};
use super::preprocess::Preprocessor;
use super::species::{ClassifierMode, DemoSettings, SpeciesService};
use super::tensor::TensorTracker;
use crate::backend::{default_device, InferenceBackend};
use crate::config::{PipelineConfig, PresentationConfig};
use crate::dataset::labels::load_labels;
use crate::model::{BurnModelLoader, ModelLoader};
use crate::utils::error::{PlantIdError, Result};
use crate::utils::logging::InferenceTimer;

/// Where the orchestrator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    Preprocessing,
    Gating,
    SpeciesClassifying,
    /// Terminal: the gate found no plant
    Rejected,
    /// Terminal: the species classifier ranked the image
    Accepted,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Rejected | Stage::Accepted)
    }
}

/// Terminal result of one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// The gate saw a plant and the species classifier ranked it
    Accepted {
        /// Leading entries for the main result view
        top: Vec<ClassPrediction>,
        /// Every class, best first
        predictions: RankedPredictions,
        gate: GateDecision,
        mode: ClassifierMode,
    },
    /// Not a plant; carries the gate's view of what the image shows
    Rejected(GateDecision),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    /// Best species match, if accepted
    pub fn best_match(&self) -> Option<&ClassPrediction> {
        match self {
            Outcome::Accepted { predictions, .. } => predictions.first(),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn gate(&self) -> &GateDecision {
        match self {
            Outcome::Accepted { gate, .. } => gate,
            Outcome::Rejected(gate) => gate,
        }
    }
}

/// Two-stage plant identification pipeline
///
/// Clones are handles onto the same classifiers and stage.
#[derive(Clone)]
pub struct PlantIdentifier {
    preprocessor: Preprocessor,
    detector: Arc<PlantDetector>,
    species: Arc<SpeciesService>,
    presentation: PresentationConfig,
    stage: Arc<Mutex<Stage>>,
}

impl PlantIdentifier {
    /// Build a pipeline from explicit model loaders
    pub fn new(
        config: &PipelineConfig,
        gate_loader: Arc<dyn ModelLoader>,
        species_loader: Arc<dyn ModelLoader>,
        demo_labels: Vec<String>,
    ) -> Self {
        let demo = DemoSettings {
            labels: demo_labels,
            num_classes: config.species.num_classes,
            seed: config.species.demo_seed,
        };

        Self {
            preprocessor: Preprocessor::new(&config.preprocess),
            detector: Arc::new(PlantDetector::new(
                gate_loader,
                KeywordPolicy::from_config(&config.gate),
            )),
            species: Arc::new(SpeciesService::new(species_loader, demo)),
            presentation: config.presentation,
            stage: Arc::new(Mutex::new(Stage::Idle)),
        }
    }

    /// Build a pipeline that loads burn records from the configured paths
    pub fn from_config(config: &PipelineConfig) -> Self {
        let device = default_device();
        let input_size = config.preprocess.input_size as usize;

        let gate_loader = BurnModelLoader::<InferenceBackend>::new(
            "plant detector",
            &config.gate.model_path,
            &config.gate.labels_path,
            input_size,
            config.gate.pixel_scale,
            device.clone(),
        );
        let species_loader = BurnModelLoader::<InferenceBackend>::new(
            "species classifier",
            &config.species.model_path,
            &config.species.labels_path,
            input_size,
            config.species.pixel_scale,
            device,
        )
        .with_expected_classes(config.species.num_classes);

        // Demo mode still shows real names when only the weights are missing
        let demo_labels = load_labels(&config.species.labels_path).unwrap_or_else(|e| {
            warn!("Species labels unavailable for demo mode: {}", e);
            Vec::new()
        });

        Self::new(
            config,
            Arc::new(gate_loader),
            Arc::new(species_loader),
            demo_labels,
        )
    }

    /// Count every tensor the pipeline allocates and releases
    pub fn with_tracker(mut self, tracker: Arc<TensorTracker>) -> Self {
        self.preprocessor = self.preprocessor.with_tracker(tracker);
        self
    }

    pub fn detector(&self) -> &PlantDetector {
        &self.detector
    }

    pub fn species(&self) -> &SpeciesService {
        &self.species
    }

    pub fn presentation(&self) -> PresentationConfig {
        self.presentation
    }

    /// Load both classifiers concurrently.
    ///
    /// A gate failure is returned; a species failure has already been turned
    /// into demo mode by the species service.
    pub async fn initialize(&self) -> Result<ClassifierMode> {
        let timer = InferenceTimer::start("pipeline initialization");
        let (gate, species) = tokio::join!(self.detector.initialize(), self.species.initialize());
        timer.finish();

        gate?;
        let mode = species?;
        info!("Pipeline ready (species classifier: {})", mode);
        Ok(mode)
    }

    pub fn is_ready(&self) -> bool {
        self.detector.is_loaded() && self.species.is_loaded()
    }

    pub fn stage(&self) -> Stage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, stage: Stage) {
        debug!("Pipeline stage: {:?}", stage);
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }

    /// Identify the plant in an encoded image.
    ///
    /// Runs both forward passes on the calling thread; async callers should
    /// go through [`classify_path`](Self::classify_path) or
    /// [`classify_bytes`](Self::classify_bytes).
    pub fn classify(&self, bytes: &[u8]) -> Result<Outcome> {
        let timer = InferenceTimer::start("classification");
        let outcome = self.run(bytes);
        if outcome.is_err() {
            self.enter(Stage::Idle);
        }
        timer.finish();
        outcome
    }

    /// Classify on the blocking pool so the async runtime keeps running
    pub async fn classify_bytes(&self, bytes: Vec<u8>) -> Result<Outcome> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.classify(&bytes))
            .await
            .map_err(|e| PlantIdError::Inference(format!("Classification task failed: {}", e)))?
    }

    /// Read a local image reference and classify it
    pub async fn classify_path(&self, path: &Path) -> Result<Outcome> {
        let bytes = tokio::fs::read(path).await?;
        self.classify_bytes(bytes).await
    }

    fn run(&self, bytes: &[u8]) -> Result<Outcome> {
        self.enter(Stage::Preprocessing);
        let tensor = self.preprocessor.preprocess(bytes)?;

        self.enter(Stage::Gating);
        let gate = self.detector.is_plant_image(&tensor)?;

        if !gate.is_plant {
            drop(tensor);
            match gate.top_guess() {
                Some(guess) => info!("Rejected: looks like {}", guess.class_name),
                None => info!("Rejected: no labels from gate"),
            }
            self.enter(Stage::Rejected);
            return Ok(Outcome::Rejected(gate));
        }

        self.enter(Stage::SpeciesClassifying);
        let classified = self.species.predict_with_mode(&tensor);
        drop(tensor);
        let (predictions, mode) = classified?;

        let top = predictions.top_k(self.presentation.top_k).to_vec();
        if let Some(best) = top.first() {
            info!(
                "Identified {} ({:.1}%, {})",
                best.class_name,
                best.confidence * 100.0,
                best.level()
            );
        }

        self.enter(Stage::Accepted);
        Ok(Outcome::Accepted {
            top,
            predictions,
            gate,
            mode,
        })
    }

    /// Release both models
    pub fn dispose(&self) {
        self.detector.dispose();
        self.species.dispose();
    }
}
