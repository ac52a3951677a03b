//! Species classifier service
//!
//! Loads the domain model once and ranks every species for an image. When the
//! model cannot be loaded the service switches to demo mode, which produces
//! structurally valid but meaningless rankings so the rest of the app keeps
//! working.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prediction::{class_label, ClassPrediction, RankedPredictions};
use super::tensor::{ImageTensor, PixelScale};
use crate::model::{ImageModel, ModelLoader};
use crate::utils::error::{PlantIdError, Result};
use crate::utils::logging::InferenceTimer;
use crate::utils::single_flight::{FlightStatus, SingleFlight};

/// Confidence bands forced onto the top three demo entries: (low, width)
const DEMO_BANDS: [(f32, f32); 3] = [(0.65, 0.30), (0.05, 0.15), (0.02, 0.08)];

/// Which classifier is answering predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Real,
    Demo,
}

impl std::fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierMode::Real => write!(f, "real"),
            ClassifierMode::Demo => write!(f, "demo"),
        }
    }
}

/// Something that ranks species for an image
pub trait SpeciesClassifier: Send + Sync {
    fn mode(&self) -> ClassifierMode;

    /// Full ranked list over every class
    fn predict(&self, tensor: &ImageTensor) -> Result<RankedPredictions>;
}

/// Ranks with the loaded species model
pub struct RealClassifier {
    model: Arc<dyn ImageModel>,
}

impl RealClassifier {
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self { model }
    }

    /// Run the model once on a zero tensor so the first real request
    /// does not pay for lazy allocation.
    pub fn warm_up(&self) -> Result<()> {
        let timer = InferenceTimer::start("species warm-up");
        let dummy = ImageTensor::zeros(self.model.input_size(), PixelScale::Raw, None);
        self.model.probabilities(&dummy)?;
        timer.finish();
        Ok(())
    }
}

impl SpeciesClassifier for RealClassifier {
    fn mode(&self) -> ClassifierMode {
        ClassifierMode::Real
    }

    fn predict(&self, tensor: &ImageTensor) -> Result<RankedPredictions> {
        // Output is already a softmax distribution
        let probabilities = self.model.probabilities(tensor)?;
        Ok(RankedPredictions::from_probabilities(
            &probabilities,
            self.model.labels(),
        ))
    }
}

/// Produces plausible-looking random rankings
pub struct DemoClassifier {
    labels: Vec<String>,
    num_classes: usize,
    rng: Mutex<ChaCha8Rng>,
}

impl DemoClassifier {
    /// `seed` fixes the sequence of rankings; `None` draws from OS entropy.
    pub fn new(labels: Vec<String>, num_classes: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            labels,
            num_classes,
            rng: Mutex::new(rng),
        }
    }

    fn synthesize(&self) -> RankedPredictions {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let draws: Vec<f32> = (0..self.num_classes).map(|_| rng.gen::<f32>()).collect();
        let sum: f32 = draws.iter().sum();
        let uniform = 1.0 / self.num_classes.max(1) as f32;

        let predictions = draws
            .iter()
            .enumerate()
            .map(|(index, &draw)| {
                let confidence = if sum > 0.0 { draw / sum } else { uniform };
                ClassPrediction::new(index, class_label(&self.labels, index), confidence)
            })
            .collect();
        let mut ranked = RankedPredictions::from_unsorted(predictions).into_vec();

        let mut forced: Vec<f32> = DEMO_BANDS
            .iter()
            .take(ranked.len())
            .map(|&(low, width)| low + rng.gen::<f32>() * width)
            .collect();
        // The second and third bands overlap
        if forced.len() == 3 && forced[1] < forced[2] {
            forced.swap(1, 2);
        }
        for (prediction, confidence) in ranked.iter_mut().zip(&forced) {
            prediction.confidence = *confidence;
        }

        // Pull the tail under the third entry without reordering it
        if ranked.len() > DEMO_BANDS.len() {
            let third = ranked[DEMO_BANDS.len() - 1].confidence;
            let tail_max = ranked[DEMO_BANDS.len()].confidence;
            if tail_max > 0.0 {
                let factor = (0.5 * third / tail_max).min(1.0);
                for prediction in &mut ranked[DEMO_BANDS.len()..] {
                    prediction.confidence *= factor;
                }
            }
        }

        RankedPredictions::from_ordered(ranked)
    }
}

impl SpeciesClassifier for DemoClassifier {
    fn mode(&self) -> ClassifierMode {
        ClassifierMode::Demo
    }

    fn predict(&self, _tensor: &ImageTensor) -> Result<RankedPredictions> {
        Ok(self.synthesize())
    }
}

/// Settings used when the service falls back to demo mode
#[derive(Debug, Clone, Default)]
pub struct DemoSettings {
    /// Names for demo classes; missing entries become `class_<index>`
    pub labels: Vec<String>,
    pub num_classes: usize,
    pub seed: Option<u64>,
}

/// Species classifier with a load-once lifecycle
pub struct SpeciesService {
    loader: Arc<dyn ModelLoader>,
    demo: DemoSettings,
    active: SingleFlight<Box<dyn SpeciesClassifier>>,
}

impl SpeciesService {
    pub fn new(loader: Arc<dyn ModelLoader>, demo: DemoSettings) -> Self {
        Self {
            loader,
            demo,
            active: SingleFlight::new(),
        }
    }

    /// Load the model, or fall back to demo mode if it cannot be loaded.
    ///
    /// Concurrent calls share one attempt. A load failure is not returned to
    /// the caller; it selects the demo classifier instead. The only error is
    /// a [`dispose`](Self::dispose) that lands while the attempt is running.
    pub async fn initialize(&self) -> Result<ClassifierMode> {
        if let Some(active) = self.active.get() {
            debug!("Species classifier already initialized ({})", active.mode());
            return Ok(active.mode());
        }

        let loader = Arc::clone(&self.loader);
        let demo = self.demo.clone();
        let active = self
            .active
            .get_or_load(move || async move { Ok(select_classifier(loader, demo).await) })
            .await?;

        Ok(active.mode())
    }

    /// True once a classifier (real or demo) is active
    pub fn is_loaded(&self) -> bool {
        self.active.status() == FlightStatus::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.active.status() == FlightStatus::Loading
    }

    /// Active mode, or `None` before initialization
    pub fn mode(&self) -> Option<ClassifierMode> {
        self.active.get().map(|active| active.mode())
    }

    /// Rank every species for `tensor`.
    ///
    /// The caller keeps ownership of the tensor and releases it whether or
    /// not the call succeeds.
    pub fn predict(&self, tensor: &ImageTensor) -> Result<RankedPredictions> {
        self.predict_with_mode(tensor).map(|(ranked, _)| ranked)
    }

    /// Like [`predict`](Self::predict), also reporting which classifier answered
    pub fn predict_with_mode(
        &self,
        tensor: &ImageTensor,
    ) -> Result<(RankedPredictions, ClassifierMode)> {
        let active = self.active.get().ok_or_else(|| {
            PlantIdError::NotLoaded(format!("Species classifier ({})", self.loader.name()))
        })?;

        let timer = InferenceTimer::start("species prediction");
        let ranked = active.predict(tensor)?;
        timer.finish();

        if active.mode() == ClassifierMode::Demo {
            debug!("Demo prediction, results are random");
        }
        for (rank, prediction) in ranked.top_k(crate::TOP_K).iter().enumerate() {
            debug!(
                "  {}. {}: {:.1}%",
                rank + 1,
                prediction.class_name,
                prediction.confidence * 100.0
            );
        }

        Ok((ranked, active.mode()))
    }

    /// First `k` entries of a ranked list
    pub fn top_k(predictions: &RankedPredictions, k: usize) -> &[ClassPrediction] {
        predictions.top_k(k)
    }

    /// Drop the active classifier; the next `initialize` starts over
    pub fn dispose(&self) {
        if self.active.reset().is_some() {
            info!("Species classifier disposed");
        }
    }
}

async fn select_classifier(
    loader: Arc<dyn ModelLoader>,
    demo: DemoSettings,
) -> Box<dyn SpeciesClassifier> {
    match loader.load().await {
        Ok(model) => {
            let classes = model.labels().len();
            let real = RealClassifier::new(Arc::clone(&model));
            // The forward pass is blocking compute; keep it off the async workers
            let warmed = tokio::task::spawn_blocking(move || {
                // A failed warm-up only costs latency on the first request
                if let Err(e) = real.warm_up() {
                    warn!("Warm-up failed: {}", e);
                }
                real
            })
            .await;
            let real = warmed.unwrap_or_else(|e| {
                warn!("Warm-up task aborted: {}", e);
                RealClassifier::new(model)
            });
            info!("Species classifier ready ({} classes)", classes);
            Box::new(real)
        }
        Err(e) => {
            warn!("{}", e);
            warn!("Switching to demo mode, predictions are random");
            Box::new(DemoClassifier::new(demo.labels, demo.num_classes, demo.seed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::LoadError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SoftmaxModel {
        labels: Vec<String>,
    }

    impl ImageModel for SoftmaxModel {
        fn name(&self) -> &str {
            "softmax"
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn input_size(&self) -> usize {
            4
        }

        fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>> {
            input.expect_input(4)?;
            Ok(vec![0.1, 0.6, 0.1, 0.2])
        }
    }

    struct TestLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    impl TestLoader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ModelLoader for TestLoader {
        fn name(&self) -> &str {
            "test species"
        }

        async fn load(&self) -> std::result::Result<Arc<dyn ImageModel>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if self.fail {
                return Err(LoadError::new("test species", "record file missing"));
            }
            Ok(Arc::new(SoftmaxModel {
                labels: ["Rosa", "Salvia", "Urtica", "Mentha"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }))
        }
    }

    fn demo_settings() -> DemoSettings {
        DemoSettings {
            labels: Vec::new(),
            num_classes: 86,
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn test_real_mode_ranks_model_output() {
        let service = SpeciesService::new(TestLoader::new(false), demo_settings());
        assert_eq!(service.initialize().await.unwrap(), ClassifierMode::Real);

        let ranked = service
            .predict(&ImageTensor::zeros(4, PixelScale::Raw, None))
            .unwrap();
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked.first().unwrap().class_name, "Salvia");
        assert!((ranked.total_confidence() - 1.0).abs() < 1e-3);
        assert!(ranked.is_ranked());
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_to_demo() {
        let service = SpeciesService::new(TestLoader::new(true), demo_settings());
        assert_eq!(service.initialize().await.unwrap(), ClassifierMode::Demo);
        assert!(service.is_loaded());
        assert_eq!(service.mode(), Some(ClassifierMode::Demo));

        let ranked = service
            .predict(&ImageTensor::zeros(4, PixelScale::Raw, None))
            .unwrap();
        assert_eq!(ranked.len(), 86);
        assert!(ranked.first().unwrap().class_name.starts_with("class_"));
    }

    #[tokio::test]
    async fn test_concurrent_initialize_loads_once() {
        let loader = TestLoader::new(false);
        let service = SpeciesService::new(loader.clone(), demo_settings());

        let (a, b, c) = tokio::join!(
            service.initialize(),
            service.initialize(),
            service.initialize()
        );
        assert_eq!(a.unwrap(), ClassifierMode::Real);
        assert_eq!(b.unwrap(), ClassifierMode::Real);
        assert_eq!(c.unwrap(), ClassifierMode::Real);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(!service.is_loading());
    }

    #[tokio::test]
    async fn test_predict_before_initialize_is_not_loaded() {
        let service = SpeciesService::new(TestLoader::new(false), demo_settings());
        let result = service.predict(&ImageTensor::zeros(4, PixelScale::Raw, None));
        assert!(matches!(result, Err(PlantIdError::NotLoaded(_))));
        assert_eq!(service.mode(), None);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_inference_error() {
        let service = SpeciesService::new(TestLoader::new(false), demo_settings());
        service.initialize().await.unwrap();

        let result = service.predict(&ImageTensor::zeros(8, PixelScale::Raw, None));
        assert!(matches!(result, Err(PlantIdError::Inference(_))));
    }

    #[tokio::test]
    async fn test_dispose_allows_reload() {
        let loader = TestLoader::new(false);
        let service = SpeciesService::new(loader.clone(), demo_settings());
        service.initialize().await.unwrap();
        service.dispose();
        assert!(!service.is_loaded());

        service.initialize().await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    struct SlowModel;

    impl ImageModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        fn labels(&self) -> &[String] {
            &[]
        }

        fn input_size(&self) -> usize {
            4
        }

        fn probabilities(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    struct SlowLoader;

    #[async_trait]
    impl ModelLoader for SlowLoader {
        fn name(&self) -> &str {
            "slow"
        }

        async fn load(&self) -> std::result::Result<Arc<dyn ImageModel>, LoadError> {
            Ok(Arc::new(SlowModel))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_warm_up_leaves_runtime_responsive() {
        use std::time::{Duration, Instant};

        let service = SpeciesService::new(Arc::new(SlowLoader), demo_settings());
        let started = Instant::now();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });

        assert_eq!(service.initialize().await.unwrap(), ClassifierMode::Real);
        let fired_after = timer.await.unwrap();
        assert!(
            fired_after < Duration::from_millis(200),
            "timer fired after {:?}",
            fired_after
        );
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_dispose_during_initialize_reports_error() {
        let service = SpeciesService::new(TestLoader::new(false), demo_settings());

        let (result, _) = tokio::join!(service.initialize(), async {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            service.dispose();
        });

        assert!(matches!(result, Err(PlantIdError::Load(_))));
        assert!(!service.is_loaded());
        assert_eq!(service.initialize().await.unwrap(), ClassifierMode::Real);
    }

    #[test]
    fn test_demo_top_three_stay_in_bands() {
        let demo = DemoClassifier::new(Vec::new(), 86, Some(42));
        let tensor = ImageTensor::zeros(4, PixelScale::Raw, None);

        for _ in 0..200 {
            let ranked = demo.predict(&tensor).unwrap();
            let top: Vec<f32> = ranked.iter().take(3).map(|p| p.confidence).collect();
            assert!((0.65..=0.95).contains(&top[0]), "top {}", top[0]);
            assert!((0.05..=0.20).contains(&top[1]), "second {}", top[1]);
            assert!((0.02..=0.10).contains(&top[2]), "third {}", top[2]);
            assert!(ranked.iter().skip(3).all(|p| p.confidence < top[2]));
        }
    }

    #[test]
    fn test_demo_tail_keeps_draw_order() {
        let demo = DemoClassifier::new(Vec::new(), 20, Some(3));
        let ranked = demo.synthesize();

        let tail: Vec<f32> = ranked.iter().skip(3).map(|p| p.confidence).collect();
        assert!(tail.windows(2).all(|pair| pair[0] >= pair[1]));
        assert!(ranked.is_ranked());

        let mut indices: Vec<usize> = ranked.iter().map(|p| p.class_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_demo_is_reproducible_with_seed() {
        let a = DemoClassifier::new(Vec::new(), 10, Some(9)).synthesize();
        let b = DemoClassifier::new(Vec::new(), 10, Some(9)).synthesize();
        assert_eq!(a, b);
    }

    #[test]
    fn test_demo_with_fewer_classes_than_bands() {
        let demo = DemoClassifier::new(vec!["Rosa".into(), "Salvia".into()], 2, Some(1));
        let ranked = demo.synthesize();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked.iter().filter(|p| p.class_name == "Rosa").count(), 1);
    }
}
