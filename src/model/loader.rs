//! Model loading and the inference seam
//!
//! [`ImageModel`] is what the classifiers call into: a loaded network plus
//! its ordered label list. [`ModelLoader`] produces one from bundled
//! resources. Tests substitute their own implementations of both traits.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor, TensorData},
};
use tracing::info;

use super::cnn::{ConvClassifier, ConvClassifierConfig};
use crate::dataset::labels::{load_labels, validate_labels};
use crate::inference::tensor::{ImageTensor, PixelScale};
use crate::utils::error::{LoadError, PlantIdError, Result};

/// A loaded image classifier
pub trait ImageModel: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Class names in output order
    fn labels(&self) -> &[String];

    /// Square input size the model expects
    fn input_size(&self) -> usize;

    /// Run the model once.
    ///
    /// Returns one probability per class. The model's own output activation
    /// already normalizes the values, so callers must not apply softmax again.
    fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// Loads an [`ImageModel`] from bundled resources
#[async_trait]
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> std::result::Result<Arc<dyn ImageModel>, LoadError>;
}

/// [`ImageModel`] backed by a burn [`ConvClassifier`]
pub struct BurnImageModel<B: Backend> {
    name: String,
    model: Mutex<ConvClassifier<B>>,
    labels: Vec<String>,
    input_size: usize,
    input_scale: PixelScale,
    device: B::Device,
}

impl<B: Backend> BurnImageModel<B> {
    pub fn new(
        name: impl Into<String>,
        model: ConvClassifier<B>,
        labels: Vec<String>,
        input_size: usize,
        input_scale: PixelScale,
        device: B::Device,
    ) -> Self {
        Self {
            name: name.into(),
            model: Mutex::new(model),
            labels,
            input_size,
            input_scale,
            device,
        }
    }
}

impl<B: Backend> ImageModel for BurnImageModel<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        input.expect_input(self.input_size)?;

        // NHWC from the preprocessor, NCHW for burn's conv layers
        let values = input.values_in(self.input_scale);
        let tensor = Tensor::<B, 4>::from_data(TensorData::new(values, input.shape()), &self.device)
            .permute([0, 3, 1, 2]);

        let model = self
            .model
            .lock()
            .map_err(|_| PlantIdError::Inference(format!("{} model lock poisoned", self.name)))?;
        let output = model.forward_softmax(tensor);

        let probabilities: Vec<f32> = output
            .into_data()
            .to_vec()
            .map_err(|e| PlantIdError::Inference(format!("Failed to extract probabilities: {:?}", e)))?;

        if probabilities.len() != self.labels.len() {
            return Err(PlantIdError::Inference(format!(
                "{} produced {} scores for {} labels",
                self.name,
                probabilities.len(),
                self.labels.len()
            )));
        }

        Ok(probabilities)
    }
}

/// Loads a [`BurnImageModel`] from a label file and a `CompactRecorder` record
pub struct BurnModelLoader<B: Backend> {
    name: String,
    model_path: PathBuf,
    labels_path: PathBuf,
    input_size: usize,
    input_scale: PixelScale,
    expected_classes: Option<usize>,
    architecture: ConvClassifierConfig,
    device: B::Device,
}

impl<B: Backend> BurnModelLoader<B> {
    pub fn new(
        name: impl Into<String>,
        model_path: impl Into<PathBuf>,
        labels_path: impl Into<PathBuf>,
        input_size: usize,
        input_scale: PixelScale,
        device: B::Device,
    ) -> Self {
        Self {
            name: name.into(),
            model_path: model_path.into(),
            labels_path: labels_path.into(),
            input_size,
            input_scale,
            expected_classes: None,
            architecture: ConvClassifierConfig::new(),
            device,
        }
    }

    /// Require the label file to contain exactly `count` classes
    pub fn with_expected_classes(mut self, count: usize) -> Self {
        self.expected_classes = Some(count);
        self
    }

    /// Override the network shape (the class count always comes from the labels)
    pub fn with_architecture(mut self, architecture: ConvClassifierConfig) -> Self {
        self.architecture = architecture;
        self
    }

    fn load_blocking(&self) -> Result<BurnImageModel<B>> {
        let labels = load_labels(&self.labels_path)?;
        if let Some(expected) = self.expected_classes {
            validate_labels(&labels, expected)?;
        }

        let config = self.architecture.clone().with_num_classes(labels.len());
        let model = ConvClassifier::<B>::new(&config, &self.device)
            .load_file(self.model_path.clone(), &CompactRecorder::new(), &self.device)
            .map_err(|e| PlantIdError::Config(format!("Failed to load model record: {:?}", e)))?;

        info!(
            "{} loaded from {:?} ({} classes)",
            self.name,
            self.model_path,
            labels.len()
        );

        Ok(BurnImageModel::new(
            self.name.clone(),
            model,
            labels,
            self.input_size,
            self.input_scale,
            self.device.clone(),
        ))
    }
}

impl<B: Backend> Clone for BurnModelLoader<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            model_path: self.model_path.clone(),
            labels_path: self.labels_path.clone(),
            input_size: self.input_size,
            input_scale: self.input_scale,
            expected_classes: self.expected_classes,
            architecture: self.architecture.clone(),
            device: self.device.clone(),
        }
    }
}

#[async_trait]
impl<B: Backend> ModelLoader for BurnModelLoader<B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> std::result::Result<Arc<dyn ImageModel>, LoadError> {
        info!("Loading {}...", self.name);
        let loader = self.clone();
        let name = self.name.clone();

        let model = tokio::task::spawn_blocking(move || loader.load_blocking())
            .await
            .map_err(|e| LoadError::new(name.clone(), format!("load task failed: {}", e)))?
            .map_err(|e| LoadError::new(name, e.to_string()))?;

        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::record::{CompactRecorder, Recorder};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_architecture() -> ConvClassifierConfig {
        ConvClassifierConfig::new()
            .with_base_filters(4)
            .with_hidden_units(8)
    }

    fn random_model(classes: usize) -> BurnImageModel<TestBackend> {
        let device = Default::default();
        let config = small_architecture().with_num_classes(classes);
        let labels = (0..classes).map(|i| format!("label_{}", i)).collect();
        BurnImageModel::new(
            "test model",
            ConvClassifier::new(&config, &device),
            labels,
            16,
            PixelScale::Unit,
            device,
        )
    }

    #[test]
    fn test_probabilities_form_distribution() {
        let model = random_model(6);
        let input = ImageTensor::zeros(16, PixelScale::Raw, None);

        let probs = model.probabilities(&input).unwrap();
        assert_eq!(probs.len(), 6);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_shape_mismatch_is_inference_error() {
        let model = random_model(3);
        let input = ImageTensor::zeros(8, PixelScale::Raw, None);

        let result = model.probabilities(&input);
        assert!(matches!(result, Err(PlantIdError::Inference(_))));
    }

    #[tokio::test]
    async fn test_loader_reports_missing_files() {
        let loader = BurnModelLoader::<TestBackend>::new(
            "species classifier",
            "/nonexistent/species.mpk",
            "/nonexistent/labels.json",
            16,
            PixelScale::Raw,
            Default::default(),
        );

        let err = loader.load().await.err().unwrap();
        assert_eq!(err.model, "species classifier");
    }

    #[tokio::test]
    async fn test_loader_round_trips_saved_record() {
        let dir = tempfile::tempdir().unwrap();
        let labels_path = dir.path().join("labels.json");
        std::fs::write(&labels_path, r#"["Rosa", "Salvia", "Urtica"]"#).unwrap();

        let device = Default::default();
        let model = ConvClassifier::<TestBackend>::new(
            &small_architecture().with_num_classes(3),
            &device,
        );
        let model_path = dir.path().join("species");
        CompactRecorder::new()
            .record(model.into_record(), model_path.clone())
            .unwrap();

        let loader = BurnModelLoader::<TestBackend>::new(
            "species classifier",
            model_path,
            labels_path,
            16,
            PixelScale::Raw,
            device,
        )
        .with_expected_classes(3)
        .with_architecture(small_architecture());

        let loaded = loader.load().await.unwrap();
        assert_eq!(loaded.labels().len(), 3);
        assert_eq!(loaded.input_size(), 16);

        let probs = loaded
            .probabilities(&ImageTensor::zeros(16, PixelScale::Raw, None))
            .unwrap();
        assert_eq!(probs.len(), 3);
    }
}
