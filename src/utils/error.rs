//! Error Handling Module
//!
//! Defines the error types for the plant identification pipeline.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Failure to load a classifier's bundled resources.
///
/// Kept separate from [`PlantIdError`] and cloneable so that one in-flight
/// load can report the same failure to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to load {model}: {reason}")]
pub struct LoadError {
    /// Which model failed (e.g. "plant detector", "species classifier")
    pub model: String,
    /// Underlying cause, rendered as text
    pub reason: String,
}

impl LoadError {
    pub fn new(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for plant identification operations
#[derive(Error, Debug)]
pub enum PlantIdError {
    /// Source image is corrupt or in an unsupported format
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// Resizing or tensor construction failed
    #[error("Preprocessing error: {0}")]
    Preprocess(String),

    /// Classifier resources failed to load
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Operation invoked before the required initialization
    #[error("{0} is not loaded. Call initialize() first.")]
    NotLoaded(String),

    /// Runtime failure while executing a model
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Q&A provider failure
    #[error("Assistant error: {0}")]
    Assistant(String),
}

impl PlantIdError {
    /// Whether the user can reasonably retry the action that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlantIdError::Decode(_)
                | PlantIdError::Preprocess(_)
                | PlantIdError::Load(_)
                | PlantIdError::Inference(_)
                | PlantIdError::Io(_)
                | PlantIdError::Assistant(_)
        )
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            PlantIdError::Decode(_) | PlantIdError::Io(_) => {
                "Could not process image. Please choose another photo."
            }
            PlantIdError::Load(_) => "Model could not be loaded. Please try again.",
            PlantIdError::Assistant(_) => "The assistant is unavailable right now. Please try again.",
            _ => "Something went wrong while processing the image. Please try again.",
        }
    }
}

impl From<serde_json::Error> for PlantIdError {
    fn from(err: serde_json::Error) -> Self {
        PlantIdError::Serialization(err.to_string())
    }
}

/// Convenience Result type for plant identification operations
pub type Result<T> = std::result::Result<T, PlantIdError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| PlantIdError::Config(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| PlantIdError::Config(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PlantIdError::Config(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| PlantIdError::Config(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlantIdError::Inference("shape mismatch".to_string());
        assert_eq!(format!("{}", err), "Inference error: shape mismatch");
    }

    #[test]
    fn test_load_error_is_transparent() {
        let err: PlantIdError = LoadError::new("plant detector", "file missing").into();
        assert_eq!(err.to_string(), "Failed to load plant detector: file missing");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_loaded_is_not_retryable() {
        let err = PlantIdError::NotLoaded("Species classifier".to_string());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("initialize()"));
    }

    #[test]
    fn test_decode_keeps_source() {
        let source = image::load_from_memory(b"not an image").unwrap_err();
        let err = PlantIdError::Decode(source);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.user_message().contains("Could not process image"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read config");
        assert!(matches!(with_context, Err(PlantIdError::Config(_))));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.context("Value was None");
        assert!(with_context.is_err());
    }
}
