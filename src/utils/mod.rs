//! Utilities module for logging, error handling, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types
//! - Single-flight loading for shared model handles
//! - Small formatting helpers used by the CLI

pub mod error;
pub mod logging;
pub mod single_flight;

// Re-export main types for convenience
pub use error::{LoadError, PlantIdError, Result, ResultExt};
pub use logging::{init_logging, InferenceTimer, LogConfig};
pub use single_flight::{FlightStatus, SingleFlight};

/// Format a confidence in [0, 1] as a whole percentage
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.0}%", (confidence * 100.0).round())
}

/// Format a confidence as a text bar of the given width
pub fn format_confidence_bar(confidence: f32, width: usize) -> String {
    let filled = ((confidence.clamp(0.0, 1.0) as f64) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);

    format!(
        "[{}{}] {}",
        "█".repeat(filled),
        "░".repeat(empty),
        format_confidence(confidence)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.874), "87%");
        assert_eq!(format_confidence(1.0), "100%");
        assert_eq!(format_confidence(0.0), "0%");
    }

    #[test]
    fn test_format_confidence_bar() {
        let bar = format_confidence_bar(0.5, 10);
        assert!(bar.contains("50%"));
        assert!(bar.contains("█████░░░░░"));
    }
}
