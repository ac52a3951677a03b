//! Bundled label lists
//!
//! A label file is a JSON array of class names whose order matches the
//! model's output indices.

use std::path::Path;

use crate::utils::error::{PlantIdError, Result};

/// Parse a JSON array of class names
pub fn parse_labels(json: &str) -> Result<Vec<String>> {
    let labels: Vec<String> = serde_json::from_str(json)?;
    if labels.is_empty() {
        return Err(PlantIdError::Serialization(
            "label list is empty".to_string(),
        ));
    }
    Ok(labels)
}

/// Read a label file from bundled storage
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let json = std::fs::read_to_string(path)?;
    parse_labels(&json)
}

/// Check a label list against the class count a model was built for
pub fn validate_labels(labels: &[String], expected: usize) -> Result<()> {
    if labels.len() != expected {
        return Err(PlantIdError::Config(format!(
            "expected {} labels, found {}",
            expected,
            labels.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_keeps_order() {
        let labels = parse_labels(r#"["Rosa canina", "Salvia officinalis", "Urtica dioica"]"#)
            .unwrap();
        assert_eq!(labels[0], "Rosa canina");
        assert_eq!(labels[2], "Urtica dioica");
    }

    #[test]
    fn test_empty_label_list_is_rejected() {
        assert!(matches!(
            parse_labels("[]"),
            Err(PlantIdError::Serialization(_))
        ));
        assert!(parse_labels("{}").is_err());
    }

    #[test]
    fn test_load_labels_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"["a", "b"]"#).unwrap();

        let labels = load_labels(&path).unwrap();
        assert!(validate_labels(&labels, 2).is_ok());
        assert!(validate_labels(&labels, 86).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_labels(Path::new("/nonexistent/labels.json"));
        assert!(matches!(result, Err(PlantIdError::Io(_))));
    }
}
