//! Prediction types shared by both classifiers
//!
//! Every classifier output is turned into a [`RankedPredictions`] list:
//! descending by confidence, ties kept in class-index order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Confidence at or above which a prediction is shown as a strong match
pub const HIGH_CONFIDENCE: f32 = 0.8;
/// Confidence below which a prediction is flagged as uncertain
pub const MEDIUM_CONFIDENCE: f32 = 0.6;

/// One class with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f32,
}

impl ClassPrediction {
    pub fn new(class_index: usize, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_index,
            class_name: class_name.into(),
            confidence,
        }
    }

    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence)
    }

    /// Below the medium band; the UI warns the match may be wrong
    pub fn is_low_confidence(&self) -> bool {
        self.confidence < MEDIUM_CONFIDENCE
    }

    /// Confidence as a rounded whole percentage
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round().max(0.0) as u32
    }
}

/// Presentation band for a confidence value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceLevel::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High confidence",
            ConfidenceLevel::Medium => "Medium confidence",
            ConfidenceLevel::Low => "Low confidence",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Descending-by-confidence list of predictions for one image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RankedPredictions {
    predictions: Vec<ClassPrediction>,
}

/// Descending by confidence; equal confidences keep their relative order
fn by_confidence_desc(a: &ClassPrediction, b: &ClassPrediction) -> Ordering {
    b.confidence.total_cmp(&a.confidence)
}

impl RankedPredictions {
    /// Rank a probability vector, naming each index from `labels`.
    ///
    /// Indices past the end of `labels` are named `class_<index>`.
    pub fn from_probabilities(probabilities: &[f32], labels: &[String]) -> Self {
        let predictions = probabilities
            .iter()
            .enumerate()
            .map(|(index, &confidence)| {
                ClassPrediction::new(index, class_label(labels, index), confidence)
            })
            .collect();
        Self::from_unsorted(predictions)
    }

    /// Sort predictions given in class-index order
    pub fn from_unsorted(mut predictions: Vec<ClassPrediction>) -> Self {
        // sort_by is stable, so ties stay in index order
        predictions.sort_by(by_confidence_desc);
        Self { predictions }
    }

    /// Wrap a list that is already in final order
    pub(crate) fn from_ordered(predictions: Vec<ClassPrediction>) -> Self {
        Self { predictions }
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn first(&self) -> Option<&ClassPrediction> {
        self.predictions.first()
    }

    pub fn get(&self, rank: usize) -> Option<&ClassPrediction> {
        self.predictions.get(rank)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassPrediction> {
        self.predictions.iter()
    }

    pub fn into_vec(self) -> Vec<ClassPrediction> {
        self.predictions
    }

    /// First `k` entries (fewer if the list is shorter)
    pub fn top_k(&self, k: usize) -> &[ClassPrediction] {
        &self.predictions[..k.min(self.predictions.len())]
    }

    /// Sum of all confidences
    pub fn total_confidence(&self) -> f32 {
        self.predictions.iter().map(|p| p.confidence).sum()
    }

    /// Gap between the top two confidences
    pub fn margin(&self) -> f32 {
        match (self.predictions.first(), self.predictions.get(1)) {
            (Some(first), Some(second)) => first.confidence - second.confidence,
            (Some(first), None) => first.confidence,
            _ => 0.0,
        }
    }

    /// Whether the list is non-increasing with index-ordered ties
    pub fn is_ranked(&self) -> bool {
        self.predictions.windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            a.confidence > b.confidence
                || (a.confidence == b.confidence && a.class_index < b.class_index)
        })
    }
}

impl<'a> IntoIterator for &'a RankedPredictions {
    type Item = &'a ClassPrediction;
    type IntoIter = std::slice::Iter<'a, ClassPrediction>;

    fn into_iter(self) -> Self::IntoIter {
        self.predictions.iter()
    }
}

/// Label for `index`, or `class_<index>` when the label list is too short
pub fn class_label(labels: &[String], index: usize) -> String {
    labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", index))
}
