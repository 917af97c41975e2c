use crate::boxes::BoxCoords;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Object detections of a single image, stored column-wise like the detector output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Boxes as `[x1, y1, x2, y2]`
    pub boxes: Vec<BoxCoords>,
    /// Object class of each box
    pub labels: Vec<usize>,
    /// Detection confidence of each box
    pub scores: Vec<f64>,
}

impl Detection {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Check that all columns have the same length
    pub fn validate(&self) -> Result<()> {
        if self.labels.len() != self.boxes.len() || self.scores.len() != self.boxes.len() {
            anyhow::bail!(
                "Mismatched detection columns: {} boxes, {} labels, {} scores",
                self.boxes.len(),
                self.labels.len(),
                self.scores.len()
            );
        }
        Ok(())
    }

    /// Gather the detections at the given indices, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            boxes: indices.iter().map(|&i| self.boxes[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            scores: indices.iter().map(|&i| self.scores[i]).collect(),
        }
    }

    /// Load detections from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read detection file: {}", path.display()))?;
        let detection: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse detection file: {}", path.display()))?;
        detection
            .validate()
            .with_context(|| format!("Invalid detection file: {}", path.display()))?;
        Ok(detection)
    }

    /// Write detections to a JSON file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string(self).context("Failed to serialize detections to JSON")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write detections to: {}", path.display()))
    }
}

/// A scored human-object pair predicted by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPrediction {
    pub box_h: BoxCoords,
    pub box_o: BoxCoords,
    /// Object class of the paired object
    pub object: usize,
    /// Predicted verb (action) index
    pub verb: usize,
    pub score: f64,
}

/// All pair predictions for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePredictions {
    pub image_id: u64,
    #[serde(default)]
    pub pairs: Vec<PairPrediction>,
}

/// A ground-truth human-object pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnnotation {
    pub box_h: BoxCoords,
    pub box_o: BoxCoords,
    pub object: usize,
    pub verb: usize,
}

/// All ground-truth pairs for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotations {
    pub image_id: u64,
    #[serde(default)]
    pub pairs: Vec<PairAnnotation>,
}

/// Result of scoring predictions against ground truth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Mean average precision over all classes
    pub mean_ap: f64,
    /// Average precision of each class
    pub per_class_ap: Vec<f64>,
    /// Number of ground-truth instances of each class
    pub num_gt: Vec<usize>,
    pub num_images: usize,
    pub num_predictions: usize,
}

/// Summary of a written result artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSummary {
    pub destination: String,
    pub num_images: usize,
    pub num_entries: usize,
}

/// Summary of a detection filtering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSummary {
    pub num_files: usize,
    pub detections_in: usize,
    pub detections_out: usize,
}
