use crate::boxes::argsort_descending;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Method used to summarize a precision-recall curve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApAlgorithm {
    /// Mean of the interpolated precision at recall 0.0, 0.1, ..., 1.0
    #[default]
    #[serde(rename = "11P")]
    ElevenPoint,
    /// Trapezoidal area under the raw precision-recall curve
    #[serde(rename = "AUC")]
    Auc,
    /// Area under the monotonically interpolated curve
    #[serde(rename = "INT")]
    Interpolated,
}

/// Accumulates scored detections and computes per-class average precision
#[derive(Debug, Clone)]
pub struct DetectionApMeter {
    num_classes: usize,
    num_gt: Option<Vec<usize>>,
    algorithm: ApAlgorithm,
    scores: Vec<Vec<f64>>,
    labels: Vec<Vec<f64>>,
}

impl DetectionApMeter {
    /// Create a meter. Without `num_gt` recall is relative to the positives seen
    pub fn new(num_classes: usize, num_gt: Option<Vec<usize>>, algorithm: ApAlgorithm) -> Result<Self> {
        if let Some(counts) = &num_gt {
            if counts.len() != num_classes {
                anyhow::bail!(
                    "Expected ground-truth counts for {} classes, got {}",
                    num_classes,
                    counts.len()
                );
            }
        }
        Ok(Self {
            num_classes,
            num_gt,
            algorithm,
            scores: vec![Vec::new(); num_classes],
            labels: vec![Vec::new(); num_classes],
        })
    }

    /// Record detections with their class and binary label
    pub fn append(&mut self, scores: &[f64], classes: &[usize], labels: &[f64]) -> Result<()> {
        if scores.len() != classes.len() || scores.len() != labels.len() {
            anyhow::bail!(
                "Mismatched meter inputs: {} scores, {} classes, {} labels",
                scores.len(),
                classes.len(),
                labels.len()
            );
        }
        if let Some(&bad) = classes.iter().find(|&&c| c >= self.num_classes) {
            anyhow::bail!("Class index {} out of range for {} classes", bad, self.num_classes);
        }
        for ((&score, &class), &label) in scores.iter().zip(classes).zip(labels) {
            self.scores[class].push(score);
            self.labels[class].push(label);
        }
        Ok(())
    }

    /// Number of detections recorded so far
    pub fn len(&self) -> usize {
        self.scores.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&mut self) {
        self.scores.iter_mut().for_each(Vec::clear);
        self.labels.iter_mut().for_each(Vec::clear);
    }

    /// Average precision of every class
    pub fn eval(&self) -> Vec<f64> {
        (0..self.num_classes).map(|c| self.class_ap(c)).collect()
    }

    fn class_ap(&self, class: usize) -> f64 {
        let scores = &self.scores[class];
        let labels = &self.labels[class];
        let num_gt = match &self.num_gt {
            Some(counts) => counts[class] as f64,
            None => labels.iter().sum(),
        };
        if num_gt <= 0.0 || scores.is_empty() {
            return 0.0;
        }

        let (precision, recall) = precision_recall(scores, labels, num_gt);
        match self.algorithm {
            ApAlgorithm::ElevenPoint => eleven_point_ap(&precision, &recall),
            ApAlgorithm::Auc => auc_ap(&precision, &recall),
            ApAlgorithm::Interpolated => interpolated_ap(&precision, &recall),
        }
    }
}

/// Mean of the per-class values
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Cumulative precision and recall after ranking by decreasing score
fn precision_recall(scores: &[f64], labels: &[f64], num_gt: f64) -> (Vec<f64>, Vec<f64>) {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut precision = Vec::with_capacity(scores.len());
    let mut recall = Vec::with_capacity(scores.len());

    for i in argsort_descending(scores) {
        tp += labels[i];
        fp += 1.0 - labels[i];
        precision.push(tp / (tp + fp));
        recall.push(tp / num_gt);
    }

    (precision, recall)
}

fn eleven_point_ap(precision: &[f64], recall: &[f64]) -> f64 {
    (0..=10)
        .map(|t| {
            // Stepped like linspace(0, 1, 11): 3 * 0.1 lands just above 0.3
            let threshold = t as f64 * 0.1;
            precision
                .iter()
                .zip(recall)
                .filter(|&(_, &r)| r >= threshold)
                .map(|(&p, _)| p)
                .fold(0.0, f64::max)
        })
        .sum::<f64>()
        / 11.0
}

fn auc_ap(precision: &[f64], recall: &[f64]) -> f64 {
    let max_recall = recall.last().copied().unwrap_or(0.0);
    let mut ap = 0.0;
    for i in 0..precision.len().saturating_sub(1) {
        if recall[i] >= max_recall {
            break;
        }
        let dx = recall[i + 1] - recall[i];
        let dy = precision[i + 1] - precision[i];
        ap += dx * precision[i] + 0.5 * dx * dy;
    }
    ap
}

fn interpolated_ap(precision: &[f64], recall: &[f64]) -> f64 {
    let mut envelope = precision.to_vec();
    for i in (0..envelope.len().saturating_sub(1)).rev() {
        envelope[i] = envelope[i].max(envelope[i + 1]);
    }

    let mut ap = 0.0;
    let mut previous_recall = 0.0;
    for (p, &r) in envelope.iter().zip(recall) {
        ap += (r - previous_recall) * p;
        previous_recall = r;
    }
    ap
}
