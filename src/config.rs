use crate::meter::ApAlgorithm;
use crate::vcoco::Action;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Detection filtering and preprocessing parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Object class index of the human/person class
    #[serde(default = "default_human_idx")]
    pub human_idx: usize,
    /// Minimum score of human detections kept from the detector output
    #[serde(default = "default_score_thresh")]
    pub box_score_thresh_h: f64,
    /// Minimum score of object detections kept from the detector output
    #[serde(default = "default_score_thresh")]
    pub box_score_thresh_o: f64,
    /// Minimum score of detections entering preprocessing
    #[serde(default = "default_score_thresh")]
    pub box_score_thresh: f64,
    /// IoU threshold of class-wise non-maximum suppression
    #[serde(default = "default_nms_thresh")]
    pub box_nms_thresh: f64,
    /// Number of human detections to keep per image
    #[serde(default = "default_max_instances")]
    pub max_human: usize,
    /// Number of object detections to keep per image
    #[serde(default = "default_max_instances")]
    pub max_object: usize,
}

/// Maps an (object, verb) combination to an interaction class
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionEntry {
    pub object: usize,
    pub verb: usize,
    pub interaction: usize,
}

/// Scoring parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    /// Number of evaluated classes
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    /// Minimum pair IoU for a detection to match a ground-truth pair
    #[serde(default = "default_min_iou")]
    pub min_iou: f64,
    #[serde(default)]
    pub algorithm: ApAlgorithm,
    /// When non-empty, classes are interactions looked up here instead of verbs
    #[serde(default)]
    pub interactions: Vec<InteractionEntry>,
}

/// V-COCO cache generation parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VcocoConfig {
    /// Actions indexed by the predicted verb index
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Default path of the written artifact
    #[serde(default = "default_destination")]
    pub destination: String,
}

fn default_human_idx() -> usize {
    1
}

fn default_score_thresh() -> f64 {
    0.2
}

fn default_nms_thresh() -> f64 {
    0.5
}

fn default_max_instances() -> usize {
    15
}

fn default_num_classes() -> usize {
    600
}

fn default_min_iou() -> f64 {
    0.5
}

fn default_destination() -> String {
    "cache.pkl".to_string()
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            human_idx: default_human_idx(),
            box_score_thresh_h: default_score_thresh(),
            box_score_thresh_o: default_score_thresh(),
            box_score_thresh: default_score_thresh(),
            box_nms_thresh: default_nms_thresh(),
            max_human: default_max_instances(),
            max_object: default_max_instances(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            num_classes: default_num_classes(),
            min_iou: default_min_iou(),
            algorithm: ApAlgorithm::default(),
            interactions: Vec::new(),
        }
    }
}

impl Default for VcocoConfig {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            destination: default_destination(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub vcoco: VcocoConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Load configuration from a file if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
[detection]
human_idx = 49
box_score_thresh_h = 0.3
box_score_thresh_o = 0.1
box_nms_thresh = 0.7
max_human = 10
max_object = 20

[evaluation]
num_classes = 24
min_iou = 0.6
algorithm = "AUC"

[[evaluation.interactions]]
object = 3
verb = 2
interaction = 11

[vcoco]
destination = "/tmp/vcoco/cache.pkl"
actions = [
    { verb = "hold", role = "obj" },
    { verb = "stand" },
    { verb = "talk_on_phone", role = "instr" },
]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.detection.human_idx, 49);
        assert_eq!(config.detection.box_score_thresh_h, 0.3);
        assert_eq!(config.detection.box_score_thresh_o, 0.1);
        assert_eq!(config.detection.box_score_thresh, 0.2);
        assert_eq!(config.detection.box_nms_thresh, 0.7);
        assert_eq!(config.detection.max_human, 10);
        assert_eq!(config.detection.max_object, 20);
        assert_eq!(config.evaluation.num_classes, 24);
        assert_eq!(config.evaluation.min_iou, 0.6);
        assert_eq!(config.evaluation.algorithm, ApAlgorithm::Auc);
        assert_eq!(config.evaluation.interactions.len(), 1);
        assert_eq!(config.evaluation.interactions[0].interaction, 11);
        assert_eq!(config.vcoco.destination, "/tmp/vcoco/cache.pkl");
        assert_eq!(config.vcoco.actions.len(), 3);
        assert_eq!(config.vcoco.actions[1].role, None);
        assert_eq!(config.vcoco.actions[2].verb, "talk_on_phone");
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[evaluation]\nnum_classes = 117\n").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.evaluation.num_classes, 117);
        assert_eq!(config.evaluation.min_iou, 0.5);
        assert_eq!(config.evaluation.algorithm, ApAlgorithm::ElevenPoint);
        assert!(config.evaluation.interactions.is_empty());
        assert_eq!(config.detection.human_idx, 1);
        assert_eq!(config.detection.max_human, 15);
        assert_eq!(config.vcoco.destination, "cache.pkl");
    }

    #[test]
    fn test_load_without_path() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.evaluation.num_classes, 600);
        assert_eq!(config.detection.box_nms_thresh, 0.5);
    }

    #[test]
    fn test_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[detection\nhuman_idx = ").unwrap();
        assert!(Config::from_file(temp_file.path()).is_err());
    }
}
