use crate::association::BoxPairAssociation;
use crate::cache::ResultArtifact;
use crate::config::Config;
use crate::detection::{DetectionFilter, Preprocessor};
use crate::meter::{DetectionApMeter, mean};
use crate::models::{
    CacheSummary, Detection, EvaluationReport, FilterSummary, ImageAnnotations, ImagePredictions,
    PairAnnotation, PairPrediction,
};
use crate::vcoco::CacheBuilder;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Main runner that orchestrates filtering, scoring and caching
pub struct Runner {
    config: Config,
    /// `(object, verb) -> interaction`, empty when classes are verbs
    interactions: HashMap<(usize, usize), usize>,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        let interactions = config
            .evaluation
            .interactions
            .iter()
            .map(|entry| ((entry.object, entry.verb), entry.interaction))
            .collect();
        Self {
            config,
            interactions,
        }
    }

    /// Filter and preprocess every detection file in `input`, writing results to `output`
    pub fn filter_detections(&self, input: &Path, output: &Path) -> Result<FilterSummary> {
        let filter = DetectionFilter::from_config(&self.config.detection);
        let preprocessor = Preprocessor::from_config(&self.config.detection);

        std::fs::create_dir_all(output)
            .with_context(|| format!("Failed to create directory: {}", output.display()))?;

        let files = self.list_json_files(input)?;
        let mut summary = FilterSummary {
            num_files: files.len(),
            detections_in: 0,
            detections_out: 0,
        };

        for path in files {
            let detection = Detection::from_file(&path)?;
            let processed = preprocessor.apply(&filter.apply(&detection));
            tracing::debug!(
                "{}: kept {}/{} detections",
                path.display(),
                processed.len(),
                detection.len()
            );

            summary.detections_in += detection.len();
            summary.detections_out += processed.len();

            let Some(name) = path.file_name() else {
                continue;
            };
            processed.to_file(&output.join(name))?;
        }

        tracing::info!(
            "Filtered {} detection files into {}",
            summary.num_files,
            output.display()
        );
        Ok(summary)
    }

    /// JSON files directly under `dir`, in name order
    fn list_json_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to read directory entry in: {}", dir.display()))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Score pair predictions against ground-truth annotations
    pub fn evaluate(&self, predictions: &Path, annotations: &Path) -> Result<EvaluationReport> {
        let predictions: Vec<ImagePredictions> = load_json(predictions)?;
        let annotations: Vec<ImageAnnotations> = load_json(annotations)?;
        self.evaluate_images(&predictions, &annotations)
    }

    fn evaluate_images(
        &self,
        predictions: &[ImagePredictions],
        annotations: &[ImageAnnotations],
    ) -> Result<EvaluationReport> {
        let num_classes = self.config.evaluation.num_classes;

        let mut ground_truth: HashMap<u64, Vec<&PairAnnotation>> = HashMap::new();
        let mut num_gt = vec![0; num_classes];
        for image in annotations {
            for pair in &image.pairs {
                let class = self.class_of(pair.object, pair.verb)?;
                if class >= num_classes {
                    anyhow::bail!("Class index {} out of range for {} classes", class, num_classes);
                }
                num_gt[class] += 1;
            }
            ground_truth
                .entry(image.image_id)
                .or_default()
                .extend(image.pairs.iter());
        }

        let association = BoxPairAssociation::new(self.config.evaluation.min_iou);
        let mut meter = DetectionApMeter::new(
            num_classes,
            Some(num_gt.clone()),
            self.config.evaluation.algorithm,
        )?;

        // Repeated image ids are scored together so a ground-truth pair is matched once
        let mut grouped: BTreeMap<u64, Vec<&PairPrediction>> = BTreeMap::new();
        for image in predictions {
            grouped
                .entry(image.image_id)
                .or_default()
                .extend(image.pairs.iter());
        }

        let mut num_predictions = 0;
        for (&image_id, pairs) in &grouped {
            let classes = pairs
                .iter()
                .map(|pair| self.class_of(pair.object, pair.verb))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Invalid predictions for image {}", image_id))?;
            let scores: Vec<f64> = pairs.iter().map(|pair| pair.score).collect();
            let mut labels = vec![0.0; pairs.len()];

            let gt_pairs = ground_truth
                .get(&image_id)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for &class in classes.iter().collect::<BTreeSet<_>>() {
                let det_idx: Vec<usize> = (0..classes.len()).filter(|&i| classes[i] == class).collect();
                let gt_idx: Vec<&PairAnnotation> = gt_pairs
                    .iter()
                    .copied()
                    .filter(|pair| {
                        self.class_of(pair.object, pair.verb)
                            .is_ok_and(|c| c == class)
                    })
                    .collect();
                if gt_idx.is_empty() {
                    continue;
                }

                let matched = association.associate(
                    &gt_idx.iter().map(|pair| pair.box_h).collect::<Vec<_>>(),
                    &gt_idx.iter().map(|pair| pair.box_o).collect::<Vec<_>>(),
                    &det_idx.iter().map(|&i| pairs[i].box_h).collect::<Vec<_>>(),
                    &det_idx.iter().map(|&i| pairs[i].box_o).collect::<Vec<_>>(),
                    &det_idx.iter().map(|&i| scores[i]).collect::<Vec<_>>(),
                )?;
                for (&i, label) in det_idx.iter().zip(matched) {
                    labels[i] = label;
                }
            }

            meter
                .append(&scores, &classes, &labels)
                .with_context(|| format!("Failed to score image {}", image_id))?;
            num_predictions += pairs.len();
        }

        let per_class_ap = meter.eval();
        tracing::info!(
            "Evaluated {} predictions over {} images",
            num_predictions,
            grouped.len()
        );

        Ok(EvaluationReport {
            mean_ap: mean(&per_class_ap),
            per_class_ap,
            num_gt,
            num_images: grouped.len(),
            num_predictions,
        })
    }

    /// Evaluation class of a pair: the verb, or the configured interaction
    fn class_of(&self, object: usize, verb: usize) -> Result<usize> {
        if self.interactions.is_empty() {
            return Ok(verb);
        }
        match self.interactions.get(&(object, verb)) {
            Some(&interaction) => Ok(interaction),
            None => anyhow::bail!("No interaction defined for object {} and verb {}", object, verb),
        }
    }

    /// Build the V-COCO result artifact and write it to disk
    pub fn cache(&self, predictions: &Path, destination: Option<&Path>) -> Result<CacheSummary> {
        let predictions: Vec<ImagePredictions> = load_json(predictions)?;
        let destination = match destination {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(&self.config.vcoco.destination),
        };

        let builder = CacheBuilder::new(&self.config.vcoco.actions);
        let artifact = builder.build(&predictions)?;
        artifact.write(&destination)?;

        tracing::info!(
            "Stored {} image caches to {}",
            artifact.len(),
            destination.display()
        );

        Ok(CacheSummary {
            destination: destination.display().to_string(),
            num_images: artifact.len(),
            num_entries: artifact.total_entries(),
        })
    }

    /// Read a previously written artifact
    pub fn inspect(&self, path: &Path) -> Result<ResultArtifact> {
        ResultArtifact::read(path)
    }
}

/// Parse a JSON file into `T`
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON: {}", path.display()))
}
