use crate::boxes::{argsort_descending, batched_nms};
use crate::config::DetectionConfig;
use crate::models::Detection;

/// Removes low scoring detections from raw detector output, with separate
/// thresholds for humans and objects
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    human_idx: usize,
    thresh_h: f64,
    thresh_o: f64,
}

impl DetectionFilter {
    pub fn new(human_idx: usize, thresh_h: f64, thresh_o: f64) -> Self {
        Self {
            human_idx,
            thresh_h,
            thresh_o,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.human_idx,
            config.box_score_thresh_h,
            config.box_score_thresh_o,
        )
    }

    /// Keep humans above `thresh_h` followed by objects above `thresh_o`
    pub fn apply(&self, detection: &Detection) -> Detection {
        let humans = (0..detection.len()).filter(|&i| {
            detection.labels[i] == self.human_idx && detection.scores[i] >= self.thresh_h
        });
        let objects = (0..detection.len()).filter(|&i| {
            detection.labels[i] != self.human_idx && detection.scores[i] >= self.thresh_o
        });
        let keep: Vec<usize> = humans.chain(objects).collect();
        detection.select(&keep)
    }
}

/// Inference-time preprocessing of detections before pairing
#[derive(Debug, Clone)]
pub struct Preprocessor {
    human_idx: usize,
    box_score_thresh: f64,
    box_nms_thresh: f64,
    max_human: usize,
    max_object: usize,
}

impl Preprocessor {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            human_idx: config.human_idx,
            box_score_thresh: config.box_score_thresh,
            box_nms_thresh: config.box_nms_thresh,
            max_human: config.max_human,
            max_object: config.max_object,
        }
    }

    /// Threshold, suppress, sort and cap detections. Humans are permuted to the top
    pub fn apply(&self, detection: &Detection) -> Detection {
        let active: Vec<usize> = (0..detection.len())
            .filter(|&i| detection.scores[i] >= self.box_score_thresh)
            .collect();
        let candidates = detection.select(&active);

        let kept = batched_nms(
            &candidates.boxes,
            &candidates.scores,
            &candidates.labels,
            self.box_nms_thresh,
        );
        let suppressed = candidates.select(&kept);
        let sorted = suppressed.select(&argsort_descending(&suppressed.scores));

        let (humans, objects): (Vec<usize>, Vec<usize>) =
            (0..sorted.len()).partition(|&i| sorted.labels[i] == self.human_idx);

        let keep: Vec<usize> = humans
            .into_iter()
            .take(self.max_human)
            .chain(objects.into_iter().take(self.max_object))
            .collect();

        sorted.select(&keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_detection() -> Detection {
        Detection {
            boxes: vec![
                [0.0, 0.0, 10.0, 10.0],
                [100.0, 100.0, 110.0, 110.0],
                [0.0, 0.0, 10.0, 10.0],
                [1.0, 1.0, 10.0, 10.0],
                [200.0, 200.0, 220.0, 220.0],
            ],
            labels: vec![3, 1, 1, 1, 5],
            scores: vec![0.15, 0.5, 0.95, 0.9, 0.6],
        }
    }

    fn config() -> DetectionConfig {
        DetectionConfig::default()
    }

    #[test]
    fn test_filter_puts_humans_first() {
        let filter = DetectionFilter::new(1, 0.2, 0.1);
        let filtered = filter.apply(&sample_detection());
        assert_eq!(filtered.labels, vec![1, 1, 1, 3, 5]);
        assert_eq!(filtered.scores, vec![0.5, 0.95, 0.9, 0.15, 0.6]);
    }

    #[test]
    fn test_filter_separate_thresholds() {
        let filter = DetectionFilter::new(1, 0.92, 0.5);
        let filtered = filter.apply(&sample_detection());
        assert_eq!(filtered.labels, vec![1, 5]);
        assert_eq!(filtered.scores, vec![0.95, 0.6]);
    }

    #[test]
    fn test_filter_empty() {
        let filter = DetectionFilter::from_config(&config());
        assert!(filter.apply(&Detection::default()).is_empty());
    }

    #[test]
    fn test_preprocess_nms_and_order() {
        let preprocessor = Preprocessor::from_config(&config());
        let result = preprocessor.apply(&sample_detection());

        // Object 0 falls below the score threshold, human 3 is suppressed by human 2
        assert_eq!(result.labels, vec![1, 1, 5]);
        assert_eq!(result.scores, vec![0.95, 0.5, 0.6]);
        assert_eq!(result.boxes[0], [0.0, 0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_preprocess_caps_instances() {
        let mut cfg = config();
        cfg.max_human = 1;
        cfg.max_object = 0;
        let preprocessor = Preprocessor::from_config(&cfg);
        let result = preprocessor.apply(&sample_detection());
        assert_eq!(result.labels, vec![1]);
        assert_eq!(result.scores, vec![0.95]);
    }

    #[test]
    fn test_preprocess_sorts_objects_by_score() {
        let detection = Detection {
            boxes: vec![
                [0.0, 0.0, 5.0, 5.0],
                [10.0, 10.0, 15.0, 15.0],
                [20.0, 20.0, 25.0, 25.0],
            ],
            labels: vec![4, 7, 1],
            scores: vec![0.3, 0.8, 0.4],
        };
        let preprocessor = Preprocessor::from_config(&config());
        let result = preprocessor.apply(&detection);
        assert_eq!(result.labels, vec![1, 7, 4]);
        assert_eq!(result.scores, vec![0.4, 0.8, 0.3]);
    }
}
