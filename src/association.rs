use crate::boxes::{BoxCoords, box_iou};
use anyhow::Result;

/// Matches detected human-object pairs against ground-truth pairs.
///
/// The IoU of two pairs is the smaller of the human IoU and the object IoU.
/// Each detection is assigned to the ground-truth pair it overlaps most; a
/// ground-truth pair is then claimed by its highest scoring assigned detection
/// with IoU at least `min_iou`.
#[derive(Debug, Clone)]
pub struct BoxPairAssociation {
    min_iou: f64,
}

impl BoxPairAssociation {
    pub fn new(min_iou: f64) -> Self {
        Self { min_iou }
    }

    /// Binary label (0.0 or 1.0) for each detected pair
    pub fn associate(
        &self,
        gt_h: &[BoxCoords],
        gt_o: &[BoxCoords],
        det_h: &[BoxCoords],
        det_o: &[BoxCoords],
        scores: &[f64],
    ) -> Result<Vec<f64>> {
        if gt_h.len() != gt_o.len() {
            anyhow::bail!(
                "Ground truth has {} human boxes but {} object boxes",
                gt_h.len(),
                gt_o.len()
            );
        }
        if det_h.len() != det_o.len() || det_h.len() != scores.len() {
            anyhow::bail!(
                "Detections have {} human boxes, {} object boxes and {} scores",
                det_h.len(),
                det_o.len(),
                scores.len()
            );
        }

        let mut labels = vec![0.0; det_h.len()];
        if gt_h.is_empty() {
            return Ok(labels);
        }

        let iou_h = box_iou(gt_h, det_h);
        let iou_o = box_iou(gt_o, det_o);

        // Best ground-truth pair of each detection
        let mut claims: Vec<Vec<usize>> = vec![Vec::new(); gt_h.len()];
        for d in 0..det_h.len() {
            let best = (0..gt_h.len())
                .map(|g| (g, iou_h[g][d].min(iou_o[g][d])))
                .fold(None, |best: Option<(usize, f64)>, (g, v)| match best {
                    Some((_, b)) if b >= v => best,
                    _ => Some((g, v)),
                });
            if let Some((g, v)) = best {
                if v >= self.min_iou {
                    claims[g].push(d);
                }
            }
        }

        for claimants in claims {
            let winner = claimants.into_iter().fold(None, |best: Option<usize>, d| match best {
                Some(b) if scores[b] >= scores[d] => best,
                _ => Some(d),
            });
            if let Some(d) = winner {
                labels[d] = 1.0;
            }
        }

        Ok(labels)
    }
}
