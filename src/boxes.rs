/// Axis-aligned box as `[x1, y1, x2, y2]`
pub type BoxCoords = [f64; 4];

/// Area of a box, zero for degenerate boxes
pub fn area(b: &BoxCoords) -> f64 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// Intersection over union of two boxes
pub fn iou(a: &BoxCoords, b: &BoxCoords) -> f64 {
    let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = w * h;
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Pairwise IoU, `result[i][j] = iou(a[i], b[j])`
pub fn box_iou(a: &[BoxCoords], b: &[BoxCoords]) -> Vec<Vec<f64>> {
    a.iter()
        .map(|x| b.iter().map(|y| iou(x, y)).collect())
        .collect()
}

/// Indices of `scores` ordered by decreasing score
pub fn argsort_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Class-wise non-maximum suppression.
///
/// Boxes only suppress boxes with the same label. Returns the kept indices
/// in decreasing score order.
pub fn batched_nms(
    boxes: &[BoxCoords],
    scores: &[f64],
    labels: &[usize],
    iou_threshold: f64,
) -> Vec<usize> {
    let order = argsort_descending(scores);
    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j] && labels[j] == labels[i] && iou(&boxes[i], &boxes[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }

    keep
}
