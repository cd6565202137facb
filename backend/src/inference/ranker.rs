use shared::RankedResult;

use super::model::LabelSet;

/// Results at or below this confidence (in percent) are dropped.
pub const CONFIDENCE_THRESHOLD: f64 = 10.0;
/// Maximum number of conditions reported per image.
pub const MAX_RESULTS: usize = 3;

/// Converts raw scores into at most [`MAX_RESULTS`] labelled confidences above
/// [`CONFIDENCE_THRESHOLD`], highest first. Equal confidences keep label order.
///
/// An empty result is the inconclusive outcome, not an error. Scores beyond the
/// label set are ignored; callers check the lengths match beforehand.
pub fn rank(scores: &[f32], labels: &LabelSet) -> Vec<RankedResult> {
    let mut confidences: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| (index, f64::from(score * 100.0)))
        .collect();

    confidences.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    confidences
        .into_iter()
        .filter(|&(_, confidence)| confidence > CONFIDENCE_THRESHOLD)
        .filter_map(|(index, confidence)| {
            labels.get(index).map(|label| RankedResult {
                label: label.to_string(),
                confidence,
            })
        })
        .take(MAX_RESULTS)
        .collect()
}
