use shared::{AdvisoryPayload, RankedResult, SkinType};

use super::catalog::{AdvisoryCatalog, Condition};

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn separator(result: &RankedResult) -> String {
    format!("--- {} ({:.1}%) 관련 솔루션 ---", result.label, result.confidence)
}

/// Builds the advisory for ranked results. Separators are only emitted when more than
/// one condition is reported, and only in front of a condition that has advice.
///
/// An empty `ranked` list produces an empty payload, which renders as the
/// inconclusive response.
pub fn compose(
    catalog: &AdvisoryCatalog,
    ranked: &[RankedResult],
    skin_type: Option<SkinType>,
) -> AdvisoryPayload {
    // Ranking already applied the threshold to unrounded values, so a result just
    // above it may be reported as exactly 10.0.
    let predictions: Vec<RankedResult> = ranked
        .iter()
        .map(|result| RankedResult {
            label: result.label.clone(),
            confidence: round_to(result.confidence, 2),
        })
        .collect();

    let multiple = predictions.len() > 1;
    let mut tips = Vec::new();
    for result in &predictions {
        let blocks = catalog.lookup(&Condition::from_label(&result.label), skin_type);
        if multiple && !blocks.is_empty() {
            tips.push(separator(result));
        }
        tips.extend(blocks.iter().cloned());
    }

    AdvisoryPayload { predictions, tips }
}
