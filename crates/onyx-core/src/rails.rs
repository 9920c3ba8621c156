use crate::types::{RailWeightAdjustment, RailWeights, RiskLevel};

/// Multiplicative factor applied to a rail for a risk tier. Unknown rails keep 1.0.
pub fn adjustment_factor(risk_level: RiskLevel, rail: &str) -> f64 {
    match (risk_level, rail) {
        (RiskLevel::Medium, "ACH") => 0.8,
        (RiskLevel::High, "ACH") => 0.3,
        (RiskLevel::High, "debit") => 0.7,
        _ => 1.0,
    }
}

/// Scale rail weights by the tier factors, then renormalize so the adjusted weights
/// sum to the original total.
///
/// Output follows input order. When every adjusted weight is zero the raw products are
/// returned unscaled.
pub fn calculate_rail_adjustments(
    trust_score: f64,
    risk_level: RiskLevel,
    original_weights: &RailWeights,
) -> Vec<RailWeightAdjustment> {
    let raw: Vec<(&str, f64, f64, f64)> = original_weights
        .iter()
        .map(|(rail, weight)| {
            let factor = adjustment_factor(risk_level, rail);
            (rail, weight, factor, weight * factor)
        })
        .collect();

    let adjusted_total: f64 = raw.iter().map(|(_, _, _, adjusted)| adjusted).sum();
    let scale = if adjusted_total != 0.0 {
        original_weights.total() / adjusted_total
    } else {
        1.0
    };

    raw.into_iter()
        .map(|(rail, original_weight, factor, adjusted)| RailWeightAdjustment {
            rail_type: rail.to_string(),
            original_weight,
            adjusted_weight: adjusted * scale,
            adjustment_factor: factor,
            reason: format!(
                "Trust score {trust_score:.2} ({risk_level} risk) affects {rail} preference"
            ),
        })
        .collect()
}
