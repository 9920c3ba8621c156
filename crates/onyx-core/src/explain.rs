use crate::types::{
    NarrativeExplanation, RailWeightAdjustment, RiskLevel, TrustContext, TrustScoreResult,
};

/// Labels for the context features that pulled the score down.
pub fn key_factors(context: &TrustContext) -> Vec<&'static str> {
    let mut factors = Vec::new();
    if context.device_reputation < 0.5 {
        factors.push("device reputation");
    }
    if context.velocity > 5.0 {
        factors.push("high velocity");
    }
    if context.ip_risk > 0.7 {
        factors.push("IP risk");
    }
    if context.history_len < 10 {
        factors.push("limited history");
    }
    factors
}

/// Deterministic template explanation for a scored transaction.
pub fn generate_explanation(
    score: &TrustScoreResult,
    adjustments: &[RailWeightAdjustment],
    context: &TrustContext,
) -> String {
    let factors = key_factors(context);
    let due_to = if factors.is_empty() {
        String::new()
    } else {
        format!(" due to {}", factors.join(", "))
    };

    match score.risk_level {
        RiskLevel::High => {
            let mut explanation =
                format!("High risk detected (score: {:.2}){due_to}", score.trust_score);
            let ach_down_weighted = adjustments
                .iter()
                .find(|adjustment| adjustment.rail_type == "ACH")
                .is_some_and(|adjustment| adjustment.adjustment_factor < 0.5);
            if ach_down_weighted {
                explanation.push_str(". ACH down-weighted due to elevated risk");
            }
            explanation
        }
        RiskLevel::Medium => format!(
            "Medium risk detected (score: {:.2}){due_to}. Minor rail adjustments applied",
            score.trust_score
        ),
        RiskLevel::Low => {
            let history = if context.history_len > 50 {
                " with strong transaction history"
            } else {
                ""
            };
            format!(
                "Low risk detected (score: {:.2}){history}. No significant rail adjustments needed",
                score.trust_score
            )
        }
    }
}

/// Input handed to a narrative [`Explainer`].
#[derive(Debug, Clone, Copy)]
pub struct ExplanationRequest<'a> {
    pub trace_id: &'a str,
    pub score: &'a TrustScoreResult,
    pub adjustments: &'a [RailWeightAdjustment],
    pub context: &'a TrustContext,
}

/// Optional collaborator that attaches a narrative to a trust signal.
///
/// Implementations return `None` when they have nothing to add; the template
/// explanation is produced regardless.
pub trait Explainer: Send + Sync {
    fn name(&self) -> &str;

    fn explain(&self, request: &ExplanationRequest<'_>) -> Option<NarrativeExplanation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureBreakdown;
    use chrono::Utc;

    fn score(trust_score: f64, risk_level: RiskLevel) -> TrustScoreResult {
        TrustScoreResult {
            trust_score,
            risk_level,
            confidence: 0.8,
            model_type: "trust_signal_ml_stub_v1".to_string(),
            feature_contributions: FeatureBreakdown {
                device_reputation: 0.0,
                velocity: 0.0,
                ip_risk: 0.0,
                history_len: 0.0,
            },
            timestamp: Utc::now(),
        }
    }

    fn ach(factor: f64) -> RailWeightAdjustment {
        RailWeightAdjustment {
            rail_type: "ACH".to_string(),
            original_weight: 0.4,
            adjusted_weight: 0.4 * factor,
            adjustment_factor: factor,
            reason: String::new(),
        }
    }

    #[test]
    fn key_factors_follow_fixed_order() {
        let context = TrustContext::new(0.2, 15.0, 0.8, 2);
        assert_eq!(
            key_factors(&context),
            vec!["device reputation", "high velocity", "IP risk", "limited history"]
        );
        assert!(key_factors(&TrustContext::new(0.5, 5.0, 0.7, 10)).is_empty());
    }

    #[test]
    fn high_risk_calls_out_ach() {
        let context = TrustContext::new(0.2, 15.0, 0.8, 2);
        let text = generate_explanation(&score(0.123, RiskLevel::High), &[ach(0.3)], &context);
        assert_eq!(
            text,
            "High risk detected (score: 0.12) due to device reputation, high velocity, IP risk, \
             limited history. ACH down-weighted due to elevated risk"
        );

        let without_ach = generate_explanation(&score(0.3, RiskLevel::High), &[], &context);
        assert!(!without_ach.contains("ACH"));
    }

    #[test]
    fn medium_risk_mentions_minor_adjustments() {
        let context = TrustContext::new(0.4, 2.0, 0.3, 40);
        let text = generate_explanation(&score(0.561, RiskLevel::Medium), &[ach(0.8)], &context);
        assert_eq!(
            text,
            "Medium risk detected (score: 0.56) due to device reputation. Minor rail adjustments applied"
        );
    }

    #[test]
    fn low_risk_with_long_history() {
        let long = TrustContext::new(0.9, 1.0, 0.1, 100);
        assert_eq!(
            generate_explanation(&score(0.9, RiskLevel::Low), &[], &long),
            "Low risk detected (score: 0.90) with strong transaction history. \
             No significant rail adjustments needed"
        );

        let short = TrustContext::new(0.9, 1.0, 0.1, 50);
        assert_eq!(
            generate_explanation(&score(0.9, RiskLevel::Low), &[], &short),
            "Low risk detected (score: 0.90). No significant rail adjustments needed"
        );
    }
}
