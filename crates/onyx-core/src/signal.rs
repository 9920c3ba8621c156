use crate::explain::{generate_explanation, ExplanationRequest, Explainer};
use crate::model::TrustScoringModel;
use crate::rails::calculate_rail_adjustments;
use crate::types::{RailWeights, SignalMetadata, TrustContext, TrustSignalResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Seed recorded in signal metadata when the caller supplies none.
pub const DEFAULT_SEED: u64 = 42;
pub const MODEL_VERSION: &str = "trust_signal_v1";

/// Trust signal pipeline: score, derive rail adjustments, explain.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Clone, Default)]
pub struct TrustSignalEngine {
    model: TrustScoringModel,
    explainer: Option<Arc<dyn Explainer>>,
}

impl fmt::Debug for TrustSignalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustSignalEngine")
            .field("model", &self.model)
            .field(
                "explainer",
                &self.explainer.as_ref().map(|explainer| explainer.name()),
            )
            .finish()
    }
}

impl TrustSignalEngine {
    pub fn new(model: TrustScoringModel) -> Self {
        Self {
            model,
            explainer: None,
        }
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn model(&self) -> &TrustScoringModel {
        &self.model
    }

    /// Generate a trust signal. `None` weights fall back to
    /// [`RailWeights::checkout_default`]; `seed` is recorded in metadata only.
    pub fn signal(
        &self,
        trace_id: &str,
        context: &TrustContext,
        original_weights: Option<RailWeights>,
        seed: u64,
    ) -> TrustSignalResult {
        self.signal_at(trace_id, context, original_weights, seed, Utc::now())
    }

    pub fn signal_at(
        &self,
        trace_id: &str,
        context: &TrustContext,
        original_weights: Option<RailWeights>,
        seed: u64,
        timestamp: DateTime<Utc>,
    ) -> TrustSignalResult {
        let original_weights = original_weights.unwrap_or_else(RailWeights::checkout_default);
        let score = self.model.score_at(context, timestamp);
        let adjustments =
            calculate_rail_adjustments(score.trust_score, score.risk_level, &original_weights);
        let explanation = generate_explanation(&score, &adjustments, context);

        let narrative = self.explainer.as_ref().and_then(|explainer| {
            explainer.explain(&ExplanationRequest {
                trace_id,
                score: &score,
                adjustments: &adjustments,
                context,
            })
        });

        tracing::info!(
            trace_id,
            score = score.trust_score,
            risk = %score.risk_level,
            confidence = score.confidence,
            "Trust signal generated"
        );

        TrustSignalResult {
            trace_id: trace_id.to_string(),
            trust_score_result: score,
            rail_adjustments: adjustments,
            explanation,
            narrative,
            metadata: SignalMetadata {
                deterministic_seed: seed,
                model_version: MODEL_VERSION.to_string(),
                context_features: context.clone(),
                original_weights,
            },
            timestamp,
        }
    }
}

/// Generate a trust signal with the default model and no narrative explainer.
pub fn score_trust(
    trace_id: &str,
    context: &TrustContext,
    original_weights: Option<RailWeights>,
    seed: u64,
) -> TrustSignalResult {
    TrustSignalEngine::default().signal(trace_id, context, original_weights, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NarrativeExplanation, RiskLevel};
    use std::collections::BTreeMap;

    struct EchoExplainer;

    impl Explainer for EchoExplainer {
        fn name(&self) -> &str {
            "echo"
        }

        fn explain(&self, request: &ExplanationRequest<'_>) -> Option<NarrativeExplanation> {
            Some(NarrativeExplanation {
                explanation: format!("narrative for {}", request.trace_id),
                key_factors: Vec::new(),
                rail_impact: BTreeMap::new(),
                confidence: 1.0,
                model_used: "echo".to_string(),
            })
        }
    }

    #[test]
    fn default_weights_and_metadata() {
        let context = TrustContext::new(0.9, 1.0, 0.1, 100);
        let result = score_trust("trace-low", &context, None, DEFAULT_SEED);

        assert_eq!(result.trust_score_result.risk_level, RiskLevel::Low);
        assert_eq!(result.metadata.deterministic_seed, 42);
        assert_eq!(result.metadata.model_version, "trust_signal_v1");
        assert_eq!(result.metadata.original_weights, RailWeights::checkout_default());
        assert_eq!(result.metadata.context_features, context);
        assert_eq!(result.adjusted_weights(), RailWeights::checkout_default());
        assert!(result.narrative.is_none());
    }

    #[test]
    fn high_risk_signal_down_weights_ach() {
        let context = TrustContext::new(0.2, 15.0, 0.8, 2);
        let weights = RailWeights::new()
            .with("ACH", 0.5)
            .with("debit", 0.3)
            .with("credit", 0.2);
        let result = score_trust("trace-high", &context, Some(weights), DEFAULT_SEED);

        assert_eq!(result.trust_score_result.risk_level, RiskLevel::High);
        let ach = result.adjustment_for("ACH").unwrap();
        assert!(ach.adjusted_weight < ach.original_weight);
        let credit = result.adjustment_for("credit").unwrap();
        assert!(credit.adjusted_weight > credit.original_weight);
        assert!(result
            .explanation
            .ends_with(". ACH down-weighted due to elevated risk"));
    }

    #[test]
    fn seed_does_not_change_the_score() {
        let context = TrustContext::new(0.6, 3.0, 0.4, 20);
        let at = Utc::now();
        let engine = TrustSignalEngine::default();
        let first = engine.signal_at("t", &context, None, 1, at);
        let second = engine.signal_at("t", &context, None, 99, at);
        assert_eq!(first.trust_score_result, second.trust_score_result);
        assert_eq!(first.rail_adjustments, second.rail_adjustments);
        assert_eq!(first.explanation, second.explanation);
    }

    #[test]
    fn explainer_adds_narrative_without_touching_template() {
        let context = TrustContext::new(0.9, 1.0, 0.1, 100);
        let at = Utc::now();
        let plain = TrustSignalEngine::default().signal_at("t-1", &context, None, 42, at);
        let narrated = TrustSignalEngine::default()
            .with_explainer(Arc::new(EchoExplainer))
            .signal_at("t-1", &context, None, 42, at);

        assert_eq!(plain.explanation, narrated.explanation);
        assert_eq!(
            narrated.narrative.map(|narrative| narrative.explanation),
            Some("narrative for t-1".to_string())
        );
    }
}
