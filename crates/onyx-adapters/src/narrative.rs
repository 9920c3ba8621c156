use onyx_core::{ExplanationRequest, Explainer, NarrativeExplanation, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
pub const API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const DEPLOYMENT_ENV: &str = "AZURE_OPENAI_DEPLOYMENT_NAME";
pub const API_VERSION_ENV: &str = "AZURE_OPENAI_API_VERSION";

const DEFAULT_DEPLOYMENT: &str = "onyx-llm";
const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
const NARRATIVE_CONFIDENCE: f64 = 0.85;

/// Deployment settings for the narrative explainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeExplainerConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: String,
    pub api_version: String,
}

impl Default for NarrativeExplainerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// Redacted view of the explainer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainerStatus {
    pub configured: bool,
    pub endpoint: bool,
    pub api_key: bool,
    pub deployment: String,
    pub version: String,
}

impl NarrativeExplainerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            endpoint: lookup(ENDPOINT_ENV),
            api_key: lookup(API_KEY_ENV),
            deployment: lookup(DEPLOYMENT_ENV).unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
            api_version: lookup(API_VERSION_ENV)
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.endpoint) && present(&self.api_key) && !self.deployment.is_empty()
    }

    pub fn configuration_status(&self) -> ExplainerStatus {
        ExplainerStatus {
            configured: self.is_configured(),
            endpoint: self.endpoint.is_some(),
            api_key: self.api_key.is_some(),
            deployment: self.deployment.clone(),
            version: self.api_version.clone(),
        }
    }
}

/// Deterministic narrative explainer bound to a model deployment.
///
/// Answers only when the deployment is fully configured.
#[derive(Debug, Clone)]
pub struct DeploymentNarrativeExplainer {
    config: NarrativeExplainerConfig,
    model_used: String,
}

impl DeploymentNarrativeExplainer {
    pub fn new(config: NarrativeExplainerConfig) -> Self {
        if config.is_configured() {
            tracing::info!(deployment = %config.deployment, "Narrative explainer configured");
        } else {
            tracing::info!("Narrative explainer not configured, template explanations only");
        }
        let model_used = format!("azure-openai-{}", config.deployment);
        Self { config, model_used }
    }

    pub fn from_env() -> Self {
        Self::new(NarrativeExplainerConfig::from_env())
    }

    pub fn config(&self) -> &NarrativeExplainerConfig {
        &self.config
    }
}

impl Explainer for DeploymentNarrativeExplainer {
    fn name(&self) -> &str {
        &self.model_used
    }

    fn explain(&self, request: &ExplanationRequest<'_>) -> Option<NarrativeExplanation> {
        if !self.config.is_configured() {
            return None;
        }

        let factors = narrative_factors(request);
        let score = request.score.trust_score;
        let explanation = match request.score.risk_level {
            RiskLevel::High => format!(
                "High risk assessment (score: {score:.2}) due to {}. ACH rail significantly \
                 down-weighted due to elevated risk profile. Credit card recommended for \
                 enhanced security.",
                joined_or(&factors, "multiple risk factors")
            ),
            RiskLevel::Medium => format!(
                "Medium risk assessment (score: {score:.2}) with {}. Minor rail adjustments \
                 applied to balance risk and cost efficiency.",
                joined_or(&factors, "moderate risk indicators")
            ),
            RiskLevel::Low => format!(
                "Low risk assessment (score: {score:.2}) with strong trust indicators. All \
                 payment rails available with minimal restrictions."
            ),
        };

        let rail_impact: BTreeMap<String, String> = request
            .adjustments
            .iter()
            .map(|adjustment| {
                let rail = adjustment.rail_type.to_uppercase();
                let impact = if adjustment.adjustment_factor < 0.5 {
                    format!("{rail} significantly down-weighted due to risk concerns")
                } else if adjustment.adjustment_factor < 0.8 {
                    format!("{rail} moderately adjusted for risk management")
                } else {
                    format!("{rail} weight maintained with minimal risk impact")
                };
                (adjustment.rail_type.clone(), impact)
            })
            .collect();

        tracing::debug!(trace_id = request.trace_id, "Narrative explanation generated");

        Some(NarrativeExplanation {
            explanation,
            key_factors: factors.into_iter().map(str::to_string).collect(),
            rail_impact,
            confidence: NARRATIVE_CONFIDENCE,
            model_used: self.model_used.clone(),
        })
    }
}

fn narrative_factors(request: &ExplanationRequest<'_>) -> Vec<&'static str> {
    let context = request.context;
    let mut factors = Vec::new();
    if context.device_reputation < 0.5 {
        factors.push("low device reputation");
    }
    if context.velocity > 5.0 {
        factors.push("high transaction velocity");
    }
    if context.ip_risk > 0.7 {
        factors.push("elevated IP risk");
    }
    if context.history_len < 10 {
        factors.push("limited transaction history");
    }
    factors
}

fn joined_or(factors: &[&str], fallback: &str) -> String {
    if factors.is_empty() {
        fallback.to_string()
    } else {
        factors.join(", ")
    }
}
