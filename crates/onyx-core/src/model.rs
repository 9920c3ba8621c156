use crate::types::{FeatureBreakdown, RiskLevel, TrustContext, TrustScoreResult};
use chrono::{DateTime, Utc};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;

/// Fixed parameters of the trust scoring model.
#[derive(Debug, Clone)]
pub struct TrustModelConfig {
    pub model_type: String,
    pub feature_weights: FeatureBreakdown,
    /// Velocity (tx/hour) at which the velocity feature saturates.
    pub velocity_cap: f64,
    /// History length at which the history feature saturates.
    pub history_cap: f64,
    /// Scores at or above this are low risk.
    pub low_risk_threshold: f64,
    /// Scores at or above this (and below `low_risk_threshold`) are medium risk.
    pub medium_risk_threshold: f64,
    /// Standard deviation of the score perturbation. Non-positive disables it.
    pub noise_std_dev: f64,
    pub min_confidence: f64,
}

impl Default for TrustModelConfig {
    fn default() -> Self {
        Self {
            model_type: "trust_signal_ml_stub_v1".to_string(),
            feature_weights: FeatureBreakdown {
                device_reputation: 0.35,
                velocity: 0.25,
                ip_risk: 0.25,
                history_len: 0.15,
            },
            velocity_cap: 10.0,
            history_cap: 100.0,
            low_risk_threshold: 0.7,
            medium_risk_threshold: 0.4,
            noise_std_dev: 0.05,
            min_confidence: 0.5,
        }
    }
}

/// Weighted-sum trust model with context-seeded Gaussian perturbation.
#[derive(Debug, Clone)]
pub struct TrustScoringModel {
    config: TrustModelConfig,
    noise: Option<Normal>,
}

impl Default for TrustScoringModel {
    fn default() -> Self {
        Self::new(TrustModelConfig::default())
    }
}

impl TrustScoringModel {
    pub fn new(config: TrustModelConfig) -> Self {
        let noise = if config.noise_std_dev > 0.0 {
            Normal::new(0.0, config.noise_std_dev).ok()
        } else {
            None
        };
        Self { config, noise }
    }

    pub fn config(&self) -> &TrustModelConfig {
        &self.config
    }

    /// Feature vector in `[0, 1]`, oriented so higher is more trustworthy.
    pub fn features(&self, context: &TrustContext) -> FeatureBreakdown {
        let normalized_velocity = (context.velocity / self.config.velocity_cap).min(1.0);
        let normalized_history = (context.history_len as f64 / self.config.history_cap).min(1.0);

        FeatureBreakdown {
            device_reputation: context.device_reputation,
            velocity: 1.0 - normalized_velocity,
            ip_risk: 1.0 - context.ip_risk,
            history_len: normalized_history,
        }
    }

    pub fn classify(&self, trust_score: f64) -> RiskLevel {
        if trust_score < self.config.medium_risk_threshold {
            RiskLevel::High
        } else if trust_score < self.config.low_risk_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn score(&self, context: &TrustContext) -> TrustScoreResult {
        self.score_at(context, Utc::now())
    }

    pub fn score_at(&self, context: &TrustContext, timestamp: DateTime<Utc>) -> TrustScoreResult {
        let features = self.features(context);
        let contributions = features.weighted_by(&self.config.feature_weights);
        let noise = self.noise(context);
        let trust_score = (contributions.sum() + noise).clamp(0.0, 1.0);
        let confidence = (1.0 - population_std_dev(&features.values())).max(self.config.min_confidence);

        TrustScoreResult {
            trust_score,
            risk_level: self.classify(trust_score),
            confidence,
            model_type: self.config.model_type.clone(),
            feature_contributions: contributions,
            timestamp,
        }
    }

    /// Gaussian perturbation drawn from a `StdRng` seeded by [`context_seed`].
    pub fn noise(&self, context: &TrustContext) -> f64 {
        match &self.noise {
            Some(normal) => normal.sample(&mut StdRng::seed_from_u64(context_seed(context))),
            None => 0.0,
        }
    }
}

/// BLAKE3 digest over a canonical encoding of every context field.
pub fn context_digest(context: &TrustContext) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&context.device_reputation.to_bits().to_le_bytes());
    hasher.update(&context.velocity.to_bits().to_le_bytes());
    hasher.update(&context.ip_risk.to_bits().to_le_bytes());
    hasher.update(&context.history_len.to_le_bytes());
    update_optional_str(&mut hasher, context.user_id.as_deref());
    update_optional_str(&mut hasher, context.session_id.as_deref());
    update_optional_str(&mut hasher, context.merchant_id.as_deref());
    update_optional_str(&mut hasher, Some(&context.channel));
    match context.amount {
        Some(amount) => {
            hasher.update(&[1]);
            hasher.update(&amount.to_bits().to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
    hasher.finalize()
}

fn update_optional_str(hasher: &mut blake3::Hasher, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update(&[1]);
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// PRNG seed for the noise draw: first 8 digest bytes, little-endian.
pub fn context_seed(context: &TrustContext) -> u64 {
    let mut seed = [0_u8; 8];
    seed.copy_from_slice(&context_digest(context).as_bytes()[..8]);
    u64::from_le_bytes(seed)
}

fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
    variance.sqrt()
}
