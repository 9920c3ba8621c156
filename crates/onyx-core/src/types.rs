use crate::error::OnyxError;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a single KYB check and of the combined verdict.
///
/// Variants are declared in precedence order so the derived `Ord` gives
/// `Verified < Review < Fail` and the verdict is the maximum over all checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Review,
    Fail,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Review => "review",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five KYB checks, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    JurisdictionVerification,
    EntityAgeVerification,
    SanctionsScreening,
    BusinessNameValidation,
    RegistrationStatusVerification,
}

impl CheckName {
    pub const ALL: [CheckName; 5] = [
        Self::JurisdictionVerification,
        Self::EntityAgeVerification,
        Self::SanctionsScreening,
        Self::BusinessNameValidation,
        Self::RegistrationStatusVerification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::JurisdictionVerification => "jurisdiction_verification",
            Self::EntityAgeVerification => "entity_age_verification",
            Self::SanctionsScreening => "sanctions_screening",
            Self::BusinessNameValidation => "business_name_validation",
            Self::RegistrationStatusVerification => "registration_status_verification",
        }
    }

    /// Display label, e.g. `Sanctions Screening`.
    pub fn title(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized business entity entering the KYB pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub business_name: String,
    pub jurisdiction: String,
    pub entity_age_days: u64,
    pub registration_status: String,
    pub sanctions_flags: Vec<String>,
    pub business_type: String,
    pub registration_number: String,
}

/// Result of one KYB rule check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: CheckName,
    pub status: VerificationStatus,
    pub details: BTreeMap<String, serde_json::Value>,
    pub reason: String,
}

/// Verdict metadata echoed for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictMetadata {
    pub verification_version: String,
    pub rules_applied: usize,
    pub jurisdiction: String,
    pub entity_age_days: u64,
}

/// Combined KYB verdict. The status and reason are always derived from `checks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KybVerdict {
    pub status: VerificationStatus,
    pub checks: Vec<CheckResult>,
    pub reason: String,
    pub entity_id: String,
    pub verified_at: DateTime<Utc>,
    pub metadata: VerdictMetadata,
}

fn default_channel() -> String {
    "online".to_string()
}

/// Transaction context for trust scoring.
///
/// Bounded fields are trusted by the scoring model; callers run [`TrustContext::validate`]
/// at the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustContext {
    /// 0.0..1.0 device reputation.
    pub device_reputation: f64,
    /// Transactions per hour, >= 0.
    pub velocity: f64,
    /// 0.0..1.0 IP risk.
    pub ip_risk: f64,
    pub history_len: u64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl TrustContext {
    pub fn new(device_reputation: f64, velocity: f64, ip_risk: f64, history_len: u64) -> Self {
        Self {
            device_reputation,
            velocity,
            ip_risk,
            history_len,
            user_id: None,
            session_id: None,
            merchant_id: None,
            channel: default_channel(),
            amount: None,
        }
    }

    pub fn with_identifiers(
        mut self,
        user_id: Option<String>,
        session_id: Option<String>,
        merchant_id: Option<String>,
    ) -> Self {
        self.user_id = user_id;
        self.session_id = session_id;
        self.merchant_id = merchant_id;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn validate(&self) -> Result<(), OnyxError> {
        if !self.device_reputation.is_finite() || !(0.0..=1.0).contains(&self.device_reputation)
        {
            return Err(OnyxError::out_of_range(
                "device_reputation",
                self.device_reputation,
                "within [0, 1]",
            ));
        }
        if !self.velocity.is_finite() || self.velocity < 0.0 {
            return Err(OnyxError::out_of_range("velocity", self.velocity, ">= 0"));
        }
        if !self.ip_risk.is_finite() || !(0.0..=1.0).contains(&self.ip_risk) {
            return Err(OnyxError::out_of_range(
                "ip_risk",
                self.ip_risk,
                "within [0, 1]",
            ));
        }
        if let Some(amount) = self.amount {
            if !amount.is_finite() {
                return Err(OnyxError::out_of_range("amount", amount, "finite"));
            }
        }
        Ok(())
    }
}

/// Trust tier derived from the trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-feature values (or weighted contributions) of the trust model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBreakdown {
    pub device_reputation: f64,
    pub velocity: f64,
    pub ip_risk: f64,
    pub history_len: f64,
}

impl FeatureBreakdown {
    pub fn values(&self) -> [f64; 4] {
        [
            self.device_reputation,
            self.velocity,
            self.ip_risk,
            self.history_len,
        ]
    }

    pub fn weighted_by(&self, weights: &FeatureBreakdown) -> FeatureBreakdown {
        FeatureBreakdown {
            device_reputation: self.device_reputation * weights.device_reputation,
            velocity: self.velocity * weights.velocity,
            ip_risk: self.ip_risk * weights.ip_risk,
            history_len: self.history_len * weights.history_len,
        }
    }

    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }
}

/// Output of the trust scoring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScoreResult {
    pub trust_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub model_type: String,
    pub feature_contributions: FeatureBreakdown,
    pub timestamp: DateTime<Utc>,
}

/// Insertion-ordered rail → weight mapping.
///
/// Serialized as a JSON object; deserialization keeps document order so adjustments are
/// reported in the order the caller supplied the rails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RailWeights(Vec<(String, f64)>);

impl RailWeights {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// `{ACH: 0.4, debit: 0.3, credit: 0.3}`
    pub fn checkout_default() -> Self {
        Self::new()
            .with("ACH", 0.4)
            .with("debit", 0.3)
            .with("credit", 0.3)
    }

    pub fn with(mut self, rail: impl Into<String>, weight: f64) -> Self {
        self.insert(rail, weight);
        self
    }

    /// Inserts or replaces a rail weight. Replacing keeps the original position.
    pub fn insert(&mut self, rail: impl Into<String>, weight: f64) {
        let rail = rail.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == rail) {
            Some(entry) => entry.1 = weight,
            None => self.0.push((rail, weight)),
        }
    }

    pub fn get(&self, rail: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == rail)
            .map(|(_, weight)| *weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(rail, weight)| (rail.as_str(), *weight))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, weight)| weight).sum()
    }

    /// Every weight must be finite and non-negative.
    pub fn validate(&self) -> Result<(), OnyxError> {
        match self
            .0
            .iter()
            .find(|(_, weight)| !weight.is_finite() || *weight < 0.0)
        {
            Some((rail, weight)) => Err(OnyxError::InvalidWeights(format!(
                "{rail} must be >= 0, got {weight}"
            ))),
            None => Ok(()),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RailWeights {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut weights = RailWeights::new();
        for (rail, weight) in iter {
            weights.insert(rail, weight);
        }
        weights
    }
}

impl Serialize for RailWeights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (rail, weight) in &self.0 {
            map.serialize_entry(rail, weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RailWeights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RailWeightsVisitor;

        impl<'de> Visitor<'de> for RailWeightsVisitor {
            type Value = RailWeights;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of rail names to weights")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut weights = RailWeights::new();
                while let Some((rail, weight)) = access.next_entry::<String, f64>()? {
                    weights.insert(rail, weight);
                }
                Ok(weights)
            }
        }

        deserializer.deserialize_map(RailWeightsVisitor)
    }
}

/// Weight adjustment for one payment rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailWeightAdjustment {
    pub rail_type: String,
    pub original_weight: f64,
    pub adjusted_weight: f64,
    pub adjustment_factor: f64,
    pub reason: String,
}

/// Optional narrative produced by a pluggable [`crate::Explainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeExplanation {
    pub explanation: String,
    pub key_factors: Vec<String>,
    pub rail_impact: BTreeMap<String, String>,
    pub confidence: f64,
    pub model_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub deterministic_seed: u64,
    pub model_version: String,
    pub context_features: TrustContext,
    pub original_weights: RailWeights,
}

/// Complete trust signal for one checkout transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSignalResult {
    pub trace_id: String,
    pub trust_score_result: TrustScoreResult,
    pub rail_adjustments: Vec<RailWeightAdjustment>,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativeExplanation>,
    pub metadata: SignalMetadata,
    pub timestamp: DateTime<Utc>,
}

impl TrustSignalResult {
    pub fn adjustment_for(&self, rail: &str) -> Option<&RailWeightAdjustment> {
        self.rail_adjustments
            .iter()
            .find(|adjustment| adjustment.rail_type == rail)
    }

    /// Adjusted weights keyed by rail, in adjustment order.
    pub fn adjusted_weights(&self) -> RailWeights {
        self.rail_adjustments
            .iter()
            .map(|adjustment| (adjustment.rail_type.clone(), adjustment.adjusted_weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_is_verified_review_fail() {
        assert!(VerificationStatus::Verified < VerificationStatus::Review);
        assert!(VerificationStatus::Review < VerificationStatus::Fail);
        assert_eq!(
            [
                VerificationStatus::Review,
                VerificationStatus::Fail,
                VerificationStatus::Verified
            ]
            .into_iter()
            .max(),
            Some(VerificationStatus::Fail)
        );
    }

    #[test]
    fn check_name_title_case() {
        assert_eq!(
            CheckName::RegistrationStatusVerification.title(),
            "Registration Status Verification"
        );
        assert_eq!(
            serde_json::to_value(CheckName::SanctionsScreening).unwrap(),
            serde_json::json!("sanctions_screening")
        );
    }

    #[test]
    fn rail_weights_keep_document_order() {
        let weights: RailWeights =
            serde_json::from_str(r#"{"credit": 0.2, "ACH": 0.5, "wallet": 0.3}"#).unwrap();
        let rails: Vec<&str> = weights.iter().map(|(rail, _)| rail).collect();
        assert_eq!(rails, vec!["credit", "ACH", "wallet"]);

        let encoded = serde_json::to_string(&weights).unwrap();
        assert_eq!(encoded, r#"{"credit":0.2,"ACH":0.5,"wallet":0.3}"#);
    }

    #[test]
    fn rail_weights_insert_replaces_in_place() {
        let mut weights = RailWeights::checkout_default();
        weights.insert("ACH", 0.1);
        assert_eq!(weights.len(), 3);
        assert_eq!(weights.iter().next(), Some(("ACH", 0.1)));
    }

    #[test]
    fn rail_weights_reject_negative_and_non_finite() {
        assert!(RailWeights::checkout_default().validate().is_ok());
        assert!(RailWeights::new().with("ACH", 0.0).validate().is_ok());

        let err = RailWeights::new()
            .with("ACH", 1.0)
            .with("credit", -0.3)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            OnyxError::InvalidWeights("credit must be >= 0, got -0.3".to_string())
        );
        assert!(RailWeights::new().with("debit", f64::NAN).validate().is_err());
    }

    #[test]
    fn context_defaults_channel_to_online() {
        let context: TrustContext = serde_json::from_value(serde_json::json!({
            "device_reputation": 0.5,
            "velocity": 1.0,
            "ip_risk": 0.2,
            "history_len": 4
        }))
        .unwrap();
        assert_eq!(context.channel, "online");
        assert!(context.user_id.is_none());
        assert!(context.validate().is_ok());
    }

    #[test]
    fn context_validation_rejects_out_of_range_fields() {
        let err = TrustContext::new(1.5, 1.0, 0.1, 1).validate().unwrap_err();
        assert!(err.to_string().contains("device_reputation"));

        assert!(TrustContext::new(0.5, -1.0, 0.1, 1).validate().is_err());
        assert!(TrustContext::new(0.5, 1.0, f64::NAN, 1).validate().is_err());
        assert!(TrustContext::new(0.5, 1.0, 0.1, 1)
            .with_amount(f64::INFINITY)
            .validate()
            .is_err());
    }
}
