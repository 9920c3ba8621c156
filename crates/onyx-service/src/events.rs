//! CloudEvents envelopes for KYB verdicts and trust signals.

use chrono::{DateTime, Utc};
use onyx_core::{
    EntityRecord, FeatureBreakdown, KybVerdict, RailWeightAdjustment, RailWeights, RiskLevel,
    TrustContext, TrustSignalResult, VerdictMetadata, VerificationStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const SPEC_VERSION: &str = "1.0";
pub const DATA_CONTENT_TYPE: &str = "application/json";
pub const KYB_VERIFIED_TYPE: &str = "ocn.onyx.kyb_verified.v1";
pub const KYB_SOURCE: &str = "onyx";
pub const TRUST_SIGNAL_TYPE: &str = "ocn.onyx.trust_signal.v1";
pub const TRUST_SIGNAL_SOURCE: &str = "onyx-trust-registry";

const SERVICE_VERSION: &str = "1.0.0";

/// Structured-mode CloudEvent envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent<T> {
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub id: String,
    pub time: DateTime<Utc>,
    pub subject: String,
    pub datacontenttype: String,
    pub data: T,
}

impl<T> CloudEvent<T> {
    fn new(event_type: &str, source: &str, id: String, subject: &str, data: T) -> Self {
        Self {
            specversion: SPEC_VERSION.to_string(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            id,
            time: Utc::now(),
            subject: subject.to_string(),
            datacontenttype: DATA_CONTENT_TYPE.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventValidationError {
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl EventValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// KYB verified events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KybEventMetadata {
    pub service: String,
    pub version: String,
    pub feature: String,
    pub trace_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KybEventData {
    pub verification_result: KybVerdict,
    pub entity_info: EntityRecord,
    pub timestamp: DateTime<Utc>,
    pub metadata: KybEventMetadata,
}

pub fn kyb_verified_payload(verdict: &KybVerdict, entity: &EntityRecord) -> KybEventData {
    KybEventData {
        verification_result: verdict.clone(),
        entity_info: entity.clone(),
        timestamp: Utc::now(),
        metadata: KybEventMetadata {
            service: KYB_SOURCE.to_string(),
            version: SERVICE_VERSION.to_string(),
            feature: "kyb_verification".to_string(),
            trace_id: verdict.entity_id.clone(),
        },
    }
}

pub fn kyb_verified_event(trace_id: &str, data: KybEventData) -> CloudEvent<KybEventData> {
    let event = CloudEvent::new(
        KYB_VERIFIED_TYPE,
        KYB_SOURCE,
        Uuid::new_v4().to_string(),
        trace_id,
        data,
    );
    tracing::info!(
        event_id = %event.id,
        event_type = KYB_VERIFIED_TYPE,
        subject = %event.subject,
        status = %event.data.verification_result.status,
        "CloudEvent emitted"
    );
    event
}

fn require<'a>(object: &'a Value, field: &str) -> Result<&'a Value, EventValidationError> {
    object
        .get(field)
        .ok_or_else(|| EventValidationError::MissingField(field.to_string()))
}

fn require_all(object: &Value, fields: &[&str]) -> Result<(), EventValidationError> {
    fields
        .iter()
        .try_for_each(|field| require(object, field).map(|_| ()))
}

fn expect_str(object: &Value, field: &str, expected: &str) -> Result<(), EventValidationError> {
    match require(object, field)?.as_str() {
        Some(actual) if actual == expected => Ok(()),
        _ => Err(EventValidationError::invalid(
            field,
            format!("expected '{expected}'"),
        )),
    }
}

/// Check a structured KYB verified event against the `ocn.onyx.kyb_verified.v1` shape.
pub fn validate_kyb_event(event: &Value) -> Result<(), EventValidationError> {
    require_all(
        event,
        &[
            "specversion",
            "type",
            "source",
            "id",
            "time",
            "subject",
            "datacontenttype",
            "data",
        ],
    )?;
    expect_str(event, "specversion", SPEC_VERSION)?;
    expect_str(event, "type", KYB_VERIFIED_TYPE)?;
    expect_str(event, "source", KYB_SOURCE)?;
    expect_str(event, "datacontenttype", DATA_CONTENT_TYPE)?;

    let data = require(event, "data")?;
    if !data.is_object() {
        return Err(EventValidationError::invalid("data", "expected an object"));
    }
    validate_kyb_data(data, false)
}

/// Check a KYB event payload; unlike [`validate_kyb_event`] this also requires the
/// service metadata fields.
pub fn validate_kyb_payload(payload: &Value) -> Result<(), EventValidationError> {
    validate_kyb_data(payload, true)
}

fn validate_kyb_data(data: &Value, strict_metadata: bool) -> Result<(), EventValidationError> {
    require_all(
        data,
        &["verification_result", "entity_info", "timestamp", "metadata"],
    )?;

    let result = require(data, "verification_result")?;
    require_all(
        result,
        &["status", "checks", "reason", "entity_id", "verified_at"],
    )?;
    let status = require(result, "status")?;
    if serde_json::from_value::<VerificationStatus>(status.clone()).is_err() {
        return Err(EventValidationError::invalid(
            "status",
            "expected one of verified, review, fail",
        ));
    }
    if !require(result, "checks")?.is_array() {
        return Err(EventValidationError::invalid("checks", "expected an array"));
    }

    let entity = require(data, "entity_info")?;
    require_all(entity, &["business_name", "jurisdiction", "entity_age_days"])?;

    let metadata = require(data, "metadata")?;
    if !metadata.is_object() {
        return Err(EventValidationError::invalid("metadata", "expected an object"));
    }
    if strict_metadata {
        require_all(metadata, &["service", "version", "feature"])?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub verified: usize,
    pub review: usize,
    pub fail: usize,
}

/// Reporting summary of a KYB verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KybVerificationSummary {
    pub overall_status: VerificationStatus,
    pub total_checks: usize,
    pub check_results: StatusCounts,
    pub entity_id: String,
    pub verified_at: DateTime<Utc>,
    pub reason: String,
    pub metadata: VerdictMetadata,
}

pub fn kyb_verification_summary(verdict: &KybVerdict) -> KybVerificationSummary {
    let mut counts = StatusCounts::default();
    for check in &verdict.checks {
        match check.status {
            VerificationStatus::Verified => counts.verified += 1,
            VerificationStatus::Review => counts.review += 1,
            VerificationStatus::Fail => counts.fail += 1,
        }
    }

    KybVerificationSummary {
        overall_status: verdict.status,
        total_checks: verdict.checks.len(),
        check_results: counts,
        entity_id: verdict.entity_id.clone(),
        verified_at: verdict.verified_at,
        reason: verdict.reason.clone(),
        metadata: verdict.metadata.clone(),
    }
}

// ---------------------------------------------------------------------------
// Trust signal events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailCandidate {
    pub rail_type: String,
    pub base_cost: f64,
    pub settlement_days: u32,
}

pub fn default_rail_candidates() -> Vec<RailCandidate> {
    [("ACH", 0.25, 1), ("debit", 0.75, 0), ("credit", 1.5, 0)]
        .into_iter()
        .map(|(rail_type, base_cost, settlement_days)| RailCandidate {
            rail_type: rail_type.to_string(),
            base_cost,
            settlement_days,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustSignalScores {
    pub trust_score: f64,
    pub risk_penalty: f64,
    pub confidence: f64,
}

/// Checkout context echoed into the trust signal event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutContext {
    #[serde(default)]
    pub merchant_context: Map<String, Value>,
    #[serde(default)]
    pub cart_summary: Map<String, Value>,
    #[serde(default)]
    pub rail_candidates: Option<Vec<RailCandidate>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSignalData {
    pub trace_id: String,
    pub trust_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub merchant_context: Map<String, Value>,
    pub cart_summary: Map<String, Value>,
    pub rail_candidates: Vec<RailCandidate>,
    pub scores: TrustSignalScores,
    pub device_reputation: f64,
    pub velocity: f64,
    pub ip_risk: f64,
    pub history_len: u64,
    pub rail_adjustments: Vec<RailWeightAdjustment>,
    pub original_weights: RailWeights,
    pub adjusted_weights: RailWeights,
    pub explanation: String,
    pub feature_contributions: FeatureBreakdown,
    pub model_type: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub fn trust_signal_payload(
    signal: &TrustSignalResult,
    context: &TrustContext,
    checkout: CheckoutContext,
) -> TrustSignalData {
    let score = &signal.trust_score_result;
    TrustSignalData {
        trace_id: signal.trace_id.clone(),
        trust_score: score.trust_score,
        risk_level: score.risk_level,
        confidence: score.confidence,
        merchant_context: checkout.merchant_context,
        cart_summary: checkout.cart_summary,
        rail_candidates: checkout
            .rail_candidates
            .unwrap_or_else(default_rail_candidates),
        scores: TrustSignalScores {
            trust_score: score.trust_score,
            risk_penalty: 1.0 - score.trust_score,
            confidence: score.confidence,
        },
        device_reputation: context.device_reputation,
        velocity: context.velocity,
        ip_risk: context.ip_risk,
        history_len: context.history_len,
        rail_adjustments: signal.rail_adjustments.clone(),
        original_weights: signal.metadata.original_weights.clone(),
        adjusted_weights: signal.adjusted_weights(),
        explanation: signal.explanation.clone(),
        feature_contributions: score.feature_contributions,
        model_type: score.model_type.clone(),
        generated_at: Utc::now(),
        expires_at: checkout.expires_at,
    }
}

pub fn trust_signal_event(
    signal: &TrustSignalResult,
    context: &TrustContext,
    checkout: CheckoutContext,
) -> CloudEvent<TrustSignalData> {
    let data = trust_signal_payload(signal, context, checkout);
    let event_id = format!("trust-signal-{}-{}", signal.trace_id, Utc::now().timestamp());
    let event = CloudEvent::new(
        TRUST_SIGNAL_TYPE,
        TRUST_SIGNAL_SOURCE,
        event_id,
        &signal.trace_id,
        data,
    );
    tracing::info!(
        event_id = %event.id,
        trace_id = %signal.trace_id,
        trust_score = signal.trust_score_result.trust_score,
        risk_level = %signal.trust_score_result.risk_level,
        rail_adjustments = signal.rail_adjustments.len(),
        "Trust signal event emitted"
    );
    event
}

fn check_unit_range(field: &str, value: f64) -> Result<(), EventValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EventValidationError::invalid(field, "expected a value in [0, 1]"))
    }
}

pub fn validate_trust_signal_event(
    event: &CloudEvent<TrustSignalData>,
) -> Result<(), EventValidationError> {
    if event.specversion != SPEC_VERSION {
        return Err(EventValidationError::invalid("specversion", "expected '1.0'"));
    }
    if event.event_type != TRUST_SIGNAL_TYPE {
        return Err(EventValidationError::invalid(
            "type",
            format!("expected '{TRUST_SIGNAL_TYPE}'"),
        ));
    }
    if event.source != TRUST_SIGNAL_SOURCE {
        return Err(EventValidationError::invalid(
            "source",
            format!("expected '{TRUST_SIGNAL_SOURCE}'"),
        ));
    }
    if event.id.is_empty() {
        return Err(EventValidationError::MissingField("id".to_string()));
    }
    if event.subject.is_empty() {
        return Err(EventValidationError::MissingField("subject".to_string()));
    }

    let data = &event.data;
    check_unit_range("trust_score", data.trust_score)?;
    check_unit_range("confidence", data.confidence)?;
    check_unit_range("device_reputation", data.device_reputation)?;
    check_unit_range("ip_risk", data.ip_risk)?;
    if data.velocity.is_nan() || data.velocity < 0.0 {
        return Err(EventValidationError::invalid("velocity", "expected a value >= 0"));
    }

    tracing::debug!(event_id = %event.id, "Trust signal event validated");
    Ok(())
}

/// JSON schema (draft-07) for `ocn.onyx.trust_signal.v1` events.
pub fn trust_signal_event_schema() -> Value {
    let unit = json!({"type": "number", "minimum": 0.0, "maximum": 1.0});
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "specversion": {"type": "string", "const": SPEC_VERSION},
            "type": {"type": "string", "const": TRUST_SIGNAL_TYPE},
            "source": {"type": "string", "pattern": "^onyx-trust-registry$"},
            "id": {"type": "string", "pattern": "^trust-signal-.*$"},
            "time": {"type": "string", "format": "date-time"},
            "datacontenttype": {"type": "string", "const": DATA_CONTENT_TYPE},
            "subject": {"type": "string"},
            "data": {
                "type": "object",
                "properties": {
                    "trace_id": {"type": "string"},
                    "trust_score": unit,
                    "risk_level": {"type": "string", "enum": ["low", "medium", "high"]},
                    "confidence": unit,
                    "device_reputation": unit,
                    "velocity": {"type": "number", "minimum": 0.0},
                    "ip_risk": unit,
                    "history_len": {"type": "integer", "minimum": 0},
                    "explanation": {"type": "string"},
                    "model_type": {"type": "string"},
                    "rail_adjustments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "rail_type": {"type": "string"},
                                "original_weight": {"type": "number"},
                                "adjusted_weight": {"type": "number"},
                                "adjustment_factor": {"type": "number"},
                                "reason": {"type": "string"}
                            }
                        }
                    }
                },
                "required": [
                    "trace_id", "trust_score", "risk_level", "confidence",
                    "device_reputation", "velocity", "ip_risk", "history_len",
                    "explanation", "model_type"
                ]
            }
        },
        "required": [
            "specversion", "type", "source", "id", "time",
            "datacontenttype", "subject", "data"
        ]
    })
}
