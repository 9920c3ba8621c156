#![deny(unsafe_code)]

pub mod events;
pub mod mcp;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use events::{
    kyb_verified_event, kyb_verified_payload, trust_signal_event, CheckoutContext, CloudEvent,
    KybEventData, TrustSignalData,
};
use mcp::{McpRequest, McpResponse};
use onyx_adapters::{
    DeploymentNarrativeExplainer, NarrativeExplainerConfig, RegistryStats, TrustRegistry,
};
use onyx_core::{
    normalize_entity, KybPolicyConfig, KybVerdict, KybVerifier, OnyxError, RailWeights,
    TrustContext, TrustModelConfig, TrustScoringModel, TrustSignalEngine, TrustSignalResult,
    DEFAULT_SEED,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// YAML allowlist; missing or malformed files fall back to the built-in providers.
    pub trust_registry_config: Option<PathBuf>,
    /// Seed recorded on trust signals whose request carries none.
    pub deterministic_seed: u64,
    pub narrative: NarrativeExplainerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            trust_registry_config: Some(PathBuf::from("config/trust_registry.yaml")),
            deterministic_seed: DEFAULT_SEED,
            narrative: NarrativeExplainerConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub kyb: Arc<KybVerifier>,
    pub trust: Arc<TrustSignalEngine>,
    pub registry: Arc<TrustRegistry>,
    pub deterministic_seed: u64,
}

impl ServiceState {
    pub fn bootstrap(config: ServiceConfig) -> Self {
        let ServiceConfig {
            trust_registry_config,
            deterministic_seed,
            narrative,
        } = config;

        let explainer = DeploymentNarrativeExplainer::new(narrative);
        let trust = TrustSignalEngine::new(TrustScoringModel::new(TrustModelConfig::default()))
            .with_explainer(Arc::new(explainer));

        Self {
            kyb: Arc::new(KybVerifier::new(KybPolicyConfig::default())),
            trust: Arc::new(trust),
            registry: Arc::new(TrustRegistry::load(trust_registry_config)),
            deterministic_seed,
        }
    }

    /// Verify a raw KYB payload and wrap the verdict in a KYB verified event.
    pub fn verify_kyb(&self, trace_id: &str, payload: &Value) -> KybResponse {
        let entity = normalize_entity(payload);
        let verdict = self.kyb.verify_record(&entity);
        let event = kyb_verified_event(trace_id, kyb_verified_payload(&verdict, &entity));
        KybResponse { verdict, event }
    }

    pub fn trust_signal(
        &self,
        request: TrustSignalRequest,
    ) -> Result<(TrustSignalResult, CloudEvent<TrustSignalData>), ApiError> {
        let TrustSignalRequest {
            trace_id,
            context,
            original_weights,
            deterministic_seed,
            checkout,
        } = request;
        context.validate()?;
        if let Some(weights) = &original_weights {
            weights.validate()?;
        }

        let trace_id = trace_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let seed = deterministic_seed.unwrap_or(self.deterministic_seed);
        let signal = self.trust.signal(&trace_id, &context, original_weights, seed);
        let event = trust_signal_event(&signal, &context, checkout);
        Ok((signal, event))
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/kyb/verify", post(verify_kyb))
        .route("/trust/signal", post(trust_signal))
        .route("/trust/providers", get(list_providers))
        .route("/trust/allowed/:provider_id", get(provider_allowed))
        .route("/mcp/invoke", post(mcp_invoke))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    InvalidInput(#[from] OnyxError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Service(ServiceError::Encode(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Http { status, .. } => *status,
            ApiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    ok: bool,
    repo: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        repo: "onyx",
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KybResponse {
    pub verdict: KybVerdict,
    pub event: CloudEvent<KybEventData>,
}

async fn verify_kyb(
    State(state): State<ServiceState>,
    Json(payload): Json<Value>,
) -> Result<Json<KybResponse>, ApiError> {
    if !payload.is_object() {
        return Err(ApiError::bad_request("KYB payload must be a JSON object"));
    }
    let trace_id = payload
        .get("trace_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    Ok(Json(state.verify_kyb(&trace_id, &payload)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustSignalRequest {
    #[serde(default)]
    pub trace_id: Option<String>,
    pub context: TrustContext,
    #[serde(default)]
    pub original_weights: Option<RailWeights>,
    #[serde(default)]
    pub deterministic_seed: Option<u64>,
    #[serde(flatten)]
    pub checkout: CheckoutContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustSignalResponse {
    pub signal: TrustSignalResult,
    pub event: CloudEvent<TrustSignalData>,
}

async fn trust_signal(
    State(state): State<ServiceState>,
    Json(request): Json<TrustSignalRequest>,
) -> Result<Json<TrustSignalResponse>, ApiError> {
    let (signal, event) = state.trust_signal(request)?;
    Ok(Json(TrustSignalResponse { signal, event }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
    pub count: usize,
    pub stats: RegistryStats,
}

async fn list_providers(State(state): State<ServiceState>) -> Json<ProvidersResponse> {
    let providers = state.registry.list_providers();
    Json(ProvidersResponse {
        count: providers.len(),
        providers,
        stats: state.registry.stats(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLookup {
    pub provider_id: String,
    pub allowed: bool,
    pub reason: String,
}

pub(crate) fn provider_lookup(state: &ServiceState, provider_id: &str) -> ProviderLookup {
    let allowed = state.registry.is_allowed(provider_id);
    let reason = if allowed {
        "Provider is in trust registry"
    } else {
        "Provider not found in trust registry"
    };
    ProviderLookup {
        provider_id: provider_id.to_string(),
        allowed,
        reason: reason.to_string(),
    }
}

async fn provider_allowed(
    Path(provider_id): Path<String>,
    State(state): State<ServiceState>,
) -> Json<ProviderLookup> {
    Json(provider_lookup(&state, &provider_id))
}

async fn mcp_invoke(
    State(state): State<ServiceState>,
    Json(request): Json<McpRequest>,
) -> Result<Json<McpResponse>, ApiError> {
    Ok(Json(mcp::dispatch(&state, request)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(ServiceState::bootstrap(ServiceConfig {
            trust_registry_config: None,
            ..ServiceConfig::default()
        }))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_exactly_ok_and_repo() {
        let (status, body) = send(app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "repo": "onyx"}));
    }

    #[tokio::test]
    async fn providers_endpoint_lists_builtin_registry() {
        let (status, body) = send(app(), "GET", "/trust/providers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(5));
        assert_eq!(body["stats"]["total_providers"], json!(5));
        assert_eq!(body["providers"][0], json!("authorized_fintech_003"));
    }

    #[tokio::test]
    async fn allowed_endpoint_explains_lookup() {
        let (_, body) = send(app(), "GET", "/trust/allowed/trusted_bank_001", None).await;
        assert_eq!(
            body,
            json!({
                "provider_id": "trusted_bank_001",
                "allowed": true,
                "reason": "Provider is in trust registry"
            })
        );

        let (_, body) = send(app(), "GET", "/trust/allowed/TRUSTED_BANK_001", None).await;
        assert_eq!(body["allowed"], json!(false));
        assert_eq!(body["reason"], json!("Provider not found in trust registry"));
    }

    #[tokio::test]
    async fn kyb_endpoint_returns_verdict_and_event() {
        let payload = json!({
            "trace_id": "trace-kyb-1",
            "entity_id": "ent-100",
            "business_name": "Lumen Robotics GmbH",
            "jurisdiction": "de",
            "entity_age_days": 800,
            "registration_status": "incorporated",
            "sanctions_flags": []
        });
        let (status, body) = send(app(), "POST", "/kyb/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verdict"]["status"], json!("verified"));
        assert_eq!(body["event"]["subject"], json!("trace-kyb-1"));
        assert_eq!(body["event"]["data"]["entity_info"]["jurisdiction"], json!("DE"));
        assert_eq!(events::validate_kyb_event(&body["event"]), Ok(()));
    }

    #[tokio::test]
    async fn trust_signal_endpoint_wraps_signal_in_event() {
        let request = json!({
            "trace_id": "trace-ts-1",
            "context": {
                "device_reputation": 0.2,
                "velocity": 15.0,
                "ip_risk": 0.8,
                "history_len": 2
            },
            "original_weights": {"ACH": 0.5, "debit": 0.3, "credit": 0.2},
            "merchant_context": {"merchant_id": "m-9"}
        });
        let (status, body) = send(app(), "POST", "/trust/signal", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["signal"]["trust_score_result"]["risk_level"], json!("high"));
        assert_eq!(body["signal"]["metadata"]["deterministic_seed"], json!(42));
        assert_eq!(body["signal"]["rail_adjustments"][0]["rail_type"], json!("ACH"));
        assert_eq!(body["event"]["type"], json!("ocn.onyx.trust_signal.v1"));
        assert_eq!(body["event"]["data"]["merchant_context"]["merchant_id"], json!("m-9"));
        assert!(body["signal"].get("narrative").is_none());
    }

    #[tokio::test]
    async fn invalid_trust_context_is_unprocessable() {
        let request = json!({
            "context": {
                "device_reputation": 1.7,
                "velocity": 1.0,
                "ip_risk": 0.1,
                "history_len": 3
            }
        });
        let (status, body) = send(app(), "POST", "/trust/signal", Some(request)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("device_reputation"));
    }

    #[tokio::test]
    async fn negative_rail_weight_is_unprocessable() {
        let request = json!({
            "context": {
                "device_reputation": 0.2,
                "velocity": 15.0,
                "ip_risk": 0.8,
                "history_len": 2
            },
            "original_weights": {"ACH": 1.0, "credit": -0.3}
        });
        let (status, body) = send(app(), "POST", "/trust/signal", Some(request.clone())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body,
            json!({"error": "Invalid rail weights: credit must be >= 0, got -0.3"})
        );

        let (status, _) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "getTrustSignal", "args": request})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn mcp_status_and_provider_verbs() {
        let (status, body) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "getStatus", "args": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "data": {"ok": true, "agent": "onyx"}, "error": null})
        );

        let (_, body) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "isAllowedProvider", "args": {"provider_id": "licensed_lender_005"}})),
        )
        .await;
        assert_eq!(body["data"]["allowed"], json!(true));
        assert_eq!(body["data"]["provider_id"], json!("licensed_lender_005"));
    }

    #[tokio::test]
    async fn mcp_rejects_missing_provider_and_unknown_verb() {
        let (status, body) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "isAllowedProvider", "args": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "provider_id parameter is required"}));

        let (status, body) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "launchRocket"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Unknown verb: launchRocket"}));
    }

    #[tokio::test]
    async fn mcp_runs_kyb_and_trust_verbs() {
        let (status, body) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "verifyKYB", "args": {
                "entity_id": "ent-5",
                "business_name": "Fjord Analytics AS",
                "jurisdiction": "NO",
                "entity_age_days": 30,
                "registration_status": "active"
            }})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], json!("review"));

        let (status, body) = send(
            app(),
            "POST",
            "/mcp/invoke",
            Some(json!({"verb": "getTrustSignal", "args": {
                "trace_id": "mcp-trace",
                "context": {
                    "device_reputation": 0.9,
                    "velocity": 1.0,
                    "ip_risk": 0.1,
                    "history_len": 100
                },
                "deterministic_seed": 7
            }})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["trace_id"], json!("mcp-trace"));
        assert_eq!(body["data"]["trust_score_result"]["risk_level"], json!("low"));
        assert_eq!(body["data"]["metadata"]["deterministic_seed"], json!(7));
    }

    #[tokio::test]
    async fn configured_explainer_adds_narrative() {
        let narrative = NarrativeExplainerConfig {
            endpoint: Some("https://onyx.example.net".to_string()),
            api_key: Some("secret".to_string()),
            ..NarrativeExplainerConfig::default()
        };
        let state = ServiceState::bootstrap(ServiceConfig {
            trust_registry_config: None,
            narrative,
            ..ServiceConfig::default()
        });
        let request: TrustSignalRequest = serde_json::from_value(json!({
            "context": {
                "device_reputation": 0.9,
                "velocity": 1.0,
                "ip_risk": 0.1,
                "history_len": 100
            }
        }))
        .unwrap();
        let (signal, event) = state.trust_signal(request).unwrap();
        let narrative = signal.narrative.unwrap();
        assert_eq!(narrative.model_used, "azure-openai-onyx-llm");
        assert_eq!(event.subject, signal.trace_id);
    }
}
