//! Generic `{verb, args}` envelope over the Onyx operations.

use crate::{provider_lookup, ApiError, ServiceState, TrustSignalRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct McpRequest {
    pub verb: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl McpResponse {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

pub fn dispatch(state: &ServiceState, request: McpRequest) -> Result<McpResponse, ApiError> {
    tracing::debug!(verb = %request.verb, "MCP invoke");

    match request.verb.as_str() {
        "getStatus" => Ok(McpResponse::ok(json!({"ok": true, "agent": "onyx"}))),
        "isAllowedProvider" => {
            let provider_id = request
                .args
                .get("provider_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ApiError::bad_request("provider_id parameter is required"))?;
            let lookup = provider_lookup(state, provider_id);
            Ok(McpResponse::ok(serde_json::to_value(lookup)?))
        }
        "verifyKYB" => {
            let payload = Value::Object(request.args);
            let verdict = state.kyb.verify(&payload);
            Ok(McpResponse::ok(serde_json::to_value(verdict)?))
        }
        "getTrustSignal" => {
            let signal_request: TrustSignalRequest =
                serde_json::from_value(Value::Object(request.args))
                    .map_err(|err| ApiError::bad_request(format!("invalid args: {err}")))?;
            let (signal, _) = state.trust_signal(signal_request)?;
            Ok(McpResponse::ok(serde_json::to_value(signal)?))
        }
        other => Err(ApiError::bad_request(format!("Unknown verb: {other}"))),
    }
}
