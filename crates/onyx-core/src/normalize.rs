use crate::types::EntityRecord;
use serde_json::Value;

/// Coerce a loosely-typed KYB payload into an [`EntityRecord`].
///
/// Never fails: missing or null fields fall back to defaults and unparseable ages become 0.
/// Normalizing the serialized output of a previous normalization yields the same record.
pub fn normalize_entity(payload: &Value) -> EntityRecord {
    let field = |name: &str| payload.get(name);

    EntityRecord {
        entity_id: coerce_text(field("entity_id"), ""),
        business_name: coerce_text(field("business_name"), "").trim().to_string(),
        jurisdiction: coerce_text(field("jurisdiction"), "").to_uppercase(),
        entity_age_days: coerce_age(field("entity_age_days")),
        registration_status: coerce_text(field("registration_status"), "unknown").to_lowercase(),
        sanctions_flags: coerce_flags(field("sanctions_flags")),
        business_type: coerce_text(field("business_type"), "unknown"),
        registration_number: coerce_text(field("registration_number"), ""),
    }
}

fn coerce_text(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
    }
}

fn coerce_age(value: Option<&Value>) -> u64 {
    let days = match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .map(|days| days as f64)
            .or_else(|| number.as_u64().map(|days| days as f64))
            .or_else(|| number.as_f64()),
        Some(Value::String(text)) => {
            let text = text.trim();
            text.parse::<i64>()
                .map(|days| days as f64)
                .ok()
                .or_else(|| text.parse::<f64>().ok())
        }
        _ => None,
    };

    match days {
        // `as` saturates and truncates toward zero.
        Some(days) if days.is_finite() && days > 0.0 => days.trunc() as u64,
        _ => 0,
    }
}

fn coerce_flags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(flags)) => flags
            .iter()
            .map(|flag| match flag {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(flag)) => vec![flag.clone()],
        _ => Vec::new(),
    }
}
