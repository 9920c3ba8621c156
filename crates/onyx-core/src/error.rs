use thiserror::Error;

/// Onyx core errors.
///
/// The decision pipelines themselves are total over normalized input; these errors are
/// raised only by the validation helpers callers run before handing data to the core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OnyxError {
    #[error("Invalid trust context: {0}")]
    InvalidContext(String),
    #[error("Invalid rail weights: {0}")]
    InvalidWeights(String),
}

impl OnyxError {
    pub fn out_of_range(field: &str, value: f64, bounds: &str) -> Self {
        Self::InvalidContext(format!("{field} must be {bounds}, got {value}"))
    }
}
