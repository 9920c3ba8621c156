#![deny(unsafe_code)]
//! Deterministic decision core for Onyx: KYB verification and checkout trust signals.
//!
//! Everything here is synchronous and free of I/O. Registry storage, narrative
//! generation and event envelopes plug in through [`ProviderAllowlist`] and
//! [`Explainer`] or live in the service crate.

pub mod allowlist;
pub mod error;
pub mod explain;
pub mod kyb;
pub mod model;
pub mod normalize;
pub mod rails;
pub mod signal;
pub mod types;

pub use allowlist::ProviderAllowlist;
pub use error::OnyxError;
pub use explain::{generate_explanation, key_factors, ExplanationRequest, Explainer};
pub use kyb::{combine_checks, verify_kyb, KybPolicyConfig, KybVerifier};
pub use model::{context_seed, TrustModelConfig, TrustScoringModel};
pub use normalize::normalize_entity;
pub use rails::{adjustment_factor, calculate_rail_adjustments};
pub use signal::{score_trust, TrustSignalEngine, DEFAULT_SEED, MODEL_VERSION};
pub use types::*;
