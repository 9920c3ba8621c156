//! Pluggable collaborators for the Onyx core: the provider trust registry and the
//! narrative explainer.

#![deny(unsafe_code)]

pub mod narrative;
pub mod registry;

pub use narrative::{DeploymentNarrativeExplainer, ExplainerStatus, NarrativeExplainerConfig};
pub use registry::{RegistryError, RegistryStats, TrustRegistry, BUILTIN_PROVIDERS};
