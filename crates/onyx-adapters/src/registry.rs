use onyx_core::ProviderAllowlist;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Providers trusted when no registry file is available.
pub const BUILTIN_PROVIDERS: [&str; 5] = [
    "trusted_bank_001",
    "verified_credit_union_002",
    "authorized_fintech_003",
    "certified_payment_processor_004",
    "licensed_lender_005",
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read trust registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed trust registry YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid provider entry: {0}")]
    InvalidEntry(String),
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    providers: Vec<ProviderEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProviderEntry {
    Id(String),
    Record { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_providers: usize,
    pub allowlist_size: usize,
}

/// Allowlist of credential providers, optionally backed by a YAML file.
///
/// Loading never fails: a missing file or a malformed one falls back to
/// [`BUILTIN_PROVIDERS`].
#[derive(Debug)]
pub struct TrustRegistry {
    config_path: Option<PathBuf>,
    providers: RwLock<BTreeSet<String>>,
}

impl TrustRegistry {
    pub fn load(config_path: Option<PathBuf>) -> Self {
        let providers = load_providers(config_path.as_deref());
        Self {
            config_path,
            providers: RwLock::new(providers),
        }
    }

    pub fn builtin() -> Self {
        Self::load(None)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn is_allowed(&self, provider_id: &str) -> bool {
        self.read().is_allowed(provider_id)
    }

    /// Provider ids in ascending order.
    pub fn list_providers(&self) -> Vec<String> {
        self.read().iter().cloned().collect()
    }

    /// Returns `false` for blank or already-present ids.
    pub fn add_provider(&self, provider_id: &str) -> bool {
        let provider_id = provider_id.trim();
        if provider_id.is_empty() {
            return false;
        }
        self.write().insert(provider_id.to_string())
    }

    /// Returns `false` when the id is not registered.
    pub fn remove_provider(&self, provider_id: &str) -> bool {
        self.write().remove(provider_id.trim())
    }

    /// Re-read the backing file, discarding runtime additions and removals.
    pub fn reload(&self) {
        let providers = load_providers(self.config_path.as_deref());
        *self.write() = providers;
    }

    pub fn stats(&self) -> RegistryStats {
        let size = self.read().len();
        RegistryStats {
            total_providers: size,
            allowlist_size: size,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<String>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<String>> {
        self.providers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProviderAllowlist for TrustRegistry {
    fn is_allowed(&self, provider_id: &str) -> bool {
        TrustRegistry::is_allowed(self, provider_id)
    }
}

fn builtin_providers() -> BTreeSet<String> {
    BUILTIN_PROVIDERS.iter().map(|id| id.to_string()).collect()
}

fn load_providers(config_path: Option<&Path>) -> BTreeSet<String> {
    let Some(path) = config_path.filter(|path| path.exists()) else {
        tracing::debug!("No trust registry file, using built-in allowlist");
        return builtin_providers();
    };

    match read_registry_file(path) {
        Ok(providers) => {
            tracing::info!(
                path = %path.display(),
                providers = providers.len(),
                "Trust registry loaded"
            );
            providers
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "Failed to load trust registry, falling back to built-in allowlist"
            );
            builtin_providers()
        }
    }
}

pub fn read_registry_file(path: &Path) -> Result<BTreeSet<String>, RegistryError> {
    let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_registry(&text)
}

/// Parse `{providers: [id | {id: ...}]}`.
pub fn parse_registry(text: &str) -> Result<BTreeSet<String>, RegistryError> {
    let file: RegistryFile = serde_yaml::from_str(text)?;
    file.providers
        .into_iter()
        .map(|entry| {
            let id = match entry {
                ProviderEntry::Id(id) | ProviderEntry::Record { id } => id,
            };
            let trimmed = id.trim();
            if trimmed.is_empty() {
                Err(RegistryError::InvalidEntry(format!("{id:?}")))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_registry(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("onyx-registry-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_uses_builtin_allowlist() {
        let registry = TrustRegistry::load(Some(PathBuf::from("/nonexistent/onyx/registry.yaml")));
        assert_eq!(registry.stats().total_providers, 5);
        assert!(registry.is_allowed("trusted_bank_001"));
        assert!(!registry.is_allowed("unknown_provider"));
    }

    #[test]
    fn yaml_accepts_plain_and_mapping_entries() {
        let path = temp_registry("providers:\n  - acme_bank\n  - id: beta_fintech\n");
        let registry = TrustRegistry::load(Some(path.clone()));
        assert_eq!(registry.list_providers(), vec!["acme_bank", "beta_fintech"]);
        assert!(!registry.is_allowed("trusted_bank_001"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn malformed_yaml_falls_back() {
        let path = temp_registry("providers: [1, [2]]\n");
        let registry = TrustRegistry::load(Some(path.clone()));
        assert!(registry.is_allowed("licensed_lender_005"));
        let _ = std::fs::remove_file(path);

        assert!(matches!(
            parse_registry("providers:\n  - id: '  '\n"),
            Err(RegistryError::InvalidEntry(_))
        ));
        assert!(parse_registry("just a string\n").is_err());
    }

    #[test]
    fn lookups_trim_and_respect_case() {
        let registry = TrustRegistry::builtin();
        assert!(registry.is_allowed("  trusted_bank_001\n"));
        assert!(!registry.is_allowed("Trusted_Bank_001"));
        assert!(!registry.is_allowed(""));
    }

    #[test]
    fn add_remove_and_reload() {
        let path = temp_registry("providers:\n  - acme_bank\n");
        let registry = TrustRegistry::load(Some(path.clone()));

        assert!(registry.add_provider(" new_provider "));
        assert!(!registry.add_provider("new_provider"));
        assert!(!registry.add_provider("   "));
        assert!(registry.is_allowed("new_provider"));

        assert!(registry.remove_provider("acme_bank"));
        assert!(!registry.remove_provider("acme_bank"));
        assert_eq!(registry.stats().allowlist_size, 1);

        registry.reload();
        assert_eq!(registry.list_providers(), vec!["acme_bank"]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn registry_is_usable_as_allowlist_trait_object() {
        let registry = TrustRegistry::builtin();
        let allowlist: &dyn ProviderAllowlist = &registry;
        assert!(allowlist.is_allowed("authorized_fintech_003"));
    }
}
