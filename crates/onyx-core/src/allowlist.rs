use std::collections::{BTreeSet, HashSet};

/// Read-only provider allowlist lookup.
pub trait ProviderAllowlist: Send + Sync {
    fn is_allowed(&self, provider_id: &str) -> bool;
}

impl ProviderAllowlist for BTreeSet<String> {
    fn is_allowed(&self, provider_id: &str) -> bool {
        let provider_id = provider_id.trim();
        !provider_id.is_empty() && self.contains(provider_id)
    }
}

impl ProviderAllowlist for HashSet<String> {
    fn is_allowed(&self, provider_id: &str) -> bool {
        let provider_id = provider_id.trim();
        !provider_id.is_empty() && self.contains(provider_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_trims_and_is_case_sensitive() {
        let allowlist: BTreeSet<String> = ["trusted_bank_001".to_string()].into_iter().collect();
        assert!(allowlist.is_allowed("  trusted_bank_001 "));
        assert!(!allowlist.is_allowed("TRUSTED_BANK_001"));
        assert!(!allowlist.is_allowed("   "));
    }
}
