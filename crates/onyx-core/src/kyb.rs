use crate::normalize::normalize_entity;
use crate::types::{
    CheckName, CheckResult, EntityRecord, KybVerdict, VerdictMetadata, VerificationStatus,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Deterministic KYB rule configuration.
#[derive(Debug, Clone)]
pub struct KybPolicyConfig {
    pub verification_version: String,
    /// ISO-3166 alpha-2 codes accepted without failure.
    pub jurisdiction_whitelist: BTreeSet<String>,
    /// Entities younger than this are routed to review.
    pub minimum_entity_age_days: u64,
    /// Any sanctions flag containing one of these (case-insensitive) fails screening.
    pub sanctions_keywords: BTreeSet<String>,
    pub name_min_chars: usize,
    pub name_max_chars: usize,
    /// Lowercase substrings that route a business name to review.
    pub suspicious_name_patterns: Vec<String>,
    pub valid_registration_statuses: Vec<String>,
}

impl Default for KybPolicyConfig {
    fn default() -> Self {
        Self {
            verification_version: "1.0.0".to_string(),
            jurisdiction_whitelist: owned_set(&[
                "US", "CA", "GB", "AU", "DE", "FR", "NL", "SG", "CH", "LU", "IE", "DK", "SE",
                "NO", "FI",
            ]),
            minimum_entity_age_days: 365,
            sanctions_keywords: owned_set(&[
                "sanctions",
                "embargo",
                "terrorist",
                "money_laundering",
                "drug_trafficking",
                "corruption",
                "fraud",
                "tax_evasion",
                "regulatory_violation",
            ]),
            name_min_chars: 2,
            name_max_chars: 200,
            suspicious_name_patterns: owned_list(&["test", "demo", "example", "fake", "invalid"]),
            valid_registration_statuses: owned_list(&[
                "active",
                "registered",
                "incorporated",
                "good_standing",
            ]),
        }
    }
}

fn owned_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// Rule-based KYB verifier.
///
/// Every check is a pure function of the normalized record, so the verdict (apart from
/// `verified_at`) is fully determined by the payload.
#[derive(Debug, Clone, Default)]
pub struct KybVerifier {
    config: KybPolicyConfig,
}

impl KybVerifier {
    pub fn new(config: KybPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KybPolicyConfig {
        &self.config
    }

    /// Normalize a raw payload and verify it.
    pub fn verify(&self, payload: &Value) -> KybVerdict {
        self.verify_record(&normalize_entity(payload))
    }

    pub fn verify_record(&self, record: &EntityRecord) -> KybVerdict {
        self.verify_record_at(record, Utc::now())
    }

    pub fn verify_record_at(&self, record: &EntityRecord, verified_at: DateTime<Utc>) -> KybVerdict {
        let checks = self.run_checks(record);
        let (status, reason) = combine_checks(&checks);

        tracing::debug!(
            entity_id = %record.entity_id,
            status = %status,
            jurisdiction = %record.jurisdiction,
            "KYB verdict computed"
        );

        KybVerdict {
            status,
            reason,
            entity_id: record.entity_id.clone(),
            verified_at,
            metadata: VerdictMetadata {
                verification_version: self.config.verification_version.clone(),
                rules_applied: checks.len(),
                jurisdiction: record.jurisdiction.clone(),
                entity_age_days: record.entity_age_days,
            },
            checks,
        }
    }

    /// All five checks, in fixed order.
    pub fn run_checks(&self, record: &EntityRecord) -> Vec<CheckResult> {
        vec![
            self.check_jurisdiction(&record.jurisdiction),
            self.check_entity_age(record.entity_age_days),
            self.check_sanctions(&record.sanctions_flags),
            self.check_business_name(&record.business_name),
            self.check_registration_status(&record.registration_status),
        ]
    }

    pub fn check_jurisdiction(&self, jurisdiction: &str) -> CheckResult {
        let whitelisted = self.config.jurisdiction_whitelist.contains(jurisdiction);
        let status = if whitelisted {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Fail
        };

        check(
            CheckName::JurisdictionVerification,
            status,
            [
                ("jurisdiction", json!(jurisdiction)),
                ("whitelisted", json!(whitelisted)),
                (
                    "whitelist_countries",
                    json!(self.config.jurisdiction_whitelist),
                ),
            ],
            format!(
                "Jurisdiction {jurisdiction} is {}",
                if whitelisted { "whitelisted" } else { "not whitelisted" }
            ),
        )
    }

    pub fn check_entity_age(&self, entity_age_days: u64) -> CheckResult {
        let minimum = self.config.minimum_entity_age_days;
        let meets = entity_age_days >= minimum;
        let status = if meets {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Review
        };

        check(
            CheckName::EntityAgeVerification,
            status,
            [
                ("entity_age_days", json!(entity_age_days)),
                ("minimum_required_days", json!(minimum)),
                ("meets_requirement", json!(meets)),
            ],
            format!(
                "Entity age {entity_age_days} days {} minimum requirement of {minimum} days",
                if meets { "meets" } else { "does not meet" }
            ),
        )
    }

    pub fn check_sanctions(&self, sanctions_flags: &[String]) -> CheckResult {
        let detected = sanctions_flags.iter().any(|flag| {
            let flag = flag.to_lowercase();
            self.config
                .sanctions_keywords
                .iter()
                .any(|keyword| flag.contains(keyword.as_str()))
        });
        let status = if detected {
            VerificationStatus::Fail
        } else {
            VerificationStatus::Verified
        };

        check(
            CheckName::SanctionsScreening,
            status,
            [
                ("sanctions_flags", json!(sanctions_flags)),
                ("flags_checked", json!(sanctions_flags.len())),
                ("sanctions_detected", json!(detected)),
                ("keywords_checked", json!(self.config.sanctions_keywords)),
            ],
            format!(
                "Sanctions screening {} with {} flags checked",
                if detected { "failed" } else { "passed" },
                sanctions_flags.len()
            ),
        )
    }

    pub fn check_business_name(&self, business_name: &str) -> CheckResult {
        if business_name.is_empty() {
            return check(
                CheckName::BusinessNameValidation,
                VerificationStatus::Fail,
                [
                    ("business_name", json!(business_name)),
                    ("name_length", json!(0)),
                    ("has_content", json!(false)),
                ],
                "Business name is empty or missing".to_string(),
            );
        }

        let name_length = business_name.chars().count();
        let has_minimum_length = name_length >= self.config.name_min_chars;
        let has_maximum_length = name_length <= self.config.name_max_chars;
        let contains_letters = business_name.chars().any(char::is_alphabetic);
        let lowered = business_name.to_lowercase();
        let contains_suspicious = self
            .config
            .suspicious_name_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()));

        let (status, reason) = if !has_minimum_length || !has_maximum_length || !contains_letters
        {
            (
                VerificationStatus::Fail,
                "Business name does not meet format requirements",
            )
        } else if contains_suspicious {
            (
                VerificationStatus::Review,
                "Business name contains suspicious patterns requiring review",
            )
        } else {
            (VerificationStatus::Verified, "Business name validation passed")
        };

        check(
            CheckName::BusinessNameValidation,
            status,
            [
                ("business_name", json!(business_name)),
                ("name_length", json!(name_length)),
                ("has_minimum_length", json!(has_minimum_length)),
                ("has_maximum_length", json!(has_maximum_length)),
                ("contains_letters", json!(contains_letters)),
                ("contains_suspicious", json!(contains_suspicious)),
            ],
            reason.to_string(),
        )
    }

    pub fn check_registration_status(&self, registration_status: &str) -> CheckResult {
        let lowered = registration_status.to_lowercase();
        let is_valid = self
            .config
            .valid_registration_statuses
            .iter()
            .any(|valid| *valid == lowered);
        let status = if is_valid {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Review
        };

        check(
            CheckName::RegistrationStatusVerification,
            status,
            [
                ("registration_status", json!(registration_status)),
                (
                    "valid_statuses",
                    json!(self.config.valid_registration_statuses),
                ),
                ("is_valid", json!(is_valid)),
            ],
            format!(
                "Registration status '{registration_status}' is {}",
                if is_valid { "valid" } else { "invalid or requires review" }
            ),
        )
    }
}

fn check<const N: usize>(
    check_name: CheckName,
    status: VerificationStatus,
    details: [(&str, Value); N],
    reason: String,
) -> CheckResult {
    CheckResult {
        check_name,
        status,
        details: details
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<BTreeMap<_, _>>(),
        reason,
    }
}

/// Worst-status combination with a reason naming the checks at that status.
pub fn combine_checks(checks: &[CheckResult]) -> (VerificationStatus, String) {
    let status = checks
        .iter()
        .map(|check| check.status)
        .max()
        .unwrap_or(VerificationStatus::Verified);

    let names_at = |target: VerificationStatus| {
        checks
            .iter()
            .filter(|check| check.status == target)
            .map(|check| check.check_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let reason = match status {
        VerificationStatus::Fail => {
            format!("Verification failed due to: {}", names_at(status))
        }
        VerificationStatus::Review => {
            format!("Verification requires review due to: {}", names_at(status))
        }
        VerificationStatus::Verified => "All verification checks passed successfully".to_string(),
    };

    (status, reason)
}

/// Verify a raw payload with the default policy.
pub fn verify_kyb(payload: &Value) -> KybVerdict {
    KybVerifier::default().verify(payload)
}

impl KybVerdict {
    pub fn check(&self, name: CheckName) -> Option<&CheckResult> {
        self.checks.iter().find(|check| check.check_name == name)
    }

    /// Human-readable multi-line report.
    pub fn summary_text(&self) -> String {
        let checks: String = self
            .checks
            .iter()
            .map(|check| {
                format!(
                    "• {}: {} - {}\n",
                    check.check_name.title(),
                    check.status.as_str().to_uppercase(),
                    check.reason
                )
            })
            .collect();

        format!(
            "KYB Verification Result: {}\n\nReason: {}\n\nIndividual Checks:\n{checks}\n\
             Metadata:\n• Jurisdiction: {}\n• Entity Age: {} days\n• Rules Applied: {}\n",
            self.status.as_str().to_uppercase(),
            self.reason,
            self.metadata.jurisdiction,
            self.metadata.entity_age_days,
            self.metadata.rules_applied
        )
    }
}
