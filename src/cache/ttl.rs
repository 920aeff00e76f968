//! TTL policy: operation category → time-to-live.
//!
//! Durations follow data volatility in the upstream governance system:
//! type catalogs barely move, pending approvals churn constantly, and
//! mutations are never cached at all. `Bypass` is a sentinel, not a zero
//! TTL — the facade must skip the store entirely for such categories.

use std::time::Duration;

use crate::config::CacheSettings;

/// Categories that must never be cached, regardless of configuration.
const NEVER_CACHE: &[&str] = &[
    "create-access-request",
    "make-approval-decision",
    "tokens",
    "oauth",
];

/// Builtin volatility table, matched by substring.
const VOLATILITY: &[(&str, u64)] = &[
    // Very static catalogs.
    ("resource-types", 86_400),
    ("systems", 86_400),
    ("compliance-config", 86_400),
    // Relatively static.
    ("identities", 3_600),
    ("identity-by-email", 3_600),
    ("identity-by-uid", 3_600),
    ("resources", 3_600),
    ("roles", 3_600),
    ("contexts", 3_600),
    // Moderately dynamic.
    ("calculated-assignments", 900),
    ("access-requests", 900),
    // Dynamic, minimal caching.
    ("pending-approvals", 300),
    ("approval-details", 300),
];

/// Cacheability of one operation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Cache(Duration),
    Bypass,
}

/// Immutable category → TTL mapping, built once at startup.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default_ttl: Duration,
    overrides: Vec<(String, u64)>,
}

impl TtlPolicy {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let mut overrides: Vec<(String, u64)> = settings
            .ttl_overrides
            .iter()
            .map(|(pattern, secs)| (normalize(pattern), *secs))
            .collect();
        // Deterministic match order for overlapping patterns.
        overrides.sort();

        Self {
            default_ttl: Duration::from_secs(settings.default_ttl_secs),
            overrides,
        }
    }

    /// Resolve the policy for a category.
    ///
    /// Configured overrides win over the builtin table; the bypass list
    /// wins over everything. Unrecognized categories get the default TTL —
    /// an unknown read query is safe to cache, only mutations are not, and
    /// those are matched explicitly.
    pub fn policy_for(&self, category: &str) -> CachePolicy {
        let category = normalize(category);

        if NEVER_CACHE.iter().any(|pattern| category.contains(pattern)) {
            return CachePolicy::Bypass;
        }

        for (pattern, secs) in &self.overrides {
            if category.contains(pattern.as_str()) {
                return if *secs == 0 {
                    CachePolicy::Bypass
                } else {
                    CachePolicy::Cache(Duration::from_secs(*secs))
                };
            }
        }

        for (pattern, secs) in VOLATILITY {
            if category.contains(pattern) {
                return CachePolicy::Cache(Duration::from_secs(*secs));
            }
        }

        CachePolicy::Cache(self.default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

/// Category names arrive in both kebab and snake case; match on one form.
fn normalize(category: &str) -> String {
    category.to_ascii_lowercase().replace('_', "-")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn policy_with(overrides: &[(&str, u64)]) -> TtlPolicy {
        let settings = CacheSettings {
            ttl_overrides: overrides
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>(),
            ..CacheSettings::default()
        };
        TtlPolicy::from_settings(&settings)
    }

    #[test]
    fn builtin_volatility_tiers() {
        let policy = policy_with(&[]);
        assert_eq!(
            policy.policy_for("resource-types"),
            CachePolicy::Cache(Duration::from_secs(86_400))
        );
        assert_eq!(
            policy.policy_for("list-identities"),
            CachePolicy::Cache(Duration::from_secs(3_600))
        );
        assert_eq!(
            policy.policy_for("get-calculated-assignments"),
            CachePolicy::Cache(Duration::from_secs(900))
        );
        assert_eq!(
            policy.policy_for("pending-approvals"),
            CachePolicy::Cache(Duration::from_secs(300))
        );
    }

    #[test]
    fn mutations_are_never_cached() {
        let policy = policy_with(&[]);
        assert_eq!(policy.policy_for("create-access-request"), CachePolicy::Bypass);
        assert_eq!(policy.policy_for("make-approval-decision"), CachePolicy::Bypass);
        assert_eq!(policy.policy_for("oauth"), CachePolicy::Bypass);
    }

    #[test]
    fn bypass_wins_over_overrides() {
        let policy = policy_with(&[("create-access-request", 600)]);
        assert_eq!(policy.policy_for("create-access-request"), CachePolicy::Bypass);
    }

    #[test]
    fn override_wins_over_builtin() {
        let policy = policy_with(&[("pending-approvals", 60)]);
        assert_eq!(
            policy.policy_for("pending-approvals"),
            CachePolicy::Cache(Duration::from_secs(60))
        );
    }

    #[test]
    fn zero_override_means_bypass() {
        let policy = policy_with(&[("contexts", 0)]);
        assert_eq!(policy.policy_for("get-identity-contexts"), CachePolicy::Bypass);
    }

    #[test]
    fn unknown_category_gets_default() {
        let policy = policy_with(&[]);
        assert_eq!(
            policy.policy_for("some-new-query"),
            CachePolicy::Cache(Duration::from_secs(3_600))
        );
    }

    #[test]
    fn matching_is_case_and_separator_insensitive() {
        let policy = policy_with(&[]);
        assert_eq!(
            policy.policy_for("Pending_Approvals"),
            CachePolicy::Cache(Duration::from_secs(300))
        );
        assert_eq!(policy.policy_for("Create_Access_Request"), CachePolicy::Bypass);
    }
}
