//! Role-based quota scaling.

use std::collections::{BTreeMap, HashMap};

use super::tier::{request_cost, TierOutcome};
use super::RateLimitOutcome;

/// Multiplier for absent or unrecognised roles.
pub const DEFAULT_MULTIPLIER: f64 = 0.25;

const BUILTIN_MULTIPLIERS: [(&str, f64); 5] = [
    ("ADMIN", 5.0),
    ("MANAGER", 3.0),
    ("OPERATOR", 2.0),
    ("USER", 1.0),
    ("VIEWER", 0.5),
];

/// Maps a caller role to a quota multiplier.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    multipliers: HashMap<String, f64>,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            multipliers: BUILTIN_MULTIPLIERS
                .iter()
                .map(|(role, m)| (role.to_string(), *m))
                .collect(),
        }
    }
}

impl RolePolicy {
    /// Built-in table with configured overrides applied on top.
    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Self {
        let mut policy = Self::default();
        for (role, multiplier) in overrides {
            policy
                .multipliers
                .insert(role.to_ascii_uppercase(), *multiplier);
        }
        policy
    }

    /// Case-insensitive lookup.
    pub fn multiplier(&self, role: Option<&str>) -> f64 {
        role.and_then(|r| self.multipliers.get(&r.trim().to_ascii_uppercase()))
            .copied()
            .unwrap_or(DEFAULT_MULTIPLIER)
    }

    /// Scale a raw tier outcome for a caller with multiplier `m`:
    /// `limit = floor(raw_limit × m)`, `remaining = max(0, floor(raw_remaining × m))`.
    ///
    /// The remaining side works on unused units so fractional raw remainders
    /// are kept: it is the number of further requests this caller can make.
    pub fn scale(outcome: TierOutcome, multiplier: f64) -> RateLimitOutcome {
        RateLimitOutcome {
            success: outcome.success,
            limit: scale_count(outcome.limit, multiplier),
            remaining: outcome.unused_units / request_cost(multiplier),
            reset_at_ms: outcome.reset_at_ms,
            restricted_by: None,
        }
    }
}

/// `max(0, floor(raw × m))`.
pub fn scale_count(raw: u64, multiplier: f64) -> u64 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return 0;
    }
    let scaled = (raw as f64 * multiplier).floor();
    if scaled <= 0.0 {
        0
    } else {
        scaled as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::security::rate_limit::tier::UNITS_PER_REQUEST;

    fn outcome(limit: u64, remaining: u64) -> TierOutcome {
        TierOutcome {
            success: true,
            limit,
            unused_units: remaining * UNITS_PER_REQUEST,
            reset_at_ms: 0,
        }
    }

    #[test]
    fn test_builtin_table() {
        let policy = RolePolicy::default();
        assert_eq!(policy.multiplier(Some("ADMIN")), 5.0);
        assert_eq!(policy.multiplier(Some("MANAGER")), 3.0);
        assert_eq!(policy.multiplier(Some("OPERATOR")), 2.0);
        assert_eq!(policy.multiplier(Some("USER")), 1.0);
        assert_eq!(policy.multiplier(Some("VIEWER")), 0.5);
    }

    #[test]
    fn test_case_insensitive_and_default() {
        let policy = RolePolicy::default();
        assert_eq!(policy.multiplier(Some("admin")), 5.0);
        assert_eq!(policy.multiplier(Some("Viewer")), 0.5);
        assert_eq!(policy.multiplier(Some("superuser")), DEFAULT_MULTIPLIER);
        assert_eq!(policy.multiplier(Some("")), DEFAULT_MULTIPLIER);
        assert_eq!(policy.multiplier(None), DEFAULT_MULTIPLIER);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("auditor".to_string(), 1.5);
        overrides.insert("Admin".to_string(), 10.0);
        let policy = RolePolicy::with_overrides(&overrides);
        assert_eq!(policy.multiplier(Some("AUDITOR")), 1.5);
        assert_eq!(policy.multiplier(Some("admin")), 10.0);
        assert_eq!(policy.multiplier(Some("user")), 1.0);
    }

    #[test]
    fn test_scale_floors() {
        let scaled = RolePolicy::scale(outcome(100, 7), 0.25);
        assert_eq!(scaled.limit, 25);
        assert_eq!(scaled.remaining, 1);

        let scaled = RolePolicy::scale(outcome(3, 1), 0.5);
        assert_eq!(scaled.limit, 1);
        assert_eq!(scaled.remaining, 0);
    }

    #[test]
    fn test_scaled_remaining_never_negative() {
        for step in 0..=50 {
            let m = step as f64 / 10.0;
            for raw in [0u64, 1, 2, 3, 7, 99, 1_000] {
                let scaled = RolePolicy::scale(outcome(raw, raw), m);
                assert!(scaled.remaining as f64 <= raw as f64 * m + 1e-9);
                assert!(scale_count(raw, m) as f64 <= raw as f64 * m + 1e-9);
            }
            let partial = TierOutcome {
                success: true,
                limit: 3,
                unused_units: UNITS_PER_REQUEST / 3,
                reset_at_ms: 0,
            };
            assert!(RolePolicy::scale(partial, m).remaining <= 1);
        }
        assert_eq!(scale_count(5, f64::NAN), 0);
        assert_eq!(scale_count(5, -1.0), 0);
    }
}
