//! Composite evaluation across several tiers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::warn;

use crate::config::schema::{OutageConfig, RouteTiers};
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::client_ip::{ClientIdentity, RateLimitKey};
use crate::security::session::VerifiedToken;

use super::role::RolePolicy;
use super::store::{CounterStore, StoreError};
use super::tier::RateLimitTier;
use super::{Clock, RateLimitOutcome};

/// Runs a request against a named set of tiers.
pub struct CompositeEvaluator {
    tiers: HashMap<String, RateLimitTier>,
    route_tiers: Vec<RouteTiers>,
    default_tiers: Vec<String>,
    roles: RolePolicy,
    outage: OutageConfig,
    clock: Arc<dyn Clock>,
}

impl CompositeEvaluator {
    /// Build every configured tier over one shared store.
    pub fn from_config(
        config: &RateLimitConfig,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timeout = Duration::from_millis(config.store_timeout_ms);
        let tiers = config
            .tiers
            .iter()
            .map(|(name, tier)| {
                let limiter = RateLimitTier::new(
                    name.clone(),
                    tier,
                    config.key_prefix.clone(),
                    timeout,
                    store.clone(),
                    clock.clone(),
                );
                (name.clone(), limiter)
            })
            .collect();

        Self {
            tiers,
            route_tiers: config.route_tiers.clone(),
            default_tiers: config.default_tiers.clone(),
            roles: RolePolicy::with_overrides(&config.role_multipliers),
            outage: config.outage.clone(),
            clock,
        }
    }

    /// Tiers enforced on an API path, first matching prefix wins.
    pub fn tiers_for(&self, path: &str) -> &[String] {
        self.route_tiers
            .iter()
            .find(|r| path.starts_with(&r.prefix))
            .map(|r| r.tiers.as_slice())
            .unwrap_or(&self.default_tiers)
    }

    /// Check every named tier concurrently and aggregate.
    pub async fn evaluate(
        &self,
        identity: &ClientIdentity,
        token: Option<&VerifiedToken>,
        tier_names: &[String],
    ) -> RateLimitOutcome {
        let user_id = token.map(|t| t.subject.as_str());
        let multiplier = self.roles.multiplier(token.and_then(|t| t.role.as_deref()));

        let checks = tier_names.iter().filter_map(|name| {
            let Some(tier) = self.tiers.get(name) else {
                warn!(tier = %name, "Unknown rate limit tier requested; skipping");
                return None;
            };
            let key = RateLimitKey::derive(user_id, identity, tier.key_mode());
            Some(async move {
                let result = tier
                    .check(&key, multiplier)
                    .await
                    .map(|raw| RolePolicy::scale(raw, multiplier));
                (tier.name().to_string(), result)
            })
        });

        let results = join_all(checks).await;
        aggregate(results, &self.outage, self.clock.now_ms())
    }
}

/// Combine per-tier results in evaluation order.
///
/// Any failing tier makes the whole outcome fail, attributed to the first
/// one; otherwise the tier with the least remaining quota is reported.
/// Tiers whose store errored are skipped; if none answered, the
/// conservative outage outcome applies.
pub fn aggregate(
    results: Vec<(String, Result<RateLimitOutcome, StoreError>)>,
    outage: &OutageConfig,
    now_ms: i64,
) -> RateLimitOutcome {
    let mut answered = Vec::with_capacity(results.len());
    for (name, result) in results {
        match result {
            Ok(outcome) => answered.push((name, outcome)),
            Err(e) => {
                warn!(tier = %name, error = %e, "Rate limit store unavailable; failing open for tier");
                metrics::record_store_error(&name);
            }
        }
    }

    if let Some((name, failed)) = answered.iter().find(|(_, o)| !o.success) {
        return RateLimitOutcome {
            restricted_by: Some(name.clone()),
            ..failed.clone()
        };
    }

    match answered.into_iter().min_by_key(|(_, o)| o.remaining) {
        Some((_, tightest)) => RateLimitOutcome {
            restricted_by: None,
            ..tightest
        },
        None => RateLimitOutcome {
            success: true,
            limit: outage.limit,
            remaining: outage.remaining,
            reset_at_ms: i64::try_from(outage.reset_secs)
                .unwrap_or(i64::MAX)
                .saturating_mul(1000)
                .saturating_add(now_ms),
            restricted_by: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TierConfig;
    use crate::config::KeyMode;
    use crate::security::rate_limit::{InMemoryStore, ManualClock};
    use crate::security::rate_limit::store::{WindowHit, WindowRequest};
    use async_trait::async_trait;

    fn ok(success: bool, limit: u64, remaining: u64) -> Result<RateLimitOutcome, StoreError> {
        Ok(RateLimitOutcome {
            success,
            limit,
            remaining,
            reset_at_ms: 5_000,
            restricted_by: None,
        })
    }

    fn down() -> Result<RateLimitOutcome, StoreError> {
        Err(StoreError::Timeout(Duration::from_millis(5)))
    }

    #[test]
    fn test_all_succeed_reports_minimum() {
        let outcome = aggregate(
            vec![("t1".into(), ok(true, 200, 150)), ("t2".into(), ok(true, 100, 25))],
            &OutageConfig::default(),
            0,
        );
        assert!(outcome.success);
        assert_eq!(outcome.remaining, 25);
        assert_eq!(outcome.limit, 100);
        assert_eq!(outcome.restricted_by, None);
    }

    #[test]
    fn test_failure_wins_and_names_tier() {
        let outcome = aggregate(
            vec![("global".into(), ok(true, 1000, 900)), ("ai".into(), ok(false, 50, 0))],
            &OutageConfig::default(),
            0,
        );
        assert!(!outcome.success);
        assert_eq!(outcome.restricted_by.as_deref(), Some("ai"));
        assert_eq!(outcome.limit, 50);
        assert_eq!(outcome.remaining, 0);
    }

    #[test]
    fn test_first_failing_tier_in_order() {
        let outcome = aggregate(
            vec![
                ("a".into(), ok(true, 10, 5)),
                ("b".into(), ok(false, 20, 0)),
                ("c".into(), ok(false, 5, 0)),
            ],
            &OutageConfig::default(),
            0,
        );
        assert_eq!(outcome.restricted_by.as_deref(), Some("b"));
        assert_eq!(outcome.limit, 20);
    }

    #[test]
    fn test_errored_tier_is_skipped() {
        let outcome = aggregate(
            vec![("global".into(), down()), ("api".into(), ok(true, 100, 60))],
            &OutageConfig::default(),
            0,
        );
        assert!(outcome.success);
        assert_eq!(outcome.limit, 100);
        assert_eq!(outcome.remaining, 60);
    }

    #[test]
    fn test_total_outage_is_conservative() {
        let outage = OutageConfig::default();
        let outcome = aggregate(vec![("a".into(), down()), ("b".into(), down())], &outage, 1_000);
        assert!(outcome.success);
        assert_eq!(outcome.limit, outage.limit);
        assert_eq!(outcome.remaining, outage.remaining);
        assert_eq!(outcome.reset_at_ms, 61_000);
    }

    #[test]
    fn test_huge_outage_reset_saturates() {
        let outage = OutageConfig {
            reset_secs: u64::MAX,
            ..OutageConfig::default()
        };
        let outcome = aggregate(vec![("a".into(), down())], &outage, 1_000);
        assert!(outcome.success);
        assert_eq!(outcome.reset_at_ms, i64::MAX);
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn hit(&self, _request: &WindowRequest) -> Result<WindowHit, StoreError> {
            Err(StoreError::Protocol("connection refused".into()))
        }

        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    fn config() -> RateLimitConfig {
        let mut config = RateLimitConfig::default();
        config.tiers.clear();
        config.tiers.insert(
            "global".into(),
            TierConfig { window_secs: 60, max_requests: 100, key_mode: KeyMode::Mixed },
        );
        config.tiers.insert(
            "api".into(),
            TierConfig { window_secs: 60, max_requests: 4, key_mode: KeyMode::Mixed },
        );
        config
    }

    fn token(role: &str) -> VerifiedToken {
        VerifiedToken {
            subject: "user-1".into(),
            email: None,
            role: Some(role.into()),
        }
    }

    #[tokio::test]
    async fn test_evaluate_scales_by_role() {
        let evaluator = CompositeEvaluator::from_config(
            &config(),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(0)),
        );
        let tiers = vec!["global".to_string(), "api".to_string()];
        let identity = ClientIdentity::unknown();

        let outcome = evaluator.evaluate(&identity, Some(&token("operator")), &tiers).await;
        assert!(outcome.success);
        assert_eq!(outcome.limit, 8);
        assert_eq!(outcome.remaining, 7);

        for _ in 0..7 {
            assert!(evaluator.evaluate(&identity, Some(&token("operator")), &tiers).await.success);
        }
        let outcome = evaluator.evaluate(&identity, Some(&token("operator")), &tiers).await;
        assert!(!outcome.success);
        assert_eq!(outcome.restricted_by.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_evaluate_fails_open_when_store_down() {
        let evaluator = CompositeEvaluator::from_config(
            &config(),
            Arc::new(BrokenStore),
            Arc::new(ManualClock::new(0)),
        );
        let tiers = vec!["global".to_string(), "api".to_string(), "nope".to_string()];
        let outcome = evaluator.evaluate(&ClientIdentity::unknown(), None, &tiers).await;
        assert!(outcome.success);
        assert_eq!(outcome.limit, OutageConfig::default().limit);
    }

    #[test]
    fn test_tiers_for_path() {
        let evaluator = CompositeEvaluator::from_config(
            &RateLimitConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(0)),
        );
        assert_eq!(evaluator.tiers_for("/api/ai/generate"), ["global", "ai"]);
        assert_eq!(evaluator.tiers_for("/api/terminal/sessions"), ["global", "terminal"]);
        assert_eq!(evaluator.tiers_for("/api/projects"), ["global", "api"]);
    }
}
