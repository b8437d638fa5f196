//! The per-request gate decision.
//!
//! # Responsibilities
//! - Walk the classification state machine (static, preflight, public, session)
//! - Run the composite rate limiter on API routes
//! - Produce a terminal decision carrying every header the response needs
//!
//! # Design Decisions
//! - Built once from config with injected store, verifier and clock
//! - Rate limiting faults allow; missing sessions deny
//! - Redirect targets are same-origin relative paths only

use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode, Uri};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::{form_urlencoded, Url};

use crate::config::{AuthConfig, Environment, GatekeeperConfig};
use crate::observability::metrics;
use crate::routing::{RouteCategory, RouteClassifier};
use crate::security::client_ip::ClientIdentity;
use crate::security::headers::{
    cors_preflight_headers, merge, retry_after_secs, security_headers, RateLimitHeaders,
};
use crate::security::rate_limit::{Clock, CompositeEvaluator, CounterStore, SystemClock};
use crate::security::session::{JwtVerifier, SessionResolver, TokenVerifier, VerifiedToken};

/// Query parameter naming the post-login destination.
pub const CALLBACK_PARAM: &str = "callbackUrl";

/// Origin used only to check that a callback resolves same-origin.
const PLACEHOLDER_ORIGIN: &str = "http://gatekeeper.invalid/";

/// Terminal state of the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Forward the request; merge `headers` into the eventual response.
    PassThrough { headers: HeaderMap },
    /// Answer 307 with `Location: location`.
    Redirect { location: String, headers: HeaderMap },
    /// Answer immediately.
    Reject {
        status: StatusCode,
        body: Option<Value>,
        headers: HeaderMap,
    },
}

impl GateDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            GateDecision::PassThrough { .. } => "pass",
            GateDecision::Redirect { .. } => "redirect",
            GateDecision::Reject { .. } => "reject",
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            GateDecision::PassThrough { headers }
            | GateDecision::Redirect { headers, .. }
            | GateDecision::Reject { headers, .. } => headers,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GateDecision::PassThrough { .. } => None,
            GateDecision::Redirect { .. } => Some(StatusCode::TEMPORARY_REDIRECT),
            GateDecision::Reject { status, .. } => Some(*status),
        }
    }
}

/// Body of the 401 for protected API routes.
pub fn unauthorized_body() -> Value {
    json!({
        "error": "Authentication required",
        "code": "UNAUTHORIZED",
        "message": "Please sign in to access this resource",
    })
}

/// Body of the 429.
pub fn rate_limited_body(message: &str) -> Value {
    json!({
        "error": message,
        "code": "RATE_LIMITED",
    })
}

/// Accept `candidate` only as a same-origin relative path.
///
/// Returns the normalized path (and query) to redirect to.
pub fn safe_callback(candidate: &str) -> Option<String> {
    if !candidate.starts_with('/')
        || candidate.starts_with("//")
        || candidate.starts_with("/\\")
        || candidate.chars().any(char::is_control)
    {
        return None;
    }

    let base = Url::parse(PLACEHOLDER_ORIGIN).ok()?;
    let resolved = base.join(candidate).ok()?;
    if resolved.origin() != base.origin() {
        return None;
    }

    let mut target = resolved.path().to_string();
    if let Some(query) = resolved.query() {
        target.push('?');
        target.push_str(query);
    }
    Some(target)
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// The request gatekeeper.
pub struct Gatekeeper {
    environment: Environment,
    auth: AuthConfig,
    classifier: RouteClassifier,
    session: SessionResolver,
    evaluator: CompositeEvaluator,
    rate_limit_enabled: bool,
    rate_limit_message: String,
    clock: Arc<dyn Clock>,
}

impl Gatekeeper {
    /// Build with explicit collaborators.
    pub fn new(
        config: &GatekeeperConfig,
        store: Arc<dyn CounterStore>,
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            environment: config.environment,
            auth: config.auth.clone(),
            classifier: RouteClassifier::from_config(&config.routes, &config.auth),
            session: SessionResolver::for_environment(
                verifier,
                &config.auth.cookie_name,
                config.environment,
            ),
            evaluator: CompositeEvaluator::from_config(&config.rate_limit, store, clock.clone()),
            rate_limit_enabled: config.rate_limit.enabled,
            rate_limit_message: config.rate_limit.message.clone(),
            clock,
        }
    }

    /// JWT verification with the configured secret, system clock.
    pub fn from_config(config: &GatekeeperConfig, store: Arc<dyn CounterStore>) -> Self {
        let verifier = Arc::new(JwtVerifier::new(
            config.auth.secret.as_deref(),
            config.auth.cookie_name.clone(),
        ));
        Self::new(config, store, verifier, Arc::new(SystemClock))
    }

    /// Decide what happens to a request.
    pub async fn decide(&self, request: &Parts) -> GateDecision {
        let start = Instant::now();
        let path = request.uri.path();
        let route = self.classifier.classify(&request.method, path);

        let decision = self.walk(request, route.category, route.sign_in).await;

        debug!(
            method = %request.method,
            path = %path,
            category = ?route.category,
            decision = decision.kind(),
            status = ?decision.status(),
            "Gate decided"
        );
        metrics::record_decision(decision.kind());
        metrics::record_decision_duration(start);
        decision
    }

    async fn walk(&self, request: &Parts, category: RouteCategory, sign_in: bool) -> GateDecision {
        let mut headers = security_headers(self.environment);
        let path = request.uri.path();

        match category {
            RouteCategory::StaticAsset => return GateDecision::PassThrough { headers },
            RouteCategory::Preflight => {
                merge(&mut headers, &cors_preflight_headers());
                return GateDecision::Reject {
                    status: StatusCode::NO_CONTENT,
                    body: None,
                    headers,
                };
            }
            _ => {}
        }

        // Public API callers are identified for quota keying only, never gated.
        let identify = self.rate_limit_enabled && category.is_rate_limited();
        let token = if category.is_public() && !sign_in && !identify {
            None
        } else {
            self.session.resolve(&request.headers).await
        };

        match (category, token.is_some()) {
            (RouteCategory::ProtectedApi, false) => {
                metrics::record_auth_failure("api");
                return GateDecision::Reject {
                    status: StatusCode::UNAUTHORIZED,
                    body: Some(unauthorized_body()),
                    headers,
                };
            }
            (RouteCategory::ProtectedPage, false) => {
                if path == self.auth.dashboard_path {
                    info!(path = %path, "Unauthenticated dashboard request, redirecting to login");
                }
                metrics::record_auth_failure("page");
                return GateDecision::Redirect {
                    location: self.login_location(path),
                    headers,
                };
            }
            (_, true) if sign_in => {
                return GateDecision::Redirect {
                    location: self.post_login_location(&request.uri),
                    headers,
                };
            }
            _ => {}
        }

        if self.rate_limit_enabled && category.is_rate_limited() {
            if let Some(rejection) = self
                .rate_limit(request, token.as_ref(), &mut headers)
                .await
            {
                return rejection;
            }
        }

        GateDecision::PassThrough { headers }
    }

    /// Attach rate limit headers; a rejection when the composite failed.
    async fn rate_limit(
        &self,
        request: &Parts,
        token: Option<&VerifiedToken>,
        headers: &mut HeaderMap,
    ) -> Option<GateDecision> {
        let identity = ClientIdentity::from_headers(&request.headers);
        let tiers = self.evaluator.tiers_for(request.uri.path());
        let outcome = self.evaluator.evaluate(&identity, token, tiers).await;

        RateLimitHeaders::from(&outcome).apply(headers);
        if outcome.success {
            return None;
        }

        let tier = outcome.restricted_by.as_deref().unwrap_or("unknown");
        info!(
            tier = %tier,
            ip = %identity.ip(),
            path = %request.uri.path(),
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(tier);

        let retry_after = retry_after_secs(outcome.reset_at_ms, self.clock.now_ms());
        headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));

        Some(GateDecision::Reject {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: Some(rate_limited_body(&self.rate_limit_message)),
            headers: std::mem::take(headers),
        })
    }

    fn login_location(&self, path: &str) -> String {
        let callback: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
        format!("{}?{CALLBACK_PARAM}={callback}", self.auth.login_path)
    }

    fn post_login_location(&self, uri: &Uri) -> String {
        query_param(uri, CALLBACK_PARAM)
            .and_then(|candidate| safe_callback(&candidate))
            .unwrap_or_else(|| self.auth.dashboard_path.clone())
    }
}
