//! Session token resolution.
//!
//! # Responsibilities
//! - Locate the session token (cookie, chunked cookie, bearer header)
//! - Verify it against the shared signing secret
//! - Try an ordered list of strategies until one yields a token
//!
//! # Design Decisions
//! - A verification error is indistinguishable from "no token" to callers
//! - No secret configured means nobody is authenticated
//! - Tokens are never cached; every request is verified afresh

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Environment;

/// Prefix browsers require for cookies set with `Secure` over HTTPS.
pub const SECURE_COOKIE_PREFIX: &str = "__Secure-";

/// Claims of a successfully verified session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedToken {
    pub subject: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Why a token could not be verified.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid session token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("session verifier unavailable: {0}")]
    Unavailable(String),
}

/// Where to look for the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStrategy {
    /// A specific cookie name (chunked variants included).
    Cookie(String),
    /// No explicit name: bearer header, then the secure and bare cookie names.
    Implicit,
}

/// Token verification capability.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(
        &self,
        headers: &HeaderMap,
        strategy: &VerificationStrategy,
    ) -> Result<Option<VerifiedToken>, AuthError>;
}

/// Cookie name for the environment.
pub fn session_cookie_name(base: &str, environment: Environment) -> String {
    if environment.is_production_like() {
        format!("{SECURE_COOKIE_PREFIX}{base}")
    } else {
        base.to_string()
    }
}

/// Read a cookie, reassembling `<name>.0`, `<name>.1`, ... chunks when the
/// plain name is absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let pairs: Vec<(&str, &str)> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let find = |wanted: &str| {
        pairs
            .iter()
            .find(|(k, _)| *k == wanted)
            .map(|(_, v)| *v)
            .filter(|v| !v.is_empty())
    };

    if let Some(value) = find(name) {
        return Some(value.to_string());
    }

    let mut joined = String::new();
    for index in 0.. {
        match find(&format!("{name}.{index}")) {
            Some(chunk) => joined.push_str(chunk),
            None => break,
        }
    }
    (!joined.is_empty()).then_some(joined)
}

/// `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Verifies HS256 JWT session tokens with the shared secret.
pub struct JwtVerifier {
    key: Option<DecodingKey>,
    cookie_base: String,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: Option<&str>, cookie_base: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        Self {
            key: secret
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            cookie_base: cookie_base.into(),
            validation,
        }
    }

    fn locate(&self, headers: &HeaderMap, strategy: &VerificationStrategy) -> Option<String> {
        match strategy {
            VerificationStrategy::Cookie(name) => read_cookie(headers, name),
            VerificationStrategy::Implicit => bearer_token(headers)
                .or_else(|| {
                    read_cookie(headers, &format!("{SECURE_COOKIE_PREFIX}{}", self.cookie_base))
                })
                .or_else(|| read_cookie(headers, &self.cookie_base)),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(
        &self,
        headers: &HeaderMap,
        strategy: &VerificationStrategy,
    ) -> Result<Option<VerifiedToken>, AuthError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let Some(raw) = self.locate(headers, strategy) else {
            return Ok(None);
        };

        let data = decode::<SessionClaims>(&raw, key, &self.validation)?;
        Ok(Some(VerifiedToken {
            subject: data.claims.sub,
            email: data.claims.email,
            role: data.claims.role,
        }))
    }
}

/// Runs verification strategies in order until one yields a token.
#[derive(Clone)]
pub struct SessionResolver {
    verifier: Arc<dyn TokenVerifier>,
    strategies: Vec<VerificationStrategy>,
}

impl SessionResolver {
    pub fn new(verifier: Arc<dyn TokenVerifier>, strategies: Vec<VerificationStrategy>) -> Self {
        Self {
            verifier,
            strategies,
        }
    }

    /// Environment cookie name first, then implicit placement.
    pub fn for_environment(
        verifier: Arc<dyn TokenVerifier>,
        cookie_base: &str,
        environment: Environment,
    ) -> Self {
        Self::new(
            verifier,
            vec![
                VerificationStrategy::Cookie(session_cookie_name(cookie_base, environment)),
                VerificationStrategy::Implicit,
            ],
        )
    }

    pub fn strategies(&self) -> &[VerificationStrategy] {
        &self.strategies
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Option<VerifiedToken> {
        for strategy in &self.strategies {
            match self.verifier.verify(headers, strategy).await {
                Ok(Some(token)) => return Some(token),
                Ok(None) => {}
                Err(e) => {
                    debug!(strategy = ?strategy, error = %e, "Session token rejected");
                }
            }
        }
        None
    }
}
