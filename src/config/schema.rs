//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gatekeeper.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gatekeeper.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Deployment environment (controls cookie naming and HSTS).
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The application the gatekeeper fronts.
    pub upstream: UpstreamConfig,

    /// Session token settings.
    pub auth: AuthConfig,

    /// Route classification tables.
    pub routes: RoutesConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Production-like environments get secure cookie names and HSTS.
    pub fn is_production_like(self) -> bool {
        matches!(self, Environment::Production | Environment::Staging)
    }

    /// Parse the `APP_ENV` style value. Unknown values map to development.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" => Environment::Staging,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Address of the protected application (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Total time allowed for a forwarded request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Session token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HS256 signing secret. `None` means every request is unauthenticated.
    pub secret: Option<String>,

    /// Session cookie identifier; production prefixes it with `__Secure-`.
    pub cookie_name: String,

    /// Sign-in pages. Authenticated callers are redirected away from these.
    pub sign_in_paths: Vec<String>,

    /// Where unauthenticated page requests are sent.
    pub login_path: String,

    /// Default landing page after sign-in.
    pub dashboard_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: "session-token".to_string(),
            sign_in_paths: vec!["/login".to_string(), "/auth/signin".to_string()],
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
        }
    }
}

/// Route classification tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Build-output and asset prefixes served without checks.
    pub static_prefixes: Vec<String>,

    /// Exact asset paths (e.g., favicon).
    pub static_paths: Vec<String>,

    /// File extensions (without the dot) treated as static assets.
    pub static_extensions: Vec<String>,

    /// Directories whose nested files match `static_extensions`. Files
    /// directly under `/` always do; API paths never do.
    pub static_asset_dirs: Vec<String>,

    /// Public paths that must match exactly.
    pub public_paths: Vec<String>,

    /// Public path prefixes (API and pages).
    pub public_prefixes: Vec<String>,

    /// Prefix identifying API routes.
    pub api_prefix: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            static_prefixes: vec![
                "/_next/static/".to_string(),
                "/_next/image".to_string(),
                "/static/".to_string(),
            ],
            static_paths: vec!["/favicon.ico".to_string()],
            static_extensions: [
                "svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "css", "js", "map", "woff",
                "woff2", "ttf", "eot",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            static_asset_dirs: ["/images/", "/fonts/", "/icons/", "/assets/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            public_paths: vec!["/".to_string(), "/api/health".to_string()],
            public_prefixes: vec![
                "/api/auth/".to_string(),
                "/api/public/".to_string(),
                "/public/".to_string(),
            ],
            api_prefix: "/api/".to_string(),
        }
    }
}

/// How a tier derives its counting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    User,
    Ip,
    #[default]
    Mixed,
}

/// A single rate limit tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierConfig {
    /// Sliding window length in seconds.
    pub window_secs: u64,

    /// Requests allowed per window at multiplier 1.0.
    pub max_requests: u64,

    /// Key derivation mode.
    #[serde(default)]
    pub key_mode: KeyMode,
}

/// Maps a path prefix to the tiers enforced on it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteTiers {
    pub prefix: String,
    pub tiers: Vec<String>,
}

/// Outcome reported when every tier backend is unreachable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutageConfig {
    pub limit: u64,
    pub remaining: u64,
    pub reset_secs: u64,
}

impl Default for OutageConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            remaining: 9,
            reset_secs: 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Redis connection string. Absent means the in-process store.
    pub store_url: Option<String>,

    /// Namespace prefix for every counter key.
    pub key_prefix: String,

    /// Deadline for a single store round trip in milliseconds.
    pub store_timeout_ms: u64,

    /// Interval between sweeps of the in-process store.
    pub sweep_interval_secs: u64,

    /// Message placed in the 429 body.
    pub message: String,

    /// Conservative outcome when no tier could be checked.
    pub outage: OutageConfig,

    /// Tier table keyed by tier name.
    pub tiers: BTreeMap<String, TierConfig>,

    /// Tier selection by path prefix, first match wins.
    pub route_tiers: Vec<RouteTiers>,

    /// Tiers applied to API paths that match no `route_tiers` entry.
    pub default_tiers: Vec<String>,

    /// Overrides for the role multiplier table (role names are case-insensitive).
    pub role_multipliers: BTreeMap<String, f64>,
}

fn tier(window_secs: u64, max_requests: u64, key_mode: KeyMode) -> TierConfig {
    TierConfig {
        window_secs,
        max_requests,
        key_mode,
    }
}

fn route(prefix: &str, tiers: &[&str]) -> RouteTiers {
    RouteTiers {
        prefix: prefix.to_string(),
        tiers: tiers.iter().map(|t| t.to_string()).collect(),
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert("global".to_string(), tier(60, 1000, KeyMode::Mixed));
        tiers.insert("api".to_string(), tier(60, 100, KeyMode::Mixed));
        tiers.insert("ai".to_string(), tier(60, 20, KeyMode::Mixed));
        tiers.insert("files".to_string(), tier(60, 50, KeyMode::Mixed));
        tiers.insert("terminal".to_string(), tier(60, 10, KeyMode::User));
        tiers.insert("auth".to_string(), tier(900, 10, KeyMode::Mixed));

        Self {
            enabled: true,
            store_url: None,
            key_prefix: "gatekeeper".to_string(),
            store_timeout_ms: 250,
            sweep_interval_secs: 60,
            message: "Too many requests".to_string(),
            outage: OutageConfig::default(),
            tiers,
            route_tiers: vec![
                route("/api/ai/", &["global", "ai"]),
                route("/api/files/", &["global", "files"]),
                route("/api/terminal/", &["global", "terminal"]),
                route("/api/auth/", &["global", "auth"]),
            ],
            default_tiers: vec!["global".to_string(), "api".to_string()],
            role_multipliers: BTreeMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
