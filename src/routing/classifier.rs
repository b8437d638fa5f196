//! Route classification.
//!
//! # Responsibilities
//! - Categorize a request by path and method
//! - Flag sign-in pages, which need a session lookup despite being public
//!
//! # Design Decisions
//! - Matchers compiled once from config, immutable at runtime
//! - First match wins: static, preflight, public, then API vs page
//! - Extensions only mark files at the root or in asset directories, never API paths
//! - Sign-in pages are never part of the public allowlist

use axum::http::Method;

use crate::config::{AuthConfig, RoutesConfig};

use super::matcher::{AnyMatcher, ExactMatcher, ExtensionMatcher, Matcher, PathPrefixMatcher};

/// What kind of route a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
    StaticAsset,
    Preflight,
    PublicApi,
    PublicPage,
    ProtectedApi,
    ProtectedPage,
}

impl RouteCategory {
    /// API routes go through the composite rate limiter.
    pub fn is_rate_limited(self) -> bool {
        matches!(self, RouteCategory::PublicApi | RouteCategory::ProtectedApi)
    }

    /// Whether the route appears on the public allowlist.
    pub fn is_public(self) -> bool {
        matches!(self, RouteCategory::PublicApi | RouteCategory::PublicPage)
    }
}

/// Result of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedRoute {
    pub category: RouteCategory,
    /// A login/sign-in page: public, but authenticated callers are sent on.
    pub sign_in: bool,
}

/// Compiled classification tables.
#[derive(Debug)]
pub struct RouteClassifier {
    static_assets: AnyMatcher,
    static_files: ExtensionMatcher,
    public: AnyMatcher,
    sign_in: AnyMatcher,
    api_prefix: String,
}

impl RouteClassifier {
    pub fn from_config(routes: &RoutesConfig, auth: &AuthConfig) -> Self {
        let mut static_assets = AnyMatcher::prefixes(routes.static_prefixes.iter().cloned());
        for path in &routes.static_paths {
            static_assets.push(ExactMatcher::new(path.clone()));
        }
        let static_files = ExtensionMatcher::new(&routes.static_extensions)
            .within(routes.static_asset_dirs.iter().cloned());

        let mut public = AnyMatcher::exact(routes.public_paths.iter().cloned());
        for prefix in &routes.public_prefixes {
            public.push(PathPrefixMatcher::new(prefix.clone()));
        }

        Self {
            static_assets,
            static_files,
            public,
            sign_in: AnyMatcher::exact(auth.sign_in_paths.iter().cloned()),
            api_prefix: routes.api_prefix.clone(),
        }
    }

    fn is_api(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix) || path == self.api_prefix.trim_end_matches('/')
    }

    fn is_static(&self, path: &str, api: bool) -> bool {
        self.static_assets.matches(path) || (!api && self.static_files.matches(path))
    }

    pub fn classify(&self, method: &Method, path: &str) -> ClassifiedRoute {
        let api = self.is_api(path);
        let category = if self.is_static(path, api) {
            RouteCategory::StaticAsset
        } else if method == Method::OPTIONS {
            RouteCategory::Preflight
        } else {
            let sign_in = !api && self.sign_in.matches(path);
            let public = sign_in || self.public.matches(path);
            let category = match (api, public) {
                (true, true) => RouteCategory::PublicApi,
                (true, false) => RouteCategory::ProtectedApi,
                (false, true) => RouteCategory::PublicPage,
                (false, false) => RouteCategory::ProtectedPage,
            };
            return ClassifiedRoute { category, sign_in };
        };

        ClassifiedRoute {
            category,
            sign_in: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RouteClassifier {
        RouteClassifier::from_config(&RoutesConfig::default(), &AuthConfig::default())
    }

    fn category(method: Method, path: &str) -> RouteCategory {
        classifier().classify(&method, path).category
    }

    #[test]
    fn test_static_assets() {
        for path in [
            "/_next/static/chunks/main.js",
            "/_next/image?url=x",
            "/static/app.css",
            "/favicon.ico",
            "/logo.svg",
            "/fonts/inter.WOFF2",
            "/images/team/photo.jpg",
        ] {
            assert_eq!(category(Method::GET, path), RouteCategory::StaticAsset, "{path}");
        }
    }

    #[test]
    fn test_extension_does_not_unlock_protected_routes() {
        assert_eq!(category(Method::GET, "/api/files/preview.png"), RouteCategory::ProtectedApi);
        assert_eq!(category(Method::GET, "/api/projects/secret.png"), RouteCategory::ProtectedApi);
        assert_eq!(category(Method::GET, "/api/public/logo.svg"), RouteCategory::PublicApi);
        assert_eq!(category(Method::GET, "/projects/42.js"), RouteCategory::ProtectedPage);
        assert_eq!(category(Method::GET, "/dashboard/export.css"), RouteCategory::ProtectedPage);
    }

    #[test]
    fn test_static_wins_over_preflight() {
        assert_eq!(category(Method::OPTIONS, "/logo.png"), RouteCategory::StaticAsset);
        assert_eq!(category(Method::OPTIONS, "/api/projects"), RouteCategory::Preflight);
    }

    #[test]
    fn test_public_routes() {
        assert_eq!(category(Method::GET, "/"), RouteCategory::PublicPage);
        assert_eq!(category(Method::GET, "/public/terms"), RouteCategory::PublicPage);
        assert_eq!(category(Method::GET, "/api/health"), RouteCategory::PublicApi);
        assert_eq!(category(Method::POST, "/api/auth/callback/github"), RouteCategory::PublicApi);
        assert_eq!(category(Method::GET, "/api/public/stats"), RouteCategory::PublicApi);
    }

    #[test]
    fn test_protected_routes() {
        assert_eq!(category(Method::GET, "/api/projects"), RouteCategory::ProtectedApi);
        assert_eq!(category(Method::GET, "/api/health/deep"), RouteCategory::ProtectedApi);
        assert_eq!(category(Method::GET, "/api"), RouteCategory::ProtectedApi);
        assert_eq!(category(Method::GET, "/dashboard"), RouteCategory::ProtectedPage);
        assert_eq!(category(Method::GET, "/projects/42"), RouteCategory::ProtectedPage);
    }

    #[test]
    fn test_sign_in_pages() {
        let route = classifier().classify(&Method::GET, "/login");
        assert_eq!(route.category, RouteCategory::PublicPage);
        assert!(route.sign_in);

        assert!(classifier().classify(&Method::GET, "/auth/signin").sign_in);
        assert!(!classifier().classify(&Method::GET, "/").sign_in);
    }

    #[test]
    fn test_rate_limited_categories() {
        assert!(RouteCategory::PublicApi.is_rate_limited());
        assert!(RouteCategory::ProtectedApi.is_rate_limited());
        assert!(!RouteCategory::ProtectedPage.is_rate_limited());
        assert!(!RouteCategory::StaticAsset.is_rate_limited());
    }
}
