//! Edge request gatekeeper library.
//!
//! Classifies every inbound request, verifies the session, applies
//! multi-tier rate limits and security headers, then forwards what passes.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GatekeeperConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{GateDecision, Gatekeeper};
