//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → classifier.rs (category + sign-in flag)
//!     → matcher.rs (evaluate path conditions)
//!     → Return: ClassifiedRoute
//!
//! Compilation (at startup):
//!     RoutesConfig + AuthConfig
//!     → Compile matchers (exact, prefix, extension)
//!     → Freeze as immutable RouteClassifier
//! ```
//!
//! # Design Decisions
//! - Tables compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always yields the same category

pub mod classifier;
pub mod matcher;

pub use classifier::{ClassifiedRoute, RouteCategory, RouteClassifier};
