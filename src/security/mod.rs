//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → gate.rs (classify, verify session, decide)
//!     → session.rs (locate and verify the session token)
//!     → client_ip.rs (caller address from forwarding headers)
//!     → rate_limit/ (composite multi-tier check)
//!     → headers.rs (security, CORS and rate limit headers)
//!     → Decision: pass through, redirect or reject
//! ```
//!
//! # Design Decisions
//! - Auth faults deny, rate limiting faults allow
//! - No trust in client input: callbacks and addresses are validated

pub mod client_ip;
pub mod gate;
pub mod headers;
pub mod rate_limit;
pub mod session;

pub use gate::{GateDecision, Gatekeeper};
