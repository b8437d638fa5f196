//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace span)
//!     → gate middleware (security::gate decides)
//!         → pass: forward to upstream, merge gate headers
//!         → redirect / reject: response.rs composes the answer
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
