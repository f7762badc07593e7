//! Middleware modules for the SEXTANT API
//!
//! - `rate_limit`: per-client request limiting on `/api/*`
//! - `security`: hardening headers on every response
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .nest("/api", api_routes.layer(from_fn_with_state(rate_limit_state, rate_limit_middleware)))
//!     .layer(from_fn(security_headers_middleware))
//!     .layer(from_fn(observability_middleware))
//!     // Outermost
//!     .layer(cors)
//! ```

mod rate_limit;
mod security;

pub use rate_limit::{extract_client_ip, rate_limit_middleware, RateLimitError, RateLimitState};
pub use security::security_headers_middleware;
