//! HTTP API surface: routes, handlers, rate limiting and the server loop

pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod types;

pub use rate_limit::RateLimitDecision;
pub use rate_limit::RateLimiter;
pub use server::serve_api;
