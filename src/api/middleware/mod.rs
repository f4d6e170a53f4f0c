//! API middleware components

pub mod auth;
pub mod logging;

pub use auth::RequireBearer;
pub use logging::logging_middleware;
