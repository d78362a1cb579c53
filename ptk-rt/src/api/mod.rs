//! HTTP API for ptk-rt

pub mod admin;
pub mod auth;
pub mod error;
pub mod health;
pub mod ws;

pub use admin::admin_routes;
pub use error::ApiError;
pub use health::health_routes;
pub use ws::ws_routes;
