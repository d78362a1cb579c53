//! # PTK Common Library
//!
//! Shared code for the Performance Tracking Kit:
//! - Performance / evaluation model types
//! - Wire event types (ClientEvent / ServerEvent)
//! - Aggregation engine and client-side ledger
//! - Configuration loading
//! - SQLite record store (`sqlx` feature, on by default)

pub mod aggregate;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod ledger;
pub mod model;
pub mod time;

pub use error::{Error, Result};
