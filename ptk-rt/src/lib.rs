//! ptk-rt library - real-time performance tracking service
//!
//! Learners and coaches hold a WebSocket connection; performances and
//! evaluations posted over it are stored, checked against the deferral rule
//! and fanned out to the right channels.

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use ptk_common::db::RecordStore;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod channels;
pub mod cli;
pub mod handlers;
pub mod locks;

use auth::Authenticator;
use channels::ChannelHub;
use locks::KeyedLocks;

/// Key serializing deferral enforcement: `(userId, postSlug)`
pub type EnforcementKey = (String, String);

/// Application state shared across HTTP handlers and sessions
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub hub: Arc<ChannelHub>,
    pub authenticator: Arc<dyn Authenticator>,
    pub locks: Arc<KeyedLocks<EnforcementKey>>,
    /// Coaches list performances created after this instant
    pub coach_cutoff: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        authenticator: Arc<dyn Authenticator>,
        coach_cutoff: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            hub: Arc::new(ChannelHub::new()),
            authenticator,
            locks: Arc::new(KeyedLocks::new()),
            coach_cutoff,
        }
    }
}

/// Build application router
///
/// `/health` is public; `/ws` and the admin routes verify a token themselves.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::ws_routes())
        .merge(api::admin_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
