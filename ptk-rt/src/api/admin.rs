//! Administrative endpoints
//!
//! Outside the real-time path: no events are emitted.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::delete,
    Json, Router,
};
use ptk_common::db::PurgeSummary;
use tracing::info;

use super::auth::{require_coach, TokenQuery};
use super::ApiError;
use crate::AppState;

/// DELETE /api/performances/:post_slug
///
/// Removes every performance recorded for the activity together with its
/// evaluations. Coach token required.
pub async fn purge_performances(
    State(state): State<AppState>,
    Path(post_slug): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<PurgeSummary>, ApiError> {
    let coach = require_coach(&state, &headers, &query).await?;

    let summary = state.store.purge_post_slug(&post_slug).await?;
    info!(
        post_slug = %post_slug,
        by = %coach.learner_id,
        performances = summary.performances,
        evaluations = summary.evaluations,
        "Purged activity records"
    );

    Ok(Json(summary))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/api/performances/:post_slug", delete(purge_performances))
}
