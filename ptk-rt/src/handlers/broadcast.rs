//! Coach broadcast ("inbox prompt") handlers

use ptk_common::events::ServerEvent;
use ptk_common::model::{Broadcast, BroadcastRequest};
use ptk_common::time;
use tracing::info;

use super::Session;
use crate::AppState;

/// Handle `start-broadcast`: replace the current broadcast
pub async fn start_broadcast(state: &AppState, session: &Session, request: BroadcastRequest) {
    if !session.is_coach() {
        session.reject(state, "Only coaches may start a broadcast").await;
        return;
    }
    if request.post_slug.trim().is_empty() {
        session.reject(state, "Broadcast needs a postSlug").await;
        return;
    }

    let broadcast = Broadcast {
        post_slug: request.post_slug,
        prompt: request.prompt,
        started_by: session.learner_id().to_string(),
        started_at: time::now(),
    };
    info!(
        post_slug = %broadcast.post_slug,
        started_by = %broadcast.started_by,
        "Broadcast started"
    );
    state.hub.set_broadcast(Some(broadcast)).await;
}

/// Handle `end-broadcast`: clear the current broadcast
pub async fn end_broadcast(state: &AppState, session: &Session) {
    if !session.is_coach() {
        session.reject(state, "Only coaches may end a broadcast").await;
        return;
    }

    info!(ended_by = %session.learner_id(), "Broadcast ended");
    state.hub.set_broadcast(None).await;
}

/// Handle `get-current-broadcast`
pub async fn get_current_broadcast(state: &AppState, session: &Session) {
    let current = state.hub.current_broadcast().await;
    session
        .reply(state, ServerEvent::CurrentBroadcast(current))
        .await;
}
