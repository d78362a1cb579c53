//! Real-time event handlers
//!
//! One [`Session`] exists per authenticated connection. Incoming frames are
//! decoded here and routed to the enforcer, evaluation, query and broadcast
//! handlers. Malformed and unauthorized frames are answered to the caller
//! with an `error` event; store write failures are only logged.

pub mod broadcast;
pub mod evaluation;
pub mod performance;
pub mod queries;

use ptk_common::events::{ClientEvent, ServerEvent};
use ptk_common::model::Identity;
use tracing::{debug, warn};

use crate::channels::ConnectionId;
use crate::AppState;

/// Verified connection context handed to every handler
#[derive(Debug, Clone)]
pub struct Session {
    pub connection: ConnectionId,
    pub identity: Identity,
}

impl Session {
    pub fn new(connection: ConnectionId, identity: Identity) -> Self {
        Self {
            connection,
            identity,
        }
    }

    pub fn learner_id(&self) -> &str {
        &self.identity.learner_id
    }

    pub fn is_coach(&self) -> bool {
        self.identity.is_coach()
    }

    /// Answer this connection only
    pub async fn reply(&self, state: &AppState, event: ServerEvent) {
        state.hub.send_to(self.connection, event).await;
    }

    pub async fn reject(&self, state: &AppState, message: impl Into<String>) {
        let message = message.into();
        warn!(
            connection = self.connection,
            learner_id = %self.identity.learner_id,
            "Rejected frame: {}",
            message
        );
        self.reply(state, ServerEvent::error(message)).await;
    }
}

/// Decode one text frame and handle it
pub async fn handle_frame(state: &AppState, session: &Session, frame: &str) {
    match serde_json::from_str::<ClientEvent>(frame) {
        Ok(event) => handle_event(state, session, event).await,
        Err(e) => {
            session
                .reject(state, format!("Malformed frame: {}", e))
                .await
        }
    }
}

pub async fn handle_event(state: &AppState, session: &Session, event: ClientEvent) {
    debug!(
        connection = session.connection,
        event = event.event_name(),
        "Handling event"
    );

    match event {
        ClientEvent::PostPerformance(raw) => {
            performance::submit_performance(state, session, raw).await
        }
        ClientEvent::PostEvaluation(raw) => {
            evaluation::submit_evaluation(state, session, raw).await
        }
        ClientEvent::ListPerformances => queries::list_performances(state, session).await,
        ClientEvent::ListEvaluations => queries::list_evaluations(state, session).await,
        ClientEvent::StartBroadcast(request) => {
            broadcast::start_broadcast(state, session, request).await
        }
        ClientEvent::EndBroadcast => broadcast::end_broadcast(state, session).await,
        ClientEvent::GetCurrentBroadcast => broadcast::get_current_broadcast(state, session).await,
    }
}
