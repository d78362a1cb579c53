//! Role-scoped pull queries
//!
//! Coaches see every learner (performances only after the configured cutoff);
//! learners see only their own records. Answers go to the caller only.

use ptk_common::db::{EvaluationFilter, PerformanceFilter};
use ptk_common::events::ServerEvent;
use tracing::{debug, error};

use super::Session;
use crate::AppState;

/// Handle `list-performances`
pub async fn list_performances(state: &AppState, session: &Session) {
    let filter = if session.is_coach() {
        PerformanceFilter::all().created_after(state.coach_cutoff)
    } else {
        PerformanceFilter::all().user(session.learner_id())
    };

    match state.store.select_performances(&filter).await {
        Ok(performances) => {
            debug!(
                learner_id = %session.learner_id(),
                count = performances.len(),
                "Listing performances"
            );
            session
                .reply(state, ServerEvent::ListPerformances(performances))
                .await;
        }
        Err(e) => {
            error!(learner_id = %session.learner_id(), "Failed to list performances: {}", e);
            session.reject(state, "Could not list performances").await;
        }
    }
}

/// Handle `list-evaluations`
pub async fn list_evaluations(state: &AppState, session: &Session) {
    let filter = if session.is_coach() {
        EvaluationFilter::all()
    } else {
        EvaluationFilter::all().learner(session.learner_id())
    };

    match state.store.select_evaluations(&filter).await {
        Ok(evaluations) => {
            debug!(
                learner_id = %session.learner_id(),
                count = evaluations.len(),
                "Listing evaluations"
            );
            session
                .reply(state, ServerEvent::ListEvaluations(evaluations))
                .await;
        }
        Err(e) => {
            error!(learner_id = %session.learner_id(), "Failed to list evaluations: {}", e);
            session.reject(state, "Could not list evaluations").await;
        }
    }
}
