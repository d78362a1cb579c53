//! Coach evaluations

use ptk_common::db::{EvaluationFilter, PerformanceFilter};
use ptk_common::events::ServerEvent;
use ptk_common::model::{Evaluation, EvaluationStatus, NewEvaluation, RawEvaluation};
use tracing::{error, info, warn};

use super::Session;
use crate::channels::Channel;
use crate::AppState;

/// Handle `post-evaluation`
///
/// Only coaches may evaluate, only with `accepted` or `rejected`, and only a
/// submission or question performance that exists, belongs to the named
/// learner and has no evaluation yet. The evaluator is always the acting coach.
pub async fn submit_evaluation(state: &AppState, session: &Session, raw: RawEvaluation) {
    if !session.is_coach() {
        session.reject(state, "Only coaches may post evaluations").await;
        return;
    }
    if raw.status == EvaluationStatus::Deferred {
        session
            .reject(state, "Deferred evaluations are issued by the system only")
            .await;
        return;
    }

    let performance = match state
        .store
        .select_performances(&PerformanceFilter::all().id(raw.performance_id))
        .await
    {
        Ok(mut found) => found.pop(),
        Err(e) => {
            error!(performance_id = raw.performance_id, "Failed to load performance: {}", e);
            return;
        }
    };
    let performance = match performance {
        None => {
            session
                .reject(state, format!("Unknown performance {}", raw.performance_id))
                .await;
            return;
        }
        Some(p) if p.user_id != raw.learner_id => {
            session
                .reject(
                    state,
                    format!(
                        "Performance {} does not belong to {}",
                        raw.performance_id, raw.learner_id
                    ),
                )
                .await;
            return;
        }
        Some(p) if !p.kind().is_evaluable() => {
            session
                .reject(
                    state,
                    format!(
                        "Performance {} is a {} and cannot be evaluated",
                        raw.performance_id,
                        p.kind().as_str()
                    ),
                )
                .await;
            return;
        }
        Some(p) => p,
    };

    // Same key as deferral enforcement, so a verdict and a deferral never
    // both land on one performance.
    let _guard = state
        .locks
        .lock((performance.user_id.clone(), performance.post_slug.clone()))
        .await;
    match state
        .store
        .select_evaluations(&EvaluationFilter::all().performances(vec![performance.id]))
        .await
    {
        Ok(existing) if existing.is_empty() => {}
        Ok(existing) => {
            let status = existing[0].status.as_str();
            session
                .reject(
                    state,
                    format!("Performance {} is already {}", performance.id, status),
                )
                .await;
            return;
        }
        Err(e) => {
            error!(performance_id = performance.id, "Failed to load evaluations: {}", e);
            return;
        }
    }

    if let Some(claimed) = raw.evaluator_id.as_deref() {
        if claimed != session.learner_id() {
            warn!(
                claimed,
                actual = %session.learner_id(),
                "Ignoring client-supplied evaluator id"
            );
        }
    }

    let record = NewEvaluation {
        performance_id: raw.performance_id,
        learner_id: raw.learner_id,
        evaluator_id: session.learner_id().to_string(),
        feedback: raw.feedback,
        status: raw.status,
    };

    let evaluation = match state.store.insert_evaluation(record).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            error!(
                performance_id = raw.performance_id,
                evaluator_id = %session.learner_id(),
                "Failed to store evaluation: {}",
                e
            );
            return;
        }
    };

    info!(
        id = evaluation.id,
        performance_id = evaluation.performance_id,
        learner_id = %evaluation.learner_id,
        status = evaluation.status.as_str(),
        "Stored evaluation"
    );
    dispatch_evaluation(state, evaluation, Some(session)).await;
}

/// Fan an evaluation out to coaches and to its learner
///
/// The learner's personal channel gets the data event plus a notice, unless
/// `actor` is that same learner.
pub(crate) async fn dispatch_evaluation(
    state: &AppState,
    evaluation: Evaluation,
    actor: Option<&Session>,
) {
    let learner = Channel::learner(&evaluation.learner_id);
    let learner_is_actor = actor.is_some_and(|s| s.learner_id() == evaluation.learner_id);

    let targets = if learner_is_actor {
        vec![Channel::Coaches]
    } else {
        vec![Channel::Coaches, learner.clone()]
    };
    state
        .hub
        .dispatch(&targets, &ServerEvent::NewEvaluation(evaluation.clone()), None)
        .await;

    if !learner_is_actor {
        state
            .hub
            .dispatch(&[learner], &ServerEvent::NewEvaluationNotice(evaluation), None)
            .await;
    }
}
