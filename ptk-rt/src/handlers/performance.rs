//! Performance ingestion and deferral enforcement
//!
//! For `submission` and `question` performances, every earlier performance of
//! the same kind for the same `(userId, postSlug)` that has no evaluation yet is
//! closed out with a system `deferred` evaluation before the new one is stored.
//! Enforcement for one pair runs under that pair's [`crate::locks::KeyedLocks`]
//! entry; the store's unique deferral index backs it up across processes.

use std::collections::HashSet;

use ptk_common::db::{EvaluationFilter, PerformanceFilter};
use ptk_common::events::ServerEvent;
use ptk_common::model::{NewEvaluation, NewPerformance, RawPerformance, RecordId};
use ptk_common::Error;
use tracing::{error, info, warn};

use super::evaluation::dispatch_evaluation;
use super::Session;
use crate::channels::Channel;
use crate::AppState;

/// Handle `post-performance`
pub async fn submit_performance(state: &AppState, session: &Session, raw: RawPerformance) {
    let record = NewPerformance::from_raw(session.learner_id(), raw);
    let kind = record.payload.kind();

    let guard = if kind.is_evaluable() {
        let guard = state
            .locks
            .lock((record.user_id.clone(), record.post_slug.clone()))
            .await;
        defer_unjudged(state, &record).await;
        Some(guard)
    } else {
        None
    };

    let performance = match state.store.insert_performance(record).await {
        Ok(performance) => performance,
        Err(e) => {
            error!(
                learner_id = %session.learner_id(),
                kind = kind.as_str(),
                "Failed to store performance: {}",
                e
            );
            return;
        }
    };
    drop(guard);

    info!(
        id = performance.id,
        learner_id = %performance.user_id,
        post_slug = %performance.post_slug,
        kind = kind.as_str(),
        "Stored performance"
    );

    if !session.is_coach() {
        session
            .reply(state, ServerEvent::NewPerformance(performance.clone()))
            .await;
    }
    state
        .hub
        .dispatch(&[Channel::Coaches], &ServerEvent::NewPerformance(performance.clone()), None)
        .await;
    state
        .hub
        .dispatch(
            &[Channel::Coaches],
            &ServerEvent::NewPerformanceNotice(performance),
            Some(session.connection),
        )
        .await;
}

/// Close out unjudged earlier attempts for the same learner and activity
///
/// Read failures are logged and treated as "nothing unjudged" so the new
/// submission is still stored.
async fn defer_unjudged(state: &AppState, record: &NewPerformance) {
    let filter = PerformanceFilter::all()
        .user(&record.user_id)
        .post_slug(&record.post_slug);
    let prior = match state.store.select_performances(&filter).await {
        Ok(prior) => prior,
        Err(e) => {
            warn!(
                learner_id = %record.user_id,
                post_slug = %record.post_slug,
                "Could not load earlier performances, skipping deferral: {}",
                e
            );
            return;
        }
    };

    let candidates: Vec<RecordId> = prior
        .iter()
        .filter(|p| p.kind().is_evaluable())
        .map(|p| p.id)
        .collect();
    if candidates.is_empty() {
        return;
    }

    let judged: HashSet<RecordId> = match state
        .store
        .select_evaluations(&EvaluationFilter::all().performances(candidates.clone()))
        .await
    {
        Ok(evaluations) => evaluations.iter().map(|e| e.performance_id).collect(),
        Err(e) => {
            warn!(
                learner_id = %record.user_id,
                post_slug = %record.post_slug,
                "Could not load evaluations, skipping deferral: {}",
                e
            );
            return;
        }
    };

    for performance_id in candidates.into_iter().filter(|id| !judged.contains(id)) {
        let deferral = NewEvaluation::deferral(performance_id, &record.user_id);
        match state.store.insert_evaluation(deferral).await {
            Ok(evaluation) => {
                info!(
                    performance_id,
                    learner_id = %record.user_id,
                    post_slug = %record.post_slug,
                    "Deferred superseded performance"
                );
                dispatch_evaluation(state, evaluation, None).await;
            }
            Err(Error::Conflict(_)) => {
                warn!(performance_id, "Performance already deferred elsewhere");
            }
            Err(e) => {
                error!(performance_id, "Failed to store deferral: {}", e);
            }
        }
    }
}
