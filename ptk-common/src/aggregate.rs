//! Aggregation engine
//!
//! Derives every read-side view (grading queue, per-learner standing, daily
//! activity) from the flat performance and evaluation streams. All functions
//! here are pure: same input, same output, no shared state. Clients recompute
//! the full [`Aggregates`] on every stream change.
//!
//! Ordering conventions:
//! - "most recent" means greatest `createdAt`, ties broken by greatest `id`
//!   (ids are assigned in insert order)
//! - map keys (slugs, learner ids, day keys) iterate in ascending order
//! - when several evaluations reference one performance, the most recent wins

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::model::{Evaluation, Performance, PerformanceType, RecordId};
use crate::time::day_key;

/// Performances grouped by a string key
pub type Grouped = BTreeMap<String, Vec<Performance>>;

/// slug → learner → most recent performance
pub type LastBySlugByLearner = BTreeMap<String, BTreeMap<String, Performance>>;

/// activity slug → learner → question slug → most recent performance
pub type LastBySlugByLearnerByQuestion =
    BTreeMap<String, BTreeMap<String, BTreeMap<String, Performance>>>;

/// A performance paired with its evaluation, if one exists yet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceWithEvaluation {
    pub performance: Performance,
    pub evaluation: Option<Evaluation>,
}

/// One activity's slice of the grading queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingActivity {
    /// Originating activity slug
    pub post_slug: String,
    /// Number of unevaluated question responses for the activity
    pub outstanding: usize,
    /// Unevaluated responses per learner, most recent first
    pub by_learner: BTreeMap<String, Vec<Performance>>,
}

/// Descending recency: newest first
fn newest_first(a: &Performance, b: &Performance) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

fn is_newer_evaluation(candidate: &Evaluation, current: &Evaluation) -> bool {
    (candidate.created_at, candidate.id) > (current.created_at, current.id)
}

/// Index evaluations by the performance they judge (most recent per performance)
pub fn evaluation_index(evaluations: &[Evaluation]) -> HashMap<RecordId, Evaluation> {
    let mut index: HashMap<RecordId, Evaluation> = HashMap::new();
    for evaluation in evaluations {
        match index.get(&evaluation.performance_id) {
            Some(current) if !is_newer_evaluation(evaluation, current) => {}
            _ => {
                index.insert(evaluation.performance_id, evaluation.clone());
            }
        }
    }
    index
}

/// Left join of performances to their evaluation, in performance stream order
pub fn performances_with_evaluations(
    performances: &[Performance],
    evaluations: &[Evaluation],
) -> Vec<PerformanceWithEvaluation> {
    let index = evaluation_index(evaluations);
    performances
        .iter()
        .map(|performance| PerformanceWithEvaluation {
            evaluation: index.get(&performance.id).cloned(),
            performance: performance.clone(),
        })
        .collect()
}

/// Group by UTC calendar day (`yyyy/mm/dd`), stream order preserved within a day
pub fn performances_by_day(performances: &[Performance]) -> Grouped {
    let mut by_day = Grouped::new();
    for performance in performances {
        by_day
            .entry(day_key(&performance.created_at))
            .or_default()
            .push(performance.clone());
    }
    by_day
}

/// Group by `postSlug`, each group newest first
pub fn sorted_performances_by_slug(performances: &[Performance]) -> Grouped {
    let mut by_slug = Grouped::new();
    for performance in performances {
        by_slug
            .entry(performance.post_slug.clone())
            .or_default()
            .push(performance.clone());
    }
    for group in by_slug.values_mut() {
        group.sort_by(newest_first);
    }
    by_slug
}

/// Most recent performance per `(postSlug, userId)`, from the sorted slug groups
pub fn last_performance_by_slug_by_learner(sorted_by_slug: &Grouped) -> LastBySlugByLearner {
    sorted_by_slug
        .iter()
        .map(|(slug, group)| {
            let mut by_learner = BTreeMap::new();
            // Groups are newest first, so the first hit per learner is the latest
            for performance in group {
                by_learner
                    .entry(performance.user_id.clone())
                    .or_insert_with(|| performance.clone());
            }
            (slug.clone(), by_learner)
        })
        .collect()
}

/// Question responses regrouped by the activity they belong to, newest first
pub fn performances_by_question(performances: &[Performance]) -> Grouped {
    let mut by_activity = Grouped::new();
    for performance in performances {
        if let Some(activity) = performance.payload.original_post_slug() {
            by_activity
                .entry(activity.to_string())
                .or_default()
                .push(performance.clone());
        }
    }
    for group in by_activity.values_mut() {
        group.sort_by(newest_first);
    }
    by_activity
}

/// activity → learner → question slug → most recent response
///
/// Expects groups ordered as [`performances_by_question`] returns them.
pub fn last_question_performances_by_slug_by_learner_by_question(
    by_question: &Grouped,
) -> LastBySlugByLearnerByQuestion {
    let mut tree = LastBySlugByLearnerByQuestion::new();
    for (activity, group) in by_question {
        let by_learner = tree.entry(activity.clone()).or_default();
        // Groups are newest first, so the first hit per question is the latest
        for performance in group {
            by_learner
                .entry(performance.user_id.clone())
                .or_default()
                .entry(performance.post_slug.clone())
                .or_insert_with(|| performance.clone());
        }
    }
    tree
}

/// Grading queue: unevaluated question responses by activity, then learner
///
/// Activities with the most outstanding responses come first; equal counts
/// fall back to ascending slug.
pub fn unevaluated_question_performances_by_slug_by_learner(
    performances: &[Performance],
    evaluations: &[Evaluation],
) -> Vec<OutstandingActivity> {
    let index = evaluation_index(evaluations);
    let mut by_activity: BTreeMap<String, BTreeMap<String, Vec<Performance>>> = BTreeMap::new();

    for performance in performances {
        if performance.kind() != PerformanceType::Question || index.contains_key(&performance.id) {
            continue;
        }
        let Some(activity) = performance.payload.original_post_slug() else {
            continue;
        };
        by_activity
            .entry(activity.to_string())
            .or_default()
            .entry(performance.user_id.clone())
            .or_default()
            .push(performance.clone());
    }

    let mut queue: Vec<OutstandingActivity> = by_activity
        .into_iter()
        .map(|(post_slug, mut by_learner)| {
            for responses in by_learner.values_mut() {
                responses.sort_by(newest_first);
            }
            OutstandingActivity {
                outstanding: by_learner.values().map(Vec::len).sum(),
                post_slug,
                by_learner,
            }
        })
        .collect();

    queue.sort_by(|a, b| {
        b.outstanding
            .cmp(&a.outstanding)
            .then_with(|| a.post_slug.cmp(&b.post_slug))
    });
    queue
}

/// Every derived view, recomputed together
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub performances_with_evaluations: Vec<PerformanceWithEvaluation>,
    pub performances_by_day: Grouped,
    pub sorted_performances_by_slug: Grouped,
    pub last_performance_by_slug_by_learner: LastBySlugByLearner,
    pub performances_by_question: Grouped,
    pub last_question_performances_by_slug_by_learner_by_question: LastBySlugByLearnerByQuestion,
    pub unevaluated_question_performances_by_slug_by_learner: Vec<OutstandingActivity>,
    #[serde(skip)]
    evaluations_by_performance: HashMap<RecordId, Evaluation>,
}

impl Aggregates {
    pub fn compute(performances: &[Performance], evaluations: &[Evaluation]) -> Self {
        let sorted_performances_by_slug = sorted_performances_by_slug(performances);
        let performances_by_question = performances_by_question(performances);

        Self {
            performances_with_evaluations: performances_with_evaluations(performances, evaluations),
            performances_by_day: performances_by_day(performances),
            last_performance_by_slug_by_learner: last_performance_by_slug_by_learner(
                &sorted_performances_by_slug,
            ),
            last_question_performances_by_slug_by_learner_by_question:
                last_question_performances_by_slug_by_learner_by_question(
                    &performances_by_question,
                ),
            unevaluated_question_performances_by_slug_by_learner:
                unevaluated_question_performances_by_slug_by_learner(performances, evaluations),
            evaluations_by_performance: evaluation_index(evaluations),
            sorted_performances_by_slug,
            performances_by_question,
        }
    }

    /// Evaluation currently attached to a performance
    pub fn evaluation_for(&self, performance_id: RecordId) -> Option<&Evaluation> {
        self.evaluations_by_performance.get(&performance_id)
    }

    /// Latest performance of a learner on an activity, with its verdict
    pub fn standing(&self, post_slug: &str, learner_id: &str) -> Option<PerformanceWithEvaluation> {
        let performance = self
            .last_performance_by_slug_by_learner
            .get(post_slug)?
            .get(learner_id)?;
        Some(PerformanceWithEvaluation {
            evaluation: self.evaluation_for(performance.id).cloned(),
            performance: performance.clone(),
        })
    }

    /// Latest response to one question, as queried by the grading indicator
    pub fn last_question_performance(
        &self,
        activity_slug: &str,
        learner_id: &str,
        question_slug: &str,
    ) -> Option<&Performance> {
        self.last_question_performances_by_slug_by_learner_by_question
            .get(activity_slug)?
            .get(learner_id)?
            .get(question_slug)
    }

    /// Total unevaluated question responses across all activities
    pub fn outstanding_total(&self) -> usize {
        self.unevaluated_question_performances_by_slug_by_learner
            .iter()
            .map(|activity| activity.outstanding)
            .sum()
    }
}
