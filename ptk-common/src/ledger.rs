//! Client-side record ledger
//!
//! Holds the locally known performance and evaluation streams, folds incoming
//! [`ServerEvent`]s into them and keeps the derived [`Aggregates`] current.
//! Records are deduplicated by id, so overlapping `list-*` answers and pushed
//! `new-*` events can arrive in any order.

use std::collections::HashSet;

use crate::aggregate::Aggregates;
use crate::events::ServerEvent;
use crate::model::{Broadcast, Evaluation, Performance, RecordId};

#[derive(Debug, Default)]
pub struct Ledger {
    performances: Vec<Performance>,
    performance_ids: HashSet<RecordId>,
    evaluations: Vec<Evaluation>,
    evaluation_ids: HashSet<RecordId>,
    broadcast: Option<Broadcast>,
    aggregates: Aggregates,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server event in; returns whether derived views changed
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        let changed = match event {
            ServerEvent::NewPerformance(performance) => self.add_performance(performance),
            ServerEvent::NewEvaluation(evaluation) => self.add_evaluation(evaluation),
            ServerEvent::ListPerformances(performances) => performances
                .iter()
                .fold(false, |changed, p| self.add_performance(p) || changed),
            ServerEvent::ListEvaluations(evaluations) => evaluations
                .iter()
                .fold(false, |changed, e| self.add_evaluation(e) || changed),
            ServerEvent::CurrentBroadcast(broadcast) => {
                self.broadcast = broadcast.clone();
                false
            }
            // Notices and errors only drive UI feedback
            ServerEvent::NewPerformanceNotice(_)
            | ServerEvent::NewEvaluationNotice(_)
            | ServerEvent::Error { .. } => false,
        };

        if changed {
            self.aggregates = Aggregates::compute(&self.performances, &self.evaluations);
        }
        changed
    }

    fn add_performance(&mut self, performance: &Performance) -> bool {
        if !self.performance_ids.insert(performance.id) {
            return false;
        }
        self.performances.push(performance.clone());
        true
    }

    fn add_evaluation(&mut self, evaluation: &Evaluation) -> bool {
        if !self.evaluation_ids.insert(evaluation.id) {
            return false;
        }
        self.evaluations.push(evaluation.clone());
        true
    }

    pub fn performances(&self) -> &[Performance] {
        &self.performances
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn current_broadcast(&self) -> Option<&Broadcast> {
        self.broadcast.as_ref()
    }
}
