//! Real-time wire events
//!
//! Every frame on the real-time connection is a JSON object of the form
//! `{"event": "<name>", "data": <payload>}`. Events without a payload omit
//! `data`.
//!
//! [`ClientEvent`] covers connection → server frames, [`ServerEvent`] covers
//! server → channel frames. Both are shared by the server and by consumers that
//! feed a [`crate::ledger::Ledger`].

use serde::{Deserialize, Serialize};

use crate::model::{
    Broadcast, BroadcastRequest, Evaluation, Performance, RawEvaluation, RawPerformance,
};

/// Frames sent by a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Record a learner performance (runs deferral enforcement)
    PostPerformance(RawPerformance),
    /// Record a coach evaluation
    PostEvaluation(RawEvaluation),
    /// Pull the performances visible to this connection
    ListPerformances,
    /// Pull the evaluations visible to this connection
    ListEvaluations,
    /// Coach starts (or replaces) the deployment-wide broadcast
    StartBroadcast(BroadcastRequest),
    /// Coach clears the deployment-wide broadcast
    EndBroadcast,
    /// Pull the current broadcast
    GetCurrentBroadcast,
}

impl ClientEvent {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::PostPerformance(_) => "post-performance",
            ClientEvent::PostEvaluation(_) => "post-evaluation",
            ClientEvent::ListPerformances => "list-performances",
            ClientEvent::ListEvaluations => "list-evaluations",
            ClientEvent::StartBroadcast(_) => "start-broadcast",
            ClientEvent::EndBroadcast => "end-broadcast",
            ClientEvent::GetCurrentBroadcast => "get-current-broadcast",
        }
    }
}

/// Frames pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    NewPerformance(Performance),
    /// Toast trigger for coaches
    NewPerformanceNotice(Performance),
    NewEvaluation(Evaluation),
    /// Toast trigger for the evaluated learner
    NewEvaluationNotice(Evaluation),
    /// Answer to `list-performances`
    ListPerformances(Vec<Performance>),
    /// Answer to `list-evaluations`
    ListEvaluations(Vec<Evaluation>),
    /// Broadcast started (`Some`) or ended (`None`)
    CurrentBroadcast(Option<Broadcast>),
    /// Rejection of a malformed or unauthorized frame, sent to the caller only
    Error { message: String },
}

impl ServerEvent {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::NewPerformance(_) => "new-performance",
            ServerEvent::NewPerformanceNotice(_) => "new-performance-notice",
            ServerEvent::NewEvaluation(_) => "new-evaluation",
            ServerEvent::NewEvaluationNotice(_) => "new-evaluation-notice",
            ServerEvent::ListPerformances(_) => "list-performances",
            ServerEvent::ListEvaluations(_) => "list-evaluations",
            ServerEvent::CurrentBroadcast(_) => "current-broadcast",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Learner whose record this event carries, if it carries exactly one
    ///
    /// Personal channels only ever receive events whose subject is their owner.
    pub fn subject_learner(&self) -> Option<&str> {
        match self {
            ServerEvent::NewPerformance(p) | ServerEvent::NewPerformanceNotice(p) => {
                Some(&p.user_id)
            }
            ServerEvent::NewEvaluation(e) | ServerEvent::NewEvaluationNotice(e) => {
                Some(&e.learner_id)
            }
            _ => None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}
