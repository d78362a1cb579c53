//! Record types for performances, evaluations and coach broadcasts
//!
//! Field names serialize in camelCase to match the wire protocol consumed by
//! browser clients (`userId`, `postSlug`, `createdAt`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Store-assigned record identifier
pub type RecordId = i64;

/// Name of the channel every coach connection joins
pub const COACHES_CHANNEL: &str = "coaches";

/// Evaluator identity used for evaluations generated by the server itself
pub const SYSTEM_EVALUATOR_ID: &str = "system@ptk";

/// Feedback attached to auto-generated deferrals
pub const DEFERRED_FEEDBACK: &str =
    "A newer attempt was submitted before this one was reviewed, so it will not be graded.";

// ========================================
// Identity
// ========================================

/// Role carried by a verified connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Coach,
}

impl Role {
    pub fn is_coach(self) -> bool {
        matches!(self, Role::Coach)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Coach => "coach",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified `{ learnerId, role }` pair for one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub learner_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(learner_id: impl Into<String>, role: Role) -> Self {
        Self {
            learner_id: learner_id.into(),
            role,
        }
    }

    pub fn is_coach(&self) -> bool {
        self.role.is_coach()
    }
}

// ========================================
// Performances
// ========================================

/// Discriminant of a performance payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceType {
    View,
    Submission,
    Question,
    Prompt,
}

impl PerformanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceType::View => "view",
            PerformanceType::Submission => "submission",
            PerformanceType::Question => "question",
            PerformanceType::Prompt => "prompt",
        }
    }

    /// Whether performances of this type wait for a coach verdict.
    ///
    /// Only evaluable types take part in deferral.
    pub fn is_evaluable(self) -> bool {
        matches!(self, PerformanceType::Submission | PerformanceType::Question)
    }
}

impl FromStr for PerformanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(PerformanceType::View),
            "submission" => Ok(PerformanceType::Submission),
            "question" => Ok(PerformanceType::Question),
            "prompt" => Ok(PerformanceType::Prompt),
            other => Err(Error::InvalidInput(format!("unknown performance type '{}'", other))),
        }
    }
}

/// Type-specific performance data, tagged by `type` with fields under `payload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum PerformancePayload {
    /// Learner viewed an activity and rated their confidence
    View {
        #[serde(rename = "confidenceLevel")]
        confidence_level: u8,
    },
    /// Learner submitted a link to their work
    Submission { url: String },
    /// Learner answered a question embedded in an activity
    Question {
        response: String,
        prompt: String,
        /// Activity the question belongs to (the performance's own slug is the question's)
        #[serde(rename = "originalPostSlug")]
        original_post_slug: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
    },
    /// Learner responded to a free-form prompt
    Prompt { response: String, prompt: String },
}

impl PerformancePayload {
    pub fn kind(&self) -> PerformanceType {
        match self {
            PerformancePayload::View { .. } => PerformanceType::View,
            PerformancePayload::Submission { .. } => PerformanceType::Submission,
            PerformancePayload::Question { .. } => PerformanceType::Question,
            PerformancePayload::Prompt { .. } => PerformanceType::Prompt,
        }
    }

    /// The inner `payload` object alone, as stored in the payload column
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuild a payload from its stored `type` and `payload` columns
    pub fn from_parts(kind: &str, body: serde_json::Value) -> crate::Result<Self> {
        let kind = PerformanceType::from_str(kind)?;
        let tagged = serde_json::json!({ "type": kind.as_str(), "payload": body });
        Ok(serde_json::from_value(tagged)?)
    }

    /// Originating activity slug for question responses
    pub fn original_post_slug(&self) -> Option<&str> {
        match self {
            PerformancePayload::Question {
                original_post_slug, ..
            } => Some(original_post_slug),
            _ => None,
        }
    }
}

/// A stored performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub id: RecordId,
    pub user_id: String,
    pub post_slug: String,
    #[serde(flatten)]
    pub payload: PerformancePayload,
    pub created_at: DateTime<Utc>,
}

impl Performance {
    pub fn kind(&self) -> PerformanceType {
        self.payload.kind()
    }
}

/// Performance as sent by a client (`post-performance`).
///
/// Any `userId` in the frame is ignored; the connection identity is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPerformance {
    pub post_slug: String,
    #[serde(flatten)]
    pub payload: PerformancePayload,
}

/// Performance ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewPerformance {
    pub user_id: String,
    pub post_slug: String,
    pub payload: PerformancePayload,
}

impl NewPerformance {
    pub fn from_raw(user_id: impl Into<String>, raw: RawPerformance) -> Self {
        Self {
            user_id: user_id.into(),
            post_slug: raw.post_slug,
            payload: raw.payload,
        }
    }
}

// ========================================
// Evaluations
// ========================================

/// Verdict attached to a performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Accepted,
    Rejected,
    /// Superseded by a newer attempt before being graded
    Deferred,
}

impl EvaluationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationStatus::Accepted => "accepted",
            EvaluationStatus::Rejected => "rejected",
            EvaluationStatus::Deferred => "deferred",
        }
    }
}

impl FromStr for EvaluationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(EvaluationStatus::Accepted),
            "rejected" => Ok(EvaluationStatus::Rejected),
            "deferred" => Ok(EvaluationStatus::Deferred),
            other => Err(Error::InvalidInput(format!("unknown evaluation status '{}'", other))),
        }
    }
}

/// A stored evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: RecordId,
    pub performance_id: RecordId,
    pub learner_id: String,
    pub evaluator_id: String,
    pub feedback: String,
    pub status: EvaluationStatus,
    pub created_at: DateTime<Utc>,
}

/// Evaluation as sent by a coach (`post-evaluation`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvaluation {
    pub performance_id: RecordId,
    pub learner_id: String,
    /// Ignored by the server in favour of the acting connection's identity
    #[serde(default)]
    pub evaluator_id: Option<String>,
    #[serde(default)]
    pub feedback: String,
    pub status: EvaluationStatus,
}

/// Evaluation ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvaluation {
    pub performance_id: RecordId,
    pub learner_id: String,
    pub evaluator_id: String,
    pub feedback: String,
    pub status: EvaluationStatus,
}

impl NewEvaluation {
    /// System deferral closing out an unjudged performance
    pub fn deferral(performance_id: RecordId, learner_id: impl Into<String>) -> Self {
        Self {
            performance_id,
            learner_id: learner_id.into(),
            evaluator_id: SYSTEM_EVALUATOR_ID.to_string(),
            feedback: DEFERRED_FEEDBACK.to_string(),
            status: EvaluationStatus::Deferred,
        }
    }
}

// ========================================
// Coach broadcast
// ========================================

/// Prompt a coach pushes to every connected session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub post_slug: String,
    pub prompt: String,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
}

/// Client request to start a broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub post_slug: String,
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_performance_wire_shape() {
        let perf = Performance {
            id: 7,
            user_id: "ada@example.com".to_string(),
            post_slug: "loops-quiz-q1".to_string(),
            payload: PerformancePayload::Question {
                response: "a for loop".to_string(),
                prompt: "How do you iterate?".to_string(),
                original_post_slug: "loops".to_string(),
                answer: None,
            },
            created_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let value = serde_json::to_value(&perf).unwrap();
        assert_eq!(value["userId"], "ada@example.com");
        assert_eq!(value["postSlug"], "loops-quiz-q1");
        assert_eq!(value["type"], "question");
        assert_eq!(value["payload"]["originalPostSlug"], "loops");
        assert!(value["payload"].get("answer").is_none());
        assert!(value["createdAt"].is_string());

        let back: Performance = serde_json::from_value(value).unwrap();
        assert_eq!(back, perf);
    }

    #[test]
    fn test_raw_performance_ignores_user_id() {
        let raw: RawPerformance = serde_json::from_value(json!({
            "userId": "mallory@example.com",
            "postSlug": "intro",
            "type": "view",
            "payload": { "confidenceLevel": 3 }
        }))
        .unwrap();

        let new = NewPerformance::from_raw("ada@example.com", raw);
        assert_eq!(new.user_id, "ada@example.com");
        assert_eq!(new.payload, PerformancePayload::View { confidence_level: 3 });
    }

    #[test]
    fn test_payload_shape_fixed_per_type() {
        // A submission must carry a url
        let result: Result<RawPerformance, _> = serde_json::from_value(json!({
            "postSlug": "project-1",
            "type": "submission",
            "payload": { "response": "oops" }
        }));
        assert!(result.is_err());

        let result: Result<RawPerformance, _> = serde_json::from_value(json!({
            "postSlug": "project-1",
            "type": "essay",
            "payload": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_parts_round_trip() {
        let payload = PerformancePayload::Prompt {
            response: "I learned ownership".to_string(),
            prompt: "What did you learn?".to_string(),
        };
        let body = payload.body_json().unwrap();
        assert_eq!(body, json!({ "response": "I learned ownership", "prompt": "What did you learn?" }));

        let rebuilt = PerformancePayload::from_parts("prompt", body).unwrap();
        assert_eq!(rebuilt, payload);

        assert!(PerformancePayload::from_parts("dance", json!({})).is_err());
    }

    #[test]
    fn test_evaluable_types() {
        assert!(PerformanceType::Submission.is_evaluable());
        assert!(PerformanceType::Question.is_evaluable());
        assert!(!PerformanceType::View.is_evaluable());
        assert!(!PerformanceType::Prompt.is_evaluable());
    }

    #[test]
    fn test_deferral_defaults() {
        let eval = NewEvaluation::deferral(12, "ada@example.com");
        assert_eq!(eval.status, EvaluationStatus::Deferred);
        assert_eq!(eval.evaluator_id, SYSTEM_EVALUATOR_ID);
        assert_eq!(eval.feedback, DEFERRED_FEEDBACK);
        assert_eq!(eval.learner_id, "ada@example.com");
    }

    #[test]
    fn test_raw_evaluation_defaults() {
        let raw: RawEvaluation = serde_json::from_value(json!({
            "performanceId": 4,
            "learnerId": "ada@example.com",
            "status": "accepted"
        }))
        .unwrap();
        assert_eq!(raw.feedback, "");
        assert!(raw.evaluator_id.is_none());
        assert_eq!(raw.status, EvaluationStatus::Accepted);
    }
}
