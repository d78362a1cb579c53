//! Record store abstraction and its SQLite implementation
//!
//! The real-time core only ever selects by filter and inserts; the purge
//! operation exists for the administrative endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{
    Evaluation, EvaluationStatus, NewEvaluation, NewPerformance, Performance, PerformancePayload,
    RecordId,
};
use crate::time::{from_millis, now, to_millis};
use crate::{Error, Result};

// ========================================
// Filters
// ========================================

/// Equality/range filter over performances; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceFilter {
    pub id: Option<RecordId>,
    pub user_id: Option<String>,
    pub post_slug: Option<String>,
    /// Strictly after this instant
    pub created_after: Option<DateTime<Utc>>,
}

impl PerformanceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn post_slug(mut self, post_slug: impl Into<String>) -> Self {
        self.post_slug = Some(post_slug.into());
        self
    }

    pub fn created_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_after = Some(cutoff);
        self
    }
}

/// Equality/membership filter over evaluations; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationFilter {
    pub learner_id: Option<String>,
    /// Restrict to evaluations of these performances (empty matches nothing)
    pub performance_ids: Option<Vec<RecordId>>,
}

impl EvaluationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn learner(mut self, learner_id: impl Into<String>) -> Self {
        self.learner_id = Some(learner_id.into());
        self
    }

    pub fn performances(mut self, ids: Vec<RecordId>) -> Self {
        self.performance_ids = Some(ids);
        self
    }
}

/// Rows removed by an administrative purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub performances: u64,
    pub evaluations: u64,
}

// ========================================
// Store trait
// ========================================

/// Durable storage for performances and evaluations
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Performances matching `filter`, oldest first
    async fn select_performances(&self, filter: &PerformanceFilter) -> Result<Vec<Performance>>;

    /// Insert and return the record with its id and timestamp
    async fn insert_performance(&self, record: NewPerformance) -> Result<Performance>;

    /// Evaluations matching `filter`, oldest first
    async fn select_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>>;

    /// Insert and return the record with its id and timestamp
    ///
    /// A second `deferred` evaluation for one performance fails with
    /// [`Error::Conflict`].
    async fn insert_evaluation(&self, record: NewEvaluation) -> Result<Evaluation>;

    /// Remove every performance for `post_slug` together with its evaluations
    async fn purge_post_slug(&self, post_slug: &str) -> Result<PurgeSummary>;
}

// ========================================
// SQLite implementation
// ========================================

/// [`RecordStore`] backed by a SQLite pool
///
/// Inserts are serialized through an in-process write clock so that
/// `created_at` never decreases in insert (id) order.
pub struct SqliteStore {
    pool: SqlitePool,
    last_created_ms: Mutex<i64>,
}

impl SqliteStore {
    /// Wrap a migrated pool, resuming the write clock from stored rows
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let last: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(ts) FROM (
                SELECT MAX(created_at) AS ts FROM performances
                UNION ALL
                SELECT MAX(created_at) AS ts FROM evaluations
            )
            "#,
        )
        .fetch_one(&pool)
        .await?;

        Ok(Self {
            pool,
            last_created_ms: Mutex::new(last.unwrap_or(0)),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn next_timestamp(last: &mut i64) -> i64 {
    let ts = to_millis(&now()).max(*last);
    *last = ts;
    ts
}

fn map_write_error(err: sqlx::Error, what: &str) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::Conflict(format!("{}: {}", what, db_err.message()))
        }
        _ => Error::Database(err),
    }
}

fn performance_from_row(row: &SqliteRow) -> Result<Performance> {
    let kind: String = row.try_get("type")?;
    let payload: String = row.try_get("payload")?;
    let body: serde_json::Value = serde_json::from_str(&payload)?;

    Ok(Performance {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        post_slug: row.try_get("post_slug")?,
        payload: PerformancePayload::from_parts(&kind, body)?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}

fn evaluation_from_row(row: &SqliteRow) -> Result<Evaluation> {
    let status: String = row.try_get("status")?;

    Ok(Evaluation {
        id: row.try_get("id")?,
        performance_id: row.try_get("performance_id")?,
        learner_id: row.try_get("learner_id")?,
        evaluator_id: row.try_get("evaluator_id")?,
        feedback: row.try_get("feedback")?,
        status: EvaluationStatus::from_str(&status)?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn select_performances(&self, filter: &PerformanceFilter) -> Result<Vec<Performance>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, user_id, post_slug, type, payload, created_at FROM performances WHERE 1 = 1",
        );
        if let Some(id) = filter.id {
            query.push(" AND id = ").push_bind(id);
        }
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(post_slug) = &filter.post_slug {
            query.push(" AND post_slug = ").push_bind(post_slug.clone());
        }
        if let Some(cutoff) = &filter.created_after {
            query.push(" AND created_at > ").push_bind(to_millis(cutoff));
        }
        query.push(" ORDER BY created_at ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(performance_from_row).collect()
    }

    async fn insert_performance(&self, record: NewPerformance) -> Result<Performance> {
        let body = serde_json::to_string(&record.payload.body_json()?)?;

        let mut clock = self.last_created_ms.lock().await;
        let created_ms = next_timestamp(&mut clock);

        let id: RecordId = sqlx::query_scalar(
            r#"
            INSERT INTO performances (user_id, post_slug, type, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.post_slug)
        .bind(record.payload.kind().as_str())
        .bind(&body)
        .bind(created_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "performance"))?;
        drop(clock);

        debug!(id, user_id = %record.user_id, post_slug = %record.post_slug, "Inserted performance");

        Ok(Performance {
            id,
            user_id: record.user_id,
            post_slug: record.post_slug,
            payload: record.payload,
            created_at: from_millis(created_ms),
        })
    }

    async fn select_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>> {
        if matches!(&filter.performance_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, performance_id, learner_id, evaluator_id, feedback, status, created_at FROM evaluations WHERE 1 = 1",
        );
        if let Some(learner_id) = &filter.learner_id {
            query.push(" AND learner_id = ").push_bind(learner_id.clone());
        }
        if let Some(ids) = &filter.performance_ids {
            query.push(" AND performance_id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        query.push(" ORDER BY created_at ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(evaluation_from_row).collect()
    }

    async fn insert_evaluation(&self, record: NewEvaluation) -> Result<Evaluation> {
        let mut clock = self.last_created_ms.lock().await;
        let created_ms = next_timestamp(&mut clock);

        let id: RecordId = sqlx::query_scalar(
            r#"
            INSERT INTO evaluations (performance_id, learner_id, evaluator_id, feedback, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(record.performance_id)
        .bind(&record.learner_id)
        .bind(&record.evaluator_id)
        .bind(&record.feedback)
        .bind(record.status.as_str())
        .bind(created_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "evaluation"))?;
        drop(clock);

        debug!(
            id,
            performance_id = record.performance_id,
            status = record.status.as_str(),
            "Inserted evaluation"
        );

        Ok(Evaluation {
            id,
            performance_id: record.performance_id,
            learner_id: record.learner_id,
            evaluator_id: record.evaluator_id,
            feedback: record.feedback,
            status: record.status,
            created_at: from_millis(created_ms),
        })
    }

    async fn purge_post_slug(&self, post_slug: &str) -> Result<PurgeSummary> {
        let mut tx = self.pool.begin().await?;

        let evaluations = sqlx::query(
            r#"
            DELETE FROM evaluations
            WHERE performance_id IN (SELECT id FROM performances WHERE post_slug = ?)
            "#,
        )
        .bind(post_slug)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let performances = sqlx::query("DELETE FROM performances WHERE post_slug = ?")
            .bind(post_slug)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(PurgeSummary {
            performances,
            evaluations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;

    async fn store() -> SqliteStore {
        let pool = init_memory_database().await.unwrap();
        SqliteStore::new(pool).await.unwrap()
    }

    fn submission(user: &str, slug: &str) -> NewPerformance {
        NewPerformance {
            user_id: user.to_string(),
            post_slug: slug.to_string(),
            payload: PerformancePayload::Submission {
                url: format!("https://example.com/{}/{}", user, slug),
            },
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_monotonic_timestamps() {
        let store = store().await;

        let mut previous: Option<Performance> = None;
        for _ in 0..5 {
            let perf = store.insert_performance(submission("ada", "project")).await.unwrap();
            if let Some(prev) = &previous {
                assert!(perf.id > prev.id);
                assert!(perf.created_at >= prev.created_at);
            }
            previous = Some(perf);
        }
    }

    #[tokio::test]
    async fn test_select_by_user_and_slug() {
        let store = store().await;
        store.insert_performance(submission("ada", "project")).await.unwrap();
        store.insert_performance(submission("ada", "essay")).await.unwrap();
        store.insert_performance(submission("bob", "project")).await.unwrap();

        let found = store
            .select_performances(&PerformanceFilter::all().user("ada").post_slug("project"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, "ada");
        assert_eq!(found[0].post_slug, "project");

        let all = store.select_performances(&PerformanceFilter::all()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_select_created_after_cutoff() {
        let store = store().await;
        let first = store.insert_performance(submission("ada", "a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.insert_performance(submission("ada", "b")).await.unwrap();

        let after = store
            .select_performances(&PerformanceFilter::all().created_after(first.created_at))
            .await
            .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].post_slug, "b");
    }

    #[tokio::test]
    async fn test_payload_survives_storage() {
        let store = store().await;
        let inserted = store
            .insert_performance(NewPerformance {
                user_id: "ada".to_string(),
                post_slug: "loops-q1".to_string(),
                payload: PerformancePayload::Question {
                    response: "iterate".to_string(),
                    prompt: "What is a loop?".to_string(),
                    original_post_slug: "loops".to_string(),
                    answer: Some("repeat".to_string()),
                },
            })
            .await
            .unwrap();

        let loaded = store
            .select_performances(&PerformanceFilter::all().id(inserted.id))
            .await
            .unwrap();
        assert_eq!(loaded, vec![inserted]);
    }

    #[tokio::test]
    async fn test_evaluation_filters() {
        let store = store().await;
        let ada = store.insert_performance(submission("ada", "project")).await.unwrap();
        let bob = store.insert_performance(submission("bob", "project")).await.unwrap();

        store
            .insert_evaluation(NewEvaluation {
                performance_id: ada.id,
                learner_id: "ada".to_string(),
                evaluator_id: "coach".to_string(),
                feedback: "good".to_string(),
                status: EvaluationStatus::Accepted,
            })
            .await
            .unwrap();
        store.insert_evaluation(NewEvaluation::deferral(bob.id, "bob")).await.unwrap();

        let for_ada = store.select_evaluations(&EvaluationFilter::all().learner("ada")).await.unwrap();
        assert_eq!(for_ada.len(), 1);
        assert_eq!(for_ada[0].status, EvaluationStatus::Accepted);

        let by_ids = store
            .select_evaluations(&EvaluationFilter::all().performances(vec![bob.id]))
            .await
            .unwrap();
        assert_eq!(by_ids.len(), 1);
        assert_eq!(by_ids[0].learner_id, "bob");

        let none = store
            .select_evaluations(&EvaluationFilter::all().performances(Vec::new()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_deferral_is_conflict() {
        let store = store().await;
        let perf = store.insert_performance(submission("ada", "project")).await.unwrap();

        store.insert_evaluation(NewEvaluation::deferral(perf.id, "ada")).await.unwrap();
        let second = store.insert_evaluation(NewEvaluation::deferral(perf.id, "ada")).await;
        assert!(matches!(second, Err(Error::Conflict(_))), "got {:?}", second);
    }

    #[tokio::test]
    async fn test_evaluation_for_missing_performance_fails() {
        let store = store().await;
        let result = store.insert_evaluation(NewEvaluation::deferral(999, "ada")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_purge_removes_slug_and_evaluations() {
        let store = store().await;
        let keep = store.insert_performance(submission("ada", "keep")).await.unwrap();
        let drop_me = store.insert_performance(submission("ada", "retired")).await.unwrap();
        store.insert_performance(submission("bob", "retired")).await.unwrap();
        store.insert_evaluation(NewEvaluation::deferral(drop_me.id, "ada")).await.unwrap();
        store.insert_evaluation(NewEvaluation::deferral(keep.id, "ada")).await.unwrap();

        let summary = store.purge_post_slug("retired").await.unwrap();
        assert_eq!(summary, PurgeSummary { performances: 2, evaluations: 1 });

        let remaining = store.select_performances(&PerformanceFilter::all()).await.unwrap();
        assert_eq!(remaining, vec![keep]);
        let evaluations = store.select_evaluations(&EvaluationFilter::all()).await.unwrap();
        assert_eq!(evaluations.len(), 1);
    }

    #[tokio::test]
    async fn test_clock_resumes_from_stored_rows() {
        let pool = init_memory_database().await.unwrap();
        let future_ms = to_millis(&now()) + 60_000;
        sqlx::query(
            "INSERT INTO performances (user_id, post_slug, type, payload, created_at) VALUES ('ada', 'p', 'view', '{\"confidenceLevel\":2}', ?)",
        )
        .bind(future_ms)
        .execute(&pool)
        .await
        .unwrap();

        let store = SqliteStore::new(pool).await.unwrap();
        let perf = store.insert_performance(submission("ada", "p")).await.unwrap();
        assert!(to_millis(&perf.created_at) >= future_ms);
    }
}
