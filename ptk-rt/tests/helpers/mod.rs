//! Shared test helpers for ptk-rt integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ptk_common::db::{init_memory_database, RecordStore, SqliteStore};
use ptk_common::events::{ClientEvent, ServerEvent};
use ptk_common::model::{Identity, PerformancePayload, RawPerformance, Role};
use ptk_rt::auth::JwtAuthenticator;
use ptk_rt::handlers::{self, Session};
use ptk_rt::AppState;
use tokio::sync::mpsc;

pub const SECRET: &str = "integration-secret-integration-secret";

pub fn cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn authenticator() -> JwtAuthenticator {
    JwtAuthenticator::new(SECRET).unwrap()
}

pub fn token_for(learner: &str, role: Role) -> String {
    authenticator()
        .generate_token(&Identity::new(learner, role))
        .unwrap()
}

pub async fn sqlite_store() -> Arc<SqliteStore> {
    let pool = init_memory_database().await.unwrap();
    Arc::new(SqliteStore::new(pool).await.unwrap())
}

/// State over a fresh in-memory store
pub async fn test_state() -> AppState {
    state_with_store(sqlite_store().await, cutoff())
}

pub fn state_with_store(store: Arc<dyn RecordStore>, coach_cutoff: DateTime<Utc>) -> AppState {
    AppState::new(store, Arc::new(authenticator()), coach_cutoff)
}

/// In-process connection: registered with the hub, outbound events collected
pub struct TestClient {
    pub session: Session,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestClient {
    pub async fn connect(state: &AppState, learner: &str, role: Role) -> Self {
        let identity = Identity::new(learner, role);
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = state.hub.register(identity.clone(), tx).await;
        Self {
            session: Session::new(connection, identity),
            rx,
        }
    }

    pub async fn send(&self, state: &AppState, event: ClientEvent) {
        handlers::handle_event(state, &self.session, event).await;
    }

    pub async fn send_frame(&self, state: &AppState, frame: &str) {
        handlers::handle_frame(state, &self.session, frame).await;
    }

    /// Everything delivered so far
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn drain_names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(|e| e.event_name()).collect()
    }
}

pub fn submission(slug: &str, url: &str) -> ClientEvent {
    ClientEvent::PostPerformance(RawPerformance {
        post_slug: slug.to_string(),
        payload: PerformancePayload::Submission {
            url: url.to_string(),
        },
    })
}

pub fn question(slug: &str, original: &str, response: &str) -> ClientEvent {
    ClientEvent::PostPerformance(RawPerformance {
        post_slug: slug.to_string(),
        payload: PerformancePayload::Question {
            response: response.to_string(),
            prompt: "Explain".to_string(),
            original_post_slug: original.to_string(),
            answer: None,
        },
    })
}

pub fn view(slug: &str) -> ClientEvent {
    ClientEvent::PostPerformance(RawPerformance {
        post_slug: slug.to_string(),
        payload: PerformancePayload::View { confidence_level: 3 },
    })
}
