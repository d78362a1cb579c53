//! End-to-end tests over a real WebSocket connection

mod helpers;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use helpers::*;
use ptk_common::events::{ClientEvent, ServerEvent};
use ptk_common::model::Role;
use ptk_rt::{build_router, AppState};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

async fn connect(url: &str, learner: &str, role: Role) -> Socket {
    let (socket, _) = connect_async(format!("{}?token={}", url, token_for(learner, role)))
        .await
        .expect("WebSocket connect");
    socket
}

async fn send(socket: &mut Socket, event: &ClientEvent) {
    let text = serde_json::to_string(event).unwrap();
    socket.send(Message::Text(text)).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("server frame decodes");
        }
    }
}

/// Wait until the hub has registered `expected` connections
async fn wait_for_connections(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.hub.connection_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {} connections", expected);
}

#[tokio::test]
async fn test_unauthenticated_upgrade_rejected() {
    let state = test_state().await;
    let url = serve(state.clone()).await;

    let result = connect_async(format!("{}?token=bogus", url)).await;
    assert!(result.is_err());
    assert_eq!(state.hub.connection_count().await, 0);
}

#[tokio::test]
async fn test_submission_round_trip_over_socket() {
    let state = test_state().await;
    let url = serve(state.clone()).await;

    let mut coach = connect(&url, "coach@example.com", Role::Coach).await;
    let mut ada = connect(&url, "ada@example.com", Role::Learner).await;
    wait_for_connections(&state, 2).await;

    send(&mut ada, &submission("project", "https://v1")).await;

    let mine = next_event(&mut ada).await;
    let performance = match mine {
        ServerEvent::NewPerformance(p) => p,
        other => panic!("unexpected: {:?}", other),
    };
    assert_eq!(performance.user_id, "ada@example.com");

    assert_eq!(
        next_event(&mut coach).await,
        ServerEvent::NewPerformance(performance.clone())
    );
    assert_eq!(
        next_event(&mut coach).await,
        ServerEvent::NewPerformanceNotice(performance)
    );
}

#[tokio::test]
async fn test_frames_handled_in_order() {
    let state = test_state().await;
    let url = serve(state.clone()).await;
    let mut ada = connect(&url, "ada@example.com", Role::Learner).await;
    wait_for_connections(&state, 1).await;

    send(&mut ada, &submission("project", "https://v1")).await;
    send(&mut ada, &ClientEvent::ListPerformances).await;

    assert_eq!(next_event(&mut ada).await.event_name(), "new-performance");
    match next_event(&mut ada).await {
        ServerEvent::ListPerformances(list) => assert_eq!(list.len(), 1),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_frame_gets_error_event() {
    let state = test_state().await;
    let url = serve(state.clone()).await;
    let mut ada = connect(&url, "ada@example.com", Role::Learner).await;
    wait_for_connections(&state, 1).await;

    ada.send(Message::Text(r#"{"event":"shout"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(next_event(&mut ada).await.event_name(), "error");
}

#[tokio::test]
async fn test_disconnect_unregisters() {
    let state = test_state().await;
    let url = serve(state.clone()).await;
    let mut ada = connect(&url, "ada@example.com", Role::Learner).await;
    wait_for_connections(&state, 1).await;

    ada.close(None).await.unwrap();
    wait_for_connections(&state, 0).await;
}
