//! Cache behavior of the typed accessors: deduplicated reads and
//! mutation-driven invalidation

use std::sync::Arc;

use oculara_client::storage::{MemoryStore, TokenPair, TokenStore};
use oculara_client::{ApiConfig, AppState, FilePayload};
use oculara_domain::{CompleteExerciseRequest, SubmitTestRequest};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

async fn signed_in_state(server: &MockServer) -> AppState {
    let store = Arc::new(MemoryStore::new());
    let tokens = TokenStore::new(store.clone());
    tokens
        .set_pair(&TokenPair { access_token: "T1".into(), refresh_token: "R1".into() })
        .await
        .unwrap();
    let config = ApiConfig::builder().base_url(server.uri()).build();
    AppState::new(config, store).expect("client stack builds")
}

fn session_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "exerciseId": "e1",
        "userId": "u1",
        "duration": 5
    })
}

#[tokio::test]
async fn repeated_reads_resolve_from_one_request() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exercises"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let state = signed_in_state(&server).await;
    state.exercises().await.unwrap();
    state.exercises().await.unwrap();
    state.exercises().await.unwrap();
}

#[tokio::test]
async fn concurrent_reads_share_the_fetch() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tests"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([]))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = Arc::new(signed_in_state(&server).await);
    let a = { let s = Arc::clone(&state); tokio::spawn(async move { s.eye_tests().await }) };
    let b = { let s = Arc::clone(&state); tokio::spawn(async move { s.eye_tests().await }) };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
}

#[tokio::test]
async fn completing_an_exercise_invalidates_history_and_progress() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/exercises/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2) // initial read + refetch after invalidation
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exercises/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "totalSessions": 1,
            "totalDuration": 5,
            "averageScore": 0.9,
            "streak": 1
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/exercises/complete/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json("s1")))
        .expect(1)
        .mount(&server)
        .await;

    let state = signed_in_state(&server).await;
    state.exercise_history().await.unwrap();
    state.exercise_progress().await.unwrap();

    state
        .complete_exercise(
            "s1",
            &CompleteExerciseRequest { duration_sec: 300, score: Some(0.9), notes: None },
        )
        .await
        .unwrap();

    // Fresh within the staleness window, yet the invalidation forces a
    // refetch on the next access.
    state.exercise_history().await.unwrap();
    state.exercise_progress().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn submitting_a_test_invalidates_test_queries() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tests/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tests/submit/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "r1",
            "testId": "t1",
            "userId": "u1",
            "score": 18.0,
            "maxScore": 20.0,
            "percentage": 90.0,
            "createdAt": "2026-02-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = signed_in_state(&server).await;
    state.test_history().await.unwrap();
    state.submit_test("sess-1", &SubmitTestRequest { answers: vec![] }).await.unwrap();
    state.test_history().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn uploading_a_scan_invalidates_the_scan_list() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scans/user/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scans/upload"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "scan-1",
            "userId": "u1",
            "createdAt": "2026-02-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = signed_in_state(&server).await;
    state.scans("u1").await.unwrap();
    state.upload_scan(FilePayload::jpeg_image("eye.jpg", vec![1, 2, 3])).await.unwrap();
    state.scans("u1").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn sending_a_message_invalidates_conversation_queries() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chat/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {
                "id": "m1",
                "content": "Try the 20-20-20 rule.",
                "role": "assistant",
                "timestamp": "2026-02-01T10:00:00Z",
                "conversationId": "c1"
            },
            "conversationId": "c1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = signed_in_state(&server).await;
    state.chat_history().await.unwrap();
    let response = state.send_message("My eyes feel dry", Some("c1")).await.unwrap();
    assert_eq!(response.conversation_id, "c1");
    state.chat_history().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn transient_server_errors_retry_within_bounds() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/educations"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/educations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let state = signed_in_state(&server).await;
    let resources = state.education().await.unwrap();
    assert!(resources.is_empty());
}
