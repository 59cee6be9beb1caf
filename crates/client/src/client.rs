//! Authenticated request pipeline
//!
//! Wraps the transport with bearer-token attachment and 401 recovery:
//! a 401 triggers at most one token refresh followed by a replay of the
//! original request. Concurrent refresh attempts are coalesced so two
//! requests failing at the same time produce a single refresh call.
//!
//! Per-request state machine:
//! `INIT -> DISPATCHED -> {SUCCESS | 401 -> REFRESHING -> {RETRIED ->
//! SUCCESS|FAILURE} | HTTP_FAILURE | NETWORK_FAILURE}`

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use oculara_domain::{RefreshRequest, RefreshResponse};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::http::{FilePayload, HttpTransport, Payload, RequestDescriptor};
use crate::storage::{TokenPair, TokenStore};

/// Auth session state, observable through [`ApiClient::session_watch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    SignedIn,
}

/// Authenticated API client
pub struct ApiClient {
    transport: HttpTransport,
    tokens: TokenStore,
    refresh_rotation: bool,
    /// Serializes refresh attempts; see [`Self::refresh_access_token`]
    refresh_gate: tokio::sync::Mutex<()>,
    session_tx: watch::Sender<SessionStatus>,
}

impl ApiClient {
    /// Create a client over the given token store
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the transport cannot be built
    pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config)?;
        let (session_tx, _) = watch::channel(SessionStatus::SignedOut);

        Ok(Self {
            transport,
            tokens,
            refresh_rotation: config.refresh_rotation,
            refresh_gate: tokio::sync::Mutex::new(()),
            session_tx,
        })
    }

    /// Observe session transitions. The channel flips to `SignedOut`
    /// whenever the pipeline clears tokens, signalling consumers to
    /// route to the sign-in flow.
    pub fn session_watch(&self) -> watch::Receiver<SessionStatus> {
        self.session_tx.subscribe()
    }

    pub(crate) fn mark_signed_in(&self) {
        self.session_tx.send_replace(SessionStatus::SignedIn);
    }

    pub(crate) fn mark_signed_out(&self) {
        self.session_tx.send_replace(SessionStatus::SignedOut);
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(RequestDescriptor::new(Method::GET, path, Payload::Empty)).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(RequestDescriptor::new(Method::POST, path, json_payload(body)?)).await
    }

    /// POST without a request body (e.g., `/exercises/start/{id}`)
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(RequestDescriptor::new(Method::POST, path, Payload::Empty)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(RequestDescriptor::new(Method::PUT, path, json_payload(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(RequestDescriptor::new(Method::DELETE, path, Payload::Empty)).await
    }

    /// Multipart file upload (e.g., `/scans/upload`)
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        file: FilePayload,
    ) -> Result<T, ApiError> {
        self.execute(RequestDescriptor::new(Method::POST, path, Payload::Multipart(file))).await
    }

    /// Dispatch a descriptor with the current credentials, refreshing and
    /// replaying exactly once on 401.
    async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = self.transport.dispatch(&descriptor, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return parse_response(response).await;
        }

        // A 401 on a request that never carried credentials (bad login,
        // expired invite) is the server's answer, not a stale session.
        let Some(stale) = token else {
            return parse_response(response).await;
        };

        debug!(path = %descriptor.path, "401 received, attempting token refresh");
        let fresh = self.refresh_access_token(stale).await?;

        let retry = self.transport.dispatch(&descriptor, Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            // The refreshed token was itself rejected. One replay per
            // request, so the session ends here rather than looping.
            self.tokens.clear().await?;
            self.mark_signed_out();
            warn!(path = %descriptor.path, "request rejected after token refresh, signing out");
            return Err(ApiError::Auth("request rejected after token refresh".into()));
        }

        parse_response(retry).await
    }

    /// Obtain a fresh access token, coalescing concurrent attempts.
    ///
    /// `stale` is the token the failed request was sent with. All callers
    /// queue on the gate; whoever enters first performs the actual
    /// refresh, and the rest observe the changed token on re-read and
    /// reuse it without issuing a second refresh call.
    async fn refresh_access_token(&self, stale: String) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.tokens.access_token().await? {
            if stale != current {
                debug!("reusing token refreshed by a concurrent request");
                return Ok(current);
            }
        }

        let refresh_token = self
            .tokens
            .refresh_token()
            .await?
            .ok_or_else(|| ApiError::Auth("no refresh token".into()))?;

        let body = RefreshRequest { refresh_token };
        let descriptor =
            RequestDescriptor::new(Method::POST, "/auth/refresh", json_payload(&body)?);

        // Unauthenticated call. Transport failures propagate as-is and
        // leave tokens in place; only a server-side rejection ends the
        // session.
        let response = self.transport.dispatch(&descriptor, None).await?;
        let status = response.status();
        if !status.is_success() {
            self.tokens.clear().await?;
            self.mark_signed_out();
            warn!(%status, "token refresh rejected, clearing session");
            return Err(ApiError::Auth(format!("refresh failed with status {status}")));
        }

        let refreshed: RefreshResponse = parse_response(response).await?;
        match refreshed.refresh_token.filter(|_| self.refresh_rotation) {
            Some(rotated) => {
                self.tokens
                    .set_pair(&TokenPair {
                        access_token: refreshed.token.clone(),
                        refresh_token: rotated,
                    })
                    .await?;
            }
            None => self.tokens.set_access_token(&refreshed.token).await?,
        }

        info!("access token refreshed");
        Ok(refreshed.token)
    }
}

fn json_payload<B: Serialize>(body: &B) -> Result<Payload, ApiError> {
    serde_json::to_value(body)
        .map(Payload::Json)
        .map_err(|e| ApiError::Parse(format!("failed to serialize request body: {e}")))
}

/// Turn a response into a typed value or an `Http` error carrying the
/// parsed server payload. 204/205 deserialize from JSON null.
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let body: Option<serde_json::Value> = serde_json::from_str(&text).ok();
        let message = body
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(text);
        return Err(ApiError::Http { status: status.as_u16(), message, body });
    }

    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return from_null();
    }

    let bytes = response.bytes().await.map_err(|e| ApiError::Network(e.to_string()))?;
    if bytes.is_empty() {
        return from_null();
    }

    serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
}

fn from_null<T: DeserializeOwned>() -> Result<T, ApiError> {
    serde_json::from_value(serde_json::Value::Null)
        .map_err(|_| ApiError::Parse("empty response cannot populate the expected type".into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde::Deserialize;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::MemoryStore;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        message: String,
    }

    fn token_store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStore::new()))
    }

    async fn client_for(server: &MockServer, tokens: TokenStore) -> ApiClient {
        let config = ApiConfig::builder()
            .base_url(server.uri())
            .timeout(Duration::from_secs(2))
            .build();
        ApiClient::new(&config, tokens).unwrap()
    }

    async fn signed_in_store() -> TokenStore {
        let tokens = token_store();
        tokens
            .set_pair(&TokenPair { access_token: "T1".into(), refresh_token: "R1".into() })
            .await
            .unwrap();
        tokens
    }

    #[tokio::test]
    async fn unauthenticated_request_has_no_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/educations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server, token_store()).await;
        let _: Vec<serde_json::Value> = client.get("/educations").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn unauthenticated_401_surfaces_without_a_refresh_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"message": "invalid credentials"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, token_store()).await;
        let result: Result<Pong, _> =
            client.post("/auth/login", &serde_json::json!({"email": "x"})).await;

        match result {
            Err(ApiError::Http { status, message, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid credentials");
            }
            other => panic!("expected the raw 401, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bearer_token_attached_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "hi"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store().await).await;
        let pong: Pong = client.get("/users/profile").await.unwrap();
        assert_eq!(pong.message, "hi");
    }

    #[tokio::test]
    async fn refresh_and_replay_on_401() {
        let server = MockServer::start().await;

        // Old token rejected once.
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(serde_json::json!({"refreshToken": "R1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "T2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        // Replay with the fresh token succeeds.
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header("Authorization", "Bearer T2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let client = client_for(&server, tokens.clone()).await;

        let pong: Pong = client.get("/users/profile").await.unwrap();
        assert_eq!(pong.message, "ok");

        // New access token persisted, refresh token reused.
        assert_eq!(tokens.access_token().await.unwrap(), Some("T2".to_string()));
        assert_eq!(tokens.refresh_token().await.unwrap(), Some("R1".to_string()));
    }

    #[tokio::test]
    async fn rejected_refresh_clears_tokens_and_fails_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let client = client_for(&server, tokens.clone()).await;
        let mut session = client.session_watch();

        let result: Result<Pong, _> = client.get("/users/profile").await;
        assert!(matches!(result, Err(ApiError::Auth(_))));

        assert_eq!(tokens.access_token().await.unwrap(), None);
        assert_eq!(tokens.refresh_token().await.unwrap(), None);
        assert_eq!(*session.borrow_and_update(), SessionStatus::SignedOut);
    }

    #[tokio::test]
    async fn second_401_after_replay_terminates_without_looping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2) // original + exactly one replay
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "T2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let client = client_for(&server, tokens.clone()).await;

        let result: Result<Pong, _> = client.get("/users/profile").await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
        assert_eq!(tokens.access_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_touching_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        // Access token only; the pair invariant is broken deliberately to
        // exercise the no-refresh-token path.
        let tokens = token_store();
        tokens.set_access_token("T1").await.unwrap();

        let client = client_for(&server, tokens.clone()).await;
        let result: Result<Pong, _> = client.get("/users/profile").await;

        assert!(matches!(result, Err(ApiError::Auth(ref msg)) if msg.contains("no refresh token")));
        assert_eq!(tokens.access_token().await.unwrap(), Some("T1".to_string()));
    }

    #[tokio::test]
    async fn concurrent_401s_coalesce_into_one_refresh() {
        let server = MockServer::start().await;

        // Both initial requests carry T1 and get rejected.
        Mock::given(method("GET"))
            .and(path("/exercises/history"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/exercises/progress"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        // Exactly one refresh call is allowed.
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"token": "T2"}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/exercises/history"))
            .and(header("Authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/exercises/progress"))
            .and(header("Authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let client = Arc::new(client_for(&server, tokens.clone()).await);

        let a = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client.get::<Vec<serde_json::Value>>("/exercises/history").await
            })
        };
        let b = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client.get::<Vec<serde_json::Value>>("/exercises/progress").await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(tokens.access_token().await.unwrap(), Some("T2".to_string()));
    }

    #[tokio::test]
    async fn rotated_refresh_token_persisted_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"token": "T2", "refreshToken": "R2"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header("Authorization", "Bearer T2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "ok"})),
            )
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let config = ApiConfig::builder()
            .base_url(server.uri())
            .refresh_rotation(true)
            .build();
        let client = ApiClient::new(&config, tokens.clone()).unwrap();

        let _: Pong = client.get("/users/profile").await.unwrap();
        assert_eq!(tokens.access_token().await.unwrap(), Some("T2".to_string()));
        assert_eq!(tokens.refresh_token().await.unwrap(), Some("R2".to_string()));
    }

    #[tokio::test]
    async fn rotation_ignored_when_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"token": "T2", "refreshToken": "R2"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .and(header_exists("Authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "ok"})),
            )
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let client = client_for(&server, tokens.clone()).await;

        let _: Pong = client.get("/users/profile").await.unwrap();
        assert_eq!(tokens.refresh_token().await.unwrap(), Some("R1".to_string()));
    }

    #[tokio::test]
    async fn http_error_carries_status_and_parsed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tests"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({"message": "bad answers"})),
            )
            .mount(&server)
            .await;

        let tokens = signed_in_store().await;
        let client = client_for(&server, tokens.clone()).await;

        let result: Result<Vec<serde_json::Value>, _> = client.get("/tests").await;
        match result {
            Err(ApiError::Http { status, message, body }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "bad answers");
                assert!(body.is_some());
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        // Non-auth HTTP errors never mutate tokens.
        assert_eq!(tokens.access_token().await.unwrap(), Some("T1".to_string()));
    }

    #[tokio::test]
    async fn network_failure_never_triggers_refresh() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tokens = signed_in_store().await;
        let config = ApiConfig::builder().base_url(format!("http://{addr}")).build();
        let client = ApiClient::new(&config, tokens.clone()).unwrap();

        let result: Result<Pong, _> = client.get("/users/profile").await;
        assert!(matches!(result, Err(ApiError::Network(_))));
        assert_eq!(tokens.access_token().await.unwrap(), Some("T1".to_string()));
    }

    #[tokio::test]
    async fn no_content_deserializes_into_unit() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/scans/abc"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, signed_in_store().await).await;
        let result: Result<(), _> = client.delete("/scans/abc").await;
        assert!(result.is_ok());
    }
}
