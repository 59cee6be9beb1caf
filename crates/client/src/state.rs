//! Application state: wires storage, the HTTP pipeline, services, and
//! the query cache together, and owns the background housekeeping tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::{ApiClient, SessionStatus};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::query::QueryClient;
use crate::services::{
    AuthService, ChatService, EducationService, ExerciseService, EyeTestService, ScanService,
};
use crate::storage::{SecretStore, TokenStore};

pub struct AppState {
    config: ApiConfig,
    tokens: TokenStore,
    api: Arc<ApiClient>,
    pub(crate) queries: QueryClient,
    pub(crate) auth: AuthService,
    pub(crate) exercises: ExerciseService,
    pub(crate) eye_tests: EyeTestService,
    pub(crate) scans: ScanService,
    pub(crate) chat: ChatService,
    pub(crate) education: EducationService,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Assemble the client stack over the given secret store.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig, store: Arc<dyn SecretStore>) -> Result<Self, ApiError> {
        let tokens = TokenStore::new(store);
        let api = Arc::new(ApiClient::new(&config, tokens.clone())?);
        let queries = QueryClient::new(&config);

        Ok(Self {
            tokens: tokens.clone(),
            auth: AuthService::new(Arc::clone(&api), tokens),
            exercises: ExerciseService::new(Arc::clone(&api)),
            eye_tests: EyeTestService::new(Arc::clone(&api)),
            scans: ScanService::new(Arc::clone(&api)),
            chat: ChatService::new(Arc::clone(&api)),
            education: EducationService::new(Arc::clone(&api)),
            api,
            queries,
            config,
            background: Mutex::new(Vec::new()),
        })
    }

    /// Restore any persisted session and start background housekeeping:
    /// a periodic cache sweep, and a watcher that drops cached server
    /// state whenever the session ends.
    pub async fn init(&self) -> Result<(), ApiError> {
        if self.tokens.is_authenticated().await? {
            self.api.mark_signed_in();
            info!("persisted session restored");
        }

        let mut handles = self.background.lock();
        if !handles.is_empty() {
            return Ok(());
        }

        let queries = self.queries.clone();
        let period = self.config.cache_time / 2;
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                queries.sweep();
            }
        }));

        let queries = self.queries.clone();
        let mut session = self.api.session_watch();
        handles.push(tokio::spawn(async move {
            while session.changed().await.is_ok() {
                if *session.borrow() == SessionStatus::SignedOut {
                    debug!("session ended, dropping cached server state");
                    queries.clear();
                }
            }
        }));

        Ok(())
    }

    /// Stop background tasks. Cached data and stored tokens are left
    /// intact so a later `init` resumes where this session left off.
    pub fn teardown(&self) {
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn session_watch(&self) -> watch::Receiver<SessionStatus> {
        self.api.session_watch()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Default for AppState {
    fn default() -> Self {
        // MemoryStore cannot fail and the default config parses.
        match Self::new(ApiConfig::default(), Arc::new(crate::storage::MemoryStore::new())) {
            Ok(state) => state,
            Err(_) => unreachable!("default configuration is valid"),
        }
    }
}
