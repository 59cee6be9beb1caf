//! Cached accessors and invalidating mutations over the services
//!
//! Every server read the app performs goes through one of these
//! methods, each bound to a well-known cache key and a staleness window
//! tuned to how quickly the underlying data changes. Mutations declare
//! the keys their write makes stale.

use std::sync::Arc;

use oculara_domain::{
    ChatConversation, CompleteExerciseRequest, EducationResource, Exercise, ExerciseProgress,
    ExerciseSession, EyeScan, EyeTest, LoginRequest, RegisterRequest, SendMessageResponse,
    StartTestResponse, SubmitTestRequest, TestProgress, TestResult, User, UserUpdate,
};

use crate::error::ApiError;
use crate::http::FilePayload;
use crate::query::FetchOptions;
use crate::state::AppState;

/// Cache keys, one constructor per server resource
pub mod keys {
    use crate::query::QueryKey;

    pub fn profile() -> QueryKey {
        QueryKey::from("profile")
    }

    pub fn exercises() -> QueryKey {
        QueryKey::from("exercises")
    }

    pub fn exercise_history() -> QueryKey {
        QueryKey::new(["exercises", "history"])
    }

    pub fn exercise_progress() -> QueryKey {
        QueryKey::new(["exercises", "progress"])
    }

    pub fn eye_tests() -> QueryKey {
        QueryKey::from("tests")
    }

    pub fn test_history() -> QueryKey {
        QueryKey::new(["tests", "history"])
    }

    pub fn test_progress() -> QueryKey {
        QueryKey::new(["tests", "progress"])
    }

    pub fn scans(user_id: &str) -> QueryKey {
        QueryKey::from("scans").with(user_id)
    }

    pub fn chat_history() -> QueryKey {
        QueryKey::new(["chat", "history"])
    }

    pub fn education() -> QueryKey {
        QueryKey::from("education")
    }
}

/// Staleness windows per resource, matching how often each changes
pub mod windows {
    use std::time::Duration;

    /// Profile edits are rare
    pub const PROFILE: Duration = Duration::from_secs(5 * 60);
    /// Catalogues (exercises, tests, education) change on deploys only
    pub const CATALOG: Duration = Duration::from_secs(10 * 60);
    /// Histories and progress move with every completed activity
    pub const ACTIVITY: Duration = Duration::from_secs(2 * 60);
    /// Chat moves fastest
    pub const CHAT: Duration = Duration::from_secs(60);
}

impl AppState {
    // --- session ---

    pub async fn login(&self, request: &LoginRequest) -> Result<User, ApiError> {
        self.auth.login(request).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        self.auth.register(request).await
    }

    /// Sign out and drop all cached server state
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.auth.logout().await?;
        self.queries.clear();
        Ok(())
    }

    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.auth.delete_account().await?;
        self.queries.clear();
        Ok(())
    }

    /// Locally persisted profile snapshot, available before any request
    pub async fn cached_profile(&self) -> Result<Option<User>, ApiError> {
        self.auth.cached_profile().await
    }

    // --- cached reads ---

    pub async fn profile(&self) -> Result<Arc<User>, ApiError> {
        let auth = self.auth.clone();
        self.queries
            .fetch_with(&keys::profile(), FetchOptions::stale_time(windows::PROFILE), move || {
                let auth = auth.clone();
                async move { auth.profile().await }
            })
            .await
    }

    pub async fn exercises(&self) -> Result<Arc<Vec<Exercise>>, ApiError> {
        let exercises = self.exercises.clone();
        self.queries
            .fetch_with(&keys::exercises(), FetchOptions::stale_time(windows::CATALOG), move || {
                let exercises = exercises.clone();
                async move { exercises.list().await }
            })
            .await
    }

    pub async fn exercise_history(&self) -> Result<Arc<Vec<ExerciseSession>>, ApiError> {
        let exercises = self.exercises.clone();
        self.queries
            .fetch_with(
                &keys::exercise_history(),
                FetchOptions::stale_time(windows::ACTIVITY),
                move || {
                    let exercises = exercises.clone();
                    async move { exercises.history().await }
                },
            )
            .await
    }

    pub async fn exercise_progress(&self) -> Result<Arc<ExerciseProgress>, ApiError> {
        let exercises = self.exercises.clone();
        self.queries
            .fetch_with(
                &keys::exercise_progress(),
                FetchOptions::stale_time(windows::ACTIVITY),
                move || {
                    let exercises = exercises.clone();
                    async move { exercises.progress().await }
                },
            )
            .await
    }

    pub async fn eye_tests(&self) -> Result<Arc<Vec<EyeTest>>, ApiError> {
        let tests = self.eye_tests.clone();
        self.queries
            .fetch_with(&keys::eye_tests(), FetchOptions::stale_time(windows::CATALOG), move || {
                let tests = tests.clone();
                async move { tests.list().await }
            })
            .await
    }

    pub async fn test_history(&self) -> Result<Arc<Vec<TestResult>>, ApiError> {
        let tests = self.eye_tests.clone();
        self.queries
            .fetch_with(
                &keys::test_history(),
                FetchOptions::stale_time(windows::ACTIVITY),
                move || {
                    let tests = tests.clone();
                    async move { tests.history().await }
                },
            )
            .await
    }

    pub async fn test_progress(&self) -> Result<Arc<TestProgress>, ApiError> {
        let tests = self.eye_tests.clone();
        self.queries
            .fetch_with(
                &keys::test_progress(),
                FetchOptions::stale_time(windows::ACTIVITY),
                move || {
                    let tests = tests.clone();
                    async move { tests.progress().await }
                },
            )
            .await
    }

    pub async fn scans(&self, user_id: &str) -> Result<Arc<Vec<EyeScan>>, ApiError> {
        let scans = self.scans.clone();
        let id = user_id.to_string();
        self.queries
            .fetch_with(
                &keys::scans(user_id),
                FetchOptions::stale_time(windows::ACTIVITY),
                move || {
                    let scans = scans.clone();
                    let id = id.clone();
                    async move { scans.list(&id).await }
                },
            )
            .await
    }

    pub async fn chat_history(&self) -> Result<Arc<Vec<ChatConversation>>, ApiError> {
        let chat = self.chat.clone();
        self.queries
            .fetch_with(&keys::chat_history(), FetchOptions::stale_time(windows::CHAT), move || {
                let chat = chat.clone();
                async move { chat.history().await }
            })
            .await
    }

    pub async fn education(&self) -> Result<Arc<Vec<EducationResource>>, ApiError> {
        let education = self.education.clone();
        self.queries
            .fetch_with(&keys::education(), FetchOptions::stale_time(windows::CATALOG), move || {
                let education = education.clone();
                async move { education.list().await }
            })
            .await
    }

    // --- mutations ---

    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User, ApiError> {
        self.queries
            .mutate(&[keys::profile()], || self.auth.update_profile(update))
            .await
    }

    /// Session starts are not cached; they create server-side state
    pub async fn start_exercise(&self, exercise_id: &str) -> Result<ExerciseSession, ApiError> {
        self.exercises.start(exercise_id).await
    }

    pub async fn complete_exercise(
        &self,
        session_id: &str,
        request: &CompleteExerciseRequest,
    ) -> Result<ExerciseSession, ApiError> {
        self.queries
            .mutate(&[keys::exercise_history(), keys::exercise_progress()], || {
                self.exercises.complete(session_id, request)
            })
            .await
    }

    pub async fn start_test(&self, test_id: &str) -> Result<StartTestResponse, ApiError> {
        self.eye_tests.start(test_id).await
    }

    pub async fn submit_test(
        &self,
        session_id: &str,
        request: &SubmitTestRequest,
    ) -> Result<TestResult, ApiError> {
        self.queries
            .mutate(&[keys::test_history(), keys::test_progress()], || {
                self.eye_tests.submit(session_id, request)
            })
            .await
    }

    pub async fn upload_scan(&self, image: FilePayload) -> Result<EyeScan, ApiError> {
        let scan = self
            .queries
            .mutate(&[], || self.scans.upload(image.clone()))
            .await?;
        // The owning user is only known from the stored scan, so the
        // per-user list key is invalidated off the response.
        self.queries.invalidate(&[keys::scans(&scan.user_id)]);
        Ok(scan)
    }

    pub async fn delete_scan(&self, user_id: &str, scan_id: &str) -> Result<(), ApiError> {
        self.queries
            .mutate(&[keys::scans(user_id)], || self.scans.delete(scan_id))
            .await
    }

    pub async fn send_message(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<SendMessageResponse, ApiError> {
        self.queries
            .mutate(&[keys::chat_history()], || {
                self.chat.send_message(message, conversation_id)
            })
            .await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.queries
            .mutate(&[keys::chat_history()], || self.chat.delete_conversation(conversation_id))
            .await
    }
}
