//! Eye exercise catalogue, sessions, and history

use std::sync::Arc;

use oculara_domain::{
    CompleteExerciseRequest, Exercise, ExerciseProgress, ExerciseSession, ExerciseType,
};

use crate::client::ApiClient;
use crate::error::ApiError;

#[derive(Clone)]
pub struct ExerciseService {
    client: Arc<ApiClient>,
}

impl ExerciseService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Exercise>, ApiError> {
        self.client.get("/exercises").await
    }

    pub async fn get(&self, exercise_id: &str) -> Result<Exercise, ApiError> {
        self.client.get(&format!("/exercises/{exercise_id}")).await
    }

    /// Catalogue filtered to one exercise type
    pub async fn by_type(&self, exercise_type: ExerciseType) -> Result<Vec<Exercise>, ApiError> {
        self.client.get(&format!("/exercises/type/{}", exercise_type.as_str())).await
    }

    /// Open a session for an exercise; completion is reported separately
    pub async fn start(&self, exercise_id: &str) -> Result<ExerciseSession, ApiError> {
        self.client.post_empty(&format!("/exercises/start/{exercise_id}")).await
    }

    pub async fn complete(
        &self,
        session_id: &str,
        request: &CompleteExerciseRequest,
    ) -> Result<ExerciseSession, ApiError> {
        self.client.post(&format!("/exercises/complete/{session_id}"), request).await
    }

    pub async fn history(&self) -> Result<Vec<ExerciseSession>, ApiError> {
        self.client.get("/exercises/history").await
    }

    pub async fn progress(&self) -> Result<ExerciseProgress, ApiError> {
        self.client.get("/exercises/progress").await
    }
}
