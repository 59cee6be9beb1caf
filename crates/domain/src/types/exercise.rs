//! Eye exercise catalog, sessions, and progress types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseType {
    Focus,
    Tracking,
    Strength,
    Relaxation,
}

impl ExerciseType {
    /// Wire spelling, as used in URL path segments
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Tracking => "tracking",
            Self::Strength => "strength",
            Self::Relaxation => "relaxation",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// Exercise definition from the catalog (`GET /exercises`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub exercise_type: ExerciseType,
    /// Planned duration in minutes
    pub duration: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A started or completed exercise session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSession {
    pub id: String,
    pub exercise_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Actual duration in minutes
    #[serde(default)]
    pub duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of `POST /exercises/complete/{sessionId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteExerciseRequest {
    pub duration_sec: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Aggregate progress from `GET /exercises/progress`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseProgress {
    pub total_sessions: u64,
    pub total_duration: u64,
    pub average_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<String>,
    pub streak: u32,
}
