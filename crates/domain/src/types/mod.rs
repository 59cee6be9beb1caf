//! API data types, one module per backend resource.

pub mod chat;
pub mod education;
pub mod exercise;
pub mod scan;
pub mod user;

pub use chat::{ChatConversation, ChatMessage, ChatRole, SendMessageRequest, SendMessageResponse};
pub use education::{EducationResource, ResourceKind};
pub use exercise::{
    CompleteExerciseRequest, Difficulty, Exercise, ExerciseProgress, ExerciseSession, ExerciseType,
};
pub use eye_test::{
    EyeTest, ImprovementTrend, StartTestResponse, SubmitTestRequest, TestAnswer, TestProgress,
    TestResult, TestType,
};
pub use scan::{EyeScan, RiskLevel, ScanAnalysis};
pub use user::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, User, UserUpdate,
};
