//! Typed access to each backend resource
//!
//! Services are thin wrappers over [`ApiClient`](crate::ApiClient):
//! one struct per resource, one method per endpoint. Caching and
//! invalidation live a level up in the query layer.

pub mod auth;
pub mod chat;
pub mod education;
pub mod exercises;
pub mod scans;

pub use auth::AuthService;
pub use chat::ChatService;
pub use education::EducationService;
pub use exercises::ExerciseService;
pub use eye_tests::EyeTestService;
pub use scans::ScanService;
