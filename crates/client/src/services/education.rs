//! Educational reading material

use std::sync::Arc;

use oculara_domain::EducationResource;

use crate::client::ApiClient;
use crate::error::ApiError;

#[derive(Clone)]
pub struct EducationService {
    client: Arc<ApiClient>,
}

impl EducationService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<EducationResource>, ApiError> {
        self.client.get("/educations").await
    }
}
