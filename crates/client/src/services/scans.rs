//! Eye scan upload and retrieval

use std::sync::Arc;

use oculara_domain::EyeScan;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::http::FilePayload;

#[derive(Clone)]
pub struct ScanService {
    client: Arc<ApiClient>,
}

impl ScanService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Upload a scan image for analysis. The image travels as the
    /// multipart `image` part; the response includes the stored scan
    /// with any synchronous analysis attached.
    pub async fn upload(&self, image: FilePayload) -> Result<EyeScan, ApiError> {
        self.client.upload("/scans/upload", image).await
    }

    /// All scans belonging to the given user
    pub async fn list(&self, user_id: &str) -> Result<Vec<EyeScan>, ApiError> {
        self.client.get(&format!("/scans/user/{user_id}")).await
    }

    pub async fn get(&self, scan_id: &str) -> Result<EyeScan, ApiError> {
        self.client.get(&format!("/scans/{scan_id}")).await
    }

    pub async fn delete(&self, scan_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self.client.delete(&format!("/scans/{scan_id}")).await?;
        Ok(())
    }
}
