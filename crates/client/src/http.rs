//! HTTP transport
//!
//! Thin layer over reqwest: base-URL joining, request timeout, JSON and
//! multipart bodies, transport error mapping. Requests are rebuilt from
//! their descriptor on every dispatch, so a replayed request never needs
//! a clonable body.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, Method, Response};
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Local file destined for a multipart upload
#[derive(Debug, Clone)]
pub struct FilePayload {
    /// Form field name (e.g., "image")
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// JPEG image under the conventional "image" field
    pub fn jpeg_image(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new("image", file_name, "image/jpeg", bytes)
    }
}

/// Request body variants
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Empty,
    Json(serde_json::Value),
    Multipart(FilePayload),
}

/// Immutable description of one API request.
///
/// A replay after token refresh reuses the same descriptor; only the
/// Authorization header differs between dispatches.
#[derive(Debug, Clone)]
pub(crate) struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub payload: Payload,
}

impl RequestDescriptor {
    pub(crate) fn new(method: Method, path: impl Into<String>, payload: Payload) -> Self {
        Self { method, path: path.into(), payload }
    }
}

/// HTTP transport with a fixed base URL and timeout
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from client configuration
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the underlying client cannot be built
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }

    /// Dispatch a request descriptor, optionally with a bearer credential.
    ///
    /// Returns the raw response; status handling belongs to the caller.
    /// Transport-level failures map to `Timeout`/`Network` and are never
    /// grounds for a token refresh.
    pub(crate) async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        bearer: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, descriptor.path);

        let mut request = self.client.request(descriptor.method.clone(), &url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request = match &descriptor.payload {
            Payload::Empty => request,
            Payload::Json(body) => request.json(body),
            Payload::Multipart(file) => request.multipart(build_form(file)?),
        };

        debug!(method = %descriptor.method, url = %url, authenticated = bearer.is_some(), "dispatching request");

        let response = request.send().await.map_err(|e| self.map_transport_error(&e))?;

        debug!(method = %descriptor.method, url = %url, status = %response.status(), "received response");

        Ok(response)
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

fn build_form(file: &FilePayload) -> Result<Form, ApiError> {
    let part = Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(&file.mime)
        .map_err(|e| ApiError::Config(format!("invalid MIME type {}: {e}", file.mime)))?;

    Ok(Form::new().part(file.field.clone(), part))
}
