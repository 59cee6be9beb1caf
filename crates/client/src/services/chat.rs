//! AI chat assistant conversations

use std::sync::Arc;

use oculara_domain::{ChatConversation, SendMessageRequest, SendMessageResponse};

use crate::client::ApiClient;
use crate::error::ApiError;

#[derive(Clone)]
pub struct ChatService {
    client: Arc<ApiClient>,
}

impl ChatService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Send a message. Omitting `conversation_id` starts a new
    /// conversation; the response names the one the message landed in.
    pub async fn send_message(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<SendMessageResponse, ApiError> {
        let request = SendMessageRequest {
            message: message.to_string(),
            conversation_id: conversation_id.map(str::to_string),
        };
        self.client.post("/chat/message", &request).await
    }

    /// Every conversation with its messages embedded
    pub async fn history(&self) -> Result<Vec<ChatConversation>, ApiError> {
        self.client.get("/chat/history").await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value =
            self.client.delete(&format!("/chat/conversation/{conversation_id}")).await?;
        Ok(())
    }
}
