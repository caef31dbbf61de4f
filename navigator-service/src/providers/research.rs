//! Research assistant over a chat-style API (Perplexity `sonar` by default).

use async_trait::async_trait;
use serde_json::json;
use stage_flow::{ResearchAssistant, ResearchPrompt, ServiceClient, ServiceConfig, ServiceError};

use super::chat::{messages, parse_reply};

pub struct ResearchChat {
    client: ServiceClient,
    config: ServiceConfig,
    model: String,
}

impl ResearchChat {
    pub fn new(client: ServiceClient, config: ServiceConfig, model: impl Into<String>) -> Self {
        Self {
            client,
            config,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ResearchAssistant for ResearchChat {
    async fn investigate(&self, prompt: &ResearchPrompt) -> Result<String, ServiceError> {
        let payload = json!({
            "model": self.model,
            "messages": messages(&prompt.system, &prompt.question),
        });
        let response = self
            .client
            .call(&self.config, "chat/completions", &payload)
            .await?;

        let reply = parse_reply(&self.config.name, &response.body)?;
        Ok(reply.content.unwrap_or_default())
    }
}
