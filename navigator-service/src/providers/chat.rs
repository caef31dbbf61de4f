//! OpenAI-compatible `/chat/completions`.

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde_json::{Value, json};
use stage_flow::{
    CompletionReply, CompletionRequest, CompletionService, ServiceClient, ServiceConfig,
    ServiceError,
};

const COMPLETIONS_PATH: &str = "chat/completions";

pub struct ChatCompletions {
    client: ServiceClient,
    config: ServiceConfig,
}

impl ChatCompletions {
    pub fn new(client: ServiceClient, config: ServiceConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CompletionService for ChatCompletions {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, ServiceError> {
        let payload = request_payload(&request);
        let response = self
            .client
            .call(&self.config, COMPLETIONS_PATH, &payload)
            .await?;
        parse_reply(&self.config.name, &response.body)
    }
}

/// Build the request body. A declared tool is also forced through `tool_choice`.
pub fn request_payload(request: &CompletionRequest) -> Value {
    let mut payload = json!({
        "model": request.model,
        "messages": messages(&request.system, &request.user),
    });

    if let Some(tool) = &request.tool {
        payload["tools"] = json!([tool_payload(tool)]);
        payload["tool_choice"] = json!({
            "type": "function",
            "function": { "name": tool.name },
        });
    }
    payload
}

pub fn messages(system: &str, user: &str) -> Value {
    json!([
        { "role": "system", "content": system },
        { "role": "user", "content": user },
    ])
}

fn tool_payload(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

/// Read `choices[0].message`: the first tool call's arguments and the text content.
pub fn parse_reply(service: &str, body: &Value) -> Result<CompletionReply, ServiceError> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| ServiceError::MalformedResponse {
            service: service.to_string(),
            message: "response has no choices[0].message".to_string(),
        })?;

    // Some providers send arguments as an object instead of a JSON string.
    let tool_arguments = message
        .pointer("/tool_calls/0/function/arguments")
        .and_then(|arguments| match arguments {
            Value::String(raw) => Some(raw.clone()),
            Value::Object(_) => Some(arguments.to_string()),
            _ => None,
        });
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(CompletionReply {
        tool_arguments,
        content,
    })
}
