//! Structured extraction: ask a completion service for output that matches a declared schema.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ServiceError, StageError};
use crate::schema::ExtractionSchema;

/// A single completion call. When `tool` is set the service must be asked to answer through it.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub tool: Option<ToolDefinition>,
}

/// What came back: the declared tool's arguments, free text, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionReply {
    pub tool_arguments: Option<String>,
    pub content: Option<String>,
}

impl CompletionReply {
    pub fn tool_call(arguments: impl Into<String>) -> Self {
        Self {
            tool_arguments: Some(arguments.into()),
            content: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            tool_arguments: None,
            content: Some(content.into()),
        }
    }
}

/// A language-completion API.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, ServiceError>;
}

/// One model served by one completion service.
#[derive(Clone)]
pub struct ModelEndpoint {
    model: String,
    service: Arc<dyn CompletionService>,
}

impl ModelEndpoint {
    pub fn new(service: Arc<dyn CompletionService>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            service,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for ModelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEndpoint")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// A schema paired with the system instructions that explain how to fill it.
#[derive(Debug, Clone)]
pub struct ExtractionGoal {
    pub schema: ExtractionSchema,
    pub instructions: String,
}

impl ExtractionGoal {
    pub fn new(schema: ExtractionSchema, instructions: impl Into<String>) -> Self {
        Self {
            schema,
            instructions: instructions.into(),
        }
    }

    pub async fn run<T: DeserializeOwned>(
        &self,
        endpoint: &ModelEndpoint,
        input: &str,
    ) -> Result<T, StageError> {
        extract(endpoint, &self.schema, &self.instructions, input).await
    }
}

/// Run one extraction attempt against `endpoint`. Never retries.
pub async fn extract<T: DeserializeOwned>(
    endpoint: &ModelEndpoint,
    schema: &ExtractionSchema,
    instructions: &str,
    input: &str,
) -> Result<T, StageError> {
    let request = CompletionRequest {
        model: endpoint.model.clone(),
        system: instructions.to_string(),
        user: input.to_string(),
        tool: Some(schema.tool_definition()),
    };

    let reply = endpoint.service.complete(request).await?;
    let value = reply_value(schema, &reply)?;
    schema.decode(value)
}

/// Pull the structured value out of a reply, preferring the declared tool call.
pub fn reply_value(schema: &ExtractionSchema, reply: &CompletionReply) -> Result<Value, StageError> {
    if let Some(arguments) = &reply.tool_arguments {
        return serde_json::from_str(arguments).map_err(|e| {
            StageError::violation(
                schema.qualified_name(),
                format!("tool arguments are not valid JSON: {e}"),
            )
        });
    }

    let Some(content) = reply.content.as_deref().filter(|c| !c.trim().is_empty()) else {
        return Err(StageError::violation(
            schema.qualified_name(),
            "completion returned neither a tool call nor content",
        ));
    };

    warn!(
        schema = %schema.qualified_name(),
        "completion ignored the declared tool, parsing free text"
    );
    parse_free_text(content).ok_or_else(|| {
        debug!(content, "unparseable completion content");
        StageError::violation(
            schema.qualified_name(),
            "free-text completion does not contain a JSON value",
        )
    })
}

/// Best-effort JSON recovery from a free-text completion.
pub fn parse_free_text(content: &str) -> Option<Value> {
    let cleaned = strip_code_fences(content);
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Some(value);
    }

    // Fall back to the outermost object or array embedded in prose.
    [('{', '}'), ('[', ']')].iter().find_map(|(open, close)| {
        let start = cleaned.find(*open)?;
        let end = cleaned.rfind(*close)?;
        (end > start)
            .then(|| serde_json::from_str::<Value>(&cleaned[start..=end]).ok())
            .flatten()
    })
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
