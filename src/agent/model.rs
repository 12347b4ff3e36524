use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agent::agent::AbortHandle;
use crate::agent::error::AgentError;
use crate::agent::history::{Brain, TokenUsage};
use crate::agent::tools::ToolRegistry;

/// Connection options for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
}

/// One structured model reply: the JSON content plus token accounting.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub usage: TokenUsage,
}

/// The seam to the model client. The client owns retries and token
/// accounting; the agent passes its abort handle so an implementation
/// can bail out between attempts.
pub trait ModelBackend {
    fn complete(
        &self,
        system: &str,
        user: &str,
        response_schema: &Value,
        abort: &AbortHandle,
    ) -> Result<ModelReply, AgentError>;
}

/// Full structured-output schema for one step: optional brain fields
/// plus the single-key action union over the current tool set.
pub fn response_schema(registry: &ToolRegistry) -> Value {
    json!({
        "type": "object",
        "properties": {
            "evaluation_previous_goal": {"type": "string"},
            "memory": {"type": "string"},
            "next_goal": {"type": "string"},
            "action": registry.action_schema(),
        },
        "required": ["action"],
        "additionalProperties": false
    })
}

/// Decoded model step, after the single-key invariant has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedStep {
    pub brain: Brain,
    pub tool_name: String,
    pub tool_input: Value,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    evaluation_previous_goal: Option<String>,
    #[serde(default)]
    memory: Option<String>,
    #[serde(default)]
    next_goal: Option<String>,
    action: Map<String, Value>,
}

/// Validate one model reply against the structured-output contract:
/// valid JSON, an `action` object with exactly one tool key.
pub fn decode_step(content: &str) -> Result<DecodedStep, AgentError> {
    let raw: RawStep = serde_json::from_str(content)
        .map_err(|e| AgentError::Schema(format!("model output is not a valid step: {}", e)))?;

    let mut entries = raw.action.into_iter();
    let (tool_name, tool_input) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => {
            return Err(AgentError::Schema(
                "action object names no tool".into(),
            ))
        }
        _ => {
            return Err(AgentError::Schema(
                "action object must name exactly one tool".into(),
            ))
        }
    };

    Ok(DecodedStep {
        brain: Brain {
            evaluation_previous_goal: raw.evaluation_previous_goal,
            memory: raw.memory,
            next_goal: raw.next_goal,
        },
        tool_name,
        tool_input,
    })
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking chat-completions client with structured output enforced
/// through `response_format: json_schema`.
pub struct OpenAiBackend {
    options: ModelOptions,
    client: reqwest::blocking::Client,
}

impl OpenAiBackend {
    pub fn new(options: ModelOptions) -> Result<Self, AgentError> {
        if options.model.trim().is_empty() {
            return Err(AgentError::Config("model name is required".into()));
        }
        if options.api_key.trim().is_empty() {
            return Err(AgentError::Config(
                "API key is required (set OPENAI_API_KEY or API_KEY)".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { options, client })
    }
}

impl ModelBackend for OpenAiBackend {
    fn complete(
        &self,
        system: &str,
        user: &str,
        response_schema: &Value,
        abort: &AbortHandle,
    ) -> Result<ModelReply, AgentError> {
        abort.check()?;

        let request = ChatRequest {
            model: &self.options.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "agent_step",
                    "strict": true,
                    "schema": response_schema,
                }
            }),
        };

        let url = format!(
            "{}/chat/completions",
            self.options.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.options.api_key)
            .json(&request)
            .send()
            .map_err(|e| AgentError::Model(format!("request to {} failed: {}", url, e)))?;

        abort.check()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AgentError::Model(format!(
                "model returned HTTP {}: {}",
                status,
                crate::util::truncate_chars(&body, 300)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| AgentError::Model(format!("invalid completion payload: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AgentError::Model("completion contained no content".into()))?;

        Ok(ModelReply {
            content,
            usage: parsed.usage.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// Scripted backend for tests and offline runs: each call pops the next
/// canned step.
pub struct MockBackend {
    replies: Mutex<VecDeque<Value>>,
}

impl MockBackend {
    pub fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }
}

impl ModelBackend for MockBackend {
    fn complete(
        &self,
        _system: &str,
        _user: &str,
        _response_schema: &Value,
        abort: &AbortHandle,
    ) -> Result<ModelReply, AgentError> {
        abort.check()?;
        let mut replies = match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match replies.pop_front() {
            Some(reply) => Ok(ModelReply {
                content: reply.to_string(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                    total_tokens: 120,
                },
            }),
            None => Err(AgentError::Model(
                "mock backend has no more scripted replies".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_multiple_tools() {
        let content = r#"{"action": {"wait": {}, "done": {"text": "x"}}}"#;
        let err = decode_step(content).unwrap_err();
        assert!(matches!(err, AgentError::Schema(_)));
    }

    #[test]
    fn decode_rejects_empty_action() {
        let err = decode_step(r#"{"action": {}}"#).unwrap_err();
        assert!(matches!(err, AgentError::Schema(_)));
    }

    #[test]
    fn decode_accepts_single_tool() {
        let content = r#"{"next_goal": "click it", "action": {"click_element_by_index": {"index": 3}}}"#;
        let step = decode_step(content).unwrap();
        assert_eq!(step.tool_name, "click_element_by_index");
        assert_eq!(step.brain.next_goal.as_deref(), Some("click it"));
        assert_eq!(step.tool_input["index"], 3);
    }

    #[test]
    fn response_schema_tracks_registry() {
        let mut registry = ToolRegistry::defaults(false);
        let schema = response_schema(&registry);
        let variants = schema["properties"]["action"]["anyOf"].as_array().unwrap();
        assert_eq!(variants.len(), registry.len());

        registry.remove("wait");
        let schema = response_schema(&registry);
        let variants = schema["properties"]["action"]["anyOf"].as_array().unwrap();
        assert_eq!(variants.len(), registry.len());
        assert!(!schema.to_string().contains("\"wait\""));
    }
}
