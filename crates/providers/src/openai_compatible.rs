//! Chat-completions client for any OpenAI-compatible endpoint.

use async_trait::async_trait;
use capflow_core::{ChatMessage, ChatRole, ModelClient, ModelError, ModelTurn, ToolCall};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRY_DELAY_MS: u64 = 30_000;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: 0.2,
            max_retries: 2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ResponseMessage, ModelError> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            debug!(attempt = attempt + 1, model = %self.model, "Chat completion request");
            match self.chat_once(request).await {
                Ok(message) => return Ok(message),
                // Bad payloads will not get better on retry.
                Err(e @ ModelError::Parse(_)) => return Err(e),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Chat completion failed");
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(retry_delay(attempt)).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ModelError::Http("no attempt was made".to_string())))
    }

    async fn chat_once(&self, request: &ChatRequest<'_>) -> Result<ResponseMessage, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{}: {}", status, text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ModelError::Parse("No choices in response".to_string()))
    }

    fn request<'a>(&'a self, messages: &[ChatMessage]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: encode_messages(messages),
            tools: None,
            tool_choice: None,
            response_format: None,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAICompatibleProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let message = self.chat(&self.request(messages)).await?;
        Ok(message.content.unwrap_or_default())
    }

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<Value, ModelError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let mut request = self.request(&messages);
        request.response_format = Some(json!({ "type": "json_object" }));
        if let Some(t) = temperature {
            request.temperature = t;
        }

        let message = self.chat(&request).await?;
        let content = message.content.unwrap_or_default();
        extract_json_object(&content)
            .ok_or_else(|| ModelError::Parse(format!("Expected a JSON object, got: {}", content)))
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelTurn, ModelError> {
        let mut request = self.request(messages);
        if !tools.is_empty() {
            request.tools = Some(tools);
            request.tool_choice = Some("auto");
        }
        let message = self.chat(&request).await?;
        Ok(decode_turn(message))
    }
}

fn role_str(role: &ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn encode_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            if !msg.tool_calls.is_empty() {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    json!(msg.content)
                };
                return json!({ "role": "assistant", "content": content, "tool_calls": calls });
            }
            match &msg.tool_call_id {
                Some(id) => json!({ "role": "tool", "tool_call_id": id, "content": msg.content }),
                None => json!({ "role": role_str(&msg.role), "content": msg.content }),
            }
        })
        .collect()
}

fn decode_turn(message: ResponseMessage) -> ModelTurn {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(idx, call)| {
            let arguments = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                // Keep unparseable arguments visible so the tool can reject them.
                serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments.clone()))
            };
            ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", idx)),
                name: call.function.name,
                arguments,
            }
        })
        .collect();
    ModelTurn {
        content: message.content.filter(|c| !c.trim().is_empty()),
        tool_calls,
    }
}

/// Pull the first JSON object out of model text, tolerating code fences and
/// surrounding prose.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Exponential backoff starting at 500ms, capped at 30s.
fn retry_delay(attempt: u32) -> Duration {
    let ms = 2u64.saturating_pow(attempt).saturating_mul(500);
    Duration::from_millis(ms.min(MAX_RETRY_DELAY_MS))
}
