//! Gemini `generateContent` chat provider.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::chat::{
    AgentTurn, ChatProvider, ModelReply, StructuredProvider, ToolCall, ToolSpec, TurnRole,
};
use crate::error::AgentError;

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// HTTP client for the Gemini API.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AgentError> {
        Self::with_model(api_key, DEFAULT_MODEL, DEFAULT_TIMEOUT)
    }

    pub fn with_model(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Point the provider at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(system: &str, turns: &[AgentTurn], tools: &[ToolSpec]) -> Value {
        let contents: Vec<Value> = turns
            .iter()
            .map(|turn| {
                json!({
                    "role": match turn.role {
                        TurnRole::User => "user",
                        TurnRole::Model => "model",
                    },
                    "parts": [{ "text": turn.text }],
                })
            })
            .collect();

        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": contents,
        });
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        body
    }

    fn structured_body(prompt: &str, schema: &Value, temperature: f64) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json",
                "responseSchema": schema,
            },
        })
    }

    /// POST one `generateContent` request, surfacing the server's error
    /// message on a non-success status.
    async fn post(&self, body: &Value) -> Result<Value, AgentError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown provider error");
            return Err(AgentError::Provider(format!("{}: {}", status, message)));
        }
        Ok(payload)
    }

    fn parse_reply(body: &Value) -> Result<ModelReply, AgentError> {
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                AgentError::ResponseFormat("response has no candidate parts".to_string())
            })?;

        let mut calls = Vec::new();
        let mut text = String::new();
        for part in parts {
            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().ok_or_else(|| {
                    AgentError::ResponseFormat("functionCall without a name".to_string())
                })?;
                calls.push(ToolCall {
                    name: name.to_string(),
                    args: call.get("args").cloned().unwrap_or(Value::Null),
                });
            } else if let Some(chunk) = part.get("text").and_then(Value::as_str) {
                text.push_str(chunk);
            }
        }

        if !calls.is_empty() {
            Ok(ModelReply::ToolCalls(calls))
        } else if !text.is_empty() {
            Ok(ModelReply::Text(text))
        } else {
            Err(AgentError::ResponseFormat(
                "candidate contained neither text nor tool calls".to_string(),
            ))
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn generate(
        &self,
        system: &str,
        turns: &[AgentTurn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, AgentError> {
        let body = Self::request_body(system, turns, tools);
        let payload = self.post(&body).await?;
        Self::parse_reply(&payload)
    }
}

#[async_trait]
impl StructuredProvider for GeminiProvider {
    async fn generate_json(
        &self,
        prompt: &str,
        schema: &Value,
        temperature: f64,
    ) -> Result<Value, AgentError> {
        let body = Self::structured_body(prompt, schema, temperature);
        let payload = self.post(&body).await?;

        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                AgentError::ResponseFormat("structured response has no text part".to_string())
            })?;
        Ok(serde_json::from_str(text)?)
    }
}
