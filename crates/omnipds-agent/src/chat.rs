//! Conversation and tool-call protocol types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

/// Role of a participant in an agent conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The human operator
    User,
    /// The reasoning model
    Model,
}

/// A single role-tagged message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTurn {
    pub role: TurnRole,
    pub text: String,
}

impl AgentTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A named function the model may call instead of answering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: Value,
}

/// A structured tool request emitted by the model. Transient: consumed
/// exactly once by the bridge, never stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    /// Extract a required string argument.
    pub fn str_arg(&self, key: &str) -> Result<&str, AgentError> {
        self.args.get(key).and_then(Value::as_str).ok_or_else(|| {
            AgentError::ResponseFormat(format!(
                "tool call {} is missing string argument '{}'",
                self.name, key
            ))
        })
    }
}

/// What the model produced for one request: final prose or tool requests.
#[derive(Debug, Clone)]
pub enum ModelReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

/// A reasoning-model backend.
///
/// One implementation speaks the Gemini HTTP API; tests provide scripted
/// fakes.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Issue one model request: system context plus the full turn history,
    /// with the given tools available.
    async fn generate(
        &self,
        system: &str,
        turns: &[AgentTurn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, AgentError>;
}

/// A model backend capable of one-shot, schema-constrained JSON output.
///
/// Used by the analysis operations, which need a parseable document rather
/// than prose or tool calls.
#[async_trait]
pub trait StructuredProvider: Send + Sync {
    /// Issue one request whose reply must conform to `schema`; returns the
    /// parsed document.
    async fn generate_json(
        &self,
        prompt: &str,
        schema: &Value,
        temperature: f64,
    ) -> Result<Value, AgentError>;
}
