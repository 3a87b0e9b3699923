//! Agent tool bridge.
//!
//! Mediates between a reasoning model and the ledger over one conversation
//! turn: compose (ledger context + history), dispatch, execute at most one
//! tool call, then resolve with a second model request carrying the tool
//! result. Tool failures become explicit error strings fed back to the
//! model; they never abort the conversation.

use std::collections::VecDeque;

use omnipds_core::LedgerSession;
use serde_json::json;

use crate::chat::{AgentTurn, ChatProvider, ModelReply, ToolCall, ToolSpec};
use crate::error::AgentError;

pub const QUERY_LEDGER: &str = "queryLedger";
pub const SEARCH_EVERYTHING: &str = "searchEverything";

/// Default cap on retained conversation turns.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

const SYSTEM_PROMPT: &str = "You are the OmniPDS assistant for a personal data \
store. You have full visibility into the user's ledger (finance, social, \
projects, notes, contacts, inventory, comms). Use the queryLedger tool for \
exact figures and the searchEverything tool for free-text lookup; ground \
every answer in tool results instead of guessing.";

/// The two ledger tools offered to the model, each taking exactly one
/// string argument.
pub fn ledger_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: QUERY_LEDGER.to_string(),
            description: "Execute a SQL statement against the ledger and return \
                          the result rows or an error."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "description": "The SQL statement to run." }
                },
                "required": ["sql"]
            }),
        },
        ToolSpec {
            name: SEARCH_EVERYTHING.to_string(),
            description: "Free-text search across every indexed ledger table, \
                          returning ranked hits."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "term": { "type": "string", "description": "The search term." }
                },
                "required": ["term"]
            }),
        },
    ]
}

/// One conversation bound to a chat provider, with a bounded history.
pub struct AgentBridge<P: ChatProvider> {
    provider: P,
    history: VecDeque<AgentTurn>,
    history_limit: usize,
}

impl<P: ChatProvider> AgentBridge<P> {
    pub fn new(provider: P) -> Self {
        Self::with_history_limit(provider, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(provider: P, history_limit: usize) -> Self {
        Self {
            provider,
            history: VecDeque::new(),
            history_limit: history_limit.max(2),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &AgentTurn> {
        self.history.iter()
    }

    /// Run one full conversational turn against the ledger.
    pub async fn take_turn(
        &mut self,
        session: &mut LedgerSession,
        message: &str,
    ) -> Result<String, AgentError> {
        let context = session.context_snapshot()?;
        let system = format!("{}\nLedger context: {}", SYSTEM_PROMPT, context);

        let mut turns: Vec<AgentTurn> = self.history.iter().cloned().collect();
        turns.push(AgentTurn::user(message));

        let tools = ledger_tools();
        let reply = self.provider.generate(&system, &turns, &tools).await?;

        let answer = match reply {
            ModelReply::Text(text) => text,
            ModelReply::ToolCalls(calls) => {
                // Only the first requested tool is honored; extras are dropped.
                if calls.len() > 1 {
                    tracing::warn!(
                        dropped = calls.len() - 1,
                        "model requested multiple tools, executing only the first"
                    );
                }
                let call = &calls[0];
                let result = execute_tool(session, call).await;
                tracing::debug!(tool = %call.name, "tool executed");

                turns.push(AgentTurn::model(format!(
                    "[tool call] {}({})",
                    call.name, call.args
                )));
                turns.push(AgentTurn::user(format!(
                    "Tool {} returned: {}\nAnswer the original question using this result.",
                    call.name, result
                )));

                // Resolve with no tools offered so the model must answer.
                match self.provider.generate(&system, &turns, &[]).await? {
                    ModelReply::Text(text) => text,
                    ModelReply::ToolCalls(_) => {
                        return Err(AgentError::ResponseFormat(
                            "model requested a tool during the resolve turn".to_string(),
                        ))
                    }
                }
            }
        };

        self.push_pair(AgentTurn::user(message), AgentTurn::model(answer.clone()));
        Ok(answer)
    }

    /// Append a user/model pair, evicting the oldest pair past the limit.
    fn push_pair(&mut self, user: AgentTurn, model: AgentTurn) {
        self.history.push_back(user);
        self.history.push_back(model);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
            self.history.pop_front();
        }
    }
}

/// Execute one tool call against the ledger. Every failure path returns an
/// error string for the model instead of propagating.
async fn execute_tool(session: &mut LedgerSession, call: &ToolCall) -> String {
    match call.name.as_str() {
        QUERY_LEDGER => match call.str_arg("sql") {
            Ok(sql) => session.raw_query(sql).await.to_json().to_string(),
            Err(e) => format!("{{\"success\": false, \"error\": \"{}\"}}", e),
        },
        SEARCH_EVERYTHING => match call.str_arg("term") {
            Ok(term) => match session.search(term) {
                Ok(hits) => serde_json::to_string(&hits)
                    .unwrap_or_else(|e| format!("search serialization failed: {}", e)),
                Err(e) => format!("search failed: {}", e),
            },
            Err(e) => format!("search failed: {}", e),
        },
        other => format!("unknown tool: {}", other),
    }
}
