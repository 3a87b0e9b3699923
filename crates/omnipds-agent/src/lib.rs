//! # OmniPDS Agent
//!
//! LLM tool bridge for the ledger: conversation types, a pluggable
//! [`ChatProvider`] backend, the Gemini HTTP implementation, the
//! [`AgentBridge`] that executes `queryLedger` / `searchEverything`
//! tool calls against a live session, and the one-shot structured
//! analysis operations in [`insights`].

pub mod bridge;
pub mod chat;
pub mod error;
pub mod gemini;
pub mod insights;

pub use bridge::{ledger_tools, AgentBridge, DEFAULT_HISTORY_LIMIT};
pub use chat::{
    AgentTurn, ChatProvider, ModelReply, StructuredProvider, ToolCall, ToolSpec, TurnRole,
};
pub use error::AgentError;
pub use gemini::{GeminiProvider, DEFAULT_MODEL};
pub use insights::{personal_insights, sovereign_roadmap, Insight, RoadmapWeek};
