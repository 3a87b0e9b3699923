//! One-shot strategic analysis over the ledger context.
//!
//! Two structured-output operations complement the conversational bridge: a
//! cross-module insight scan and a 30-day roadmap. Both send the same ledger
//! context summary the bridge uses and constrain the reply with a response
//! schema, so a malformed reply surfaces as an error instead of half-usable
//! prose.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chat::StructuredProvider;
use crate::error::AgentError;

/// One strategic insight derived from cross-module correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub category: String,
    pub description: String,
    pub impact: String,
    /// Scale of 1-10.
    pub urgency: String,
}

/// One week of the 30-day roadmap. The model may omit fields, so every
/// field defaults rather than failing the whole plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapWeek {
    #[serde(default)]
    pub week: i64,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub financial_goal: String,
}

/// Analyze the ledger for correlations between work velocity, financial
/// burn and social reach.
pub async fn personal_insights<P: StructuredProvider + ?Sized>(
    provider: &P,
    context: &Value,
) -> Result<Vec<Insight>, AgentError> {
    let prompt = format!(
        "You are the OmniPDS Strategic Analyst. Analyze this unified data \
         repository: {}. Identify non-obvious correlations between work \
         velocity, financial burn, and social reach. Provide 3 high-impact \
         strategic insights.",
        context
    );
    let schema = json!({
        "type": "object",
        "properties": {
            "insights": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "category": { "type": "string" },
                        "description": { "type": "string" },
                        "impact": { "type": "string" },
                        "urgency": { "type": "string", "description": "Scale of 1-10" }
                    },
                    "required": ["title", "category", "description", "impact", "urgency"]
                }
            }
        }
    });

    let reply = provider.generate_json(&prompt, &schema, 1.0).await?;
    let insights = reply.get("insights").cloned().unwrap_or_else(|| json!([]));
    Ok(serde_json::from_value(insights)?)
}

/// Build a 30-day plan with weekly milestones and financial targets.
pub async fn sovereign_roadmap<P: StructuredProvider + ?Sized>(
    provider: &P,
    context: &Value,
) -> Result<Vec<RoadmapWeek>, AgentError> {
    let prompt = format!(
        "Create a 30-day strategic roadmap based on these PDS records: {}. \
         Format as a structured plan with weekly milestones, financial \
         targets, and social engagement goals.",
        context
    );
    let schema = json!({
        "type": "object",
        "properties": {
            "roadmap": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "week": { "type": "integer" },
                        "focus": { "type": "string" },
                        "tasks": { "type": "array", "items": { "type": "string" } },
                        "financialGoal": { "type": "string" }
                    }
                }
            }
        }
    });

    let reply = provider.generate_json(&prompt, &schema, 0.9).await?;
    let roadmap = reply.get("roadmap").cloned().unwrap_or_else(|| json!([]));
    Ok(serde_json::from_value(roadmap)?)
}
