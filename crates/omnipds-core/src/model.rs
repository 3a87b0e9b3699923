//! Entity row types for the ledger's logical tables.
//!
//! Each row carries a caller-assigned string id (timestamp-derived, unique
//! within its table, never reused). Rows are immutable once written apart
//! from the explicitly supported in-place updates (task status transitions,
//! balance deltas).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PdsError;

/// A social post row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub author: String,
    pub body: String,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
}

/// Direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Income,
    Expense,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Income => "income",
            TxKind::Expense => "expense",
        }
    }

    /// Signed balance delta for a transaction of this kind.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            TxKind::Income => amount,
            TxKind::Expense => -amount,
        }
    }
}

impl FromStr for TxKind {
    type Err = PdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TxKind::Income),
            "expense" => Ok(TxKind::Expense),
            other => Err(PdsError::Validation(format!(
                "Invalid transaction kind: {} (use income or expense)",
                other
            ))),
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A financial transaction row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub category: String,
    pub kind: TxKind,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
}

/// Task workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = PdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            other => Err(PdsError::Validation(format!(
                "Invalid task status: {} (use todo, doing or done)",
                other
            ))),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = PdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(PdsError::Validation(format!(
                "Invalid task priority: {} (use low, medium or high)",
                other
            ))),
        }
    }
}

/// A project task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

/// A per-currency running balance.
///
/// Invariant: `amount` equals the seed value plus the signed sum of all
/// transaction amounts in this currency. The gateway maintains this
/// incrementally at transaction-insert time; it is never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub amount: f64,
    pub symbol: String,
}

/// A vault note row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A health metric sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetric {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    pub unit: String,
}

/// An identity contact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub handle: Option<String>,
    pub category: String,
    pub last_contacted: DateTime<Utc>,
    pub notes: Option<String>,
}

/// An inventory asset row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub serial: Option<String>,
    pub value: f64,
    pub category: String,
    pub location: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

/// A comms message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub encrypted: bool,
}

/// An automation rule row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub id: String,
    pub name: String,
    pub trigger_kind: String,
    pub condition: String,
    pub action: String,
    pub active: bool,
}

/// One entry of the unified dashboard feed (recent posts and transactions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub origin: String,
    pub date: DateTime<Utc>,
    pub title: String,
}

/// A ranked free-text search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub origin: String,
}

/// Outcome of raw SQL execution.
///
/// The raw surface never propagates engine errors to the caller; a failure
/// is a value, not an exception.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// A row-producing statement: one JSON object per row.
    Rows(Vec<serde_json::Value>),
    /// A write (or script) that produced no rows.
    Done { changes: usize },
    /// The statement was rejected by the engine.
    Failed { error: String },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, QueryOutcome::Failed { .. })
    }

    /// Discriminated `{success, ...}` encoding used by the console surface
    /// and the agent tool bridge.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryOutcome::Rows(rows) => serde_json::json!({ "success": true, "rows": rows }),
            QueryOutcome::Done { changes } => {
                serde_json::json!({ "success": true, "changes": changes })
            }
            QueryOutcome::Failed { error } => {
                serde_json::json!({ "success": false, "error": error })
            }
        }
    }
}

/// Generate a fresh caller-assigned entity id.
///
/// Timestamp-derived with a process-local counter so two calls in the same
/// clock tick still differ.
pub fn ledger_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = NEXT.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", nanos, seq)
}

/// Display symbol for a currency code.
pub fn currency_symbol(code: &str) -> &'static str {
    match code {
        "USD" | "AUD" | "CAD" => "$",
        "EUR" => "\u{20ac}",
        "GBP" => "\u{a3}",
        "JPY" => "\u{a5}",
        "BTC" => "\u{20bf}",
        "ETH" => "\u{39e}",
        _ => "\u{a4}",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_kind_round_trip() {
        assert_eq!(TxKind::from_str("income").unwrap(), TxKind::Income);
        assert_eq!(TxKind::from_str("expense").unwrap(), TxKind::Expense);
        assert!(TxKind::from_str("transfer").is_err());
        assert_eq!(TxKind::Income.signed(10.0), 10.0);
        assert_eq!(TxKind::Expense.signed(10.0), -10.0);
    }

    #[test]
    fn test_query_outcome_json_shape() {
        let ok = QueryOutcome::Rows(vec![serde_json::json!({"n": 1})]);
        let json = ok.to_json();
        assert_eq!(json["success"], serde_json::json!(true));
        assert!(json["rows"].is_array());

        let failed = QueryOutcome::Failed {
            error: "no such table".to_string(),
        };
        let json = failed.to_json();
        assert_eq!(json["success"], serde_json::json!(false));
        assert_eq!(json["error"], serde_json::json!("no such table"));
    }

    #[test]
    fn test_ledger_ids_are_unique() {
        let a = ledger_id();
        let b = ledger_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
