//! Query gateway: the typed read/write surface over the engine.
//!
//! Typed mutators perform the engine write plus the matching search-index
//! upsert; the session facade layers persistence on top. The raw-SQL escape
//! hatch lives here too, clearly separated as the less-safe path.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::engine::LedgerEngine;
use crate::error::{PdsError, Result};
use crate::index::SearchIndex;
use crate::model::{
    currency_symbol, Asset, Balance, Contact, FeedItem, HealthMetric, LedgerTransaction, Message,
    Note, QueryOutcome, SearchHit, SocialPost, Task, TaskStatus, WorkflowRule,
};

/// Typed access to the ledger's primary tables.
pub struct LedgerGateway {
    engine: LedgerEngine,
    index: SearchIndex,
}

impl LedgerGateway {
    pub fn new(engine: LedgerEngine, index: SearchIndex) -> Self {
        Self { engine, index }
    }

    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    // --- Social posts ---

    pub fn posts(&self) -> Result<Vec<SocialPost>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, author, body, likes, created_at FROM posts ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut posts = Vec::new();
        for row in rows {
            let (id, author, body, likes, created_at) = row?;
            posts.push(SocialPost {
                id,
                author,
                body,
                likes,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(posts)
    }

    pub fn add_post(&self, post: &SocialPost) -> Result<()> {
        {
            let conn = self.engine.lock_conn()?;
            conn.execute(
                "INSERT INTO posts (id, author, body, likes, created_at) VALUES (?, ?, ?, ?, ?)",
                (
                    &post.id,
                    &post.author,
                    &post.body,
                    post.likes,
                    post.created_at.to_rfc3339(),
                ),
            )?;
        }
        self.index.upsert(&self.engine, &post.id, &post.body, "SOCIAL")
    }

    // --- Transactions and balances ---

    pub fn transactions(&self) -> Result<Vec<LedgerTransaction>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, amount, currency, category, kind, occurred_at, description \
             FROM transactions ORDER BY occurred_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut transactions = Vec::new();
        for row in rows {
            let (id, amount, currency, category, kind, occurred_at, description) = row?;
            transactions.push(LedgerTransaction {
                id,
                amount,
                currency,
                category,
                kind: kind.parse()?,
                occurred_at: parse_timestamp(&occurred_at)?,
                description,
            });
        }
        Ok(transactions)
    }

    /// Insert a transaction and adjust the matching balance as one logical
    /// unit. Both statements run inside a single SQL transaction so the
    /// balance invariant cannot be broken by a partial write.
    pub fn add_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        {
            let mut conn = self.engine.lock_conn()?;
            let sql_tx = conn.transaction()?;
            sql_tx.execute(
                "INSERT INTO transactions (id, amount, currency, category, kind, occurred_at, description) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    &tx.id,
                    tx.amount,
                    &tx.currency,
                    &tx.category,
                    tx.kind.as_str(),
                    tx.occurred_at.to_rfc3339(),
                    &tx.description,
                ),
            )?;
            // An unseeded currency starts from zero before the delta applies.
            sql_tx.execute(
                "INSERT OR IGNORE INTO balances (currency, amount, symbol) VALUES (?, 0, ?)",
                (&tx.currency, currency_symbol(&tx.currency)),
            )?;
            sql_tx.execute(
                "UPDATE balances SET amount = amount + ? WHERE currency = ?",
                (tx.kind.signed(tx.amount), &tx.currency),
            )?;
            sql_tx.commit()?;
        }
        self.index
            .upsert(&self.engine, &tx.id, &tx.description, "FINANCE")
    }

    pub fn balances(&self) -> Result<Vec<Balance>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT currency, amount, symbol FROM balances ORDER BY currency")?;
        let rows = stmt.query_map([], |row| {
            Ok(Balance {
                currency: row.get(0)?,
                amount: row.get(1)?,
                symbol: row.get(2)?,
            })
        })?;

        let mut balances = Vec::new();
        for row in rows {
            balances.push(row?);
        }
        Ok(balances)
    }

    pub fn balance(&self, currency: &str) -> Result<Option<Balance>> {
        let conn = self.engine.lock_conn()?;
        let balance = conn
            .query_row(
                "SELECT currency, amount, symbol FROM balances WHERE currency = ?",
                [currency],
                |row| {
                    Ok(Balance {
                        currency: row.get(0)?,
                        amount: row.get(1)?,
                        symbol: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(balance)
    }

    // --- Tasks ---

    pub fn tasks(&self) -> Result<Vec<Task>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn.prepare("SELECT id, title, status, priority FROM tasks")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            let (id, title, status, priority) = row?;
            tasks.push(Task {
                id,
                title,
                status: status.parse()?,
                priority: priority.parse()?,
            });
        }
        Ok(tasks)
    }

    pub fn add_task(&self, task: &Task) -> Result<()> {
        {
            let conn = self.engine.lock_conn()?;
            conn.execute(
                "INSERT INTO tasks (id, title, status, priority) VALUES (?, ?, ?, ?)",
                (
                    &task.id,
                    &task.title,
                    task.status.as_str(),
                    task.priority.as_str(),
                ),
            )?;
        }
        self.index
            .upsert(&self.engine, &task.id, &task.title, "PROJECTS")
    }

    /// Supported in-place update: task status transition.
    pub fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let conn = self.engine.lock_conn()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ? WHERE id = ?",
            (status.as_str(), id),
        )?;
        if changed == 0 {
            return Err(PdsError::NotFound(format!("Task not found: {}", id)));
        }
        Ok(())
    }

    // --- Notes ---

    pub fn notes(&self) -> Result<Vec<Note>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, title, content, tags, updated_at FROM notes")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut notes = Vec::new();
        for row in rows {
            let (id, title, content, tags, updated_at) = row?;
            notes.push(Note {
                id,
                title,
                content,
                tags,
                updated_at: parse_timestamp(&updated_at)?,
            });
        }
        Ok(notes)
    }

    pub fn add_note(&self, note: &Note) -> Result<()> {
        {
            let conn = self.engine.lock_conn()?;
            conn.execute(
                "INSERT INTO notes (id, title, content, tags, updated_at) VALUES (?, ?, ?, ?, ?)",
                (
                    &note.id,
                    &note.title,
                    &note.content,
                    &note.tags,
                    note.updated_at.to_rfc3339(),
                ),
            )?;
        }
        let content = format!("{} {}", note.title, note.content);
        self.index.upsert(&self.engine, &note.id, &content, "VAULT")
    }

    // --- Contacts ---

    pub fn contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, handle, category, last_contacted, notes FROM contacts")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut contacts = Vec::new();
        for row in rows {
            let (id, name, handle, category, last_contacted, notes) = row?;
            contacts.push(Contact {
                id,
                name,
                handle,
                category,
                last_contacted: parse_timestamp(&last_contacted)?,
                notes,
            });
        }
        Ok(contacts)
    }

    pub fn add_contact(&self, contact: &Contact) -> Result<()> {
        {
            let conn = self.engine.lock_conn()?;
            conn.execute(
                "INSERT INTO contacts (id, name, handle, category, last_contacted, notes) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                (
                    &contact.id,
                    &contact.name,
                    &contact.handle,
                    &contact.category,
                    contact.last_contacted.to_rfc3339(),
                    &contact.notes,
                ),
            )?;
        }
        let content = match &contact.handle {
            Some(handle) => format!("{} {}", contact.name, handle),
            None => contact.name.clone(),
        };
        self.index
            .upsert(&self.engine, &contact.id, &content, "IDENTITY")
    }

    // --- Assets ---

    pub fn assets(&self) -> Result<Vec<Asset>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, serial, value, category, location, purchased_at FROM assets",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut assets = Vec::new();
        for row in rows {
            let (id, name, serial, value, category, location, purchased_at) = row?;
            assets.push(Asset {
                id,
                name,
                serial,
                value,
                category,
                location,
                purchased_at: parse_timestamp(&purchased_at)?,
            });
        }
        Ok(assets)
    }

    pub fn add_asset(&self, asset: &Asset) -> Result<()> {
        {
            let conn = self.engine.lock_conn()?;
            conn.execute(
                "INSERT INTO assets (id, name, serial, value, category, location, purchased_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    &asset.id,
                    &asset.name,
                    &asset.serial,
                    asset.value,
                    &asset.category,
                    &asset.location,
                    asset.purchased_at.to_rfc3339(),
                ),
            )?;
        }
        self.index
            .upsert(&self.engine, &asset.id, &asset.name, "INVENTORY")
    }

    // --- Messages ---

    pub fn messages(&self) -> Result<Vec<Message>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, sender, receiver, body, sent_at, encrypted FROM messages \
             ORDER BY sent_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, sender, receiver, body, sent_at, encrypted) = row?;
            messages.push(Message {
                id,
                sender,
                receiver,
                body,
                sent_at: parse_timestamp(&sent_at)?,
                encrypted: encrypted != 0,
            });
        }
        Ok(messages)
    }

    pub fn add_message(&self, message: &Message) -> Result<()> {
        {
            let conn = self.engine.lock_conn()?;
            conn.execute(
                "INSERT INTO messages (id, sender, receiver, body, sent_at, encrypted) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                (
                    &message.id,
                    &message.sender,
                    &message.receiver,
                    &message.body,
                    message.sent_at.to_rfc3339(),
                    message.encrypted as i64,
                ),
            )?;
        }
        self.index
            .upsert(&self.engine, &message.id, &message.body, "COMMS")
    }

    // --- Health metrics ---

    pub fn health_metrics(&self) -> Result<Vec<HealthMetric>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, recorded_at, metric, value, unit FROM health_metrics")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut metrics = Vec::new();
        for row in rows {
            let (id, recorded_at, metric, value, unit) = row?;
            metrics.push(HealthMetric {
                id,
                recorded_at: parse_timestamp(&recorded_at)?,
                metric,
                value,
                unit,
            });
        }
        Ok(metrics)
    }

    pub fn add_health_metric(&self, metric: &HealthMetric) -> Result<()> {
        let conn = self.engine.lock_conn()?;
        conn.execute(
            "INSERT INTO health_metrics (id, recorded_at, metric, value, unit) \
             VALUES (?, ?, ?, ?, ?)",
            (
                &metric.id,
                metric.recorded_at.to_rfc3339(),
                &metric.metric,
                metric.value,
                &metric.unit,
            ),
        )?;
        Ok(())
    }

    // --- Workflow rules ---

    pub fn workflows(&self) -> Result<Vec<WorkflowRule>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, trigger_kind, condition, action, active FROM workflows")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut workflows = Vec::new();
        for row in rows {
            let (id, name, trigger_kind, condition, action, active) = row?;
            workflows.push(WorkflowRule {
                id,
                name,
                trigger_kind,
                condition,
                action,
                active: active != 0,
            });
        }
        Ok(workflows)
    }

    pub fn add_workflow(&self, rule: &WorkflowRule) -> Result<()> {
        let conn = self.engine.lock_conn()?;
        conn.execute(
            "INSERT INTO workflows (id, name, trigger_kind, condition, action, active) \
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                &rule.id,
                &rule.name,
                &rule.trigger_kind,
                &rule.condition,
                &rule.action,
                rule.active as i64,
            ),
        )?;
        Ok(())
    }

    // --- Cross-table surfaces ---

    /// Recent posts and transactions merged into one reverse-chronological
    /// feed.
    pub fn unified_feed(&self) -> Result<Vec<FeedItem>> {
        let conn = self.engine.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT origin, date, title FROM ( \
                 SELECT 'SOCIAL' AS origin, created_at AS date, body AS title \
                 FROM posts ORDER BY created_at DESC LIMIT 5 \
             ) UNION ALL \
             SELECT origin, date, title FROM ( \
                 SELECT 'FINANCE' AS origin, occurred_at AS date, description AS title \
                 FROM transactions ORDER BY occurred_at DESC LIMIT 5 \
             ) ORDER BY date DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut feed = Vec::new();
        for row in rows {
            let (origin, date, title) = row?;
            feed.push(FeedItem {
                origin,
                date: parse_timestamp(&date)?,
                title,
            });
        }
        Ok(feed)
    }

    pub fn table_row_count(&self, table: &str) -> Result<i64> {
        self.engine.table_row_count(table)
    }

    /// Free-text search across all indexed tables.
    pub fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.index.search(&self.engine, term)
    }

    /// Rebuild the search index from the primary tables.
    pub fn rebuild_index(&self) -> Result<()> {
        self.index.rebuild(&self.engine)
    }

    /// Raw SQL escape hatch. No allowlist, no read/write distinction; the
    /// caller is a trusted operator (console or agent bridge).
    pub fn raw(&self, sql: &str) -> QueryOutcome {
        self.engine.raw(sql)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PdsError::Validation(format!("Invalid timestamp {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ledger_id, TaskPriority, TxKind};

    fn gateway() -> LedgerGateway {
        let engine = LedgerEngine::cold_start().unwrap();
        let index = SearchIndex::attach(&engine);
        LedgerGateway::new(engine, index)
    }

    fn usd_tx(amount: f64, kind: TxKind, description: &str) -> LedgerTransaction {
        LedgerTransaction {
            id: ledger_id(),
            amount,
            currency: "USD".to_string(),
            category: "general".to_string(),
            kind,
            occurred_at: Utc::now(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_balance_tracks_signed_transaction_sum() {
        let gw = gateway();
        // Seed is 5000.00 USD.
        gw.add_transaction(&usd_tx(50.0, TxKind::Expense, "groceries"))
            .unwrap();
        gw.add_transaction(&usd_tx(25.0, TxKind::Income, "refund"))
            .unwrap();
        gw.add_transaction(&usd_tx(100.0, TxKind::Expense, "utilities"))
            .unwrap();

        let usd = gw.balance("USD").unwrap().unwrap();
        assert!((usd.amount - 4875.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_follows_signed_deltas() {
        let gw = gateway();
        // Reset the seed to the scenario value of 100.00.
        gw.raw("UPDATE balances SET amount = 100.0 WHERE currency = 'USD'");

        gw.add_transaction(&usd_tx(50.0, TxKind::Expense, "expense one"))
            .unwrap();
        let usd = gw.balance("USD").unwrap().unwrap();
        assert!((usd.amount - 50.0).abs() < 1e-9);

        gw.add_transaction(&usd_tx(25.0, TxKind::Income, "income one"))
            .unwrap();
        let usd = gw.balance("USD").unwrap().unwrap();
        assert!((usd.amount - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_unseeded_currency_starts_from_zero() {
        let gw = gateway();
        gw.add_transaction(&LedgerTransaction {
            id: ledger_id(),
            amount: 2.5,
            currency: "BTC".to_string(),
            category: "mining".to_string(),
            kind: TxKind::Income,
            occurred_at: Utc::now(),
            description: "block reward".to_string(),
        })
        .unwrap();

        let btc = gw.balance("BTC").unwrap().unwrap();
        assert!((btc.amount - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_add_post_is_searchable() {
        let gw = gateway();
        gw.add_post(&SocialPost {
            id: "p1".to_string(),
            author: "ada".to_string(),
            body: "quarterly retrospective published".to_string(),
            likes: 0,
            created_at: Utc::now(),
        })
        .unwrap();

        let hits = gw.search("retrospective").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].origin, "SOCIAL");
    }

    #[test]
    fn test_task_status_transition() {
        let gw = gateway();
        gw.add_task(&Task {
            id: "t1".to_string(),
            title: "write report".to_string(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
        })
        .unwrap();

        gw.update_task_status("t1", TaskStatus::Done).unwrap();
        let tasks = gw.tasks().unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Done);

        assert!(gw.update_task_status("missing", TaskStatus::Done).is_err());
    }

    #[test]
    fn test_unified_feed_merges_posts_and_transactions() {
        let gw = gateway();
        gw.add_post(&SocialPost {
            id: "p1".to_string(),
            author: "ada".to_string(),
            body: "hello".to_string(),
            likes: 0,
            created_at: Utc::now(),
        })
        .unwrap();
        gw.add_transaction(&usd_tx(10.0, TxKind::Expense, "coffee"))
            .unwrap();

        let feed = gw.unified_feed().unwrap();
        assert_eq!(feed.len(), 2);
        let origins: Vec<&str> = feed.iter().map(|f| f.origin.as_str()).collect();
        assert!(origins.contains(&"SOCIAL"));
        assert!(origins.contains(&"FINANCE"));
    }

    #[test]
    fn test_health_metric_round_trip() {
        let gw = gateway();
        gw.add_health_metric(&HealthMetric {
            id: "h1".to_string(),
            recorded_at: Utc::now(),
            metric: "sleep".to_string(),
            value: 7.5,
            unit: "hours".to_string(),
        })
        .unwrap();

        let metrics = gw.health_metrics().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric, "sleep");
        assert!((metrics[0].value - 7.5).abs() < 1e-9);
        // Health samples stay out of the search index.
        assert!(gw.search("sleep").unwrap().is_empty());
    }

    #[test]
    fn test_workflow_rule_round_trip() {
        let gw = gateway();
        gw.add_workflow(&WorkflowRule {
            id: "w1".to_string(),
            name: "low balance alert".to_string(),
            trigger_kind: "threshold".to_string(),
            condition: "balance < 100".to_string(),
            action: "notify".to_string(),
            active: true,
        })
        .unwrap();

        let rules = gw.workflows().unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].active);
        assert_eq!(rules[0].trigger_kind, "threshold");
        assert_eq!(rules[0].action, "notify");
    }

    #[test]
    fn test_raw_failure_is_discriminated() {
        let gw = gateway();
        let outcome = gw.raw("SELECT * FROM not_a_table");
        assert!(!outcome.is_success());
    }
}
