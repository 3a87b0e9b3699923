//! Ledger session facade.
//!
//! Wires engine, search index, query gateway and persistence coordinator
//! into the lifecycle described by the boot flow: hydrate (remote > local
//! cache > cold start), serve reads, and re-snapshot after every mutation.
//! There is exactly one session (and one engine handle) per process run;
//! tests instantiate isolated sessions instead of sharing global state.

use crate::engine::LedgerEngine;
use crate::error::Result;
use crate::gateway::LedgerGateway;
use crate::index::SearchIndex;
use crate::model::{
    Asset, Contact, HealthMetric, LedgerTransaction, Message, Note, QueryOutcome, SearchHit,
    SocialPost, Task, TaskStatus, WorkflowRule,
};
use crate::store::{HydrationSource, PersistenceCoordinator, WriteRecord};

/// A live ledger bound to its persistence coordinator.
pub struct LedgerSession {
    gateway: LedgerGateway,
    coordinator: PersistenceCoordinator,
    source: HydrationSource,
}

impl LedgerSession {
    /// Boot a session: try each hydration candidate in priority order,
    /// falling back to a cold start when every candidate is absent or
    /// corrupt.
    pub async fn open(coordinator: PersistenceCoordinator) -> Result<Self> {
        let mut engine = None;
        let mut source = HydrationSource::ColdStart;

        for candidate in coordinator.hydrate().await {
            match LedgerEngine::from_image(&candidate.image) {
                Ok(restored) => {
                    tracing::info!(source = candidate.source.as_str(), "ledger hydrated");
                    engine = Some(restored);
                    source = candidate.source;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        source = candidate.source.as_str(),
                        error = %e,
                        "snapshot unusable, trying next source"
                    );
                }
            }
        }

        let engine = match engine {
            Some(engine) => engine,
            None => {
                tracing::info!("no usable snapshot, cold starting");
                LedgerEngine::cold_start()?
            }
        };

        let index = SearchIndex::attach(&engine);
        Ok(Self {
            gateway: LedgerGateway::new(engine, index),
            coordinator,
            source,
        })
    }

    /// Open a session with a forced cold start, ignoring stored snapshots.
    pub fn cold_start(coordinator: PersistenceCoordinator) -> Result<Self> {
        let engine = LedgerEngine::cold_start()?;
        let index = SearchIndex::attach(&engine);
        Ok(Self {
            gateway: LedgerGateway::new(engine, index),
            coordinator,
            source: HydrationSource::ColdStart,
        })
    }

    pub fn hydration_source(&self) -> HydrationSource {
        self.source
    }

    /// The typed read surface. Mutations go through the session methods so
    /// persistence stays attached to every write path.
    pub fn gateway(&self) -> &LedgerGateway {
        &self.gateway
    }

    pub fn write_log(&self) -> &[WriteRecord] {
        self.coordinator.write_log()
    }

    /// Export the current Ledger Image and dual-write it. Persistence is
    /// best-effort: the caller's mutation has already succeeded and is not
    /// rolled back on a sink failure.
    pub async fn persist(&mut self) {
        match self.gateway.engine().export() {
            Ok(image) => self.coordinator.persist(&image).await,
            Err(e) => tracing::warn!(error = %e, "ledger export failed, snapshot skipped"),
        }
    }

    // --- Mutations (write, then snapshot) ---

    pub async fn add_post(&mut self, post: &SocialPost) -> Result<()> {
        self.gateway.add_post(post)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_transaction(&mut self, tx: &LedgerTransaction) -> Result<()> {
        self.gateway.add_transaction(tx)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_task(&mut self, task: &Task) -> Result<()> {
        self.gateway.add_task(task)?;
        self.persist().await;
        Ok(())
    }

    pub async fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        self.gateway.update_task_status(id, status)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_note(&mut self, note: &Note) -> Result<()> {
        self.gateway.add_note(note)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_contact(&mut self, contact: &Contact) -> Result<()> {
        self.gateway.add_contact(contact)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_asset(&mut self, asset: &Asset) -> Result<()> {
        self.gateway.add_asset(asset)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_message(&mut self, message: &Message) -> Result<()> {
        self.gateway.add_message(message)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_health_metric(&mut self, metric: &HealthMetric) -> Result<()> {
        self.gateway.add_health_metric(metric)?;
        self.persist().await;
        Ok(())
    }

    pub async fn add_workflow(&mut self, rule: &WorkflowRule) -> Result<()> {
        self.gateway.add_workflow(rule)?;
        self.persist().await;
        Ok(())
    }

    /// Raw SQL surface. The statement may have written, so a snapshot is
    /// always taken afterwards.
    pub async fn raw_query(&mut self, sql: &str) -> QueryOutcome {
        let outcome = self.gateway.raw(sql);
        self.persist().await;
        outcome
    }

    /// Free-text search. Read-only: no snapshot.
    pub fn search(&self, term: &str) -> Result<Vec<SearchHit>> {
        self.gateway.search(term)
    }

    /// JSON summary of ledger state, used as system context for the agent.
    pub fn context_snapshot(&self) -> Result<serde_json::Value> {
        let balances = self.gateway.balances()?;
        let feed = self.gateway.unified_feed()?;

        let mut counts = serde_json::Map::new();
        for table in crate::engine::PRIMARY_TABLES {
            counts.insert(
                table.to_string(),
                serde_json::Value::from(self.gateway.table_row_count(table)?),
            );
        }

        Ok(serde_json::json!({
            "balances": balances,
            "row_counts": counts,
            "recent_activity": feed,
        }))
    }
}
