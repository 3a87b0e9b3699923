//! End-to-end ledger lifecycle: hydrate, mutate, snapshot, re-hydrate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use omnipds_core::error::{PdsError, Result};
use omnipds_core::model::{
    ledger_id, HealthMetric, LedgerTransaction, Note, QueryOutcome, Task, TaskPriority,
    TaskStatus, TxKind, WorkflowRule,
};
use omnipds_core::{
    HydrationSource, LedgerSession, LocalCache, PersistenceCoordinator, SnapshotSink, WriteStatus,
};

/// Shared in-memory sink standing in for the remote store.
#[derive(Clone)]
struct FakeRemote {
    stored: Arc<Mutex<Option<Vec<u8>>>>,
    offline: bool,
}

impl FakeRemote {
    fn empty() -> Self {
        Self {
            stored: Arc::new(Mutex::new(None)),
            offline: false,
        }
    }

    fn offline() -> Self {
        Self {
            stored: Arc::new(Mutex::new(None)),
            offline: true,
        }
    }

    fn image(&self) -> Option<Vec<u8>> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSink for FakeRemote {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn store(&self, image: &[u8]) -> Result<()> {
        if self.offline {
            return Err(PdsError::Transport("connection refused".to_string()));
        }
        *self.stored.lock().unwrap() = Some(image.to_vec());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        if self.offline {
            return Err(PdsError::Transport("connection refused".to_string()));
        }
        Ok(self.stored.lock().unwrap().clone())
    }
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

#[tokio::test]
async fn test_cold_start_when_both_sinks_empty() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(dir.path().join("pds.cache.json"))),
        Some(Box::new(FakeRemote::empty())),
    );

    let session = LedgerSession::open(coordinator).await.unwrap();
    assert_eq!(session.hydration_source(), HydrationSource::ColdStart);

    // Seed balances present, everything else empty.
    let balances = session.gateway().balances().unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].currency, "USD");
    assert!((balances[0].amount - 5000.0).abs() < 1e-9);
    assert_eq!(session.gateway().table_row_count("tasks").unwrap(), 0);
    assert_eq!(session.gateway().table_row_count("posts").unwrap(), 0);
}

#[tokio::test]
async fn test_mutation_snapshots_to_both_sinks_and_rehydrates() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("pds.cache.json");
    let remote = FakeRemote::empty();

    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(&cache_path)),
        Some(Box::new(remote.clone())),
    );
    let mut session = LedgerSession::open(coordinator).await.unwrap();

    session
        .add_transaction(&usd_tx(50.0, TxKind::Expense, "server rent"))
        .await
        .unwrap();
    session
        .add_note(&Note {
            id: "n1".to_string(),
            title: "Infra".to_string(),
            content: "rent renews monthly".to_string(),
            tags: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    assert!(remote.image().is_some());
    assert!(cache_path.exists());
    assert!(session
        .write_log()
        .iter()
        .all(|record| record.status == WriteStatus::Committed));

    // A fresh session hydrated from the remote sees identical state.
    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(dir.path().join("other-instance.json"))),
        Some(Box::new(remote.clone())),
    );
    let restored = LedgerSession::open(coordinator).await.unwrap();
    assert_eq!(restored.hydration_source(), HydrationSource::Remote);

    let usd = restored.gateway().balance("USD").unwrap().unwrap();
    assert!((usd.amount - 4950.0).abs() < 1e-9);
    assert_eq!(restored.gateway().table_row_count("notes").unwrap(), 1);

    let hits = restored.search("renews").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "n1");
}

#[tokio::test]
async fn test_offline_remote_degrades_to_cache_only() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("pds.cache.json");

    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(&cache_path)),
        Some(Box::new(FakeRemote::offline())),
    );
    let mut session = LedgerSession::open(coordinator).await.unwrap();
    assert_eq!(session.hydration_source(), HydrationSource::ColdStart);

    // The mutation succeeds even though the remote write fails.
    session
        .add_task(&Task {
            id: "t1".to_string(),
            title: "restore uplink".to_string(),
            status: TaskStatus::Todo,
            priority: TaskPriority::High,
        })
        .await
        .unwrap();

    let statuses: Vec<WriteStatus> = session
        .write_log()
        .iter()
        .map(|record| record.status)
        .collect();
    assert!(statuses.contains(&WriteStatus::Committed));
    assert!(statuses.contains(&WriteStatus::Failed));

    // Next boot hydrates from the cache.
    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(&cache_path)),
        Some(Box::new(FakeRemote::offline())),
    );
    let restored = LedgerSession::open(coordinator).await.unwrap();
    assert_eq!(restored.hydration_source(), HydrationSource::LocalCache);
    assert_eq!(restored.gateway().table_row_count("tasks").unwrap(), 1);
}

#[tokio::test]
async fn test_corrupt_remote_snapshot_falls_through_to_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("pds.cache.json");

    // Build a valid cache snapshot first.
    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(&cache_path)),
        None,
    );
    let mut session = LedgerSession::open(coordinator).await.unwrap();
    session
        .add_transaction(&usd_tx(25.0, TxKind::Income, "consulting"))
        .await
        .unwrap();
    drop(session);

    let remote = FakeRemote::empty();
    *remote.stored.lock().unwrap() = Some(vec![0u8; 128]);

    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(&cache_path)),
        Some(Box::new(remote)),
    );
    let restored = LedgerSession::open(coordinator).await.unwrap();
    assert_eq!(restored.hydration_source(), HydrationSource::LocalCache);
    let usd = restored.gateway().balance("USD").unwrap().unwrap();
    assert!((usd.amount - 5025.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_health_and_workflow_writes_survive_rehydration() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("pds.cache.json");

    let coordinator =
        PersistenceCoordinator::new(Box::new(LocalCache::new(&cache_path)), None);
    let mut session = LedgerSession::open(coordinator).await.unwrap();

    session
        .add_health_metric(&HealthMetric {
            id: "h1".to_string(),
            recorded_at: Utc::now(),
            metric: "steps".to_string(),
            value: 9000.0,
            unit: "count".to_string(),
        })
        .await
        .unwrap();
    session
        .add_workflow(&WorkflowRule {
            id: "w1".to_string(),
            name: "weekly export".to_string(),
            trigger_kind: "schedule".to_string(),
            condition: "sunday".to_string(),
            action: "snapshot".to_string(),
            active: true,
        })
        .await
        .unwrap();
    drop(session);

    let coordinator =
        PersistenceCoordinator::new(Box::new(LocalCache::new(&cache_path)), None);
    let restored = LedgerSession::open(coordinator).await.unwrap();
    assert_eq!(
        restored.gateway().table_row_count("health_metrics").unwrap(),
        1
    );
    assert_eq!(restored.gateway().table_row_count("workflows").unwrap(), 1);
    assert_eq!(restored.gateway().workflows().unwrap()[0].name, "weekly export");
}

#[tokio::test]
async fn test_raw_query_persists_writes() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("pds.cache.json");

    let coordinator =
        PersistenceCoordinator::new(Box::new(LocalCache::new(&cache_path)), None);
    let mut session = LedgerSession::open(coordinator).await.unwrap();

    let outcome = session
        .raw_query("INSERT INTO tasks VALUES ('raw1', 'via console', 'todo', 'low')")
        .await;
    assert!(outcome.is_success());

    let coordinator =
        PersistenceCoordinator::new(Box::new(LocalCache::new(&cache_path)), None);
    let restored = LedgerSession::open(coordinator).await.unwrap();
    match restored.gateway().raw("SELECT COUNT(*) AS n FROM tasks") {
        QueryOutcome::Rows(rows) => assert_eq!(rows[0]["n"], serde_json::json!(1)),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_context_snapshot_shape() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = PersistenceCoordinator::new(
        Box::new(LocalCache::new(dir.path().join("pds.cache.json"))),
        None,
    );
    let mut session = LedgerSession::open(coordinator).await.unwrap();
    session
        .add_transaction(&usd_tx(10.0, TxKind::Expense, "coffee"))
        .await
        .unwrap();

    let context = session.context_snapshot().unwrap();
    assert!(context["balances"].is_array());
    assert_eq!(context["row_counts"]["transactions"], serde_json::json!(1));
    assert!(context["recent_activity"].is_array());
}
