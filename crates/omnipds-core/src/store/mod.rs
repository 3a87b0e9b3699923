//! Persistence coordinator and snapshot sinks.
//!
//! After every mutating session call the current Ledger Image is written to
//! two independent sinks: a fast local cache and a remote durable store.
//! Writes are best-effort with no cross-checking; each attempt is recorded
//! with an explicit status so retry and reconciliation stay observable.
//!
//! On boot, hydration candidates are offered in priority order
//! **remote > local cache > cold start**: the remote store is shared across
//! client instances, the cache is instance-scoped.

mod local;
mod remote;

pub use local::LocalCache;
pub use remote::RemoteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// A destination for Ledger Image snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Short sink name used in write records and logs.
    fn name(&self) -> &'static str;

    /// Overwrite the stored snapshot wholesale. Last writer wins.
    async fn store(&self, image: &[u8]) -> Result<()>;

    /// Fetch the stored snapshot, `None` if the sink holds nothing yet.
    async fn load(&self) -> Result<Option<Vec<u8>>>;
}

/// Terminal status of one outbound snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    Committed,
    Failed,
}

/// One recorded snapshot write attempt.
#[derive(Debug, Clone, Serialize)]
pub struct WriteRecord {
    pub sink: &'static str,
    pub status: WriteStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// Where a hydration candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    Remote,
    LocalCache,
    ColdStart,
}

impl HydrationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HydrationSource::Remote => "remote",
            HydrationSource::LocalCache => "local-cache",
            HydrationSource::ColdStart => "cold-start",
        }
    }
}

/// A loadable snapshot candidate.
pub struct Snapshot {
    pub source: HydrationSource,
    pub image: Vec<u8>,
}

/// Dual-target snapshot writer with boot-time hydration.
pub struct PersistenceCoordinator {
    local: Box<dyn SnapshotSink>,
    remote: Option<Box<dyn SnapshotSink>>,
    log: Vec<WriteRecord>,
}

impl PersistenceCoordinator {
    pub fn new(local: Box<dyn SnapshotSink>, remote: Option<Box<dyn SnapshotSink>>) -> Self {
        Self {
            local,
            remote,
            log: Vec::new(),
        }
    }

    /// Write the image to every sink, independently. A sink failure is
    /// logged and recorded but never propagated: the in-memory mutation and
    /// the other sink's write stand regardless.
    pub async fn persist(&mut self, image: &[u8]) {
        let local_record = write_to(self.local.as_ref(), image).await;
        self.log.push(local_record);

        if let Some(remote) = &self.remote {
            let remote_record = write_to(remote.as_ref(), image).await;
            self.log.push(remote_record);
        }
    }

    /// Hydration candidates in priority order. A sink error or empty sink
    /// just drops out of the list; the caller falls back to a cold start
    /// when the list is empty or every candidate turns out corrupt.
    pub async fn hydrate(&self) -> Vec<Snapshot> {
        let mut candidates = Vec::new();

        if let Some(remote) = &self.remote {
            match remote.load().await {
                Ok(Some(image)) => candidates.push(Snapshot {
                    source: HydrationSource::Remote,
                    image,
                }),
                Ok(None) => tracing::info!("remote store holds no snapshot yet"),
                Err(e) => tracing::warn!(error = %e, "remote hydration failed"),
            }
        }

        match self.local.load().await {
            Ok(Some(image)) => candidates.push(Snapshot {
                source: HydrationSource::LocalCache,
                image,
            }),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "local cache hydration failed"),
        }

        candidates
    }

    /// The outbound write log, oldest first.
    pub fn write_log(&self) -> &[WriteRecord] {
        &self.log
    }
}

async fn write_to(sink: &dyn SnapshotSink, image: &[u8]) -> WriteRecord {
    match sink.store(image).await {
        Ok(()) => WriteRecord {
            sink: sink.name(),
            status: WriteStatus::Committed,
            at: Utc::now(),
            detail: None,
        },
        Err(e) => {
            tracing::warn!(sink = sink.name(), error = %e, "snapshot write failed");
            WriteRecord {
                sink: sink.name(),
                status: WriteStatus::Failed,
                at: Utc::now(),
                detail: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdsError;
    use std::sync::Mutex;

    struct MemorySink {
        name: &'static str,
        stored: Mutex<Option<Vec<u8>>>,
        fail: bool,
    }

    impl MemorySink {
        fn holding(name: &'static str, image: Option<Vec<u8>>) -> Self {
            Self {
                name,
                stored: Mutex::new(image),
                fail: false,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                stored: Mutex::new(None),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SnapshotSink for MemorySink {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn store(&self, image: &[u8]) -> Result<()> {
            if self.fail {
                return Err(PdsError::Transport("sink offline".to_string()));
            }
            *self.stored.lock().unwrap() = Some(image.to_vec());
            Ok(())
        }

        async fn load(&self) -> Result<Option<Vec<u8>>> {
            if self.fail {
                return Err(PdsError::Transport("sink offline".to_string()));
            }
            Ok(self.stored.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_remote_candidate_comes_first() {
        let coordinator = PersistenceCoordinator::new(
            Box::new(MemorySink::holding("local", Some(vec![1]))),
            Some(Box::new(MemorySink::holding("remote", Some(vec![2])))),
        );

        let candidates = coordinator.hydrate().await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source, HydrationSource::Remote);
        assert_eq!(candidates[0].image, vec![2]);
        assert_eq!(candidates[1].source, HydrationSource::LocalCache);
    }

    #[tokio::test]
    async fn test_unreachable_remote_falls_back_to_cache() {
        let coordinator = PersistenceCoordinator::new(
            Box::new(MemorySink::holding("local", Some(vec![7]))),
            Some(Box::new(MemorySink::failing("remote"))),
        );

        let candidates = coordinator.hydrate().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, HydrationSource::LocalCache);
    }

    #[tokio::test]
    async fn test_empty_sinks_mean_cold_start() {
        let coordinator = PersistenceCoordinator::new(
            Box::new(MemorySink::holding("local", None)),
            Some(Box::new(MemorySink::holding("remote", None))),
        );

        assert!(coordinator.hydrate().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_records_per_sink_status() {
        let mut coordinator = PersistenceCoordinator::new(
            Box::new(MemorySink::holding("local", None)),
            Some(Box::new(MemorySink::failing("remote"))),
        );

        coordinator.persist(&[42]).await;

        let log = coordinator.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sink, "local");
        assert_eq!(log[0].status, WriteStatus::Committed);
        assert_eq!(log[1].sink, "remote");
        assert_eq!(log[1].status, WriteStatus::Failed);
        assert!(log[1].detail.as_deref().unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_persist_without_remote_writes_cache_only() {
        let mut coordinator =
            PersistenceCoordinator::new(Box::new(MemorySink::holding("local", None)), None);

        coordinator.persist(&[9, 9]).await;

        let log = coordinator.write_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, WriteStatus::Committed);
    }
}
