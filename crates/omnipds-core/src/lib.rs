//! # OmniPDS Core
//!
//! Local-first embedded ledger for a personal data store: an in-memory
//! SQLite database serialized to dual persistence targets, with a
//! full-text search projection and a typed query surface.
//!
//! ## Architecture
//!
//! - **engine**: embedded database wrapper (open, execute, export)
//! - **index**: search index synchronizer with scan fallback
//! - **store**: persistence coordinator and snapshot sinks
//! - **gateway**: typed per-table read/write surface plus raw SQL
//! - **session**: facade tying hydration, mutation and snapshotting together
//! - **model**: entity row types

pub mod engine;
pub mod error;
pub mod fs;
pub mod gateway;
pub mod index;
pub mod model;
pub mod session;
pub mod store;

pub use engine::LedgerEngine;
pub use error::{PdsError, Result};
pub use gateway::LedgerGateway;
pub use index::{IndexMode, SearchIndex};
pub use session::LedgerSession;
pub use store::{
    HydrationSource, LocalCache, PersistenceCoordinator, RemoteStore, SnapshotSink, WriteStatus,
};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
