//! # Calls-Core
//!
//! Outbound call lifecycle tracking for calls placed through an external
//! telephony provider.
//!
//! The provider is the source of truth for what happens during a call, but
//! it reports asynchronously: webhooks arrive late, twice, out of order, or
//! not at all. This crate keeps one local record per call converging on the
//! provider's view anyway:
//!
//! - a totally ordered status lattice with absorbing terminal states
//! - a reconciler that turns any provider snapshot into a minimal change set
//! - push (webhook) and pull (poll) ingestion feeding the same reconciler
//! - a stale sweeper and an admission gate working on stored state
//!
//! ## Architecture
//!
//! ```text
//! webhook ──► PushChannel ─┐
//!                          ├─► reconcile(normalize, guard, merge) ──► CallStore
//! provider ◄─ PollChannel ─┘
//!
//! StaleSweeper, AdmissionGate ──────────────────────────────────────► CallStore
//! ```

pub mod admission;
pub mod api;
pub mod changeset;
pub mod config;
pub mod directory;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod service;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod sweeper;
pub mod transition;
pub mod types;

use std::sync::Arc;

pub use admission::AdmissionGate;
pub use changeset::{CallField, ChangeSet};
pub use config::CallsConfig;
pub use directory::{ContactDirectory, MemoryDirectory};
pub use error::{CallError, ErrorKind, Result};
pub use ingest::{PollChannel, PushChannel, PushOutcome};
pub use provider::{ProviderClient, VapiClient};
pub use reconcile::reconcile;
pub use service::{CallService, MaintenanceReport};
pub use snapshot::{ProviderSnapshot, SnapshotPhase};
pub use status::CallStatus;
pub use store::{CallStore, MemoryCallStore, SqliteCallStore};
pub use sweeper::StaleSweeper;
pub use transition::is_valid_transition;
pub use types::{Call, CallGoal, CallScript, Contact, CreateCallRequest};

/// Initialize the call service against SQLite and the Vapi API
pub async fn init(config: &CallsConfig, directory: Arc<dyn ContactDirectory>) -> Result<CallService> {
    config.validate()?;

    let store = SqliteCallStore::new(&config.database_url).await?;
    let provider = VapiClient::new(&config.provider)?;

    Ok(CallService::new(
        Arc::new(store),
        directory,
        Arc::new(provider),
        &config.limits,
    ))
}
