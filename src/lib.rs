//! sweep_recon - Provider Sweep Reconciliation Engine
//!
//! Moves balances between a main wallet and many provider sub-accounts in
//! bounded batches, sweeps everything back, and cross-checks the ledger
//! against an independently observed balance source.
//!
//! # Modules
//!
//! - [`catalog`] - Provider catalog fetch + flattening
//! - [`partition`] - Batch partitioner and the processed set
//! - [`executor`] - Sequential, fail-open transfer executor
//! - [`verify`] - Reconciliation checks and mismatch export
//! - [`retry`] - Bounded retry controller with observed-state resync
//! - [`engine`] - Scenario orchestration
//! - [`ledger`] - Ledger service trait, HTTP client, in-memory ledger
//! - [`observed`] - Observed-state channel
//! - [`simulation`] - Virtual-user account + deposit worker pool

// Core types
pub mod error;
pub mod models;
pub mod money;

// Configuration & logging
pub mod config;
pub mod logging;

// Collaborators
pub mod ledger;
pub mod observed;

// Engine components
pub mod catalog;
pub mod engine;
pub mod executor;
pub mod partition;
pub mod readiness;
pub mod report;
pub mod retry;
pub mod scenario;
pub mod verify;

pub mod simulation;

// Convenient re-exports at crate root
pub use config::{AppConfig, EngineConfig, LedgerConfig, SimulationConfig};
pub use engine::{PartReport, ReconciliationEngine, RevertReport, ScenarioOutcome};
pub use error::EngineError;
pub use executor::{BatchOutcome, TransferExecutor};
pub use ledger::{HttpLedgerClient, LedgerService};
#[cfg(feature = "mock-ledger")]
pub use ledger::InMemoryLedger;
pub use models::{MainWalletSnapshot, Provider, ProviderId, TransferRecord, TransferStatus};
pub use observed::{LedgerMirror, ObservedSnapshot, ObservedState};
pub use partition::{Batch, ProcessedSet};
pub use report::ReportRow;
pub use retry::{RetryController, RetryState};
pub use scenario::{ScenarioDescriptor, ScenarioKind, ScenarioPlan, ScenarioPlanBuilder};
pub use simulation::{AccountProvisioner, SimulationReport, VirtualUserPool};
pub use verify::{Mismatch, MismatchReason, ReconciliationResult};
