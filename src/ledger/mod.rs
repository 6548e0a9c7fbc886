//! Ledger Service Adapters
//!
//! The ledger is the authoritative balance source. Everything the engine
//! does to money goes through [`LedgerService`]; implementations must map
//! session failures to `EngineError::Auth` and any other bad response to
//! `EngineError::Service`.

pub mod client;
#[cfg(feature = "mock-ledger")]
pub mod memory;
pub mod types;

pub use client::HttpLedgerClient;
#[cfg(feature = "mock-ledger")]
pub use memory::InMemoryLedger;
pub use types::CatalogEntry;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::{ProviderId, TransferReply};

/// Ledger operations used by the sweep/reconcile engine
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    /// `GET /transfers`: raw provider catalog, possibly nested
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, EngineError>;

    /// `POST /transfers`: move `amount` from `source` to `target`
    ///
    /// A reply with a non-2xx `status_code` is returned as `Ok`; transport
    /// failures and non-2xx HTTP responses are `Err`.
    async fn transfer(
        &self,
        source: ProviderId,
        target: ProviderId,
        amount: Decimal,
    ) -> Result<TransferReply, EngineError>;

    /// `GET /balance`: main wallet balance
    async fn main_balance(&self) -> Result<Decimal, EngineError>;

    /// `GET /user`: account ID behind the current session
    async fn current_user(&self) -> Result<i64, EngineError>;
}
