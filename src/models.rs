//! Provider, transfer record and wallet snapshot types.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;

/// Provider (sub-account) ID as reported by the ledger
pub type ProviderId = i64;

/// Ledger account ID for the main wallet
pub const MAIN_WALLET_ID: ProviderId = 0;

/// Legacy alias the ledger uses for the main wallet in some payloads
pub const MAIN_WALLET_ALIAS_ID: ProviderId = -1;

/// Returns true for IDs that denote the main wallet rather than a provider
#[inline]
pub fn is_main_wallet(id: ProviderId) -> bool {
    id == MAIN_WALLET_ID || id == MAIN_WALLET_ALIAS_ID
}

/// A provider wallet and its current ledger balance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub credit: Decimal,
    pub has_failed_transfer: bool,
}

impl Provider {
    pub fn new(id: ProviderId, name: impl Into<String>, credit: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            credit,
            has_failed_transfer: false,
        }
    }

    /// Main-wallet entries are excluded from sweep-to-zero checks
    #[inline]
    pub fn is_excluded(&self) -> bool {
        is_main_wallet(self.id)
    }
}

/// Transfer outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransferStatus {
    Pending,
    Success,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Success => "SUCCESS",
            TransferStatus::Failed => "FAILED",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger acknowledgement for a single transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReply {
    pub status_code: u16,
    pub message: String,
}

impl TransferReply {
    /// Only 2xx status codes count as a landed transfer
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// One transfer request together with its result
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub req_id: String,
    pub source_id: ProviderId,
    pub target_id: ProviderId,
    pub amount: Decimal,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    /// New record in `Pending` state with a fresh ULID request id
    pub fn pending(source_id: ProviderId, target_id: ProviderId, amount: Decimal) -> Self {
        Self {
            req_id: ulid::Ulid::new().to_string(),
            source_id,
            target_id,
            amount,
            status_code: None,
            error_message: None,
            status: TransferStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Settle the record from the ledger's reply or transport error
    pub fn settle(&mut self, outcome: &Result<TransferReply, EngineError>) {
        match outcome {
            Ok(reply) if reply.is_success() => {
                self.status_code = Some(reply.status_code);
                self.status = TransferStatus::Success;
            }
            Ok(reply) => {
                self.status_code = Some(reply.status_code);
                self.error_message = Some(reply.message.clone());
                self.status = TransferStatus::Failed;
            }
            Err(e) => {
                self.status_code = e.http_status();
                self.error_message = Some(e.to_string());
                self.status = TransferStatus::Failed;
            }
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }
}

/// Main wallet balance at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MainWalletSnapshot {
    pub credit: Decimal,
    pub taken_at: DateTime<Utc>,
}

impl MainWalletSnapshot {
    pub fn now(credit: Decimal) -> Self {
        Self {
            credit,
            taken_at: Utc::now(),
        }
    }
}
