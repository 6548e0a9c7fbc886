//! Transfer Executor
//!
//! Sequential, fail-open: one transfer per provider, main wallet → provider.
//! A failed transfer is recorded and the batch carries on; only a fatal
//! error (expired session) stops it, returned as `BatchAborted` with the
//! records attempted so far. Every attempted provider is marked processed
//! before the ledger is called, whatever the outcome.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::ledger::LedgerService;
use crate::models::{MAIN_WALLET_ID, ProviderId, TransferRecord, TransferStatus};
use crate::partition::{Batch, ProcessedSet};

/// Result of executing one batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub part: usize,
    pub records: Vec<TransferRecord>,
    /// Sum of amounts whose transfer the ledger acknowledged
    pub total_expected_credit: Decimal,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == TransferStatus::Failed)
            .count()
    }

    /// Providers whose transfer failed; they stay processed, so re-driving
    /// them is an explicit caller decision
    pub fn failed_ids(&self) -> Vec<ProviderId> {
        self.records
            .iter()
            .filter(|r| r.status == TransferStatus::Failed)
            .map(|r| r.target_id)
            .collect()
    }

    pub fn record_for(&self, id: ProviderId) -> Option<&TransferRecord> {
        self.records.iter().find(|r| r.target_id == id)
    }
}

pub struct TransferExecutor<'a> {
    ledger: &'a dyn LedgerService,
    unit_amount: Decimal,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(ledger: &'a dyn LedgerService, unit_amount: Decimal) -> Self {
        Self {
            ledger,
            unit_amount,
        }
    }

    pub async fn execute(
        &self,
        batch: &Batch,
        processed: &mut ProcessedSet,
    ) -> Result<BatchOutcome, EngineError> {
        info!(
            part = batch.part,
            size = batch.len(),
            amount = %self.unit_amount,
            "Executing transfer batch"
        );

        let mut outcome = BatchOutcome {
            part: batch.part,
            records: Vec::with_capacity(batch.len()),
            total_expected_credit: Decimal::ZERO,
        };

        for provider in &batch.providers {
            processed.insert(provider.id);
            let mut record = TransferRecord::pending(MAIN_WALLET_ID, provider.id, self.unit_amount);

            let result = self
                .ledger
                .transfer(MAIN_WALLET_ID, provider.id, self.unit_amount)
                .await;

            record.settle(&result);

            if let Err(e) = result
                && e.is_fatal()
            {
                warn!(
                    part = batch.part,
                    provider_id = provider.id,
                    landed = outcome.succeeded(),
                    error = %e,
                    "Fatal ledger error, aborting batch"
                );
                outcome.records.push(record);
                return Err(EngineError::BatchAborted {
                    outcome: Box::new(outcome),
                    cause: Box::new(e),
                });
            }

            if record.is_success() {
                outcome.total_expected_credit += self.unit_amount;
                debug!(provider_id = provider.id, req_id = %record.req_id, "Transfer acknowledged");
            } else {
                warn!(
                    provider_id = provider.id,
                    status_code = ?record.status_code,
                    error = record.error_message.as_deref().unwrap_or(""),
                    "Transfer failed, continuing batch"
                );
            }
            outcome.records.push(record);
        }

        info!(
            part = batch.part,
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            total_expected_credit = %outcome.total_expected_credit,
            "Transfer batch finished"
        );
        Ok(outcome)
    }
}

#[cfg(all(test, feature = "mock-ledger"))]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::models::Provider;
    use crate::partition::partition;

    fn providers(n: i64) -> Vec<Provider> {
        (1..=n)
            .map(|id| Provider::new(id, format!("p{}", id), Decimal::ZERO))
            .collect()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let catalog = providers(10);
        let ledger = InMemoryLedger::with_providers(Decimal::from(1000), catalog.clone());
        ledger.fail_provider(4, 500, "Internal Server Error");

        let mut processed = ProcessedSet::new();
        let batch = partition(&catalog, 10, 1, &processed).unwrap();
        let executor = TransferExecutor::new(&ledger, Decimal::TWO);
        let outcome = executor.execute(&batch, &mut processed).await.unwrap();

        assert_eq!(outcome.records.len(), 10);
        assert_eq!(outcome.succeeded(), 9);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.failed_ids(), vec![4]);
        let failed = outcome.record_for(4).unwrap();
        assert_eq!(failed.status_code, Some(500));
        assert!(failed.error_message.as_ref().unwrap().contains("Internal Server Error"));
        assert_eq!(outcome.total_expected_credit, Decimal::from(18));

        // Attempted == processed, failure included
        assert_eq!(processed.len(), 10);
        assert!(processed.contains(4));
    }

    #[tokio::test]
    async fn test_expired_session_aborts_batch() {
        let catalog = providers(3);
        let ledger = InMemoryLedger::with_providers(Decimal::from(100), catalog.clone());
        ledger.expire_session();

        let mut processed = ProcessedSet::new();
        let batch = partition(&catalog, 3, 1, &processed).unwrap();
        let err = TransferExecutor::new(&ledger, Decimal::ONE)
            .execute(&batch, &mut processed)
            .await
            .unwrap_err();

        let EngineError::BatchAborted { outcome, cause } = &err else {
            panic!("unexpected {:?}", err);
        };
        assert!(matches!(**cause, EngineError::Auth(_)));
        assert!(err.is_fatal());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.succeeded(), 0);
        assert_eq!(ledger.transfer_calls(), 1);
        assert_eq!(processed.len(), 1);
    }

    #[tokio::test]
    async fn test_mid_batch_expiry_returns_landed_transfers() {
        let catalog = providers(4);
        let ledger = InMemoryLedger::with_providers(Decimal::from(100), catalog.clone());
        ledger.expire_session_after(2);

        let mut processed = ProcessedSet::new();
        let batch = partition(&catalog, 4, 1, &processed).unwrap();
        let err = TransferExecutor::new(&ledger, Decimal::TWO)
            .execute(&batch, &mut processed)
            .await
            .unwrap_err();

        let outcome = err.partial_outcome().unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(outcome.failed_ids(), vec![3]);
        assert_eq!(outcome.total_expected_credit, Decimal::from(4));
        assert_eq!(outcome.record_for(3).unwrap().status_code, Some(401));

        // Provider 4 was never attempted
        assert_eq!(processed.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(ledger.main_balance_now(), Decimal::from(96));
    }

    #[tokio::test]
    async fn test_rejected_reply_counts_as_failed() {
        let catalog = providers(2);
        // Only enough for one unit
        let ledger = InMemoryLedger::with_providers(Decimal::TWO, catalog.clone());

        let mut processed = ProcessedSet::new();
        let batch = partition(&catalog, 2, 1, &processed).unwrap();
        let outcome = TransferExecutor::new(&ledger, Decimal::TWO)
            .execute(&batch, &mut processed)
            .await
            .unwrap();

        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(outcome.record_for(2).unwrap().status_code, Some(422));
        assert_eq!(outcome.total_expected_credit, Decimal::TWO);
    }
}
