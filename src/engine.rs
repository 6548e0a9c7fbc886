//! Reconciliation engine
//!
//! Owns the ledger, the observed-state channel and the [`ProcessedSet`],
//! and runs the three scenario kinds:
//!
//! - transfer batch: partition, execute, verify expected credit
//! - credit match: ledger credit vs. observed credit
//! - revert all: sweep to the main wallet under the retry controller,
//!   verify conservation and empty providers
//!
//! Settings are validated in [`ReconciliationEngine::new`], before any
//! ledger call is made.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::catalog;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::{BatchOutcome, TransferExecutor};
use crate::ledger::LedgerService;
use crate::models::{MAIN_WALLET_ID, MainWalletSnapshot, Provider, ProviderId, TransferRecord};
use crate::observed::ObservedState;
use crate::partition::{ProcessedSet, partition};
use crate::readiness;
use crate::report::ReportRow;
use crate::retry::{RetryController, RetryReport, RetryableAction};
use crate::scenario::{ScenarioDescriptor, ScenarioKind, ScenarioPlan, ScenarioPlanBuilder};
use crate::verify::{self, ReconciliationResult};

/// One executed and verified part
#[derive(Debug, Clone)]
pub struct PartReport {
    pub part: usize,
    pub outcome: BatchOutcome,
    pub expected: BTreeMap<ProviderId, Decimal>,
    /// Whether the observed channel was ready before it was read
    pub observed_ready: bool,
    pub result: ReconciliationResult,
}

impl PartReport {
    pub fn passed(&self) -> bool {
        self.result.is_clean()
    }

    pub fn ensure_passed(self) -> Result<Self, EngineError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(EngineError::VerificationMismatch {
                mismatches: self.result.mismatches,
            })
        }
    }
}

/// Ledger credit vs. observed credit for every provider in the catalog
#[derive(Debug, Clone)]
pub struct CreditMatchReport {
    /// Whether the observed channel was ready before it was read
    pub observed_ready: bool,
    pub result: ReconciliationResult,
}

impl CreditMatchReport {
    pub fn passed(&self) -> bool {
        self.result.is_clean()
    }
}

/// Successful revert-all
#[derive(Debug, Clone)]
pub struct RevertReport {
    pub initial: MainWalletSnapshot,
    pub final_wallet: MainWalletSnapshot,
    pub swept: Decimal,
    pub records: Vec<TransferRecord>,
    pub retry: RetryReport,
    pub result: ReconciliationResult,
}

#[derive(Debug, Clone)]
pub enum ScenarioOutcome {
    Transfer(PartReport),
    CreditMatch(CreditMatchReport),
    Revert(RevertReport),
}

impl ScenarioOutcome {
    pub fn report_rows(&self) -> Vec<ReportRow> {
        match self {
            ScenarioOutcome::Transfer(r) => r.result.report_rows(),
            ScenarioOutcome::CreditMatch(r) => r.result.report_rows(),
            ScenarioOutcome::Revert(r) => r.result.report_rows(),
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            ScenarioOutcome::Transfer(r) => r.passed(),
            ScenarioOutcome::CreditMatch(r) => r.passed(),
            ScenarioOutcome::Revert(r) => r.result.is_clean(),
        }
    }
}

pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerService>,
    observed: Arc<dyn ObservedState>,
    batch_size: usize,
    unit_amount: Decimal,
    processed: ProcessedSet,
    readiness_timeout: Duration,
    readiness_poll: Duration,
    retry: RetryController,
}

impl ReconciliationEngine {
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        observed: Arc<dyn ObservedState>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            ledger,
            observed,
            batch_size: config.batch_size,
            unit_amount: config.unit_amount()?,
            processed: ProcessedSet::new(),
            readiness_timeout: config.readiness_timeout(),
            readiness_poll: config.readiness_poll(),
            retry: RetryController::new(config.max_retries, config.settle_interval()),
        })
    }

    /// Continue from providers handled by an earlier engine
    pub fn with_processed(mut self, processed: ProcessedSet) -> Self {
        self.processed = processed;
        self
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn into_processed(self) -> ProcessedSet {
        self.processed
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn fetch_catalog(&self) -> Result<Vec<Provider>, EngineError> {
        catalog::fetch_providers(self.ledger.as_ref()).await
    }

    pub fn plan_builder(&self) -> ScenarioPlanBuilder {
        ScenarioPlanBuilder::new(self.batch_size)
    }

    pub async fn plan(&self, builder: ScenarioPlanBuilder) -> Result<ScenarioPlan, EngineError> {
        let catalog = self.fetch_catalog().await?;
        let plan = builder.build(&catalog)?;
        info!(
            providers = plan.total_providers,
            batch_size = plan.batch_size,
            parts = plan.num_parts,
            scenarios = plan.scenarios.len(),
            "Scenario plan built"
        );
        Ok(plan)
    }

    async fn observed_ready(&self) -> bool {
        readiness::precondition(
            self.observed.as_ref(),
            self.readiness_timeout,
            self.readiness_poll,
        )
        .await
    }

    /// Transfer the unit amount into every unprocessed provider of `part`
    /// and check the observed credit of each one
    ///
    /// A fatal ledger error mid-batch comes back as `BatchAborted`, with
    /// the transfers that already landed; nothing is verified then.
    pub async fn run_part(&mut self, part: usize) -> Result<PartReport, EngineError> {
        let catalog = self.fetch_catalog().await?;
        let providers = catalog::sub_accounts(&catalog);
        let batch = partition(&providers, self.batch_size, part, &self.processed)?;

        let outcome = TransferExecutor::new(self.ledger.as_ref(), self.unit_amount)
            .execute(&batch, &mut self.processed)
            .await?;

        let observed_ready = self.observed_ready().await;
        let snapshot = self.observed.snapshot().await?;
        let expected = verify::expected_after_transfers(&batch.providers, &outcome);
        let result = verify::verify_expected(&batch.providers, &expected, &snapshot);

        if result.is_clean() {
            info!(part, providers = batch.len(), "Part verified");
        } else {
            warn!(
                part,
                mismatches = result.mismatches.len(),
                "Part failed verification"
            );
        }

        Ok(PartReport {
            part,
            outcome,
            expected,
            observed_ready,
            result,
        })
    }

    /// Compare every catalog entry, main wallet included
    pub async fn credit_match(&self) -> Result<CreditMatchReport, EngineError> {
        let catalog = self.fetch_catalog().await?;
        let observed_ready = self.observed_ready().await;
        let snapshot = self.observed.snapshot().await?;
        let result = verify::credit_match(&catalog, &snapshot);
        info!(
            providers = result.checks.len(),
            mismatches = result.mismatches.len(),
            observed_ready,
            "Credit match finished"
        );
        Ok(CreditMatchReport {
            observed_ready,
            result,
        })
    }

    /// Sweep every provider back to the main wallet
    ///
    /// Each attempt sweeps whatever is still non-zero, waits for the
    /// observed channel, then checks wallet conservation and
    /// empty-after-revert together. Exhaustion returns `RetryExhausted`
    /// wrapping the last attempt's mismatches.
    pub async fn revert_all(&mut self) -> Result<RevertReport, EngineError> {
        let initial = catalog::main_wallet(self.ledger.as_ref()).await?;
        info!(initial = %initial.credit, "Revert-all started");

        let mut action = RevertAllAction {
            ledger: self.ledger.clone(),
            observed: self.observed.clone(),
            readiness_timeout: self.readiness_timeout,
            readiness_poll: self.readiness_poll,
            initial,
            swept: Decimal::ZERO,
            records: Vec::new(),
            final_wallet: None,
            result: ReconciliationResult::default(),
        };

        let retry = self.retry.drive(&mut action, self.observed.as_ref()).await?;
        let final_wallet = action
            .final_wallet
            .ok_or_else(|| EngineError::service("revert-all finished without a wallet reading"))?;

        info!(
            swept = %action.swept,
            final_balance = %final_wallet.credit,
            attempts = retry.attempts,
            "Revert-all verified"
        );
        Ok(RevertReport {
            initial,
            final_wallet,
            swept: action.swept,
            records: action.records,
            retry,
            result: action.result,
        })
    }

    pub async fn run_scenario(
        &mut self,
        scenario: &ScenarioDescriptor,
    ) -> Result<ScenarioOutcome, EngineError> {
        info!(scenario = %scenario.label(), "Running scenario");
        match scenario.kind {
            ScenarioKind::TransferBatch { part } => {
                self.run_part(part).await.map(ScenarioOutcome::Transfer)
            }
            ScenarioKind::CreditMatch => self.credit_match().await.map(ScenarioOutcome::CreditMatch),
            ScenarioKind::RevertAll => self.revert_all().await.map(ScenarioOutcome::Revert),
        }
    }

    /// Run every scenario in order; a fatal error stops the run
    pub async fn run_plan(
        &mut self,
        plan: &ScenarioPlan,
    ) -> Vec<(ScenarioDescriptor, Result<ScenarioOutcome, EngineError>)> {
        let mut results = Vec::with_capacity(plan.scenarios.len());
        for scenario in &plan.scenarios {
            let result = self.run_scenario(scenario).await;
            let fatal = matches!(&result, Err(e) if e.is_fatal());
            results.push((scenario.clone(), result));
            if fatal {
                warn!(scenario = %scenario.label(), "Fatal error, stopping plan");
                break;
            }
        }
        results
    }
}

struct RevertAllAction {
    ledger: Arc<dyn LedgerService>,
    observed: Arc<dyn ObservedState>,
    readiness_timeout: Duration,
    readiness_poll: Duration,
    initial: MainWalletSnapshot,
    /// Accumulated across attempts
    swept: Decimal,
    records: Vec<TransferRecord>,
    final_wallet: Option<MainWalletSnapshot>,
    result: ReconciliationResult,
}

impl RevertAllAction {
    async fn sweep(&mut self) -> Result<(), EngineError> {
        let catalog = catalog::fetch_providers(self.ledger.as_ref()).await?;
        for provider in catalog::sub_accounts(&catalog)
            .into_iter()
            .filter(|p| p.credit > Decimal::ZERO)
        {
            let mut record = TransferRecord::pending(provider.id, MAIN_WALLET_ID, provider.credit);
            let result = self
                .ledger
                .transfer(provider.id, MAIN_WALLET_ID, provider.credit)
                .await;

            if let Err(e) = &result
                && e.is_fatal()
            {
                return Err(e.clone());
            }

            record.settle(&result);
            if record.is_success() {
                self.swept += provider.credit;
            } else {
                warn!(
                    provider_id = provider.id,
                    credit = %provider.credit,
                    status_code = ?record.status_code,
                    error = record.error_message.as_deref().unwrap_or(""),
                    "Sweep transfer failed"
                );
            }
            self.records.push(record);
        }
        Ok(())
    }
}

#[async_trait]
impl RetryableAction for RevertAllAction {
    fn name(&self) -> &'static str {
        "revert-all"
    }

    async fn attempt(&mut self, attempt: u32) -> Result<(), EngineError> {
        self.sweep().await?;

        readiness::wait_until_ready(
            self.observed.as_ref(),
            self.readiness_timeout,
            self.readiness_poll,
        )
        .await?;

        let final_wallet = catalog::main_wallet(self.ledger.as_ref()).await?;
        let catalog = catalog::fetch_providers(self.ledger.as_ref()).await?;
        let snapshot = self.observed.snapshot().await?;

        let result = verify::empty_after_revert(&catalog, &snapshot);
        let mut mismatches = Vec::new();
        if let Some(m) = verify::wallet_conservation(&self.initial, self.swept, &final_wallet) {
            mismatches.push(m);
        }
        mismatches.extend(result.mismatches.iter().cloned());

        info!(
            attempt,
            swept = %self.swept,
            final_balance = %final_wallet.credit,
            mismatches = mismatches.len(),
            "Revert-all verification"
        );

        self.final_wallet = Some(final_wallet);
        self.result = result;

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(EngineError::VerificationMismatch { mismatches })
        }
    }
}
