//! Virtual-user simulation
//!
//! Bulk account creation + deposit, independent of the sweep/reconcile
//! data. A fixed number of workers (default 5) run virtual-user flows
//! concurrently; each flow owns its state, and the pool joins every flow
//! before the counts are aggregated. Every call is bounded by a per-call
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::money;

pub const DEFAULT_WORKERS: usize = 5;

/// Account registration + funding, provided by the ledger side
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    /// Returns the new account ID
    async fn create_account(&self, username: &str) -> Result<i64, EngineError>;

    async fn deposit(&self, account: i64, amount: Decimal) -> Result<(), EngineError>;
}

#[cfg(feature = "mock-ledger")]
#[async_trait]
impl AccountProvisioner for crate::ledger::InMemoryLedger {
    async fn create_account(&self, username: &str) -> Result<i64, EngineError> {
        crate::ledger::InMemoryLedger::create_account(self, username)
    }

    async fn deposit(&self, account: i64, amount: Decimal) -> Result<(), EngineError> {
        crate::ledger::InMemoryLedger::deposit(self, account, amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserStep {
    CreateAccount,
    Deposit,
}

/// Per-flow state, owned by exactly one worker
#[derive(Debug, Clone)]
pub struct VirtualUser {
    pub index: usize,
    pub username: String,
    pub account_id: Option<i64>,
}

impl VirtualUser {
    pub fn new(index: usize) -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self {
            index,
            username: format!("vu{:04}_{}", index, &tag[..8]),
            account_id: None,
        }
    }

    async fn run(
        &mut self,
        provisioner: &dyn AccountProvisioner,
        deposit: Decimal,
        call_timeout: Duration,
    ) -> Result<(), (UserStep, EngineError)> {
        let account = bounded(call_timeout, provisioner.create_account(&self.username))
            .await
            .map_err(|e| (UserStep::CreateAccount, e))?;
        self.account_id = Some(account);

        bounded(call_timeout, provisioner.deposit(account, deposit))
            .await
            .map_err(|e| (UserStep::Deposit, e))?;
        debug!(user = %self.username, account, amount = %deposit, "Virtual user funded");
        Ok(())
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
        Err(EngineError::service(format!(
            "call timed out after {}ms",
            limit.as_millis()
        )))
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct UserFailure {
    pub username: String,
    pub step: UserStep,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<UserFailure>,
}

impl SimulationReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.succeeded == self.attempted
    }
}

pub struct VirtualUserPool {
    provisioner: Arc<dyn AccountProvisioner>,
    workers: usize,
    deposit: Decimal,
    call_timeout: Duration,
}

impl VirtualUserPool {
    pub fn new(provisioner: Arc<dyn AccountProvisioner>, deposit: Decimal) -> Self {
        Self {
            provisioner,
            workers: DEFAULT_WORKERS,
            deposit,
            call_timeout: Duration::from_secs(2),
        }
    }

    pub fn from_config(
        provisioner: Arc<dyn AccountProvisioner>,
        config: &SimulationConfig,
        call_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let deposit = money::parse_amount(&config.deposit_amount).map_err(|e| {
            EngineError::Config(format!(
                "deposit_amount {:?}: {}",
                config.deposit_amount, e
            ))
        })?;
        if config.workers == 0 {
            return Err(EngineError::Config("workers must be greater than zero".into()));
        }
        Ok(Self::new(provisioner, deposit)
            .with_workers(config.workers)
            .with_call_timeout(call_timeout))
    }

    /// Values below 1 are treated as 1
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `users` virtual-user flows, at most `workers` at a time
    pub async fn run(&self, users: usize) -> SimulationReport {
        info!(users, workers = self.workers, deposit = %self.deposit, "Simulation started");

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut flows = JoinSet::new();

        for index in 0..users {
            let permits = permits.clone();
            let provisioner = self.provisioner.clone();
            let deposit = self.deposit;
            let call_timeout = self.call_timeout;

            flows.spawn(async move {
                let mut user = VirtualUser::new(index);
                // The pool never closes the semaphore
                let Ok(_permit) = permits.acquire_owned().await else {
                    let closed = EngineError::service("worker pool closed");
                    return (user, Err((UserStep::CreateAccount, closed)));
                };
                let result = user.run(provisioner.as_ref(), deposit, call_timeout).await;
                (user, result)
            });
        }

        let mut report = SimulationReport {
            attempted: users,
            ..Default::default()
        };

        while let Some(joined) = flows.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.succeeded += 1,
                Ok((user, Err((step, e)))) => {
                    warn!(user = %user.username, step = ?step, error = %e, "Virtual user failed");
                    report.failed += 1;
                    report.failures.push(UserFailure {
                        username: user.username,
                        step,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Virtual user task panicked");
                    report.failed += 1;
                    report.failures.push(UserFailure {
                        username: String::new(),
                        step: UserStep::CreateAccount,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.failures.sort_by(|a, b| a.username.cmp(&b.username));
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Simulation finished"
        );
        report
    }
}
