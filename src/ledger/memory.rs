//! In-memory ledger
//!
//! Behaves like the HTTP ledger (same error mapping, same failure flags) so
//! engine tests and dry runs exercise the real code paths. Failure
//! injection is per provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::LedgerService;
use super::types::CatalogEntry;
use crate::error::EngineError;
use crate::models::{Provider, ProviderId, TransferReply, is_main_wallet};

#[derive(Debug, Clone)]
struct InjectedFailure {
    status: u16,
    message: String,
    /// `None` = fail forever
    remaining: Option<u32>,
}

#[derive(Debug)]
struct LedgerState {
    user_id: i64,
    session_valid: bool,
    /// Session dies once this many transfers have been served
    session_transfer_limit: Option<usize>,
    main_balance: Decimal,
    providers: BTreeMap<ProviderId, Provider>,
    failures: HashMap<ProviderId, InjectedFailure>,
    /// Virtual-user accounts: username -> (account id, balance)
    accounts: BTreeMap<String, (i64, Decimal)>,
    next_account_id: i64,
}

pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    catalog_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(user_id: i64, main_balance: Decimal) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                user_id,
                session_valid: true,
                session_transfer_limit: None,
                main_balance,
                providers: BTreeMap::new(),
                failures: HashMap::new(),
                accounts: BTreeMap::new(),
                next_account_id: 10_000,
            }),
            catalog_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
        }
    }

    /// Ledger seeded with the given providers
    pub fn with_providers(main_balance: Decimal, providers: impl IntoIterator<Item = Provider>) -> Self {
        let ledger = Self::new(1, main_balance);
        for p in providers {
            ledger.upsert_provider(p);
        }
        ledger
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn upsert_provider(&self, provider: Provider) {
        self.state().providers.insert(provider.id, provider);
    }

    pub fn provider(&self, id: ProviderId) -> Option<Provider> {
        self.state().providers.get(&id).cloned()
    }

    pub fn provider_credit(&self, id: ProviderId) -> Option<Decimal> {
        self.state().providers.get(&id).map(|p| p.credit)
    }

    /// Credit an account outside the transfer primitive (e.g. game winnings)
    pub fn set_credit(&self, id: ProviderId, credit: Decimal) {
        if let Some(p) = self.state().providers.get_mut(&id) {
            p.credit = credit;
        }
    }

    pub fn main_balance_now(&self) -> Decimal {
        self.state().main_balance
    }

    /// Every transfer touching `id` fails with `status`
    pub fn fail_provider(&self, id: ProviderId, status: u16, message: impl Into<String>) {
        self.inject(id, status, message.into(), None);
    }

    /// The next `times` transfers touching `id` fail with `status`
    pub fn fail_provider_times(
        &self,
        id: ProviderId,
        status: u16,
        message: impl Into<String>,
        times: u32,
    ) {
        self.inject(id, status, message.into(), Some(times));
    }

    fn inject(&self, id: ProviderId, status: u16, message: String, remaining: Option<u32>) {
        self.state().failures.insert(
            id,
            InjectedFailure {
                status,
                message,
                remaining,
            },
        );
    }

    /// Simulate session expiry
    pub fn expire_session(&self) {
        self.state().session_valid = false;
    }

    /// Serve `transfers` more transfers, then expire the session
    pub fn expire_session_after(&self, transfers: usize) {
        let served = self.transfer_calls();
        self.state().session_transfer_limit = Some(served + transfers);
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn account_balance(&self, username: &str) -> Option<Decimal> {
        self.state().accounts.get(username).map(|(_, b)| *b)
    }

    pub fn account_count(&self) -> usize {
        self.state().accounts.len()
    }

    fn check_session(state: &LedgerState) -> Result<(), EngineError> {
        if state.session_valid {
            Ok(())
        } else {
            Err(EngineError::Auth("session expired".into()))
        }
    }

    /// Consume one injected failure for `id`, if any
    fn take_failure(state: &mut LedgerState, id: ProviderId) -> Option<InjectedFailure> {
        let failure = state.failures.get(&id)?.clone();
        match failure.remaining {
            Some(0) => {
                state.failures.remove(&id);
                None
            }
            Some(1) => {
                state.failures.remove(&id);
                Some(failure)
            }
            Some(n) => {
                if let Some(f) = state.failures.get_mut(&id) {
                    f.remaining = Some(n - 1);
                }
                Some(failure)
            }
            None => Some(failure),
        }
    }

    pub(crate) fn create_account(&self, username: &str) -> Result<i64, EngineError> {
        let mut state = self.state();
        Self::check_session(&state)?;
        if let Some((id, _)) = state.accounts.get(username) {
            return Err(EngineError::service_status(
                409,
                format!("username {} already taken by account {}", username, id),
            ));
        }
        let id = state.next_account_id;
        state.next_account_id += 1;
        state
            .accounts
            .insert(username.to_string(), (id, Decimal::ZERO));
        Ok(id)
    }

    pub(crate) fn deposit(&self, account: i64, amount: Decimal) -> Result<(), EngineError> {
        let mut state = self.state();
        Self::check_session(&state)?;
        let entry = state
            .accounts
            .values_mut()
            .find(|(id, _)| *id == account)
            .ok_or_else(|| EngineError::service_status(404, format!("account {} not found", account)))?;
        entry.1 += amount;
        Ok(())
    }
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, EngineError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        Self::check_session(&state)?;
        let mut entries = vec![CatalogEntry::leaf(0, "Main Wallet", state.main_balance)];
        entries.extend(state.providers.values().map(CatalogEntry::from));
        Ok(entries)
    }

    async fn transfer(
        &self,
        source: ProviderId,
        target: ProviderId,
        amount: Decimal,
    ) -> Result<TransferReply, EngineError> {
        let call = self.transfer_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state();
        if state.session_transfer_limit.is_some_and(|limit| call > limit) {
            state.session_valid = false;
        }
        Self::check_session(&state)?;

        let provider_id = if is_main_wallet(source) { target } else { source };
        if is_main_wallet(source) == is_main_wallet(target) {
            return Ok(TransferReply {
                status_code: 400,
                message: "transfers must involve exactly one main wallet side".into(),
            });
        }
        if !state.providers.contains_key(&provider_id) {
            return Ok(TransferReply {
                status_code: 404,
                message: format!("provider {} not found", provider_id),
            });
        }
        if amount <= Decimal::ZERO {
            return Ok(TransferReply {
                status_code: 400,
                message: "amount must be positive".into(),
            });
        }

        if let Some(failure) = Self::take_failure(&mut state, provider_id) {
            if let Some(p) = state.providers.get_mut(&provider_id) {
                p.has_failed_transfer = true;
            }
            return Err(EngineError::service_status(failure.status, failure.message));
        }

        let available = if is_main_wallet(source) {
            state.main_balance
        } else {
            state.providers[&provider_id].credit
        };
        if available < amount {
            return Ok(TransferReply {
                status_code: 422,
                message: "insufficient balance".into(),
            });
        }

        if is_main_wallet(source) {
            state.main_balance -= amount;
            if let Some(p) = state.providers.get_mut(&provider_id) {
                p.credit += amount;
            }
        } else {
            state.main_balance += amount;
            if let Some(p) = state.providers.get_mut(&provider_id) {
                p.credit -= amount;
                p.has_failed_transfer = false;
            }
        }

        Ok(TransferReply {
            status_code: 200,
            message: "ok".into(),
        })
    }

    async fn main_balance(&self) -> Result<Decimal, EngineError> {
        let state = self.state();
        Self::check_session(&state)?;
        Ok(state.main_balance)
    }

    async fn current_user(&self) -> Result<i64, EngineError> {
        let state = self.state();
        Self::check_session(&state)?;
        Ok(state.user_id)
    }
}
