//! Reconciliation Verifier
//!
//! Every check scans the full provider list, collects all mismatches, and
//! only then decides pass/fail, so a failure always names every offending
//! provider. Results are ordered by provider ID.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;
use crate::executor::BatchOutcome;
use crate::models::{MAIN_WALLET_ID, MainWalletSnapshot, Provider, ProviderId};
use crate::money::format_credit;
use crate::observed::ObservedSnapshot;
use crate::report::ReportRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MismatchReason {
    /// Observed credit differs from the expected value
    CreditDiffers,
    /// Provider is absent from the observed channel
    MissingObserved,
    /// Non-zero after revert and not flagged as a failed transfer
    NotSwept,
    /// Flagged as failed in the ledger but the failed tag is not visible
    FailedTagMissing,
    /// Main wallet did not grow by the swept total
    WalletNotConserved,
}

impl MismatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchReason::CreditDiffers => "credit differs",
            MismatchReason::MissingObserved => "not observed",
            MismatchReason::NotSwept => "not swept",
            MismatchReason::FailedTagMissing => "failed tag missing",
            MismatchReason::WalletNotConserved => "wallet not conserved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub provider_id: ProviderId,
    pub name: String,
    pub expected: Decimal,
    pub observed: Option<Decimal>,
    pub reason: MismatchReason,
}

impl Mismatch {
    pub fn with_reason(
        provider_id: ProviderId,
        name: impl Into<String>,
        expected: Decimal,
        observed: Option<Decimal>,
        reason: MismatchReason,
    ) -> Self {
        Self {
            provider_id,
            name: name.into(),
            expected,
            observed,
            reason,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed = self
            .observed
            .map(format_credit)
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "#{} {}: expected {}, observed {} ({})",
            self.provider_id,
            self.name,
            format_credit(self.expected),
            observed,
            self.reason.as_str()
        )
    }
}

/// Per-provider verification line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCheck {
    pub provider_id: ProviderId,
    pub name: String,
    pub expected_credit: Decimal,
    pub observed_credit: Option<Decimal>,
    pub mismatch: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub checks: Vec<ProviderCheck>,
    pub mismatches: Vec<Mismatch>,
}

impl ReconciliationResult {
    fn push(&mut self, provider: &Provider, expected: Decimal, observed: Option<Decimal>, failure: Option<MismatchReason>) {
        self.checks.push(ProviderCheck {
            provider_id: provider.id,
            name: provider.name.clone(),
            expected_credit: expected,
            observed_credit: observed,
            mismatch: failure.is_some(),
        });
        if let Some(reason) = failure {
            self.mismatches.push(Mismatch::with_reason(
                provider.id,
                provider.name.clone(),
                expected,
                observed,
                reason,
            ));
        }
    }

    fn finish(mut self) -> Self {
        self.checks.sort_by_key(|c| c.provider_id);
        self.mismatches.sort_by_key(|m| m.provider_id);
        self
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Raise once with the full mismatch set, or pass the result through
    pub fn into_result(self) -> Result<Self, EngineError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(EngineError::VerificationMismatch {
                mismatches: self.mismatches,
            })
        }
    }

    /// Rows for the reporting collaborator, one per checked provider
    pub fn report_rows(&self) -> Vec<ReportRow> {
        self.checks.iter().map(ReportRow::from).collect()
    }

    /// Rows for mismatched providers only
    pub fn mismatch_rows(&self) -> Vec<ReportRow> {
        self.mismatches.iter().map(ReportRow::from).collect()
    }
}

fn compare(expected: Decimal, observed: Option<Decimal>) -> Option<MismatchReason> {
    match observed {
        None => Some(MismatchReason::MissingObserved),
        Some(o) if o != expected => Some(MismatchReason::CreditDiffers),
        Some(_) => None,
    }
}

/// Ledger credit vs. observed credit for every provider
pub fn credit_match(catalog: &[Provider], observed: &ObservedSnapshot) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    for provider in catalog {
        let seen = observed.credit(provider.id);
        result.push(provider, provider.credit, seen, compare(provider.credit, seen));
    }
    result.finish()
}

/// Expected credit per provider after a batch: prior credit plus the unit
/// amount for every acknowledged transfer
pub fn expected_after_transfers(
    prior: &[Provider],
    outcome: &BatchOutcome,
) -> BTreeMap<ProviderId, Decimal> {
    let mut expected: BTreeMap<ProviderId, Decimal> =
        prior.iter().map(|p| (p.id, p.credit)).collect();
    for record in outcome.records.iter().filter(|r| r.is_success()) {
        *expected.entry(record.target_id).or_insert(Decimal::ZERO) += record.amount;
    }
    expected
}

/// Observed credit must equal `expected` for each listed provider
pub fn verify_expected(
    providers: &[Provider],
    expected: &BTreeMap<ProviderId, Decimal>,
    observed: &ObservedSnapshot,
) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    for provider in providers {
        let want = expected.get(&provider.id).copied().unwrap_or(provider.credit);
        let seen = observed.credit(provider.id);
        result.push(provider, want, seen, compare(want, seen));
    }
    result.finish()
}

/// After revert-all: zero, or non-zero with both the ledger's failed flag
/// and a visible failed tag
pub fn empty_after_revert(catalog: &[Provider], observed: &ObservedSnapshot) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    for provider in catalog.iter().filter(|p| !p.is_excluded()) {
        let seen = observed.credit(provider.id);
        let failure = match seen {
            None => Some(MismatchReason::MissingObserved),
            Some(c) if c.is_zero() => None,
            Some(_) if !provider.has_failed_transfer => Some(MismatchReason::NotSwept),
            Some(_) if !observed.failed_tag_visible(provider.id) => {
                Some(MismatchReason::FailedTagMissing)
            }
            Some(_) => None,
        };
        result.push(provider, Decimal::ZERO, seen, failure);
    }
    result.finish()
}

/// `final == initial + swept`, reported against the main wallet
pub fn wallet_conservation(
    initial: &MainWalletSnapshot,
    swept: Decimal,
    final_: &MainWalletSnapshot,
) -> Option<Mismatch> {
    let expected = initial.credit + swept;
    if final_.credit == expected {
        None
    } else {
        Some(Mismatch::with_reason(
            MAIN_WALLET_ID,
            "main wallet",
            expected,
            Some(final_.credit),
            MismatchReason::WalletNotConserved,
        ))
    }
}
