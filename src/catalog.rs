//! Provider Catalog Fetcher
//!
//! Flattens the ledger's nested catalog into providers sorted by ID.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::EngineError;
use crate::ledger::{CatalogEntry, LedgerService};
use crate::models::{MainWalletSnapshot, Provider, ProviderId};

/// Read the current providers and balances, ascending by ID
///
/// Read-only. Duplicate IDs (a provider listed both at top level and
/// nested) keep the first occurrence.
pub async fn fetch_providers(ledger: &dyn LedgerService) -> Result<Vec<Provider>, EngineError> {
    let entries = ledger.fetch_catalog().await?;
    let providers = flatten(&entries);
    debug!(
        ledger = ledger.name(),
        providers = providers.len(),
        "Provider catalog loaded"
    );
    Ok(providers)
}

/// Providers the engine may move money into/out of (main wallet excluded)
pub fn sub_accounts(catalog: &[Provider]) -> Vec<Provider> {
    catalog.iter().filter(|p| !p.is_excluded()).cloned().collect()
}

pub async fn main_wallet(ledger: &dyn LedgerService) -> Result<MainWalletSnapshot, EngineError> {
    Ok(MainWalletSnapshot::now(ledger.main_balance().await?))
}

/// Leaf entries only; a group with `sub_entries` is a heading, not a wallet
pub fn flatten(entries: &[CatalogEntry]) -> Vec<Provider> {
    let mut by_id: BTreeMap<ProviderId, Provider> = BTreeMap::new();
    let mut stack: Vec<&CatalogEntry> = entries.iter().rev().collect();
    while let Some(entry) = stack.pop() {
        if entry.sub_entries.is_empty() {
            by_id.entry(entry.id).or_insert_with(|| entry.to_provider());
        } else {
            stack.extend(entry.sub_entries.iter().rev());
        }
    }
    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn group(id: ProviderId, children: Vec<CatalogEntry>) -> CatalogEntry {
        let mut g = CatalogEntry::leaf(id, format!("group-{}", id), Decimal::ZERO);
        g.sub_entries = children;
        g
    }

    #[test]
    fn test_flatten_sorts_and_recurses() {
        let entries = vec![
            group(
                100,
                vec![
                    CatalogEntry::leaf(7, "seven", Decimal::ONE),
                    CatalogEntry::leaf(3, "three", Decimal::TWO),
                ],
            ),
            CatalogEntry::leaf(0, "main", Decimal::TEN),
            CatalogEntry::leaf(5, "five", Decimal::ZERO),
        ];
        let ids: Vec<_> = flatten(&entries).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 3, 5, 7]);
    }

    #[test]
    fn test_flatten_keeps_first_duplicate() {
        let entries = vec![
            CatalogEntry::leaf(3, "top", Decimal::ONE),
            group(9, vec![CatalogEntry::leaf(3, "nested", Decimal::TEN)]),
        ];
        let providers = flatten(&entries);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "top");
    }

    #[test]
    fn test_sub_accounts_drop_main_wallet() {
        let catalog = vec![
            Provider::new(-1, "main", Decimal::ZERO),
            Provider::new(0, "main", Decimal::ZERO),
            Provider::new(4, "p4", Decimal::ZERO),
        ];
        let subs = sub_accounts(&catalog);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, 4);
    }

    #[cfg(feature = "mock-ledger")]
    #[tokio::test]
    async fn test_fetch_providers_auth_error() {
        let ledger = crate::ledger::InMemoryLedger::new(1, Decimal::ZERO);
        ledger.expire_session();
        let err = fetch_providers(&ledger).await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(_)));
    }
}
