//! Ledger-backed observed channel
//!
//! Reads a second copy of the catalog from any [`LedgerService`] (a replica,
//! a reporting endpoint, or the in-memory ledger in tests). `Lagging` mode
//! keeps serving the last snapshot until an explicit resync, which is how a
//! rendered page behaves between refreshes. [`LedgerMirror::hold_pending`]
//! simulates outstanding background work for the readiness gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ObservedSnapshot, ObservedState};
use crate::catalog;
use crate::error::EngineError;
use crate::ledger::LedgerService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Every snapshot re-reads the source
    Live,
    /// Snapshots are served from cache until `resync`
    Lagging,
}

pub struct LedgerMirror {
    source: Arc<dyn LedgerService>,
    mode: MirrorMode,
    cache: RwLock<Option<ObservedSnapshot>>,
    syncing: AtomicBool,
    /// Readiness polls still to report busy
    pending: AtomicU32,
}

impl LedgerMirror {
    pub fn new(source: Arc<dyn LedgerService>, mode: MirrorMode) -> Self {
        Self {
            source,
            mode,
            cache: RwLock::new(None),
            syncing: AtomicBool::new(false),
            pending: AtomicU32::new(0),
        }
    }

    pub fn live(source: Arc<dyn LedgerService>) -> Self {
        Self::new(source, MirrorMode::Live)
    }

    pub fn lagging(source: Arc<dyn LedgerService>) -> Self {
        Self::new(source, MirrorMode::Lagging)
    }

    /// Report not-ready for the next `polls` readiness checks
    pub fn hold_pending(&self, polls: u32) {
        self.pending.store(polls, Ordering::SeqCst);
    }

    async fn load(&self) -> Result<ObservedSnapshot, EngineError> {
        self.syncing.store(true, Ordering::SeqCst);
        let result = catalog::fetch_providers(self.source.as_ref()).await;
        self.syncing.store(false, Ordering::SeqCst);

        let mut snapshot = ObservedSnapshot::new();
        for p in result? {
            snapshot.set_credit(p.id, p.credit);
            snapshot.set_failed_tag(p.id, p.has_failed_transfer);
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl ObservedState for LedgerMirror {
    fn name(&self) -> &'static str {
        "ledger-mirror"
    }

    async fn is_ready(&self) -> bool {
        if self.syncing.load(Ordering::SeqCst) {
            return false;
        }
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    async fn snapshot(&self) -> Result<ObservedSnapshot, EngineError> {
        if self.mode == MirrorMode::Lagging
            && let Some(cached) = self.cache.read().await.as_ref()
        {
            return Ok(cached.clone());
        }

        let fresh = self.load().await?;
        *self.cache.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    async fn resync(&self) -> Result<(), EngineError> {
        let fresh = self.load().await?;
        debug!(providers = fresh.len(), "Observed state resynchronized");
        *self.cache.write().await = Some(fresh);
        Ok(())
    }
}

#[cfg(all(test, feature = "mock-ledger"))]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::models::Provider;
    use rust_decimal::Decimal;

    fn ledger() -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::with_providers(
            Decimal::from(50),
            [Provider::new(1, "alpha", Decimal::ONE)],
        ))
    }

    #[tokio::test]
    async fn test_live_mirror_tracks_source() {
        let l = ledger();
        let mirror = LedgerMirror::live(l.clone());
        assert_eq!(mirror.snapshot().await.unwrap().credit(1), Some(Decimal::ONE));

        l.set_credit(1, Decimal::TEN);
        assert_eq!(mirror.snapshot().await.unwrap().credit(1), Some(Decimal::TEN));
        assert!(mirror.is_ready().await);
    }

    #[tokio::test]
    async fn test_lagging_mirror_needs_resync() {
        let l = ledger();
        let mirror = LedgerMirror::lagging(l.clone());
        assert_eq!(mirror.snapshot().await.unwrap().credit(1), Some(Decimal::ONE));

        l.set_credit(1, Decimal::TEN);
        assert_eq!(mirror.snapshot().await.unwrap().credit(1), Some(Decimal::ONE));

        mirror.resync().await.unwrap();
        assert_eq!(mirror.snapshot().await.unwrap().credit(1), Some(Decimal::TEN));
    }

    #[tokio::test]
    async fn test_pending_work_delays_readiness() {
        let mirror = LedgerMirror::live(ledger());
        mirror.hold_pending(2);
        assert!(!mirror.is_ready().await);
        assert!(!mirror.is_ready().await);
        assert!(mirror.is_ready().await);
    }

    #[tokio::test]
    async fn test_failed_flag_becomes_tag() {
        let l = ledger();
        l.fail_provider(1, 500, "down");
        let _ = l.transfer(1, 0, Decimal::ONE).await;
        let mirror = LedgerMirror::live(l);
        assert!(mirror.snapshot().await.unwrap().failed_tag_visible(1));
    }
}
