//! Observed-State Channel
//!
//! The second, independently reported balance source the ledger is checked
//! against. The engine only ever reads it through an [`ObservedSnapshot`]:
//! a keyed view of per-provider credit and the per-provider "failed" tag.

pub mod mirror;

pub use mirror::{LedgerMirror, MirrorMode};

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::ProviderId;

#[async_trait]
pub trait ObservedState: Send + Sync {
    fn name(&self) -> &'static str;

    /// No pending async work and a stable rendered state
    async fn is_ready(&self) -> bool;

    /// Current observed state
    async fn snapshot(&self) -> Result<ObservedSnapshot, EngineError>;

    /// Discard anything cached and rebuild from the source
    async fn resync(&self) -> Result<(), EngineError>;
}

/// Point-in-time view of the observed channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedSnapshot {
    credits: BTreeMap<ProviderId, Decimal>,
    failed_tags: BTreeSet<ProviderId>,
}

impl ObservedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credit(mut self, id: ProviderId, credit: Decimal) -> Self {
        self.credits.insert(id, credit);
        self
    }

    pub fn with_failed_tag(mut self, id: ProviderId) -> Self {
        self.failed_tags.insert(id);
        self
    }

    pub fn set_credit(&mut self, id: ProviderId, credit: Decimal) {
        self.credits.insert(id, credit);
    }

    pub fn set_failed_tag(&mut self, id: ProviderId, visible: bool) {
        if visible {
            self.failed_tags.insert(id);
        } else {
            self.failed_tags.remove(&id);
        }
    }

    /// `None` when the provider is not rendered at all
    pub fn credit(&self, id: ProviderId) -> Option<Decimal> {
        self.credits.get(&id).copied()
    }

    pub fn failed_tag_visible(&self, id: ProviderId) -> bool {
        self.failed_tags.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.credits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }
}
