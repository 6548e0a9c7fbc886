//! Batch Partitioner
//!
//! Part `p` (1-based) is the index window `[(p-1)*B, p*B)` over the
//! original, unfiltered catalog ordering, with already-processed providers
//! removed afterwards. A part whose members were handled elsewhere shrinks;
//! it never pulls providers forward from later parts, so the window a
//! provider falls in is stable no matter what ran before.

use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::models::{Provider, ProviderId};

/// Provider IDs already handled by one engine instance
///
/// Written only by the transfer executor, read only by the partitioner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet {
    ids: BTreeSet<ProviderId>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the ID was already present
    pub fn insert(&mut self, id: ProviderId) -> bool {
        self.ids.insert(id)
    }

    #[inline]
    pub fn contains(&self, id: ProviderId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<ProviderId> for ProcessedSet {
    fn from_iter<I: IntoIterator<Item = ProviderId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// One bounded slice of the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based
    pub part: usize,
    pub max_size: usize,
    pub providers: Vec<Provider>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id).collect()
    }
}

fn check_batch_size(batch_size: usize) -> Result<(), EngineError> {
    if batch_size == 0 {
        return Err(EngineError::Config(
            "batch size must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// `ceil(total / batch_size)`
pub fn num_parts(total: usize, batch_size: usize) -> Result<usize, EngineError> {
    check_batch_size(batch_size)?;
    Ok(total.div_ceil(batch_size))
}

/// Build part `part` of `catalog`
pub fn partition(
    catalog: &[Provider],
    batch_size: usize,
    part: usize,
    processed: &ProcessedSet,
) -> Result<Batch, EngineError> {
    let parts = num_parts(catalog.len(), batch_size)?;
    if part == 0 || part > parts {
        return Err(EngineError::Config(format!(
            "part {} out of range 1..={} ({} providers, batch size {})",
            part,
            parts,
            catalog.len(),
            batch_size
        )));
    }

    let start = (part - 1) * batch_size;
    let end = (start + batch_size).min(catalog.len());
    let providers = catalog[start..end]
        .iter()
        .filter(|p| !processed.contains(p.id))
        .cloned()
        .collect();

    Ok(Batch {
        part,
        max_size: batch_size,
        providers,
    })
}
