//! Scenario selection and planning
//!
//! A scenario name resolves to a [`ScenarioKind`] through a fixed lookup
//! table. [`ScenarioPlanBuilder`] computes the partition count once from
//! the catalog and hands back every scenario descriptor up front.

use std::fmt;

use crate::catalog;
use crate::error::EngineError;
use crate::models::Provider;
use crate::partition::num_parts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    /// Transfer the unit amount into every provider of one part
    TransferBatch { part: usize },
    /// Ledger vs. observed credit for all providers
    CreditMatch,
    /// Sweep everything back to the main wallet and verify
    RevertAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScenarioTag {
    TransferBatch,
    CreditMatch,
    RevertAll,
}

const SCENARIO_TABLE: &[(&str, ScenarioTag)] = &[
    ("transfer", ScenarioTag::TransferBatch),
    ("transfer-batch", ScenarioTag::TransferBatch),
    ("credit-match", ScenarioTag::CreditMatch),
    ("verify", ScenarioTag::CreditMatch),
    ("revert-all", ScenarioTag::RevertAll),
    ("revert", ScenarioTag::RevertAll),
];

impl ScenarioKind {
    /// Resolve a scenario name (`-` and `_` are interchangeable).
    /// Transfer scenarios need a part number.
    pub fn resolve(name: &str, part: Option<usize>) -> Result<Self, EngineError> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        let tag = SCENARIO_TABLE
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, tag)| *tag)
            .ok_or_else(|| EngineError::Config(format!("unknown scenario: {}", name)))?;

        match tag {
            ScenarioTag::TransferBatch => match part {
                Some(p) if p > 0 => Ok(ScenarioKind::TransferBatch { part: p }),
                _ => Err(EngineError::Config(format!(
                    "scenario {} needs a part number >= 1",
                    name
                ))),
            },
            ScenarioTag::CreditMatch => Ok(ScenarioKind::CreditMatch),
            ScenarioTag::RevertAll => Ok(ScenarioKind::RevertAll),
        }
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        SCENARIO_TABLE.iter().map(|(n, _)| *n)
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::TransferBatch { part } => write!(f, "transfer-batch[part {}]", part),
            ScenarioKind::CreditMatch => write!(f, "credit-match"),
            ScenarioKind::RevertAll => write!(f, "revert-all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDescriptor {
    /// 0-based position in the plan
    pub index: usize,
    pub kind: ScenarioKind,
}

impl ScenarioDescriptor {
    pub fn label(&self) -> String {
        format!("{:02}-{}", self.index + 1, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPlan {
    pub batch_size: usize,
    pub total_providers: usize,
    pub num_parts: usize,
    pub scenarios: Vec<ScenarioDescriptor>,
}

#[derive(Debug, Clone)]
pub struct ScenarioPlanBuilder {
    batch_size: usize,
    credit_match: bool,
    revert_all: bool,
}

impl ScenarioPlanBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            credit_match: false,
            revert_all: false,
        }
    }

    /// Append a credit-match after the transfer parts
    pub fn with_credit_match(mut self) -> Self {
        self.credit_match = true;
        self
    }

    /// Append a revert-all at the end
    pub fn with_revert_all(mut self) -> Self {
        self.revert_all = true;
        self
    }

    /// Main-wallet entries are not counted towards parts
    pub fn build(self, catalog: &[Provider]) -> Result<ScenarioPlan, EngineError> {
        let total = catalog::sub_accounts(catalog).len();
        let parts = num_parts(total, self.batch_size)?;

        let mut kinds: Vec<ScenarioKind> = (1..=parts)
            .map(|part| ScenarioKind::TransferBatch { part })
            .collect();
        if self.credit_match {
            kinds.push(ScenarioKind::CreditMatch);
        }
        if self.revert_all {
            kinds.push(ScenarioKind::RevertAll);
        }

        Ok(ScenarioPlan {
            batch_size: self.batch_size,
            total_providers: total,
            num_parts: parts,
            scenarios: kinds
                .into_iter()
                .enumerate()
                .map(|(index, kind)| ScenarioDescriptor { index, kind })
                .collect(),
        })
    }
}
