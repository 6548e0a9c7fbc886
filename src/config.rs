use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::money;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    /// Bearer token for the ledger session
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Per-call timeouts, scaled by how critical the call is
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeoutConfig {
    pub catalog_ms: u64,
    pub transfer_ms: u64,
    pub balance_ms: u64,
    pub user_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            catalog_ms: 30_000,
            transfer_ms: 10_000,
            balance_ms: 5_000,
            user_ms: 2_000,
        }
    }
}

impl TimeoutConfig {
    pub fn catalog(&self) -> Duration {
        Duration::from_millis(self.catalog_ms)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_millis(self.transfer_ms)
    }

    pub fn balance(&self) -> Duration {
        Duration::from_millis(self.balance_ms)
    }

    pub fn user(&self) -> Duration {
        Duration::from_millis(self.user_ms)
    }
}

/// Sweep / reconcile engine settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub batch_size: usize,
    /// Decimal string, e.g. "2.00"
    pub transfer_amount: String,
    pub max_retries: u32,
    pub settle_interval_ms: u64,
    pub readiness_poll_ms: u64,
    /// How long to wait for the observed channel before reading it
    pub readiness_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            transfer_amount: "2.00".to_string(),
            max_retries: 3,
            settle_interval_ms: 2_000,
            readiness_poll_ms: 250,
            readiness_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Reject settings that would make partitioning or retrying meaningless
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::Config(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(EngineError::Config(
                "max_retries must be at least 1".into(),
            ));
        }
        self.unit_amount()?;
        Ok(())
    }

    pub fn unit_amount(&self) -> Result<Decimal, EngineError> {
        money::parse_amount(&self.transfer_amount).map_err(|e| {
            EngineError::Config(format!(
                "transfer_amount {:?}: {}",
                self.transfer_amount, e
            ))
        })
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

/// Virtual-user account creation + deposit simulation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    pub users: usize,
    pub workers: usize,
    pub deposit_amount: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            users: 20,
            workers: 5,
            deposit_amount: "100.00".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, EngineError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, EngineError> {
        let config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config yaml: {}", e)))?;
        config.engine.validate()?;
        Ok(config)
    }
}
