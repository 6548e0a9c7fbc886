//! HTTP Ledger Client
//!
//! `reqwest` implementation of [`LedgerService`] with a per-call timeout
//! for every endpoint.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::LedgerService;
use super::types::{
    BalanceBody, CatalogEntry, CatalogResponse, TransferBody, TransferReplyBody, UserBody,
};
use crate::config::{LedgerConfig, TimeoutConfig};
use crate::error::EngineError;
use crate::models::{ProviderId, TransferReply};

pub struct HttpLedgerClient {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
    timeouts: TimeoutConfig,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self, EngineError> {
        info!(base_url = %config.base_url, "Initializing ledger client");

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EngineError::service(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            token: config.token.clone(),
            timeouts: config.timeouts.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map HTTP status to the error taxonomy, then parse the body
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, EngineError> {
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EngineError::Auth(format!(
                "ledger rejected session (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(EngineError::service_status(
                status.as_u16(),
                String::from_utf8_lossy(&body).trim().to_string(),
            ));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl LedgerService for HttpLedgerClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, EngineError> {
        let response = self
            .request(Method::GET, "/transfers", self.timeouts.catalog())
            .send()
            .await?;
        let catalog: CatalogResponse = Self::read_json(response).await?;
        let entries = catalog.into_entries();
        debug!(entries = entries.len(), "Fetched provider catalog");
        Ok(entries)
    }

    async fn transfer(
        &self,
        source: ProviderId,
        target: ProviderId,
        amount: Decimal,
    ) -> Result<TransferReply, EngineError> {
        let body = TransferBody {
            source_id: source,
            target_id: target,
            amount: amount.to_string(),
        };
        let response = self
            .request(Method::POST, "/transfers", self.timeouts.transfer())
            .json(&body)
            .send()
            .await?;
        let reply: TransferReplyBody = Self::read_json(response).await?;
        Ok(reply.into())
    }

    async fn main_balance(&self) -> Result<Decimal, EngineError> {
        let response = self
            .request(Method::GET, "/balance", self.timeouts.balance())
            .send()
            .await?;
        let body: BalanceBody = Self::read_json(response).await?;
        Ok(body.balance)
    }

    async fn current_user(&self) -> Result<i64, EngineError> {
        let response = self
            .request(Method::GET, "/user", self.timeouts.user())
            .send()
            .await?;
        let body: UserBody = Self::read_json(response).await?;
        Ok(body.id)
    }
}
