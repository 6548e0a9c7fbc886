//! Ledger wire types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Provider, ProviderId, TransferReply};
use crate::money::deserialize_credit_opt;

/// One catalog entry; groups carry their providers in `sub_entries`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub id: ProviderId,
    #[serde(default, alias = "label")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_credit_opt")]
    pub credit: Decimal,
    #[serde(default)]
    pub has_failed_transfer: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_entries: Vec<CatalogEntry>,
}

impl CatalogEntry {
    pub fn leaf(id: ProviderId, name: impl Into<String>, credit: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            credit,
            has_failed_transfer: false,
            sub_entries: Vec::new(),
        }
    }

    pub fn to_provider(&self) -> Provider {
        Provider {
            id: self.id,
            name: self.name.clone(),
            credit: self.credit,
            has_failed_transfer: self.has_failed_transfer,
        }
    }
}

impl From<&Provider> for CatalogEntry {
    fn from(p: &Provider) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            credit: p.credit,
            has_failed_transfer: p.has_failed_transfer,
            sub_entries: Vec::new(),
        }
    }
}

/// `GET /transfers` body: either a bare list or wrapped in `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CatalogResponse {
    Wrapped { data: Vec<CatalogEntry> },
    Bare(Vec<CatalogEntry>),
}

impl CatalogResponse {
    pub fn into_entries(self) -> Vec<CatalogEntry> {
        match self {
            CatalogResponse::Wrapped { data } => data,
            CatalogResponse::Bare(entries) => entries,
        }
    }
}

/// `POST /transfers` body. Amount travels as a string to keep precision.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferBody {
    pub source_id: ProviderId,
    pub target_id: ProviderId,
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferReplyBody {
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
}

impl From<TransferReplyBody> for TransferReply {
    fn from(body: TransferReplyBody) -> Self {
        TransferReply {
            status_code: body.status_code,
            message: body.message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceBody {
    #[serde(alias = "credit", deserialize_with = "crate::money::deserialize_credit")]
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UserBody {
    #[serde(alias = "user_id")]
    pub id: i64,
}
