//! Report rows handed to the reporting collaborator.
//!
//! Only the row shape lives here; where the rows end up (CSV, HTML,
//! a dashboard) is decided by the caller.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::ProviderId;
use crate::money::format_credit;
use crate::verify::{Mismatch, ProviderCheck};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportRow {
    #[serde(rename = "ProviderID")]
    pub provider_id: ProviderId,
    pub name: String,
    /// Observed credit; `None` when the provider was not observed
    pub credit: Option<Decimal>,
    pub expected: Decimal,
}

impl ReportRow {
    /// `[ProviderID, Name, Credit, Expected]` as display strings
    pub fn cells(&self) -> [String; 4] {
        [
            self.provider_id.to_string(),
            self.name.clone(),
            self.credit.map(format_credit).unwrap_or_else(|| "-".into()),
            format_credit(self.expected),
        ]
    }

    pub const HEADER: [&'static str; 4] = ["ProviderID", "Name", "Credit", "Expected"];
}

impl From<&ProviderCheck> for ReportRow {
    fn from(check: &ProviderCheck) -> Self {
        Self {
            provider_id: check.provider_id,
            name: check.name.clone(),
            credit: check.observed_credit,
            expected: check.expected_credit,
        }
    }
}

impl From<&Mismatch> for ReportRow {
    fn from(m: &Mismatch) -> Self {
        Self {
            provider_id: m.provider_id,
            name: m.name.clone(),
            credit: m.observed,
            expected: m.expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_and_serialization() {
        let row = ReportRow {
            provider_id: 12,
            name: "Alpha".into(),
            credit: None,
            expected: Decimal::TWO,
        };
        assert_eq!(row.cells(), ["12", "Alpha", "-", "2.00"].map(String::from));

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["ProviderID"], 12);
        assert_eq!(json["Name"], "Alpha");
        assert!(json["Credit"].is_null());
    }
}
