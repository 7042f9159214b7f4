use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AssessError, Result};

/// A card transaction under assessment.
///
/// Field order here is the canonical order used for retrieval queries and
/// prompts, so it must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub country: String,
    pub device_new: bool,
    /// Transactions seen from the same card in the recent window.
    pub velocity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_age_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transaction {
    pub fn from_json(raw: &str) -> Result<Self> {
        let tx: Transaction = serde_json::from_str(raw)
            .map_err(|e| AssessError::InvalidTransaction(e.to_string()))?;
        tx.validated()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let tx: Transaction = serde_json::from_value(value)
            .map_err(|e| AssessError::InvalidTransaction(e.to_string()))?;
        tx.validated()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AssessError::io(path, e))?;
        Self::from_json(&raw)
    }

    /// Checks value ranges and normalises country/currency codes to upper case.
    pub fn validated(mut self) -> Result<Self> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(AssessError::InvalidTransaction(format!(
                "amount must be a finite non-negative number, got {}",
                self.amount
            )));
        }

        self.country = self.country.trim().to_ascii_uppercase();
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AssessError::InvalidTransaction(format!(
                "country must be a 2-letter code, got '{}'",
                self.country
            )));
        }

        if let Some(currency) = self.currency.as_mut() {
            *currency = currency.trim().to_ascii_uppercase();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(AssessError::InvalidTransaction(format!(
                    "currency must be a 3-letter code, got '{}'",
                    currency
                )));
            }
        }

        Ok(self)
    }

    pub fn id_or_unknown(&self) -> &str {
        self.transaction_id.as_deref().unwrap_or("unknown")
    }

    /// Stable JSON rendering used as the similarity-search query.
    pub fn canonical_query(&self) -> String {
        // Struct serialization cannot fail: every field is a plain scalar or string.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "n/a".to_string());

        writeln!(f, "- Transaction ID: {}", self.id_or_unknown())?;
        match &self.currency {
            Some(cur) => writeln!(f, "- Amount: {:.2} {}", self.amount, cur)?,
            None => writeln!(f, "- Amount: {:.2}", self.amount)?,
        }
        writeln!(f, "- Country: {}", self.country)?;
        writeln!(f, "- New device: {}", if self.device_new { "yes" } else { "no" })?;
        writeln!(f, "- Velocity (recent transactions): {}", self.velocity)?;
        writeln!(f, "- Merchant category: {}", opt(&self.merchant_category))?;
        match self.account_age_days {
            Some(days) => writeln!(f, "- Account age: {} days", days)?,
            None => writeln!(f, "- Account age: n/a")?,
        }
        writeln!(f, "- Location: {}", opt(&self.location))?;
        write!(f, "- Timestamp: {}", opt(&self.timestamp))?;
        if let Some(desc) = &self.description {
            write!(f, "\n- Description: {}", desc)?;
        }
        Ok(())
    }
}
