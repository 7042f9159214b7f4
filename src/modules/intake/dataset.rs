use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use super::transaction::Transaction;
use crate::error::{AssessError, Result};
use crate::modules::brain::assessment::RiskLevel;

/// A test transaction paired with its expected risk level.
#[derive(Debug, Clone)]
pub struct LabeledTransaction {
    pub transaction: Transaction,
    pub ground_truth: RiskLevel,
}

/// Loads a JSON array of transactions that each carry a `ground_truth` label.
pub fn load_labeled(path: &Path) -> Result<Vec<LabeledTransaction>> {
    let raw = std::fs::read_to_string(path).map_err(|e| AssessError::io(path, e))?;
    parse_labeled(&raw)
}

pub fn parse_labeled(raw: &str) -> Result<Vec<LabeledTransaction>> {
    let records: Vec<Value> = serde_json::from_str(raw)?;

    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            let Value::Object(mut fields) = record else {
                return Err(AssessError::InvalidTransaction(format!(
                    "record {idx} is not a JSON object"
                )));
            };
            let label = fields.remove("ground_truth").ok_or_else(|| {
                AssessError::InvalidTransaction(format!("record {idx} has no ground_truth"))
            })?;
            let ground_truth: RiskLevel = serde_json::from_value(label).map_err(|e| {
                AssessError::InvalidTransaction(format!("record {idx}: bad ground_truth: {e}"))
            })?;
            let transaction = Transaction::from_value(Value::Object(fields))?;
            Ok(LabeledTransaction {
                transaction,
                ground_truth,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AmountStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DatasetStatistics {
    pub count: usize,
    pub by_label: BTreeMap<RiskLevel, usize>,
    pub amount: Option<AmountStats>,
    pub countries: Vec<String>,
    pub device_new_pct: f64,
    pub avg_velocity: f64,
}

pub fn statistics(records: &[LabeledTransaction]) -> DatasetStatistics {
    let count = records.len();
    let mut by_label = BTreeMap::new();
    let mut countries: Vec<String> = Vec::new();
    let mut device_new = 0usize;
    let mut velocity_sum = 0u64;

    for r in records {
        *by_label.entry(r.ground_truth).or_insert(0) += 1;
        if !countries.contains(&r.transaction.country) {
            countries.push(r.transaction.country.clone());
        }
        if r.transaction.device_new {
            device_new += 1;
        }
        velocity_sum += u64::from(r.transaction.velocity);
    }
    countries.sort();

    let amount = if count == 0 {
        None
    } else {
        let amounts = records.iter().map(|r| r.transaction.amount);
        Some(AmountStats {
            min: amounts.clone().fold(f64::INFINITY, f64::min),
            max: amounts.clone().fold(f64::NEG_INFINITY, f64::max),
            mean: amounts.sum::<f64>() / count as f64,
        })
    };

    let ratio = |n: f64| if count == 0 { 0.0 } else { n / count as f64 };

    DatasetStatistics {
        count,
        by_label,
        amount,
        countries,
        device_new_pct: ratio(device_new as f64) * 100.0,
        avg_velocity: ratio(velocity_sum as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"[
        {"transaction_id":"T1","amount":20,"country":"DE","device_new":false,"velocity":1,"ground_truth":"low","description":"coffee"},
        {"transaction_id":"T2","amount":50000,"country":"NG","device_new":true,"velocity":9,"ground_truth":"high"}
    ]"#;

    #[test]
    fn strips_label_before_validating_transaction() {
        let records = parse_labeled(DATA).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ground_truth, RiskLevel::Low);
        assert_eq!(records[0].transaction.description.as_deref(), Some("coffee"));
        assert_eq!(records[1].ground_truth, RiskLevel::High);
    }

    #[test]
    fn missing_label_is_rejected() {
        let raw = r#"[{"amount":20,"country":"DE","device_new":false,"velocity":1}]"#;
        assert!(matches!(parse_labeled(raw), Err(AssessError::InvalidTransaction(_))));
    }

    #[test]
    fn statistics_summarise_the_set() {
        let stats = statistics(&parse_labeled(DATA).unwrap());
        assert_eq!(stats.count, 2);
        assert_eq!(stats.by_label.get(&RiskLevel::High), Some(&1));
        assert_eq!(stats.countries, vec!["DE".to_string(), "NG".to_string()]);
        assert_eq!(stats.device_new_pct, 50.0);
        assert_eq!(stats.avg_velocity, 5.0);
        let amount = stats.amount.unwrap();
        assert_eq!(amount.min, 20.0);
        assert_eq!(amount.max, 50000.0);
    }

    #[test]
    fn empty_set_has_no_amount_stats() {
        let stats = statistics(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.amount.is_none());
    }
}
