use std::collections::BTreeMap;

use serde::Serialize;

use crate::modules::brain::decision::ConsistencyReport;
use crate::modules::brain::{RecommendedAction, RiskLevel};
use crate::modules::intake::dataset::DatasetStatistics;

/// Binary scores for `high` against every other level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BinaryScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
}

/// Rows are ground truth, columns are predictions.
pub type ConfusionMatrix = BTreeMap<RiskLevel, BTreeMap<RiskLevel, usize>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub transaction_id: String,
    pub truth: RiskLevel,
    pub predicted: RiskLevel,
    pub action: RecommendedAction,
    pub rules_agree: bool,
    pub groundedness: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub transaction_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub count: usize,
    pub assessed: usize,
    pub failures: Vec<FailedRecord>,
    pub accuracy: f64,
    pub high_risk: BinaryScores,
    pub confusion_matrix: ConfusionMatrix,
    pub action_distribution: BTreeMap<RecommendedAction, usize>,
    pub decision_agreement_rate: f64,
    pub mean_groundedness: f64,
    /// Repeated assessment of one transaction; absent unless requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_consistency: Option<ConsistencyReport>,
    pub dataset: DatasetStatistics,
}

pub fn accuracy(outcomes: &[Outcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let correct = outcomes.iter().filter(|o| o.predicted == o.truth).count();
    correct as f64 / outcomes.len() as f64
}

pub fn high_risk_scores(outcomes: &[Outcome]) -> BinaryScores {
    let mut s = BinaryScores::default();
    for o in outcomes {
        match (o.predicted == RiskLevel::High, o.truth == RiskLevel::High) {
            (true, true) => s.tp += 1,
            (true, false) => s.fp += 1,
            (false, true) => s.fn_ += 1,
            (false, false) => s.tn += 1,
        }
    }
    let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
    s.precision = ratio(s.tp, s.tp + s.fp);
    s.recall = ratio(s.tp, s.tp + s.fn_);
    s.f1 = if s.precision + s.recall > 0.0 {
        2.0 * s.precision * s.recall / (s.precision + s.recall)
    } else {
        0.0
    };
    s
}

pub fn confusion_matrix(outcomes: &[Outcome]) -> ConfusionMatrix {
    let mut matrix: ConfusionMatrix = RiskLevel::ALL
        .iter()
        .map(|truth| (*truth, RiskLevel::ALL.iter().map(|p| (*p, 0)).collect()))
        .collect();
    for o in outcomes {
        if let Some(cell) = matrix.get_mut(&o.truth).and_then(|row| row.get_mut(&o.predicted)) {
            *cell += 1;
        }
    }
    matrix
}

fn mean_of(outcomes: &[Outcome], f: impl Fn(&Outcome) -> f64) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().map(f).sum::<f64>() / outcomes.len() as f64
}

pub fn build_report(
    outcomes: &[Outcome],
    failures: Vec<FailedRecord>,
    dataset: DatasetStatistics,
) -> EvaluationReport {
    let mut action_distribution = BTreeMap::new();
    for o in outcomes {
        *action_distribution.entry(o.action).or_insert(0) += 1;
    }

    EvaluationReport {
        count: outcomes.len() + failures.len(),
        assessed: outcomes.len(),
        failures,
        accuracy: accuracy(outcomes),
        high_risk: high_risk_scores(outcomes),
        confusion_matrix: confusion_matrix(outcomes),
        action_distribution,
        decision_agreement_rate: mean_of(outcomes, |o| if o.rules_agree { 1.0 } else { 0.0 }),
        mean_groundedness: mean_of(outcomes, |o| o.groundedness),
        action_consistency: None,
        dataset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(truth: RiskLevel, predicted: RiskLevel, agree: bool) -> Outcome {
        Outcome {
            transaction_id: "t".into(),
            truth,
            predicted,
            action: RecommendedAction::Review,
            rules_agree: agree,
            groundedness: 0.5,
        }
    }

    #[test]
    fn binary_scores_for_high_risk() {
        use RiskLevel::*;
        let outcomes = vec![
            outcome(High, High, true),
            outcome(High, Medium, true),
            outcome(Low, High, false),
            outcome(Low, Low, true),
        ];
        let s = high_risk_scores(&outcomes);
        assert_eq!((s.tp, s.fp, s.fn_, s.tn), (1, 1, 1, 1));
        assert!((s.precision - 0.5).abs() < 1e-9);
        assert!((s.recall - 0.5).abs() < 1e-9);
        assert!((s.f1 - 0.5).abs() < 1e-9);
        assert!((accuracy(&outcomes) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn confusion_matrix_has_every_cell() {
        let m = confusion_matrix(&[outcome(RiskLevel::Medium, RiskLevel::High, true)]);
        assert_eq!(m.len(), 3);
        assert!(m.values().all(|row| row.len() == 3));
        assert_eq!(m[&RiskLevel::Medium][&RiskLevel::High], 1);
        assert_eq!(m[&RiskLevel::High][&RiskLevel::High], 0);
    }

    #[test]
    fn report_counts_failures_and_rates() {
        let outcomes = vec![
            outcome(RiskLevel::High, RiskLevel::High, true),
            outcome(RiskLevel::Low, RiskLevel::Low, false),
        ];
        let failures = vec![FailedRecord {
            transaction_id: "x".into(),
            error: "boom".into(),
        }];
        let report = build_report(&outcomes, failures, DatasetStatistics::default());
        assert_eq!(report.count, 3);
        assert_eq!(report.assessed, 2);
        assert_eq!(report.decision_agreement_rate, 0.5);
        assert_eq!(report.mean_groundedness, 0.5);
        assert_eq!(report.action_distribution[&RecommendedAction::Review], 2);
    }

    #[test]
    fn empty_outcomes_do_not_divide_by_zero() {
        let report = build_report(&[], vec![], DatasetStatistics::default());
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.high_risk.f1, 0.0);
    }
}
