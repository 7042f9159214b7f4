use std::collections::BTreeMap;

use serde::Serialize;

use super::assessment::{RecommendedAction, RiskAssessment, RiskLevel};
use crate::config::settings::{DecisionConfig, DecisionMode};

/// Deterministic mapping from risk level and confidence to an action.
#[derive(Debug, Clone)]
pub struct DecisionRules {
    pub mode: DecisionMode,
    pub block_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionReview {
    pub model_action: RecommendedAction,
    pub expected_action: RecommendedAction,
    pub agrees: bool,
    pub overridden: bool,
    pub rationale: String,
}

impl Default for DecisionRules {
    fn default() -> Self {
        Self::from_config(&DecisionConfig::default())
    }
}

impl DecisionRules {
    pub fn from_config(cfg: &DecisionConfig) -> Self {
        Self {
            mode: cfg.mode,
            block_confidence: cfg.block_confidence,
        }
    }

    pub fn action_for(&self, risk_level: RiskLevel, confidence: f64) -> RecommendedAction {
        match risk_level {
            RiskLevel::High if confidence >= self.block_confidence => RecommendedAction::Block,
            RiskLevel::High | RiskLevel::Medium => RecommendedAction::Review,
            RiskLevel::Low => RecommendedAction::Approve,
        }
    }

    pub fn rationale(&self, risk_level: RiskLevel, confidence: f64) -> String {
        let action = self.action_for(risk_level, confidence);
        let header = format!(
            "Risk Level: {} | Confidence: {:.1}% | Action: {}",
            risk_level.as_str().to_uppercase(),
            confidence * 100.0,
            action.as_str().to_uppercase()
        );
        let decision = match (risk_level, action) {
            (RiskLevel::High, RecommendedAction::Block) => {
                "HIGH risk with high confidence -> BLOCK transaction".to_string()
            }
            (RiskLevel::High, _) => format!(
                "HIGH risk below {:.0}% confidence -> REVIEW transaction (manual verification)",
                self.block_confidence * 100.0
            ),
            (RiskLevel::Medium, _) => {
                "MEDIUM risk -> REVIEW transaction (manual verification)".to_string()
            }
            (RiskLevel::Low, _) => "LOW risk -> APPROVE transaction".to_string(),
        };
        format!("{header}\nDecision: {decision}")
    }

    /// Compares the model's action with the rule action. In enforce mode the
    /// assessment's action is replaced; risk level and confidence are never touched.
    pub fn review(&self, assessment: &mut RiskAssessment) -> DecisionReview {
        let model_action = assessment.recommended_action;
        let expected_action = self.action_for(assessment.risk_level, assessment.confidence());
        let agrees = model_action == expected_action;
        let overridden = !agrees && self.mode == DecisionMode::Enforce;
        if overridden {
            assessment.recommended_action = expected_action;
        }

        DecisionReview {
            model_action,
            expected_action,
            agrees,
            overridden,
            rationale: self.rationale(assessment.risk_level, assessment.confidence()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub consistency: f64,
    pub all_actions_same: bool,
    pub action_distribution: BTreeMap<RecommendedAction, usize>,
}

/// Share of repeated assessments of the same transaction that match the first action.
pub fn action_consistency(actions: &[RecommendedAction]) -> ConsistencyReport {
    let mut action_distribution = BTreeMap::new();
    for a in actions {
        *action_distribution.entry(*a).or_insert(0) += 1;
    }
    let Some(first) = actions.first() else {
        return ConsistencyReport {
            consistency: 1.0,
            all_actions_same: true,
            action_distribution,
        };
    };
    let same = actions.iter().filter(|a| *a == first).count();
    ConsistencyReport {
        consistency: same as f64 / actions.len() as f64,
        all_actions_same: same == actions.len(),
        action_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(level: RiskLevel, action: RecommendedAction, confidence: f64) -> RiskAssessment {
        RiskAssessment::new(level, vec![], vec![], action, confidence).unwrap()
    }

    #[test]
    fn rule_table() {
        let rules = DecisionRules::default();
        assert_eq!(rules.action_for(RiskLevel::High, 0.9), RecommendedAction::Block);
        assert_eq!(rules.action_for(RiskLevel::High, 0.85), RecommendedAction::Block);
        assert_eq!(rules.action_for(RiskLevel::High, 0.75), RecommendedAction::Review);
        assert_eq!(rules.action_for(RiskLevel::High, 0.2), RecommendedAction::Review);
        assert_eq!(rules.action_for(RiskLevel::Medium, 0.99), RecommendedAction::Review);
        assert_eq!(rules.action_for(RiskLevel::Low, 0.1), RecommendedAction::Approve);
    }

    #[test]
    fn advisory_mode_keeps_model_action() {
        let rules = DecisionRules::default();
        let mut a = assessment(RiskLevel::High, RecommendedAction::Escalate, 0.95);
        let review = rules.review(&mut a);
        assert!(!review.agrees);
        assert!(!review.overridden);
        assert_eq!(review.expected_action, RecommendedAction::Block);
        assert_eq!(a.recommended_action, RecommendedAction::Escalate);
    }

    #[test]
    fn enforce_mode_replaces_action_only() {
        let rules = DecisionRules {
            mode: DecisionMode::Enforce,
            block_confidence: 0.85,
        };
        let mut a = assessment(RiskLevel::Low, RecommendedAction::Review, 0.6);
        let review = rules.review(&mut a);
        assert!(review.overridden);
        assert_eq!(a.recommended_action, RecommendedAction::Approve);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.confidence(), 0.6);
    }

    #[test]
    fn rationale_names_the_outcome() {
        let rules = DecisionRules::default();
        let text = rules.rationale(RiskLevel::High, 0.9);
        assert!(text.starts_with("Risk Level: HIGH | Confidence: 90.0% | Action: BLOCK"));
    }

    #[test]
    fn consistency_over_repeated_runs() {
        use RecommendedAction::*;
        let report = action_consistency(&[Block, Block, Review, Block]);
        assert_eq!(report.consistency, 0.75);
        assert!(!report.all_actions_same);
        assert_eq!(report.action_distribution.get(&Block), Some(&3));

        let empty = action_consistency(&[]);
        assert_eq!(empty.consistency, 1.0);
        assert!(empty.all_actions_same);
    }
}
