use serde::{Deserialize, Serialize};

use super::condition::ConditionName;
use super::domain::{BadgeId, MultiplierCondition, RuleId};

/// Reasons an evaluation can end without an applicable rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityFailureKind {
    InvalidFact,
    UnknownCondition,
    RequirementNotMet,
    DailyCapExceeded,
    CooldownActive,
    NoMatchingRule,
    ThresholdNotMet,
}

impl EligibilityFailureKind {
    pub fn summary(self) -> &'static str {
        match self {
            EligibilityFailureKind::InvalidFact => "fact is missing required fields",
            EligibilityFailureKind::UnknownCondition => {
                "rule references an unknown condition or operator"
            }
            EligibilityFailureKind::RequirementNotMet => "actor does not meet rule requirements",
            EligibilityFailureKind::DailyCapExceeded => "daily action cap reached",
            EligibilityFailureKind::CooldownActive => "cooldown since last qualifying action",
            EligibilityFailureKind::NoMatchingRule => "no active rule matches",
            EligibilityFailureKind::ThresholdNotMet => "no badge threshold reached",
        }
    }
}

/// Non-fatal finding surfaced alongside a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: EligibilityFailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: EligibilityFailureKind, rule_id: Option<RuleId>, detail: String) -> Self {
        Self {
            kind,
            rule_id,
            detail,
        }
    }
}

/// Phases of a single evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPhase {
    Received,
    Selecting,
    Validating,
    Scoring,
    Resolved,
}

/// What an applicable rule grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Award {
    Points {
        points: i64,
    },
    #[serde(rename_all = "camelCase")]
    Badge {
        badge_id: BadgeId,
        metric: ConditionName,
        observed: f64,
        target: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedBonus {
    pub condition: ConditionName,
    pub bonus_points: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMultiplier {
    pub condition: MultiplierCondition,
    pub multiplier: f64,
}

/// Transparent account of how an engagement score was assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub base: u32,
    pub bonuses: Vec<AppliedBonus>,
    pub bonus_sum: u64,
    pub multipliers: Vec<AppliedMultiplier>,
    pub multiplier_product: f64,
    pub total: i64,
}

/// Decision object returned for every evaluation, applicable or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<RuleId>,
    pub applicable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub award: Option<Award>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<EligibilityFailureKind>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub resolved_in: EvaluationPhase,
}

impl EvaluationResult {
    pub fn rejected(
        reason: EligibilityFailureKind,
        phase: EvaluationPhase,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            matched_rule_id: None,
            applicable: false,
            award: None,
            breakdown: None,
            rejection_reason: Some(reason),
            diagnostics,
            resolved_in: phase,
        }
    }

    pub fn points(&self) -> Option<i64> {
        match &self.award {
            Some(Award::Points { points }) => Some(*points),
            _ => None,
        }
    }

    pub fn badge_id(&self) -> Option<&BadgeId> {
        match &self.award {
            Some(Award::Badge { badge_id, .. }) => Some(badge_id),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        match (&self.matched_rule_id, &self.award, self.rejection_reason) {
            (Some(rule), Some(Award::Points { points }), _) => {
                format!("rule {rule} awarded {points} point(s)")
            }
            (Some(rule), Some(Award::Badge { badge_id, .. }), _) => {
                format!("rule {rule} granted badge {badge_id}")
            }
            (_, _, Some(reason)) => format!("not applicable: {}", reason.summary()),
            _ => "not applicable".to_string(),
        }
    }
}

/// Every badge a metric snapshot earns, plus why nothing was earned otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeEvaluation {
    pub subject_id: String,
    pub awards: Vec<EvaluationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<EligibilityFailureKind>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previously_awarded: Vec<BadgeId>,
    pub resolved_in: EvaluationPhase,
}

impl BadgeEvaluation {
    pub fn badge_ids(&self) -> Vec<&BadgeId> {
        self.awards
            .iter()
            .filter_map(EvaluationResult::badge_id)
            .collect()
    }
}
