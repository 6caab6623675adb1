use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use super::catalog::RuleCatalog;
use super::domain::{CriteriaType, EngagementFact, RuleCriteria, RuleScope};
use super::outcome::{
    Award, Diagnostic, EligibilityFailureKind, EvaluationPhase, EvaluationResult,
};
use super::score::ScoreCalculator;
use super::selector::{RuleSelector, SelectionContext};
use super::window::TimeWindowEvaluator;
use crate::config::EngineConfig;

/// Scores one engagement event against the catalog.
///
/// At most one rule applies per event: the top-ranked eligible rule of the event's
/// scope. The engine holds no mutable state, so a single instance can be shared
/// across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct CriteriaEvaluationEngine {
    selector: RuleSelector,
    calculator: ScoreCalculator,
}

impl CriteriaEvaluationEngine {
    pub fn new(reference_offset: FixedOffset) -> Self {
        let window = TimeWindowEvaluator::new(reference_offset);
        Self {
            selector: RuleSelector::new(window),
            calculator: ScoreCalculator::new(window),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.reference_offset)
    }

    pub fn evaluate(
        &self,
        catalog: &RuleCatalog,
        fact: &EngagementFact,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        // Received
        let action_type = match validate_fact(fact) {
            Ok(action_type) => action_type,
            Err(detail) => {
                debug!(phase = ?EvaluationPhase::Received, %detail, "engagement fact rejected");
                return EvaluationResult::rejected(
                    EligibilityFailureKind::InvalidFact,
                    EvaluationPhase::Received,
                    vec![Diagnostic::new(
                        EligibilityFailureKind::InvalidFact,
                        None,
                        detail,
                    )],
                );
            }
        };

        // Selecting
        let scope = RuleScope::Engagement(action_type);
        let context = SelectionContext {
            actor: Some(&fact.actor_metrics),
            history: &fact.action_history,
            action_type: Some(action_type),
            now,
        };
        let selection = self.selector.select(catalog, &scope, &context);
        debug!(
            phase = ?EvaluationPhase::Selecting,
            actor_id = %fact.actor_id,
            %scope,
            in_window = selection.in_window,
            eligible = selection.eligible.len(),
            "candidates selected"
        );
        if selection.in_window == 0 {
            return EvaluationResult::rejected(
                EligibilityFailureKind::NoMatchingRule,
                EvaluationPhase::Selecting,
                selection.diagnostics,
            );
        }

        // Validating
        let Some(rule) = selection.winner() else {
            let reason = selection.rejection_reason();
            debug!(phase = ?EvaluationPhase::Validating, ?reason, "every candidate excluded");
            return EvaluationResult::rejected(
                reason,
                EvaluationPhase::Validating,
                selection.diagnostics,
            );
        };

        // Scoring
        let RuleCriteria::Engagement(criteria) = &rule.criteria else {
            // Scope is derived from the criteria variant, so this only trips on a
            // hand-assembled catalog.
            return EvaluationResult::rejected(
                EligibilityFailureKind::NoMatchingRule,
                EvaluationPhase::Scoring,
                selection.diagnostics,
            );
        };
        let outcome = self.calculator.compute(&rule.id, criteria, fact, now);
        let mut diagnostics = selection.diagnostics;
        diagnostics.extend(outcome.diagnostics);

        debug!(
            phase = ?EvaluationPhase::Resolved,
            rule_id = %rule.id,
            total = outcome.breakdown.total,
            "engagement scored"
        );

        EvaluationResult {
            matched_rule_id: Some(rule.id.clone()),
            applicable: true,
            award: Some(Award::Points {
                points: outcome.breakdown.total,
            }),
            breakdown: Some(outcome.breakdown),
            rejection_reason: None,
            diagnostics,
            resolved_in: EvaluationPhase::Resolved,
        }
    }
}

fn validate_fact(fact: &EngagementFact) -> Result<CriteriaType, String> {
    if fact.actor_id.trim().is_empty() {
        return Err("actorId is required".to_string());
    }
    fact.action_type
        .parse::<CriteriaType>()
        .map_err(|_| format!("unknown actionType '{}'", fact.action_type))
}
