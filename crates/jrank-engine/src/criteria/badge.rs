use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use super::catalog::RuleCatalog;
use super::condition::{ConditionMatcher, FactSource};
use super::domain::{BadgeCategory, MetricSnapshot, RuleCriteria, RuleScope};
use super::outcome::{
    Award, BadgeEvaluation, Diagnostic, EligibilityFailureKind, EvaluationPhase,
    EvaluationResult,
};
use super::selector::{RuleSelector, Selection, SelectionContext};
use super::window::TimeWindowEvaluator;
use crate::config::EngineConfig;

/// Checks cumulative metrics against badge thresholds.
///
/// Unlike engagement scoring, badges are not mutually exclusive: every eligible
/// badge rule whose threshold is met is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeEligibilityEvaluator {
    selector: RuleSelector,
    matcher: ConditionMatcher,
}

impl BadgeEligibilityEvaluator {
    pub fn new(reference_offset: FixedOffset) -> Self {
        Self {
            selector: RuleSelector::new(TimeWindowEvaluator::new(reference_offset)),
            matcher: ConditionMatcher,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.reference_offset)
    }

    /// Evaluates every badge category.
    pub fn evaluate(
        &self,
        catalog: &RuleCatalog,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> BadgeEvaluation {
        let scopes: Vec<RuleScope> = RuleScope::badge_scopes().collect();
        self.evaluate_scopes(catalog, snapshot, &scopes, now)
    }

    pub fn evaluate_category(
        &self,
        catalog: &RuleCatalog,
        snapshot: &MetricSnapshot,
        category: BadgeCategory,
        now: DateTime<Utc>,
    ) -> BadgeEvaluation {
        self.evaluate_scopes(catalog, snapshot, &[RuleScope::Badge(category)], now)
    }

    fn evaluate_scopes(
        &self,
        catalog: &RuleCatalog,
        snapshot: &MetricSnapshot,
        scopes: &[RuleScope],
        now: DateTime<Utc>,
    ) -> BadgeEvaluation {
        if snapshot.subject_id.trim().is_empty() {
            debug!(phase = ?EvaluationPhase::Received, "metric snapshot without subject");
            return resolved(
                snapshot,
                Vec::new(),
                Some(EligibilityFailureKind::InvalidFact),
                vec![Diagnostic::new(
                    EligibilityFailureKind::InvalidFact,
                    None,
                    "subjectId is required".to_string(),
                )],
                EvaluationPhase::Received,
            );
        }

        let context = SelectionContext {
            actor: snapshot.profile.as_ref(),
            history: &[],
            action_type: None,
            now,
        };
        let mut selection = Selection::default();
        for scope in scopes {
            selection.merge(self.selector.select(catalog, scope, &context));
        }
        debug!(
            phase = ?EvaluationPhase::Selecting,
            subject_id = %snapshot.subject_id,
            in_window = selection.in_window,
            eligible = selection.eligible.len(),
            "badge candidates selected"
        );

        if selection.in_window == 0 {
            return resolved(
                snapshot,
                Vec::new(),
                Some(EligibilityFailureKind::NoMatchingRule),
                selection.diagnostics,
                EvaluationPhase::Selecting,
            );
        }
        if selection.eligible.is_empty() {
            let reason = selection.rejection_reason();
            return resolved(
                snapshot,
                Vec::new(),
                Some(reason),
                selection.diagnostics,
                EvaluationPhase::Validating,
            );
        }

        let mut diagnostics = selection.diagnostics;
        let mut awards = Vec::new();
        for rule in &selection.eligible {
            let RuleCriteria::Badge(criteria) = &rule.criteria else {
                continue;
            };
            let observed = snapshot.value_of(&criteria.metric);
            let check = self.matcher.evaluate(
                Some(&rule.id),
                &criteria.metric,
                &criteria.operator,
                criteria.target,
                observed,
            );
            if let Some(diagnostic) = check.diagnostic {
                diagnostics.push(diagnostic);
            }
            if !check.satisfied {
                continue;
            }

            debug!(rule_id = %rule.id, badge_id = %criteria.badge_id, "badge threshold met");
            awards.push(EvaluationResult {
                matched_rule_id: Some(rule.id.clone()),
                applicable: true,
                award: Some(Award::Badge {
                    badge_id: criteria.badge_id.clone(),
                    metric: criteria.metric.clone(),
                    observed: observed.map(|value| value.as_number()).unwrap_or_default(),
                    target: criteria.target,
                }),
                breakdown: None,
                rejection_reason: None,
                diagnostics: Vec::new(),
                resolved_in: EvaluationPhase::Resolved,
            });
        }

        if awards.is_empty() {
            return resolved(
                snapshot,
                awards,
                Some(EligibilityFailureKind::ThresholdNotMet),
                diagnostics,
                EvaluationPhase::Scoring,
            );
        }

        resolved(snapshot, awards, None, diagnostics, EvaluationPhase::Resolved)
    }
}

fn resolved(
    snapshot: &MetricSnapshot,
    awards: Vec<EvaluationResult>,
    rejection_reason: Option<EligibilityFailureKind>,
    diagnostics: Vec<Diagnostic>,
    phase: EvaluationPhase,
) -> BadgeEvaluation {
    BadgeEvaluation {
        subject_id: snapshot.subject_id.clone(),
        awards,
        rejection_reason,
        diagnostics,
        previously_awarded: Vec::new(),
        resolved_in: phase,
    }
}
