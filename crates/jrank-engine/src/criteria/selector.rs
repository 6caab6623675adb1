use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::catalog::RuleCatalog;
use super::domain::{ActionRecord, ActorMetrics, CriteriaType, RuleDefinition, RuleId, RuleScope};
use super::outcome::{Diagnostic, EligibilityFailureKind};
use super::requirements::RequirementValidator;
use super::window::TimeWindowEvaluator;

/// Fact-derived inputs the selector needs to filter candidates.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub actor: Option<&'a ActorMetrics>,
    pub history: &'a [ActionRecord],
    pub action_type: Option<CriteriaType>,
    pub now: DateTime<Utc>,
}

/// A candidate that was in scope and in window but excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRejection {
    pub rule_id: RuleId,
    pub priority: i32,
    pub updated_at: DateTime<Utc>,
    pub reason: EligibilityFailureKind,
    pub notes: Vec<String>,
}

/// Ordered survivors of selection plus the trail of what was dropped.
#[derive(Debug, Clone, Default)]
pub struct Selection<'c> {
    pub eligible: Vec<&'c RuleDefinition>,
    pub rejections: Vec<RuleRejection>,
    pub diagnostics: Vec<Diagnostic>,
    /// Active rules of the scope whose time window contains `now`.
    pub in_window: usize,
}

impl<'c> Selection<'c> {
    pub fn winner(&self) -> Option<&'c RuleDefinition> {
        self.eligible.first().copied()
    }

    /// Rejection of the highest-ranked excluded rule, or `NoMatchingRule` when
    /// nothing was excluded by a gate.
    pub fn rejection_reason(&self) -> EligibilityFailureKind {
        self.rejections
            .first()
            .map(|rejection| rejection.reason)
            .unwrap_or(EligibilityFailureKind::NoMatchingRule)
    }

    /// Folds another scope's selection in, keeping both lists ranked.
    pub fn merge(&mut self, other: Selection<'c>) {
        self.eligible.extend(other.eligible);
        self.eligible.sort_by(|a, b| rank_order(a, b));
        self.rejections.extend(other.rejections);
        self.rejections.sort_by(rejection_order);
        self.diagnostics.extend(other.diagnostics);
        self.in_window += other.in_window;
    }
}

/// Priority descending, then most recently updated, then id ascending.
pub fn rank_order(a: &RuleDefinition, b: &RuleDefinition) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.audit.updated_at.cmp(&a.audit.updated_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn rejection_order(a: &RuleRejection, b: &RuleRejection) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

/// Filters a scope's candidates through time windows, condition sanity, and
/// requirement gates, and ranks the survivors deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSelector {
    window: TimeWindowEvaluator,
    requirements: RequirementValidator,
}

impl RuleSelector {
    pub fn new(window: TimeWindowEvaluator) -> Self {
        Self {
            window,
            requirements: RequirementValidator,
        }
    }

    pub fn select<'c>(
        &self,
        catalog: &'c RuleCatalog,
        scope: &RuleScope,
        context: &SelectionContext<'_>,
    ) -> Selection<'c> {
        let mut selection = Selection::default();

        for rule in catalog.list_active(scope) {
            if let Err(rejection) = self
                .window
                .check(rule.time_constraints.as_ref(), context.now)
            {
                debug!(rule_id = %rule.id, %rejection, "rule outside time window");
                continue;
            }
            selection.in_window += 1;

            let unknown = rule.unrecognized_conditions();
            if !unknown.is_empty() {
                for detail in &unknown {
                    selection.diagnostics.push(Diagnostic::new(
                        EligibilityFailureKind::UnknownCondition,
                        Some(rule.id.clone()),
                        detail.clone(),
                    ));
                }
                selection
                    .rejections
                    .push(rejection(rule, EligibilityFailureKind::UnknownCondition, unknown));
                continue;
            }

            let check = self.requirements.check(
                rule.requirements.as_ref(),
                context.actor,
                context.history,
                context.action_type,
                context.now,
            );
            if let Some(reason) = check.reason() {
                debug!(rule_id = %rule.id, ?reason, "rule excluded by requirements");
                selection.rejections.push(rejection(rule, reason, check.notes));
                continue;
            }

            selection.eligible.push(rule);
        }

        selection.eligible.sort_by(|a, b| rank_order(a, b));
        selection.rejections.sort_by(rejection_order);
        selection
    }
}

fn rejection(
    rule: &RuleDefinition,
    reason: EligibilityFailureKind,
    notes: Vec<String>,
) -> RuleRejection {
    RuleRejection {
        rule_id: rule.id.clone(),
        priority: rule.priority,
        updated_at: rule.audit.updated_at,
        reason,
        notes,
    }
}
