//! Rule-based engagement scoring and badge eligibility.
//!
//! The evaluation path (catalog, selector, window and requirement checks, score
//! calculation, and the two orchestrators) is pure and synchronous: callers pass a
//! catalog snapshot, a fact, and `now`, and always get a decision object back.
//! Storage, the per-actor serialization of read-then-record, and HTTP live in
//! [`service`], [`repository`], and [`router`].

pub mod badge;
pub mod catalog;
pub mod condition;
pub mod domain;
pub mod engine;
pub mod import;
pub mod outcome;
pub mod repository;
pub mod requirements;
pub mod router;
pub mod score;
pub mod selector;
pub mod service;
pub mod window;

#[cfg(test)]
mod tests;

pub use badge::BadgeEligibilityEvaluator;
pub use catalog::{CatalogReport, RejectedRule, RuleCatalog, SharedCatalog};
pub use condition::{ConditionCheck, ConditionMatcher, ConditionName, FactSource, FactValue, Operator};
pub use domain::{
    ActionRecord, ActiveHours, ActorMetrics, AuditTrail, BadgeCategory, BadgeCriteria, BadgeId,
    BonusCondition, CriteriaType, EngagementCriteria, EngagementFact, MetricSnapshot,
    MultiplierCondition, Requirements, RuleCriteria, RuleDefect, RuleDefinition, RuleEntry, RuleId,
    RuleScope, ScoreMultiplier, TimeConstraints, UnknownLabel,
};
pub use engine::CriteriaEvaluationEngine;
pub use import::{ImportError, JsonRuleRepository};
pub use outcome::{
    AppliedBonus, AppliedMultiplier, Award, BadgeEvaluation, Diagnostic, EligibilityFailureKind,
    EvaluationPhase, EvaluationResult, ScoreBreakdown,
};
pub use repository::{
    ActionHistoryStore, AwardLedger, BadgeGrant, HistoryError, LedgerError, PointsEntry,
    RepositoryError, RuleRepository,
};
pub use requirements::{RequirementCheck, RequirementValidator};
pub use router::criteria_router;
pub use score::{ScoreCalculator, ScoreOutcome};
pub use selector::{RuleRejection, RuleSelector, Selection, SelectionContext};
pub use service::{EngagementEvent, ScoringService, ScoringServiceError};
pub use window::{TimeWindowEvaluator, WindowRejection};
