use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::criteria::condition::{ConditionName, Operator};
use crate::criteria::domain::{
    ActionRecord, ActiveHours, ActorMetrics, AuditTrail, BadgeCategory, BadgeCriteria, BadgeId,
    BonusCondition, CriteriaType, EngagementCriteria, EngagementFact, MetricSnapshot,
    MultiplierCondition, Requirements, RuleCriteria, RuleDefinition, RuleEntry, RuleId,
    ScoreMultiplier, TimeConstraints,
};
use crate::criteria::repository::{
    ActionHistoryStore, AwardLedger, BadgeGrant, HistoryError, LedgerError, PointsEntry,
    RepositoryError, RuleRepository,
};
use crate::criteria::{criteria_router, RuleCatalog, ScoringService};

/// Wednesday 2025-03-12 14:00 UTC.
pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, 14, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, hour, 0, 0)
        .single()
        .expect("valid instant")
}

/// Saturday 2025-03-15 14:00 UTC.
pub(super) fn saturday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 14, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn audit(updated_days_ago: i64) -> AuditTrail {
    let updated_at = now() - Duration::days(updated_days_ago);
    AuditTrail {
        created_by: "admin-1".to_string(),
        updated_by: "admin-1".to_string(),
        created_at: updated_at - Duration::days(30),
        updated_at,
    }
}

pub(super) fn engagement_criteria(kind: CriteriaType, base_score: u32) -> EngagementCriteria {
    EngagementCriteria {
        criteria_type: kind,
        base_score,
        bonus_conditions: Vec::new(),
        multipliers: Vec::new(),
    }
}

pub(super) fn engagement_rule(id: &str, kind: CriteriaType, base_score: u32) -> RuleDefinition {
    RuleDefinition {
        id: RuleId(id.to_string()),
        name: format!("{kind} reward"),
        description: String::new(),
        criteria: RuleCriteria::Engagement(engagement_criteria(kind, base_score)),
        requirements: None,
        time_constraints: None,
        is_active: true,
        priority: 0,
        audit: audit(1),
    }
}

pub(super) fn badge_rule(
    id: &str,
    category: BadgeCategory,
    badge: &str,
    metric: ConditionName,
    target: f64,
) -> RuleDefinition {
    RuleDefinition {
        id: RuleId(id.to_string()),
        name: format!("{badge} badge"),
        description: String::new(),
        criteria: RuleCriteria::Badge(BadgeCriteria {
            category,
            badge_id: BadgeId(badge.to_string()),
            metric,
            operator: Operator::Gte,
            target,
        }),
        requirements: None,
        time_constraints: None,
        is_active: true,
        priority: 0,
        audit: audit(1),
    }
}

pub(super) fn with_priority(mut rule: RuleDefinition, priority: i32) -> RuleDefinition {
    rule.priority = priority;
    rule
}

pub(super) fn with_requirements(
    mut rule: RuleDefinition,
    requirements: Requirements,
) -> RuleDefinition {
    rule.requirements = Some(requirements);
    rule
}

pub(super) fn with_active_hours(mut rule: RuleDefinition, start: u8, end: u8) -> RuleDefinition {
    rule.time_constraints = Some(TimeConstraints {
        active_hours_only: true,
        active_hours: Some(ActiveHours { start, end }),
        ..TimeConstraints::default()
    });
    rule
}

pub(super) fn with_bonus(
    mut rule: RuleDefinition,
    condition: ConditionName,
    threshold: f64,
    bonus_points: u32,
) -> RuleDefinition {
    if let RuleCriteria::Engagement(criteria) = &mut rule.criteria {
        criteria.bonus_conditions.push(BonusCondition {
            condition,
            operator: Operator::Gte,
            threshold,
            bonus_points,
            description: String::new(),
        });
    }
    rule
}

pub(super) fn with_multiplier(
    mut rule: RuleDefinition,
    condition: MultiplierCondition,
    multiplier: f64,
) -> RuleDefinition {
    if let RuleCriteria::Engagement(criteria) = &mut rule.criteria {
        criteria.multipliers.push(ScoreMultiplier {
            condition,
            multiplier,
            valid_from: None,
            valid_until: None,
        });
    }
    rule
}

pub(super) fn catalog(rules: Vec<RuleDefinition>) -> RuleCatalog {
    let (catalog, report) = RuleCatalog::from_rules(rules);
    assert!(report.rejected.is_empty(), "unexpected rejections: {report:?}");
    catalog
}

pub(super) fn actor() -> ActorMetrics {
    ActorMetrics {
        follower_count: 1_500,
        following_count: Some(200),
        account_age_days: 120,
        is_verified: true,
        engagement_rate: Some(4.2),
        jrank_points: Some(880.0),
        streak_days: Some(9),
    }
}

pub(super) fn fact(kind: CriteriaType) -> EngagementFact {
    EngagementFact {
        actor_id: "actor-7".to_string(),
        action_type: kind.label().to_string(),
        occurred_at: now(),
        actor_metrics: actor(),
        action_history: Vec::new(),
    }
}

pub(super) fn action(kind: CriteriaType, minutes_ago: i64) -> ActionRecord {
    ActionRecord {
        action_type: kind,
        occurred_at: now() - Duration::minutes(minutes_ago),
        rule_id: None,
    }
}

pub(super) fn snapshot(subject: &str, metrics: &[(ConditionName, f64)]) -> MetricSnapshot {
    MetricSnapshot {
        subject_id: subject.to_string(),
        metrics: metrics.iter().cloned().collect(),
        profile: None,
    }
}

pub(super) struct StaticRules {
    pub(super) rules: Mutex<Vec<RuleDefinition>>,
}

impl StaticRules {
    pub(super) fn new(rules: Vec<RuleDefinition>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    pub(super) fn replace(&self, rules: Vec<RuleDefinition>) {
        *self.rules.lock().expect("rules mutex poisoned") = rules;
    }
}

impl RuleRepository for StaticRules {
    fn fetch_rules(&self) -> Result<Vec<RuleEntry>, RepositoryError> {
        let rules = self.rules.lock().expect("rules mutex poisoned").clone();
        Ok(rules.into_iter().map(RuleEntry::from).collect())
    }
}

pub(super) struct OfflineRules;

impl RuleRepository for OfflineRules {
    fn fetch_rules(&self) -> Result<Vec<RuleEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("rule store offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryHistory {
    pub(super) actions: Mutex<HashMap<String, Vec<ActionRecord>>>,
}

impl ActionHistoryStore for MemoryHistory {
    fn recent_actions(
        &self,
        actor_id: &str,
        action_type: CriteriaType,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, HistoryError> {
        let guard = self.actions.lock().expect("history mutex poisoned");
        Ok(guard
            .get(actor_id)
            .into_iter()
            .flatten()
            .filter(|record| record.action_type == action_type && record.occurred_at >= since)
            .cloned()
            .collect())
    }

    fn record_action(&self, actor_id: &str, record: ActionRecord) -> Result<(), HistoryError> {
        self.actions
            .lock()
            .expect("history mutex poisoned")
            .entry(actor_id.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    fn forget_before(
        &self,
        actor_id: &str,
        action_type: CriteriaType,
        before: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        if let Some(records) = self.actions.lock().expect("history mutex poisoned").get_mut(actor_id) {
            records.retain(|record| record.action_type != action_type || record.occurred_at >= before);
        }
        Ok(())
    }
}

impl MemoryHistory {
    pub(super) fn count(&self, actor_id: &str) -> usize {
        self.actions
            .lock()
            .expect("history mutex poisoned")
            .get(actor_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

pub(super) struct OfflineHistory;

impl ActionHistoryStore for OfflineHistory {
    fn recent_actions(
        &self,
        _actor_id: &str,
        _action_type: CriteriaType,
        _since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, HistoryError> {
        Err(HistoryError::Unavailable("history store offline".to_string()))
    }

    fn record_action(&self, _actor_id: &str, _record: ActionRecord) -> Result<(), HistoryError> {
        Err(HistoryError::Unavailable("history store offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryLedger {
    pub(super) points: Mutex<Vec<PointsEntry>>,
    pub(super) badges: Mutex<BTreeMap<String, Vec<BadgeGrant>>>,
}

impl AwardLedger for MemoryLedger {
    fn record_points(&self, entry: PointsEntry) -> Result<(), LedgerError> {
        self.points
            .lock()
            .expect("ledger mutex poisoned")
            .push(entry);
        Ok(())
    }

    fn badges_for(&self, subject_id: &str) -> Result<Vec<BadgeId>, LedgerError> {
        Ok(self
            .badges
            .lock()
            .expect("ledger mutex poisoned")
            .get(subject_id)
            .into_iter()
            .flatten()
            .map(|grant| grant.badge_id.clone())
            .collect())
    }

    fn record_badge(&self, grant: BadgeGrant) -> Result<(), LedgerError> {
        self.badges
            .lock()
            .expect("ledger mutex poisoned")
            .entry(grant.subject_id.clone())
            .or_default()
            .push(grant);
        Ok(())
    }
}

impl MemoryLedger {
    pub(super) fn total_points(&self, actor_id: &str) -> i64 {
        self.points
            .lock()
            .expect("ledger mutex poisoned")
            .iter()
            .filter(|entry| entry.actor_id == actor_id)
            .map(|entry| entry.points)
            .sum()
    }
}

pub(super) struct OfflineLedger;

impl AwardLedger for OfflineLedger {
    fn record_points(&self, _entry: PointsEntry) -> Result<(), LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }

    fn badges_for(&self, _subject_id: &str) -> Result<Vec<BadgeId>, LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }

    fn record_badge(&self, _grant: BadgeGrant) -> Result<(), LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }
}

pub(super) type MemoryService = ScoringService<StaticRules, MemoryHistory, MemoryLedger>;

pub(super) fn build_service(
    rules: Vec<RuleDefinition>,
) -> (MemoryService, Arc<StaticRules>, Arc<MemoryHistory>, Arc<MemoryLedger>) {
    let repository = Arc::new(StaticRules::new(rules));
    let history = Arc::new(MemoryHistory::default());
    let ledger = Arc::new(MemoryLedger::default());
    let (service, report) = ScoringService::new(
        repository.clone(),
        history.clone(),
        ledger.clone(),
        &EngineConfig::default(),
    )
    .expect("service loads catalog");
    assert!(report.rejected.is_empty());
    (service, repository, history, ledger)
}

pub(super) fn router_with_service(service: MemoryService) -> axum::Router {
    criteria_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status);
}
