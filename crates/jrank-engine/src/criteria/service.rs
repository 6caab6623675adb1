use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::badge::BadgeEligibilityEvaluator;
use super::catalog::{CatalogReport, RuleCatalog, SharedCatalog};
use super::domain::{
    ActionRecord, ActorMetrics, CriteriaType, EngagementFact, MetricSnapshot, RuleScope,
};
use super::engine::CriteriaEvaluationEngine;
use super::outcome::{Award, BadgeEvaluation, EvaluationResult};
use super::repository::{
    ActionHistoryStore, AwardLedger, BadgeGrant, HistoryError, LedgerError, PointsEntry,
    RepositoryError, RuleRepository,
};
use crate::config::EngineConfig;

/// Engagement event as received from the ingestion pipeline, before the actor's
/// history is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEvent {
    pub actor_id: String,
    pub action_type: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_metrics: ActorMetrics,
}

impl EngagementEvent {
    pub fn into_fact(self, action_history: Vec<ActionRecord>) -> EngagementFact {
        EngagementFact {
            actor_id: self.actor_id,
            action_type: self.action_type,
            occurred_at: self.occurred_at,
            actor_metrics: self.actor_metrics,
            action_history,
        }
    }
}

/// Caller-side composition of the catalog, both evaluators, and storage.
///
/// Evaluations for the same actor are serialized so that the history read, the
/// decision, and the history write happen as one unit; two near-simultaneous
/// events cannot both pass a cap or cooldown only one of them should.
pub struct ScoringService<R, H, L> {
    catalog: SharedCatalog,
    rules: Arc<R>,
    history: Arc<H>,
    ledger: Arc<L>,
    engine: CriteriaEvaluationEngine,
    badges: BadgeEligibilityEvaluator,
    actor_locks: ActorLocks,
}

impl<R, H, L> ScoringService<R, H, L>
where
    R: RuleRepository + 'static,
    H: ActionHistoryStore + 'static,
    L: AwardLedger + 'static,
{
    /// Loads the initial catalog from the rule repository.
    pub fn new(
        rules: Arc<R>,
        history: Arc<H>,
        ledger: Arc<L>,
        config: &EngineConfig,
    ) -> Result<(Self, CatalogReport), ScoringServiceError> {
        let (catalog, report) = RuleCatalog::load(rules.as_ref())?;
        info!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "rule catalog loaded"
        );
        Ok((
            Self::with_catalog(catalog, rules, history, ledger, config),
            report,
        ))
    }

    pub fn with_catalog(
        catalog: RuleCatalog,
        rules: Arc<R>,
        history: Arc<H>,
        ledger: Arc<L>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            catalog: SharedCatalog::new(catalog),
            rules,
            history,
            ledger,
            engine: CriteriaEvaluationEngine::from_config(config),
            badges: BadgeEligibilityEvaluator::from_config(config),
            actor_locks: ActorLocks::default(),
        }
    }

    pub fn catalog(&self) -> Arc<RuleCatalog> {
        self.catalog.snapshot()
    }

    pub fn refresh_catalog(&self) -> Result<CatalogReport, ScoringServiceError> {
        Ok(self.catalog.refresh(self.rules.as_ref())?)
    }

    /// Scores an event and, when a rule applies, records the action and points.
    pub fn score_engagement(
        &self,
        event: EngagementEvent,
        now: DateTime<Utc>,
    ) -> Result<EvaluationResult, ScoringServiceError> {
        let actor_id = event.actor_id.clone();
        let lock = self.actor_locks.acquire(&actor_id);
        let outcome = {
            let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.score_locked(event, now)
        };
        self.actor_locks.release(&actor_id, lock);
        outcome
    }

    fn score_locked(
        &self,
        event: EngagementEvent,
        now: DateTime<Utc>,
    ) -> Result<EvaluationResult, ScoringServiceError> {
        let catalog = self.catalog.snapshot();
        let action_type = event.action_type.parse::<CriteriaType>().ok();
        let since = action_type.map(|action_type| now - history_lookback(&catalog, action_type));

        let history = match (action_type, since) {
            (Some(action_type), Some(since)) if !event.actor_id.trim().is_empty() => self
                .history
                .recent_actions(&event.actor_id, action_type, since)?,
            _ => Vec::new(),
        };

        let fact = event.into_fact(history);
        let result = self.engine.evaluate(&catalog, &fact, now);

        if let (Some(action_type), Some(since), Some(rule_id), Some(Award::Points { points })) =
            (action_type, since, &result.matched_rule_id, &result.award)
        {
            self.ledger.record_points(PointsEntry {
                actor_id: fact.actor_id.clone(),
                rule_id: rule_id.clone(),
                action_type,
                points: *points,
                awarded_at: now,
            })?;
            // Recorded at `now`, the instant the cap and cooldown were judged at.
            self.history.record_action(
                &fact.actor_id,
                ActionRecord {
                    action_type,
                    occurred_at: now,
                    rule_id: Some(rule_id.clone()),
                },
            )?;
            if let Err(err) = self.history.forget_before(&fact.actor_id, action_type, since) {
                warn!(actor_id = %fact.actor_id, error = %err, "expired action history not pruned");
            }
            info!(actor_id = %fact.actor_id, rule_id = %rule_id, points, "engagement points awarded");
        }

        Ok(result)
    }

    /// Evaluates badges and records the ones the subject does not hold yet.
    pub fn evaluate_badges(
        &self,
        snapshot: MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<BadgeEvaluation, ScoringServiceError> {
        let subject_id = snapshot.subject_id.clone();
        let lock = self.actor_locks.acquire(&subject_id);
        let outcome = {
            let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.grant_badges_locked(&snapshot, now)
        };
        self.actor_locks.release(&subject_id, lock);
        outcome
    }

    fn grant_badges_locked(
        &self,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<BadgeEvaluation, ScoringServiceError> {
        let catalog = self.catalog.snapshot();
        let mut evaluation = self.badges.evaluate(&catalog, snapshot, now);
        if evaluation.awards.is_empty() {
            return Ok(evaluation);
        }

        let held: BTreeSet<_> = self
            .ledger
            .badges_for(&snapshot.subject_id)?
            .into_iter()
            .collect();

        let mut granted = Vec::new();
        let mut granted_ids = BTreeSet::new();
        let mut previously_awarded = Vec::new();
        for result in evaluation.awards.drain(..) {
            let (Some(rule_id), Some(badge_id)) =
                (result.matched_rule_id.clone(), result.badge_id().cloned())
            else {
                continue;
            };
            if held.contains(&badge_id) {
                if !previously_awarded.contains(&badge_id) {
                    previously_awarded.push(badge_id);
                }
                continue;
            }
            // Several rules may grant the same badge; the top-ranked one wins.
            if !granted_ids.insert(badge_id.clone()) {
                continue;
            }
            self.ledger.record_badge(BadgeGrant {
                subject_id: snapshot.subject_id.clone(),
                badge_id: badge_id.clone(),
                rule_id,
                awarded_at: now,
            })?;
            info!(subject_id = %snapshot.subject_id, %badge_id, "badge granted");
            granted.push(result);
        }

        evaluation.awards = granted;
        evaluation.previously_awarded = previously_awarded;
        Ok(evaluation)
    }
}

/// How far back history must reach to answer both the daily cap and the longest
/// cooldown of the scope.
fn history_lookback(catalog: &RuleCatalog, action_type: CriteriaType) -> Duration {
    let longest_cooldown = catalog
        .list_active(&RuleScope::Engagement(action_type))
        .map(|rule| rule.cooldown_minutes())
        .max()
        .unwrap_or(0);
    Duration::hours(24).max(Duration::minutes(i64::from(longest_cooldown)))
}

/// Per-actor mutexes, dropped again once no evaluation holds them.
#[derive(Default)]
struct ActorLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ActorLocks {
    fn acquire(&self, actor_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(actor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, actor_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference lives in the map and one is ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(actor_id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<R, H, L> ScoringService<R, H, L> {
    #[cfg(test)]
    pub(crate) fn tracked_actor_locks(&self) -> usize {
        self.actor_locks.tracked()
    }
}

/// Error raised by the scoring service; engine non-applicability is never one.
#[derive(Debug, thiserror::Error)]
pub enum ScoringServiceError {
    #[error(transparent)]
    Rules(#[from] RepositoryError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
