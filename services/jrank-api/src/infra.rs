use chrono::{DateTime, Utc};
use jrank_engine::config::EngineConfig;
use jrank_engine::criteria::{
    ActionHistoryStore, ActionRecord, AwardLedger, BadgeGrant, BadgeId, CatalogReport,
    CriteriaType, HistoryError, JsonRuleRepository, LedgerError, PointsEntry, RepositoryError,
    RuleDefinition, RuleEntry, RuleRepository, ScoringService,
};
use jrank_engine::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub(crate) type ApiScoringService =
    ScoringService<ConfiguredRules, InMemoryActionHistory, InMemoryAwardLedger>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Rule source chosen from configuration: a JSON document on disk when
/// `JRANK_RULES_PATH` is set, otherwise a fixed in-process list.
#[derive(Debug, Clone)]
pub(crate) enum ConfiguredRules {
    File(JsonRuleRepository),
    Inline(Vec<RuleDefinition>),
}

impl ConfiguredRules {
    pub(crate) fn from_config(config: &EngineConfig) -> Self {
        match &config.rules_path {
            Some(path) => Self::File(JsonRuleRepository::new(path.clone())),
            None => {
                warn!("JRANK_RULES_PATH not set; serving an empty rule catalog");
                Self::Inline(Vec::new())
            }
        }
    }
}

impl RuleRepository for ConfiguredRules {
    fn fetch_rules(&self) -> Result<Vec<RuleEntry>, RepositoryError> {
        match self {
            Self::File(repository) => repository.fetch_rules(),
            Self::Inline(rules) => Ok(rules.iter().cloned().map(RuleEntry::from).collect()),
        }
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryActionHistory {
    records: Arc<Mutex<HashMap<String, Vec<ActionRecord>>>>,
}

impl ActionHistoryStore for InMemoryActionHistory {
    fn recent_actions(
        &self,
        actor_id: &str,
        action_type: CriteriaType,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, HistoryError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| HistoryError::Unavailable("history mutex poisoned".to_string()))?;
        Ok(guard
            .get(actor_id)
            .into_iter()
            .flatten()
            .filter(|record| record.action_type == action_type && record.occurred_at >= since)
            .cloned()
            .collect())
    }

    fn record_action(&self, actor_id: &str, record: ActionRecord) -> Result<(), HistoryError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| HistoryError::Unavailable("history mutex poisoned".to_string()))?;
        guard.entry(actor_id.to_string()).or_default().push(record);
        Ok(())
    }

    fn forget_before(
        &self,
        actor_id: &str,
        action_type: CriteriaType,
        before: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| HistoryError::Unavailable("history mutex poisoned".to_string()))?;
        if let Some(records) = guard.get_mut(actor_id) {
            records.retain(|record| record.action_type != action_type || record.occurred_at >= before);
            if records.is_empty() {
                guard.remove(actor_id);
            }
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAwardLedger {
    points: Arc<Mutex<Vec<PointsEntry>>>,
    badges: Arc<Mutex<HashMap<String, Vec<BadgeGrant>>>>,
}

impl AwardLedger for InMemoryAwardLedger {
    fn record_points(&self, entry: PointsEntry) -> Result<(), LedgerError> {
        let mut guard = self
            .points
            .lock()
            .map_err(|_| LedgerError::Unavailable("points mutex poisoned".to_string()))?;
        guard.push(entry);
        Ok(())
    }

    fn badges_for(&self, subject_id: &str) -> Result<Vec<BadgeId>, LedgerError> {
        let guard = self
            .badges
            .lock()
            .map_err(|_| LedgerError::Unavailable("badge mutex poisoned".to_string()))?;
        Ok(guard
            .get(subject_id)
            .into_iter()
            .flatten()
            .map(|grant| grant.badge_id.clone())
            .collect())
    }

    fn record_badge(&self, grant: BadgeGrant) -> Result<(), LedgerError> {
        let mut guard = self
            .badges
            .lock()
            .map_err(|_| LedgerError::Unavailable("badge mutex poisoned".to_string()))?;
        let held = guard.entry(grant.subject_id.clone()).or_default();
        if held.iter().any(|existing| existing.badge_id == grant.badge_id) {
            return Err(LedgerError::DuplicateBadge(grant.badge_id));
        }
        held.push(grant);
        Ok(())
    }
}

impl InMemoryAwardLedger {
    #[cfg(test)]
    pub(crate) fn points_for(&self, actor_id: &str) -> i64 {
        self.points
            .lock()
            .expect("points mutex poisoned")
            .iter()
            .filter(|entry| entry.actor_id == actor_id)
            .map(|entry| entry.points)
            .sum()
    }
}

pub(crate) fn build_scoring_service(
    config: &EngineConfig,
) -> Result<(ApiScoringService, CatalogReport), AppError> {
    let rules = Arc::new(ConfiguredRules::from_config(config));
    let history = Arc::new(InMemoryActionHistory::default());
    let ledger = Arc::new(InMemoryAwardLedger::default());
    Ok(ScoringService::new(rules, history, ledger, config)?)
}

pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
