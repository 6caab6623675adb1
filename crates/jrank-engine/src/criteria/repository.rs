use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActionRecord, BadgeId, CriteriaType, RuleEntry, RuleId};
use super::import::ImportError;

/// Source of admin-authored rule documents.
pub trait RuleRepository: Send + Sync {
    fn fetch_rules(&self) -> Result<Vec<RuleEntry>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("rule source unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Per-actor record of qualifying actions, owned by the persistence layer.
pub trait ActionHistoryStore: Send + Sync {
    fn recent_actions(
        &self,
        actor_id: &str,
        action_type: CriteriaType,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>, HistoryError>;

    fn record_action(&self, actor_id: &str, record: ActionRecord) -> Result<(), HistoryError>;

    /// Drops entries of `action_type` older than `before`; no later cap or cooldown
    /// check reaches back that far. Stores that expire entries on their own keep the
    /// default.
    fn forget_before(
        &self,
        _actor_id: &str,
        _action_type: CriteriaType,
        _before: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("action history unavailable: {0}")]
    Unavailable(String),
}

/// Destination for awarded points and badges.
pub trait AwardLedger: Send + Sync {
    fn record_points(&self, entry: PointsEntry) -> Result<(), LedgerError>;
    fn badges_for(&self, subject_id: &str) -> Result<Vec<BadgeId>, LedgerError>;
    fn record_badge(&self, grant: BadgeGrant) -> Result<(), LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("badge {0} already granted")]
    DuplicateBadge(BadgeId),
    #[error("award ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsEntry {
    pub actor_id: String,
    pub rule_id: RuleId,
    pub action_type: CriteriaType,
    pub points: i64,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeGrant {
    pub subject_id: String,
    pub badge_id: BadgeId,
    pub rule_id: RuleId,
    pub awarded_at: DateTime<Utc>,
}
