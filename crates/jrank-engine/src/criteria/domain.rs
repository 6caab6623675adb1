use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::condition::{ConditionName, FactSource, FactValue, Operator};

/// Identifier wrapper for admin-authored rule documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the badge a badge rule grants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BadgeId(pub String);

impl fmt::Display for BadgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Social engagement actions that engagement criteria can score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaType {
    Like,
    Retweet,
    Quote,
    Reply,
    Bookmark,
    View,
    Custom,
}

impl CriteriaType {
    pub const ALL: [CriteriaType; 7] = [
        CriteriaType::Like,
        CriteriaType::Retweet,
        CriteriaType::Quote,
        CriteriaType::Reply,
        CriteriaType::Bookmark,
        CriteriaType::View,
        CriteriaType::Custom,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CriteriaType::Like => "like",
            CriteriaType::Retweet => "retweet",
            CriteriaType::Quote => "quote",
            CriteriaType::Reply => "reply",
            CriteriaType::Bookmark => "bookmark",
            CriteriaType::View => "view",
            CriteriaType::Custom => "custom",
        }
    }
}

impl FromStr for CriteriaType {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        CriteriaType::ALL
            .into_iter()
            .find(|kind| kind.label() == normalized)
            .ok_or_else(|| UnknownLabel(value.to_string()))
    }
}

impl fmt::Display for CriteriaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Badge families used to scope badge criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Content,
    Engagement,
    Community,
    Ranking,
    Streak,
    Special,
}

impl BadgeCategory {
    pub const ALL: [BadgeCategory; 6] = [
        BadgeCategory::Content,
        BadgeCategory::Engagement,
        BadgeCategory::Community,
        BadgeCategory::Ranking,
        BadgeCategory::Streak,
        BadgeCategory::Special,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            BadgeCategory::Content => "content",
            BadgeCategory::Engagement => "engagement",
            BadgeCategory::Community => "community",
            BadgeCategory::Ranking => "ranking",
            BadgeCategory::Streak => "streak",
            BadgeCategory::Special => "special",
        }
    }
}

impl FromStr for BadgeCategory {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        BadgeCategory::ALL
            .into_iter()
            .find(|category| category.label() == normalized)
            .ok_or_else(|| UnknownLabel(value.to_string()))
    }
}

impl fmt::Display for BadgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raised when a criteria type, badge category, or scope label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized label '{0}'")]
pub struct UnknownLabel(pub String);

/// Discriminator deciding which facts a rule may be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleScope {
    Engagement(CriteriaType),
    Badge(BadgeCategory),
}

impl RuleScope {
    pub fn badge_scopes() -> impl Iterator<Item = RuleScope> {
        BadgeCategory::ALL.into_iter().map(RuleScope::Badge)
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::Engagement(kind) => write!(f, "engagement:{kind}"),
            RuleScope::Badge(category) => write!(f, "badge:{category}"),
        }
    }
}

impl FromStr for RuleScope {
    type Err = UnknownLabel;

    /// Parses `engagement:<criteria type>` or `badge:<category>`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (family, label) = value
            .trim()
            .split_once(':')
            .ok_or_else(|| UnknownLabel(value.to_string()))?;
        match family.trim().to_ascii_lowercase().as_str() {
            "engagement" => label
                .parse::<CriteriaType>()
                .map(RuleScope::Engagement)
                .map_err(|_| UnknownLabel(value.to_string())),
            "badge" => label
                .parse::<BadgeCategory>()
                .map(RuleScope::Badge)
                .map_err(|_| UnknownLabel(value.to_string())),
            _ => Err(UnknownLabel(value.to_string())),
        }
    }
}

/// Admin-authored rule document, read-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub criteria: RuleCriteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_constraints: Option<TimeConstraints>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
    pub audit: AuditTrail,
}

fn default_active() -> bool {
    true
}

impl RuleDefinition {
    pub fn scope(&self) -> RuleScope {
        match &self.criteria {
            RuleCriteria::Engagement(criteria) => RuleScope::Engagement(criteria.criteria_type),
            RuleCriteria::Badge(criteria) => RuleScope::Badge(criteria.category),
        }
    }

    /// Checks the structural invariants a rule must satisfy to enter a catalog.
    pub fn validate(&self) -> Result<(), RuleDefect> {
        if self.id.0.trim().is_empty() {
            return Err(RuleDefect::BlankId);
        }

        match &self.criteria {
            RuleCriteria::Engagement(criteria) => {
                for bonus in &criteria.bonus_conditions {
                    if !bonus.threshold.is_finite() {
                        return Err(RuleDefect::NonFiniteValue {
                            field: "bonusConditions.threshold",
                        });
                    }
                }
                for multiplier in &criteria.multipliers {
                    if !multiplier.multiplier.is_finite() {
                        return Err(RuleDefect::NonFiniteValue {
                            field: "multipliers.multiplier",
                        });
                    }
                    if multiplier.multiplier < 0.0 {
                        return Err(RuleDefect::NegativeMultiplier(multiplier.multiplier));
                    }
                    if let (Some(from), Some(until)) = (multiplier.valid_from, multiplier.valid_until)
                    {
                        if until < from {
                            return Err(RuleDefect::InvertedValidity);
                        }
                    }
                }
            }
            RuleCriteria::Badge(criteria) => {
                if !criteria.target.is_finite() {
                    return Err(RuleDefect::NonFiniteValue { field: "target" });
                }
                if criteria.target < 0.0 {
                    return Err(RuleDefect::NegativeTarget(criteria.target));
                }
                if criteria.badge_id.0.trim().is_empty() {
                    return Err(RuleDefect::BlankBadgeId);
                }
            }
        }

        if let Some(constraints) = &self.time_constraints {
            if let (Some(from), Some(until)) = (constraints.valid_from, constraints.valid_until) {
                if until < from {
                    return Err(RuleDefect::InvertedValidity);
                }
            }
            if let Some(hours) = constraints.active_hours {
                if hours.start > 23 || hours.end > 23 {
                    return Err(RuleDefect::InvalidActiveHours {
                        start: hours.start,
                        end: hours.end,
                    });
                }
            } else if constraints.active_hours_only {
                return Err(RuleDefect::MissingActiveHours);
            }
        }

        Ok(())
    }

    /// Describes every condition name or operator the matcher cannot evaluate.
    pub fn unrecognized_conditions(&self) -> Vec<String> {
        let mut findings = Vec::new();
        match &self.criteria {
            RuleCriteria::Engagement(criteria) => {
                for bonus in &criteria.bonus_conditions {
                    collect_unrecognized(&bonus.condition, &bonus.operator, &mut findings);
                }
            }
            RuleCriteria::Badge(criteria) => {
                collect_unrecognized(&criteria.metric, &criteria.operator, &mut findings);
            }
        }
        findings
    }

    /// Largest cooldown, in minutes, declared by the rule's requirements.
    pub fn cooldown_minutes(&self) -> u32 {
        self.requirements
            .as_ref()
            .and_then(|requirements| requirements.cooldown_minutes)
            .unwrap_or(0)
    }
}

fn collect_unrecognized(condition: &ConditionName, operator: &Operator, findings: &mut Vec<String>) {
    if !condition.is_recognized() {
        findings.push(format!("unknown condition '{}'", condition.as_str()));
    }
    if !operator.is_recognized() {
        findings.push(format!("unknown operator '{}'", operator.as_str()));
    }
}

/// Structural problems that keep a rule out of the catalog.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleDefect {
    #[error("rule id is blank")]
    BlankId,
    #[error("duplicate rule id {0}")]
    DuplicateId(RuleId),
    #[error("badge id is blank")]
    BlankBadgeId,
    #[error("target {0} is negative")]
    NegativeTarget(f64),
    #[error("{field} is not a finite number")]
    NonFiniteValue { field: &'static str },
    #[error("multiplier {0} is negative")]
    NegativeMultiplier(f64),
    #[error("validUntil precedes validFrom")]
    InvertedValidity,
    #[error("activeHoursOnly is set without activeHours")]
    MissingActiveHours,
    #[error("active hours {start}-{end} fall outside 0-23")]
    InvalidActiveHours { start: u8, end: u8 },
    #[error("malformed rule: {0}")]
    Malformed(String),
}

/// One entry of a rule document: a parsed rule, or one that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleEntry {
    Parsed(RuleDefinition),
    Malformed { rule_id: RuleId, defect: RuleDefect },
}

impl RuleEntry {
    pub fn into_rule(self) -> Option<RuleDefinition> {
        match self {
            RuleEntry::Parsed(rule) => Some(rule),
            RuleEntry::Malformed { .. } => None,
        }
    }
}

impl From<RuleDefinition> for RuleEntry {
    fn from(rule: RuleDefinition) -> Self {
        RuleEntry::Parsed(rule)
    }
}

/// Closed set of rule bodies; the variant determines the rule's scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCriteria {
    Engagement(EngagementCriteria),
    Badge(BadgeCriteria),
}

/// Point-awarding criteria for a single engagement action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCriteria {
    pub criteria_type: CriteriaType,
    pub base_score: u32,
    #[serde(default)]
    pub bonus_conditions: Vec<BonusCondition>,
    #[serde(default)]
    pub multipliers: Vec<ScoreMultiplier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusCondition {
    pub condition: ConditionName,
    #[serde(default)]
    pub operator: Operator,
    pub threshold: f64,
    pub bonus_points: u32,
    #[serde(default)]
    pub description: String,
}

/// Multiplicative factor applied to the final engagement score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMultiplier {
    pub condition: MultiplierCondition,
    pub multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplierCondition {
    Weekend,
    Campaign,
    SpecialEvent,
}

/// Achievement threshold granting a badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCriteria {
    pub category: BadgeCategory,
    pub badge_id: BadgeId,
    pub metric: ConditionName,
    #[serde(default)]
    pub operator: Operator,
    pub target: f64,
}

/// Hard eligibility gates checked before a rule may apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_followers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_account_age_days: Option<u32>,
    #[serde(default)]
    pub must_be_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily_actions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_hours_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_hours: Option<ActiveHours>,
}

/// Inclusive hour-of-day range; `start > end` spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: u8,
    pub end: u8,
}

/// Authoring metadata owned by the admin tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile counters of the acting user at the time of the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorMetrics {
    pub follower_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_count: Option<u64>,
    pub account_age_days: u32,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jrank_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak_days: Option<u32>,
}

impl FactSource for ActorMetrics {
    fn value_of(&self, condition: &ConditionName) -> Option<FactValue> {
        match condition {
            ConditionName::FollowerCount => Some(FactValue::Number(self.follower_count as f64)),
            ConditionName::FollowingCount => {
                self.following_count.map(|count| FactValue::Number(count as f64))
            }
            ConditionName::AccountAgeDays => {
                Some(FactValue::Number(f64::from(self.account_age_days)))
            }
            ConditionName::IsVerified => Some(FactValue::Flag(self.is_verified)),
            ConditionName::EngagementRate => self.engagement_rate.map(FactValue::Number),
            ConditionName::JrankPoints => self.jrank_points.map(FactValue::Number),
            ConditionName::StreakDays => self
                .streak_days
                .map(|days| FactValue::Number(f64::from(days))),
            _ => None,
        }
    }
}

/// A previously recorded qualifying action of the same actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action_type: CriteriaType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
}

/// Runtime input for engagement scoring.
///
/// `action_type` stays a raw label so that a malformed event resolves to an
/// `InvalidFact` result instead of failing deserialization upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementFact {
    pub actor_id: String,
    pub action_type: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_metrics: ActorMetrics,
    #[serde(default)]
    pub action_history: Vec<ActionRecord>,
}

impl FactSource for EngagementFact {
    fn value_of(&self, condition: &ConditionName) -> Option<FactValue> {
        self.actor_metrics.value_of(condition)
    }
}

/// Cumulative counters for badge evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub subject_id: String,
    #[serde(default)]
    pub metrics: BTreeMap<ConditionName, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ActorMetrics>,
}

impl FactSource for MetricSnapshot {
    fn value_of(&self, condition: &ConditionName) -> Option<FactValue> {
        self.metrics
            .get(condition)
            .copied()
            .map(FactValue::Number)
            .or_else(|| {
                self.profile
                    .as_ref()
                    .and_then(|profile| profile.value_of(condition))
            })
    }
}
