use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::RuleId;
use super::outcome::{Diagnostic, EligibilityFailureKind};

const EQUALITY_TOLERANCE: f64 = 1e-9;

/// Named facts a rule may test.
///
/// Labels outside the known set deserialize into [`ConditionName::Unrecognized`] so a
/// single malformed rule is isolated at evaluation time instead of failing the whole
/// rule document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionName {
    FollowerCount,
    FollowingCount,
    EngagementRate,
    AccountAgeDays,
    IsVerified,
    JrankPoints,
    StreakDays,
    ContentCount,
    LikeCount,
    CommentCount,
    ShareCount,
    ViewCount,
    ReferralCount,
    CourseCount,
    Unrecognized(String),
}

impl ConditionName {
    pub const KNOWN: [ConditionName; 14] = [
        ConditionName::FollowerCount,
        ConditionName::FollowingCount,
        ConditionName::EngagementRate,
        ConditionName::AccountAgeDays,
        ConditionName::IsVerified,
        ConditionName::JrankPoints,
        ConditionName::StreakDays,
        ConditionName::ContentCount,
        ConditionName::LikeCount,
        ConditionName::CommentCount,
        ConditionName::ShareCount,
        ConditionName::ViewCount,
        ConditionName::ReferralCount,
        ConditionName::CourseCount,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ConditionName::FollowerCount => "follower_count",
            ConditionName::FollowingCount => "following_count",
            ConditionName::EngagementRate => "engagement_rate",
            ConditionName::AccountAgeDays => "account_age_days",
            ConditionName::IsVerified => "is_verified",
            ConditionName::JrankPoints => "jrank_points",
            ConditionName::StreakDays => "streak_days",
            ConditionName::ContentCount => "content_count",
            ConditionName::LikeCount => "like_count",
            ConditionName::CommentCount => "comment_count",
            ConditionName::ShareCount => "share_count",
            ConditionName::ViewCount => "view_count",
            ConditionName::ReferralCount => "referral_count",
            ConditionName::CourseCount => "course_count",
            ConditionName::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ConditionName::Unrecognized(_))
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, ConditionName::IsVerified)
    }
}

impl From<String> for ConditionName {
    fn from(value: String) -> Self {
        // Accept the camelCase spellings used by the authoring UI as well.
        let mut normalized = String::with_capacity(value.len() + 4);
        for ch in value.trim().chars() {
            if ch.is_ascii_uppercase() {
                normalized.push('_');
                normalized.push(ch.to_ascii_lowercase());
            } else {
                normalized.push(ch);
            }
        }

        ConditionName::KNOWN
            .into_iter()
            .find(|known| known.as_str() == normalized)
            .unwrap_or(ConditionName::Unrecognized(value))
    }
}

impl From<&str> for ConditionName {
    fn from(value: &str) -> Self {
        ConditionName::from(value.to_string())
    }
}

impl From<ConditionName> for String {
    fn from(value: ConditionName) -> Self {
        value.as_str().to_string()
    }
}

/// Comparison operators supported by rule conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    #[default]
    Gte,
    Lte,
    Eq,
    Gt,
    Lt,
    Neq,
    Unrecognized(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Eq => "eq",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Neq => "neq",
            Operator::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Operator::Unrecognized(_))
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gte" | ">=" => Operator::Gte,
            "lte" | "<=" => Operator::Lte,
            "eq" | "==" => Operator::Eq,
            "gt" | ">" => Operator::Gt,
            "lt" | "<" => Operator::Lt,
            "neq" | "!=" => Operator::Neq,
            _ => Operator::Unrecognized(value),
        }
    }
}

impl From<&str> for Operator {
    fn from(value: &str) -> Self {
        Operator::from(value.to_string())
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_str().to_string()
    }
}

/// Value of a named fact as seen by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Flag(bool),
}

impl FactValue {
    pub fn as_number(self) -> f64 {
        match self {
            FactValue::Number(value) => value,
            FactValue::Flag(true) => 1.0,
            FactValue::Flag(false) => 0.0,
        }
    }
}

/// Anything the matcher can look a condition up in.
pub trait FactSource {
    fn value_of(&self, condition: &ConditionName) -> Option<FactValue>;
}

/// Result of a single predicate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionCheck {
    pub satisfied: bool,
    pub diagnostic: Option<Diagnostic>,
}

impl ConditionCheck {
    fn satisfied(satisfied: bool) -> Self {
        Self {
            satisfied,
            diagnostic: None,
        }
    }

    fn unknown(rule_id: Option<&RuleId>, detail: String) -> Self {
        warn!(rule_id = ?rule_id.map(|id| id.0.as_str()), %detail, "condition cannot be evaluated");
        Self {
            satisfied: false,
            diagnostic: Some(Diagnostic::new(
                EligibilityFailureKind::UnknownCondition,
                rule_id.cloned(),
                detail,
            )),
        }
    }
}

/// Stateless predicate evaluator shared by engagement scoring and badge checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionMatcher;

impl ConditionMatcher {
    pub fn matches(
        &self,
        condition: &ConditionName,
        operator: &Operator,
        threshold: f64,
        fact_value: Option<FactValue>,
    ) -> bool {
        self.evaluate(None, condition, operator, threshold, fact_value)
            .satisfied
    }

    /// Evaluates the predicate, failing closed with an `UnknownCondition`
    /// diagnostic for names or operators it cannot interpret.
    pub fn evaluate(
        &self,
        rule_id: Option<&RuleId>,
        condition: &ConditionName,
        operator: &Operator,
        threshold: f64,
        fact_value: Option<FactValue>,
    ) -> ConditionCheck {
        if !condition.is_recognized() {
            return ConditionCheck::unknown(
                rule_id,
                format!("unknown condition '{}'", condition.as_str()),
            );
        }
        if !operator.is_recognized() {
            return ConditionCheck::unknown(
                rule_id,
                format!(
                    "unknown operator '{}' on condition '{}'",
                    operator.as_str(),
                    condition.as_str()
                ),
            );
        }

        let Some(value) = fact_value else {
            return ConditionCheck::satisfied(false);
        };

        match value {
            FactValue::Flag(flag) => {
                let expected = threshold != 0.0;
                match operator {
                    Operator::Eq => ConditionCheck::satisfied(flag == expected),
                    Operator::Neq => ConditionCheck::satisfied(flag != expected),
                    _ => ConditionCheck::unknown(
                        rule_id,
                        format!(
                            "operator '{}' does not apply to flag condition '{}'",
                            operator.as_str(),
                            condition.as_str()
                        ),
                    ),
                }
            }
            FactValue::Number(number) => {
                ConditionCheck::satisfied(compare(operator, number, threshold))
            }
        }
    }
}

fn compare(operator: &Operator, value: f64, threshold: f64) -> bool {
    if value.is_nan() || threshold.is_nan() {
        return false;
    }
    match operator {
        Operator::Gte => value >= threshold,
        Operator::Lte => value <= threshold,
        Operator::Gt => value > threshold,
        Operator::Lt => value < threshold,
        Operator::Eq => (value - threshold).abs() <= EQUALITY_TOLERANCE,
        Operator::Neq => (value - threshold).abs() > EQUALITY_TOLERANCE,
        Operator::Unrecognized(_) => false,
    }
}
