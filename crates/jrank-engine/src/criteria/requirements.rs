use chrono::{DateTime, Duration, Utc};

use super::domain::{ActionRecord, ActorMetrics, CriteriaType, Requirements};
use super::outcome::EligibilityFailureKind;

/// Outcome of the eligibility gates for one rule.
///
/// Every gate is evaluated; `failures` holds at most one entry per kind in the
/// fixed order gates, daily cap, cooldown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementCheck {
    pub failures: Vec<EligibilityFailureKind>,
    pub notes: Vec<String>,
}

impl RequirementCheck {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn reason(&self) -> Option<EligibilityFailureKind> {
        self.failures.first().copied()
    }
}

/// Pure read over actor metrics and the caller-supplied action history.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementValidator;

impl RequirementValidator {
    pub fn check(
        &self,
        requirements: Option<&Requirements>,
        actor: Option<&ActorMetrics>,
        history: &[ActionRecord],
        action_type: Option<CriteriaType>,
        now: DateTime<Utc>,
    ) -> RequirementCheck {
        let mut check = RequirementCheck::default();
        let Some(requirements) = requirements else {
            return check;
        };

        if gates_fail(requirements, actor, &mut check.notes) {
            check.failures.push(EligibilityFailureKind::RequirementNotMet);
        }

        if let Some(action_type) = action_type {
            if let Some(cap) = requirements.max_daily_actions {
                let used = actions_in_trailing_day(history, action_type, now);
                if used >= cap as usize {
                    check
                        .notes
                        .push(format!("{used} {action_type} action(s) in the last 24h, cap {cap}"));
                    check.failures.push(EligibilityFailureKind::DailyCapExceeded);
                }
            }

            if let Some(cooldown) = requirements.cooldown_minutes.filter(|minutes| *minutes > 0) {
                if let Some(last) = last_action_at(history, action_type, now) {
                    let elapsed = now - last;
                    if elapsed < Duration::minutes(i64::from(cooldown)) {
                        check.notes.push(format!(
                            "last {action_type} {}m ago, cooldown {cooldown}m",
                            elapsed.num_minutes()
                        ));
                        check.failures.push(EligibilityFailureKind::CooldownActive);
                    }
                }
            }
        }

        check
    }
}

fn gates_fail(requirements: &Requirements, actor: Option<&ActorMetrics>, notes: &mut Vec<String>) -> bool {
    let has_gates = requirements.min_followers.is_some()
        || requirements.min_account_age_days.is_some()
        || requirements.must_be_verified;
    if !has_gates {
        return false;
    }

    let Some(actor) = actor else {
        notes.push("actor metrics unavailable for requirement gates".to_string());
        return true;
    };

    let mut failed = false;
    if let Some(min) = requirements.min_followers {
        if actor.follower_count < min {
            notes.push(format!("{} follower(s), requires {min}", actor.follower_count));
            failed = true;
        }
    }
    if let Some(min) = requirements.min_account_age_days {
        if actor.account_age_days < min {
            notes.push(format!(
                "account age {}d, requires {min}d",
                actor.account_age_days
            ));
            failed = true;
        }
    }
    if requirements.must_be_verified && !actor.is_verified {
        notes.push("verified account required".to_string());
        failed = true;
    }
    failed
}

/// Sliding 24-hour window ending at `now`, not a calendar day.
fn actions_in_trailing_day(
    history: &[ActionRecord],
    action_type: CriteriaType,
    now: DateTime<Utc>,
) -> usize {
    let window_start = now - Duration::hours(24);
    history
        .iter()
        .filter(|record| record.action_type == action_type)
        .filter(|record| record.occurred_at > window_start && record.occurred_at <= now)
        .count()
}

fn last_action_at(
    history: &[ActionRecord],
    action_type: CriteriaType,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    history
        .iter()
        .filter(|record| record.action_type == action_type && record.occurred_at <= now)
        .map(|record| record.occurred_at)
        .max()
}
