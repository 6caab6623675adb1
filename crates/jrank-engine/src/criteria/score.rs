use chrono::{DateTime, Utc};

use super::condition::{ConditionMatcher, FactSource};
use super::domain::{EngagementCriteria, MultiplierCondition, RuleId, ScoreMultiplier};
use super::outcome::{AppliedBonus, AppliedMultiplier, Diagnostic, ScoreBreakdown};
use super::window::{within_bounds, TimeWindowEvaluator};

/// Breakdown plus any diagnostics raised while evaluating bonus conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub breakdown: ScoreBreakdown,
    pub diagnostics: Vec<Diagnostic>,
}

/// Combines base score, satisfied bonuses, and active multipliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreCalculator {
    matcher: ConditionMatcher,
    window: TimeWindowEvaluator,
}

impl ScoreCalculator {
    pub fn new(window: TimeWindowEvaluator) -> Self {
        Self {
            matcher: ConditionMatcher,
            window,
        }
    }

    pub fn compute<F: FactSource>(
        &self,
        rule_id: &RuleId,
        criteria: &EngagementCriteria,
        fact: &F,
        now: DateTime<Utc>,
    ) -> ScoreOutcome {
        let mut diagnostics = Vec::new();
        let mut bonuses = Vec::new();

        for bonus in &criteria.bonus_conditions {
            let check = self.matcher.evaluate(
                Some(rule_id),
                &bonus.condition,
                &bonus.operator,
                bonus.threshold,
                fact.value_of(&bonus.condition),
            );
            if let Some(diagnostic) = check.diagnostic {
                diagnostics.push(diagnostic);
            }
            if check.satisfied {
                bonuses.push(AppliedBonus {
                    condition: bonus.condition.clone(),
                    bonus_points: bonus.bonus_points,
                    description: bonus.description.clone(),
                });
            }
        }

        let bonus_sum: u64 = bonuses
            .iter()
            .map(|bonus| u64::from(bonus.bonus_points))
            .sum();

        let multipliers: Vec<AppliedMultiplier> = criteria
            .multipliers
            .iter()
            .filter(|multiplier| self.multiplier_applies(multiplier, now))
            .map(|multiplier| AppliedMultiplier {
                condition: multiplier.condition,
                multiplier: multiplier.multiplier,
            })
            .collect();

        // Sorted so the float product does not depend on authoring order.
        let mut factors: Vec<f64> = multipliers.iter().map(|applied| applied.multiplier).collect();
        factors.sort_by(f64::total_cmp);
        let multiplier_product = factors.iter().fold(1.0, |product, factor| product * factor);

        let points = u64::from(criteria.base_score) + bonus_sum;
        let total = fixed_point_total(points, &factors)
            .unwrap_or_else(|| round_half_up(points as f64 * multiplier_product));

        ScoreOutcome {
            breakdown: ScoreBreakdown {
                base: criteria.base_score,
                bonuses,
                bonus_sum,
                multipliers,
                multiplier_product,
                total,
            },
            diagnostics,
        }
    }

    fn multiplier_applies(&self, multiplier: &ScoreMultiplier, now: DateTime<Utc>) -> bool {
        if !multiplier.multiplier.is_finite() || multiplier.multiplier < 0.0 {
            return false;
        }
        if within_bounds(multiplier.valid_from, multiplier.valid_until, now).is_err() {
            return false;
        }
        match multiplier.condition {
            MultiplierCondition::Weekend => self.window.is_weekend(now),
            MultiplierCondition::Campaign | MultiplierCondition::SpecialEvent => true,
        }
    }
}

const MICROS_PER_UNIT: u128 = 1_000_000;

/// `points × Π factors`, rounded half-up once, with every factor taken to six
/// decimal places. Decimal multipliers such as 1.15 have no exact binary form,
/// so the product is kept as an integer fraction until the final rounding.
/// `None` when the fraction no longer fits.
fn fixed_point_total(points: u64, factors: &[f64]) -> Option<i64> {
    let mut numerator = u128::from(points);
    let mut denominator: u128 = 1;
    for factor in factors {
        let micros = (factor * MICROS_PER_UNIT as f64).round() as u128;
        numerator = numerator.checked_mul(micros)?;
        denominator = denominator.checked_mul(MICROS_PER_UNIT)?;
    }
    let rounded = numerator.checked_add(denominator / 2)? / denominator;
    i64::try_from(rounded).ok()
}

/// Points are integral; the single rounding step happens here.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
