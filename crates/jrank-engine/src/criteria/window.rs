use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};

use super::domain::TimeConstraints;

/// Why an instant falls outside a rule's time constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowRejection {
    #[error("validity window is inverted")]
    InvertedValidity,
    #[error("not valid before {0}")]
    NotYetValid(DateTime<Utc>),
    #[error("expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("active hours are required but missing")]
    MissingActiveHours,
    #[error("active hours {start}-{end} fall outside 0-23")]
    InvalidActiveHours { start: u8, end: u8 },
    #[error("hour {hour} outside active hours {start}-{end}")]
    OutsideActiveHours { hour: u8, start: u8, end: u8 },
}

/// Decides whether an instant lies within a rule's validity and active-hours window.
///
/// Hours are read in the deployment's fixed reference offset.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindowEvaluator {
    reference_offset: FixedOffset,
}

impl Default for TimeWindowEvaluator {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl TimeWindowEvaluator {
    pub fn new(reference_offset: FixedOffset) -> Self {
        Self { reference_offset }
    }

    pub fn reference_offset(&self) -> FixedOffset {
        self.reference_offset
    }

    pub fn is_within_window(
        &self,
        constraints: Option<&TimeConstraints>,
        at: DateTime<Utc>,
    ) -> bool {
        self.check(constraints, at).is_ok()
    }

    pub fn check(
        &self,
        constraints: Option<&TimeConstraints>,
        at: DateTime<Utc>,
    ) -> Result<(), WindowRejection> {
        let Some(constraints) = constraints else {
            return Ok(());
        };

        within_bounds(constraints.valid_from, constraints.valid_until, at)?;

        if !constraints.active_hours_only {
            return Ok(());
        }

        let hours = constraints
            .active_hours
            .ok_or(WindowRejection::MissingActiveHours)?;
        if hours.start > 23 || hours.end > 23 {
            return Err(WindowRejection::InvalidActiveHours {
                start: hours.start,
                end: hours.end,
            });
        }

        let hour = self.local_hour(at);
        if hour_in_range(hour, hours.start, hours.end) {
            Ok(())
        } else {
            Err(WindowRejection::OutsideActiveHours {
                hour,
                start: hours.start,
                end: hours.end,
            })
        }
    }

    pub fn local_hour(&self, at: DateTime<Utc>) -> u8 {
        // hour() is always < 24
        at.with_timezone(&self.reference_offset).hour() as u8
    }

    pub fn is_weekend(&self, at: DateTime<Utc>) -> bool {
        matches!(
            at.with_timezone(&self.reference_offset).weekday(),
            Weekday::Sat | Weekday::Sun
        )
    }
}

/// Inclusive bounds check; an absent bound is open on that side.
pub fn within_bounds(
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> Result<(), WindowRejection> {
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if until < from {
            return Err(WindowRejection::InvertedValidity);
        }
    }
    if let Some(from) = valid_from {
        if at < from {
            return Err(WindowRejection::NotYetValid(from));
        }
    }
    if let Some(until) = valid_until {
        if at > until {
            return Err(WindowRejection::Expired(until));
        }
    }
    Ok(())
}

fn hour_in_range(hour: u8, start: u8, end: u8) -> bool {
    if start <= end {
        (start..=end).contains(&hour)
    } else {
        hour >= start || hour <= end
    }
}
