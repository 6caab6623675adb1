use chrono::{Duration, FixedOffset, TimeZone, Utc};

use super::common::*;
use crate::criteria::domain::{ActiveHours, TimeConstraints};
use crate::criteria::window::{TimeWindowEvaluator, WindowRejection};

fn overnight() -> TimeConstraints {
    TimeConstraints {
        active_hours_only: true,
        active_hours: Some(ActiveHours { start: 22, end: 6 }),
        ..TimeConstraints::default()
    }
}

#[test]
fn absent_constraints_always_match() {
    let window = TimeWindowEvaluator::default();
    assert!(window.is_within_window(None, now()));
}

#[test]
fn validity_bounds_are_inclusive() {
    let window = TimeWindowEvaluator::default();
    let constraints = TimeConstraints {
        valid_from: Some(now()),
        valid_until: Some(now() + Duration::hours(1)),
        ..TimeConstraints::default()
    };

    assert!(window.is_within_window(Some(&constraints), now()));
    assert!(window.is_within_window(Some(&constraints), now() + Duration::hours(1)));
    assert_eq!(
        window.check(Some(&constraints), now() - Duration::seconds(1)),
        Err(WindowRejection::NotYetValid(now()))
    );
    assert!(matches!(
        window.check(Some(&constraints), now() + Duration::minutes(61)),
        Err(WindowRejection::Expired(_))
    ));
}

#[test]
fn inverted_validity_never_matches() {
    let window = TimeWindowEvaluator::default();
    let constraints = TimeConstraints {
        valid_from: Some(now()),
        valid_until: Some(now() - Duration::days(1)),
        ..TimeConstraints::default()
    };

    assert_eq!(
        window.check(Some(&constraints), now()),
        Err(WindowRejection::InvertedValidity)
    );
}

#[test]
fn overnight_active_hours_wrap_midnight() {
    let window = TimeWindowEvaluator::default();
    let constraints = overnight();

    assert!(window.is_within_window(Some(&constraints), at_hour(23)));
    assert!(window.is_within_window(Some(&constraints), at_hour(2)));
    assert!(window.is_within_window(Some(&constraints), at_hour(6)));
    assert!(window.is_within_window(Some(&constraints), at_hour(22)));
    assert_eq!(
        window.check(Some(&constraints), at_hour(12)),
        Err(WindowRejection::OutsideActiveHours {
            hour: 12,
            start: 22,
            end: 6
        })
    );
}

#[test]
fn daytime_active_hours_are_inclusive() {
    let window = TimeWindowEvaluator::default();
    let constraints = TimeConstraints {
        active_hours_only: true,
        active_hours: Some(ActiveHours { start: 9, end: 17 }),
        ..TimeConstraints::default()
    };

    assert!(window.is_within_window(Some(&constraints), at_hour(9)));
    assert!(window.is_within_window(Some(&constraints), at_hour(17)));
    assert!(!window.is_within_window(Some(&constraints), at_hour(18)));
}

#[test]
fn active_hours_flag_without_hours_is_rejected() {
    let window = TimeWindowEvaluator::default();
    let constraints = TimeConstraints {
        active_hours_only: true,
        ..TimeConstraints::default()
    };

    assert_eq!(
        window.check(Some(&constraints), now()),
        Err(WindowRejection::MissingActiveHours)
    );
}

#[test]
fn hours_are_read_in_reference_offset() {
    let plus_two = FixedOffset::east_opt(2 * 3600).expect("valid offset");
    let window = TimeWindowEvaluator::new(plus_two);
    let constraints = overnight();

    // 21:00 UTC is 23:00 at +02:00.
    assert!(window.is_within_window(Some(&constraints), at_hour(21)));
    assert!(!TimeWindowEvaluator::default().is_within_window(Some(&constraints), at_hour(21)));
    assert_eq!(window.local_hour(at_hour(21)), 23);
}

#[test]
fn weekend_follows_reference_offset() {
    let utc = TimeWindowEvaluator::default();
    assert!(!utc.is_weekend(now()));
    assert!(utc.is_weekend(saturday()));

    // Friday 23:00 UTC is already Saturday at +02:00.
    let friday_late = Utc
        .with_ymd_and_hms(2025, 3, 14, 23, 0, 0)
        .single()
        .expect("valid instant");
    let plus_two = TimeWindowEvaluator::new(FixedOffset::east_opt(2 * 3600).expect("valid offset"));
    assert!(!utc.is_weekend(friday_late));
    assert!(plus_two.is_weekend(friday_late));
}
