use std::io::Cursor;

use crate::criteria::catalog::RuleCatalog;
use crate::criteria::condition::{ConditionName, Operator};
use crate::criteria::domain::{
    BadgeCategory, CriteriaType, MultiplierCondition, RuleCriteria, RuleDefect, RuleDefinition,
    RuleEntry, RuleId, RuleScope,
};
use crate::criteria::import::{rules_from_reader, snapshots_from_reader, ImportError, JsonRuleRepository};
use crate::criteria::repository::{RepositoryError, RuleRepository};

fn parsed_rules(document: &str) -> Vec<RuleDefinition> {
    rules_from_reader(Cursor::new(document))
        .expect("parse rules")
        .into_iter()
        .map(|entry| entry.into_rule().expect("well-formed rule"))
        .collect()
}

fn audit_json() -> serde_json::Value {
    serde_json::json!({ "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z" })
}

const RULE_DOCUMENT: &str = r#"{
  "rules": [
    {
      "id": "like-weekend",
      "name": "Weekend likes",
      "criteria": {
        "kind": "engagement",
        "criteriaType": "like",
        "baseScore": 10,
        "bonusConditions": [
          { "condition": "followerCount", "operator": ">=", "threshold": 1000, "bonusPoints": 5 }
        ],
        "multipliers": [ { "condition": "weekend", "multiplier": 2.0 } ]
      },
      "requirements": { "cooldownMinutes": 5, "maxDailyActions": 20 },
      "priority": 3,
      "audit": { "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-02-01T00:00:00Z" }
    },
    {
      "id": "streak-30",
      "name": "Thirty day streak",
      "isActive": false,
      "criteria": {
        "kind": "badge",
        "category": "streak",
        "badgeId": "streak-30",
        "metric": "streak_days",
        "target": 30
      },
      "audit": { "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z" }
    }
  ]
}"#;

#[test]
fn rule_document_parses_wrapped_rules() {
    let rules = parsed_rules(RULE_DOCUMENT);

    assert_eq!(rules.len(), 2);
    let like = &rules[0];
    assert_eq!(like.scope(), RuleScope::Engagement(CriteriaType::Like));
    assert_eq!(like.priority, 3);
    assert!(like.is_active);
    assert_eq!(like.cooldown_minutes(), 5);
    let RuleCriteria::Engagement(criteria) = &like.criteria else {
        panic!("expected engagement criteria");
    };
    assert_eq!(criteria.bonus_conditions[0].condition, ConditionName::FollowerCount);
    assert_eq!(criteria.bonus_conditions[0].operator, Operator::Gte);
    assert_eq!(criteria.multipliers[0].condition, MultiplierCondition::Weekend);

    let streak = &rules[1];
    assert_eq!(streak.scope(), RuleScope::Badge(BadgeCategory::Streak));
    assert!(!streak.is_active);
    assert_eq!(streak.priority, 0);
}

#[test]
fn bare_array_documents_are_accepted() {
    let document = serde_json::json!([{
        "id": "view-1",
        "name": "Views",
        "criteria": { "kind": "engagement", "criteriaType": "view", "baseScore": 1 },
        "audit": { "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z" }
    }])
    .to_string();

    let rules = parsed_rules(&document);

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].scope(), RuleScope::Engagement(CriteriaType::View));
}

#[test]
fn unknown_condition_labels_do_not_fail_the_document() {
    let document = serde_json::json!([{
        "id": "like-odd",
        "name": "Odd",
        "criteria": {
            "kind": "engagement",
            "criteriaType": "like",
            "baseScore": 1,
            "bonusConditions": [
                { "condition": "moonPhase", "operator": "approx", "threshold": 1, "bonusPoints": 1 }
            ]
        },
        "audit": { "createdAt": "2025-01-01T00:00:00Z", "updatedAt": "2025-01-01T00:00:00Z" }
    }])
    .to_string();

    let rules = parsed_rules(&document);

    assert_eq!(rules[0].unrecognized_conditions().len(), 2);
}

#[test]
fn malformed_rule_is_isolated_from_its_neighbours() {
    let document = serde_json::json!([
        {
            "id": "like-1",
            "name": "Likes",
            "criteria": { "kind": "engagement", "criteriaType": "like", "baseScore": 2 },
            "audit": audit_json()
        },
        {
            "id": "follow-1",
            "name": "Follows",
            "criteria": { "kind": "engagement", "criteriaType": "follow", "baseScore": 2 },
            "audit": audit_json()
        },
        {
            "name": "Negative",
            "criteria": { "kind": "engagement", "criteriaType": "view", "baseScore": -3 },
            "audit": audit_json()
        }
    ])
    .to_string();

    let entries = rules_from_reader(Cursor::new(document)).expect("document parses");

    assert_eq!(entries.len(), 3);
    assert!(matches!(&entries[0], RuleEntry::Parsed(rule) if rule.id.0 == "like-1"));
    match &entries[1] {
        RuleEntry::Malformed { rule_id, defect } => {
            assert_eq!(rule_id, &RuleId("follow-1".to_string()));
            assert!(matches!(defect, RuleDefect::Malformed(detail) if detail.contains("follow")));
        }
        other => panic!("expected malformed entry, got {other:?}"),
    }
    assert!(matches!(&entries[2], RuleEntry::Malformed { rule_id, .. } if rule_id.0 == "#3"));

    let (catalog, report) = RuleCatalog::from_rules(entries);

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[0].rule_id, RuleId("follow-1".to_string()));
    assert!(report.rejected[0].defect.starts_with("malformed rule:"));
    assert_eq!(
        catalog
            .list_active(&RuleScope::Engagement(CriteriaType::Like))
            .count(),
        1
    );
}

#[test]
fn scalar_documents_are_rejected() {
    let error = rules_from_reader(Cursor::new("42")).expect_err("scalar document");
    assert!(matches!(error, ImportError::UnexpectedShape));

    let error = rules_from_reader(Cursor::new(r#"{"policies": []}"#)).expect_err("missing rules");
    assert!(matches!(error, ImportError::UnexpectedShape));

    let error = rules_from_reader(Cursor::new(r#"{"rules": 5}"#)).expect_err("rules not a list");
    assert!(matches!(error, ImportError::UnexpectedShape));
}

#[test]
fn metric_csv_builds_snapshots() {
    let csv = "subject_id,content_count,streakDays,like_count\nuser-1,12,8,\nuser-2, 3 ,0,900\n";

    let snapshots = snapshots_from_reader(Cursor::new(csv)).expect("parse snapshots");

    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].subject_id, "user-1");
    assert_eq!(snapshots[0].metrics.get(&ConditionName::StreakDays), Some(&8.0));
    assert!(!snapshots[0].metrics.contains_key(&ConditionName::LikeCount));
    assert_eq!(snapshots[1].metrics.get(&ConditionName::ContentCount), Some(&3.0));
}

#[test]
fn metric_csv_requires_subject_column() {
    let error = snapshots_from_reader(Cursor::new("content_count\n4\n")).expect_err("no subject");
    assert!(matches!(error, ImportError::MissingSubjectColumn));
}

#[test]
fn metric_csv_reports_bad_cells_with_row() {
    let csv = "subjectId,content_count\nuser-1,4\nuser-2,many\n";

    let error = snapshots_from_reader(Cursor::new(csv)).expect_err("bad metric");

    match error {
        ImportError::InvalidMetric { row, column, value } => {
            assert_eq!(row, 2);
            assert_eq!(column, "content_count");
            assert_eq!(value, "many");
        }
        other => panic!("expected invalid metric, got {other:?}"),
    }
}

#[test]
fn missing_rule_file_surfaces_as_repository_error() {
    let repository = JsonRuleRepository::new("/nonexistent/jrank/rules.json");

    let error = repository.fetch_rules().expect_err("missing file");

    assert!(matches!(error, RepositoryError::Import(ImportError::Io(_))));
}
