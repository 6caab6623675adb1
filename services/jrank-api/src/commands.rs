use crate::infra::parse_instant;
use chrono::{DateTime, Utc};
use clap::Args;
use jrank_engine::config::{AppConfig, EngineConfig};
use jrank_engine::criteria::import::{rules_from_path, snapshots_from_path};
use jrank_engine::criteria::{
    BadgeCategory, BadgeEligibilityEvaluator, BadgeEvaluation, CatalogReport,
    CriteriaEvaluationEngine, EngagementFact, EvaluationResult, ImportError, RuleCatalog,
};
use jrank_engine::error::AppError;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub(crate) struct EngagementEvaluateArgs {
    /// JSON rule document (array or `{ "rules": [...] }`)
    #[arg(long)]
    pub(crate) rules: PathBuf,
    /// JSON engagement fact, including any prior action history
    #[arg(long)]
    pub(crate) fact: PathBuf,
    /// Evaluation instant (RFC 3339). Defaults to the current time.
    #[arg(long, value_parser = parse_instant)]
    pub(crate) now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub(crate) struct BadgeEvaluateArgs {
    /// JSON rule document (array or `{ "rules": [...] }`)
    #[arg(long)]
    pub(crate) rules: PathBuf,
    /// CSV of metric snapshots: a subject_id column plus one column per metric
    #[arg(long)]
    pub(crate) metrics: PathBuf,
    /// Restrict evaluation to one badge category
    #[arg(long)]
    pub(crate) category: Option<BadgeCategory>,
    /// Evaluation instant (RFC 3339). Defaults to the current time.
    #[arg(long, value_parser = parse_instant)]
    pub(crate) now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub(crate) struct RulesLintArgs {
    /// JSON rule document to validate
    #[arg(long)]
    pub(crate) rules: PathBuf,
}

pub(crate) fn run_engagement_evaluate(args: EngagementEvaluateArgs) -> Result<(), AppError> {
    let EngagementEvaluateArgs { rules, fact, now } = args;

    let engine_config = load_engine_config()?;
    let (catalog, _) = load_catalog(&rules)?;
    let fact: EngagementFact = serde_json::from_reader(BufReader::new(File::open(&fact)?))
        .map_err(ImportError::from)?;
    let now = now.unwrap_or_else(Utc::now);

    let result = CriteriaEvaluationEngine::from_config(&engine_config).evaluate(&catalog, &fact, now);
    write_evaluation(&mut io::stdout().lock(), &fact.actor_id, now, &result)?;
    Ok(())
}

pub(crate) fn run_badge_evaluate(args: BadgeEvaluateArgs) -> Result<(), AppError> {
    let BadgeEvaluateArgs {
        rules,
        metrics,
        category,
        now,
    } = args;

    let engine_config = load_engine_config()?;
    let (catalog, _) = load_catalog(&rules)?;
    let snapshots = snapshots_from_path(&metrics)?;
    let now = now.unwrap_or_else(Utc::now);
    let evaluator = BadgeEligibilityEvaluator::from_config(&engine_config);

    let mut out = io::stdout().lock();
    writeln!(out, "Badge eligibility at {}", now.to_rfc3339())?;
    for snapshot in &snapshots {
        let evaluation = match category {
            Some(category) => evaluator.evaluate_category(&catalog, snapshot, category, now),
            None => evaluator.evaluate(&catalog, snapshot, now),
        };
        write_badges(&mut out, &evaluation)?;
    }
    Ok(())
}

pub(crate) fn run_rules_lint(args: RulesLintArgs) -> Result<(), AppError> {
    let (catalog, report) = load_catalog(&args.rules)?;
    write_lint(&mut io::stdout().lock(), &catalog, &report)?;
    Ok(())
}

fn load_engine_config() -> Result<EngineConfig, AppError> {
    Ok(AppConfig::load()?.engine)
}

fn load_catalog(path: &Path) -> Result<(RuleCatalog, CatalogReport), AppError> {
    let rules = rules_from_path(path)?;
    Ok(RuleCatalog::from_rules(rules))
}

pub(crate) fn write_evaluation<W: Write>(
    out: &mut W,
    actor_id: &str,
    now: DateTime<Utc>,
    result: &EvaluationResult,
) -> io::Result<()> {
    writeln!(out, "Engagement evaluation for {actor_id} at {}", now.to_rfc3339())?;
    writeln!(out, "  {}", result.summary())?;
    writeln!(out, "  phase: {:?}", result.resolved_in)?;

    if let Some(breakdown) = &result.breakdown {
        writeln!(out, "  base: {}", breakdown.base)?;
        for bonus in &breakdown.bonuses {
            writeln!(
                out,
                "  bonus: +{} ({})",
                bonus.bonus_points,
                bonus.condition.as_str()
            )?;
        }
        for multiplier in &breakdown.multipliers {
            writeln!(
                out,
                "  multiplier: x{} ({:?})",
                multiplier.multiplier, multiplier.condition
            )?;
        }
        writeln!(out, "  total: {}", breakdown.total)?;
    }

    for diagnostic in &result.diagnostics {
        writeln!(out, "  warning [{:?}]: {}", diagnostic.kind, diagnostic.detail)?;
    }
    Ok(())
}

pub(crate) fn write_badges<W: Write>(out: &mut W, evaluation: &BadgeEvaluation) -> io::Result<()> {
    let badges: Vec<String> = evaluation
        .badge_ids()
        .into_iter()
        .map(|badge| badge.to_string())
        .collect();

    if badges.is_empty() {
        let reason = evaluation
            .rejection_reason
            .map(|reason| reason.summary())
            .unwrap_or("no badges earned");
        writeln!(out, "- {}: none ({reason})", evaluation.subject_id)?;
    } else {
        writeln!(out, "- {}: {}", evaluation.subject_id, badges.join(", "))?;
    }

    for diagnostic in &evaluation.diagnostics {
        writeln!(out, "    warning [{:?}]: {}", diagnostic.kind, diagnostic.detail)?;
    }
    Ok(())
}

pub(crate) fn write_lint<W: Write>(
    out: &mut W,
    catalog: &RuleCatalog,
    report: &CatalogReport,
) -> io::Result<()> {
    writeln!(
        out,
        "{} active, {} inactive, {} rejected",
        report.accepted,
        report.inactive,
        report.rejected.len()
    )?;

    for rejected in &report.rejected {
        writeln!(out, "  rejected {}: {}", rejected.rule_id, rejected.defect)?;
    }
    for rule in catalog.active_rules() {
        for finding in rule.unrecognized_conditions() {
            writeln!(out, "  disabled {}: {finding}", rule.id)?;
        }
    }
    for scope in catalog.scopes() {
        writeln!(out, "  {scope}: {} active", catalog.list_active(scope).count())?;
    }
    Ok(())
}
