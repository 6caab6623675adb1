use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::condition::ConditionName;
use super::domain::{MetricSnapshot, RuleDefect, RuleDefinition, RuleEntry, RuleId};
use super::repository::{RepositoryError, RuleRepository};

const SUBJECT_COLUMNS: [&str; 2] = ["subject_id", "subjectId"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid rule document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rule document must be an array or an object with a 'rules' array")]
    UnexpectedShape,
    #[error("invalid metric snapshot CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("metric snapshot CSV has no subject_id column")]
    MissingSubjectColumn,
    #[error("metric snapshot row {row} has a blank subject id")]
    BlankSubject { row: usize },
    #[error("metric snapshot row {row}: '{column}' value '{value}' is not numeric")]
    InvalidMetric {
        row: usize,
        column: String,
        value: String,
    },
}

/// Reads a JSON rule document: either a bare array or `{ "rules": [...] }`.
///
/// Each rule is decoded on its own; one that does not fit the rule shape comes
/// back as [`RuleEntry::Malformed`] and leaves its neighbours intact.
pub fn rules_from_reader<R: Read>(reader: R) -> Result<Vec<RuleEntry>, ImportError> {
    let document: Value = serde_json::from_reader(reader)?;
    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("rules") {
            Some(Value::Array(items)) => items,
            _ => return Err(ImportError::UnexpectedShape),
        },
        _ => return Err(ImportError::UnexpectedShape),
    };

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| rule_entry(index, item))
        .collect())
}

fn rule_entry(index: usize, item: Value) -> RuleEntry {
    // Position in the document stands in for an id that is missing or unreadable.
    let rule_id = match item.get("id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => RuleId(id.to_string()),
        _ => RuleId(format!("#{}", index + 1)),
    };

    match serde_json::from_value::<RuleDefinition>(item) {
        Ok(rule) => RuleEntry::Parsed(rule),
        Err(err) => RuleEntry::Malformed {
            rule_id,
            defect: RuleDefect::Malformed(err.to_string()),
        },
    }
}

pub fn rules_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<RuleEntry>, ImportError> {
    let file = std::fs::File::open(path)?;
    rules_from_reader(std::io::BufReader::new(file))
}

/// Reads metric snapshots from CSV: one row per subject, one column per condition.
///
/// Empty cells are left out of the snapshot rather than read as zero.
pub fn snapshots_from_reader<R: Read>(reader: R) -> Result<Vec<MetricSnapshot>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let subject_index = headers
        .iter()
        .position(|header| SUBJECT_COLUMNS.contains(&header))
        .ok_or(ImportError::MissingSubjectColumn)?;
    let columns: Vec<(usize, ConditionName)> = headers
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != subject_index)
        .map(|(index, header)| (index, ConditionName::from(header)))
        .collect();

    let mut snapshots = Vec::new();
    for (offset, record) in csv_reader.records().enumerate() {
        let record = record?;
        let row = offset + 1;

        let subject_id = record.get(subject_index).unwrap_or_default().to_string();
        if subject_id.is_empty() {
            return Err(ImportError::BlankSubject { row });
        }

        let mut metrics = BTreeMap::new();
        for (index, condition) in &columns {
            let raw = record.get(*index).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<f64>().map_err(|_| ImportError::InvalidMetric {
                row,
                column: condition.as_str().to_string(),
                value: raw.to_string(),
            })?;
            metrics.insert(condition.clone(), value);
        }

        snapshots.push(MetricSnapshot {
            subject_id,
            metrics,
            profile: None,
        });
    }

    Ok(snapshots)
}

pub fn snapshots_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<MetricSnapshot>, ImportError> {
    let file = std::fs::File::open(path)?;
    snapshots_from_reader(file)
}

/// Rule repository backed by a JSON document on disk, re-read on every fetch.
#[derive(Debug, Clone)]
pub struct JsonRuleRepository {
    path: PathBuf,
}

impl JsonRuleRepository {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleRepository for JsonRuleRepository {
    fn fetch_rules(&self) -> Result<Vec<RuleEntry>, RepositoryError> {
        Ok(rules_from_path(&self.path)?)
    }
}
