use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{RuleDefect, RuleDefinition, RuleEntry, RuleId, RuleScope};
use super::repository::{RepositoryError, RuleRepository};

/// Point-in-time view of the rule definitions, grouped by scope.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    by_scope: BTreeMap<RuleScope, Vec<RuleDefinition>>,
    ids: BTreeSet<RuleId>,
}

/// Summary of a catalog build: what was kept and what was turned away.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogReport {
    pub accepted: usize,
    pub inactive: usize,
    pub rejected: Vec<RejectedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRule {
    pub rule_id: RuleId,
    pub defect: String,
}

impl RuleCatalog {
    /// Builds a catalog, rejecting rules that could not be read, break structural
    /// invariants, or reuse an id already taken by an earlier rule.
    pub fn from_rules<I>(rules: I) -> (Self, CatalogReport)
    where
        I: IntoIterator,
        I::Item: Into<RuleEntry>,
    {
        let mut catalog = RuleCatalog::default();
        let mut report = CatalogReport::default();

        for entry in rules {
            let entry: RuleEntry = entry.into();
            let rule = match entry {
                RuleEntry::Parsed(rule) => rule,
                RuleEntry::Malformed { rule_id, defect } => {
                    warn!(%rule_id, %defect, "rule rejected from catalog");
                    report.rejected.push(RejectedRule {
                        rule_id,
                        defect: defect.to_string(),
                    });
                    continue;
                }
            };

            let verdict = if catalog.ids.contains(&rule.id) {
                Err(RuleDefect::DuplicateId(rule.id.clone()))
            } else {
                rule.validate()
            };

            if let Err(defect) = verdict {
                warn!(rule_id = %rule.id, %defect, "rule rejected from catalog");
                report.rejected.push(RejectedRule {
                    rule_id: rule.id.clone(),
                    defect: defect.to_string(),
                });
                continue;
            }

            if rule.is_active {
                report.accepted += 1;
            } else {
                report.inactive += 1;
            }
            catalog.ids.insert(rule.id.clone());
            catalog.by_scope.entry(rule.scope()).or_default().push(rule);
        }

        (catalog, report)
    }

    pub fn load<R>(repository: &R) -> Result<(Self, CatalogReport), RepositoryError>
    where
        R: RuleRepository + ?Sized,
    {
        let rules = repository.fetch_rules()?;
        Ok(Self::from_rules(rules))
    }

    /// Active rules for one scope, in storage order.
    pub fn list_active<'a>(
        &'a self,
        scope: &RuleScope,
    ) -> impl Iterator<Item = &'a RuleDefinition> + 'a {
        self.by_scope
            .get(scope)
            .into_iter()
            .flatten()
            .filter(|rule| rule.is_active)
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.by_scope.values().flatten().filter(|rule| rule.is_active)
    }

    pub fn get(&self, id: &RuleId) -> Option<&RuleDefinition> {
        self.by_scope.values().flatten().find(|rule| &rule.id == id)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &RuleScope> {
        self.by_scope.keys()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Refreshable handle to the current catalog snapshot.
///
/// Readers get an `Arc` to the snapshot current at call time and keep using it even
/// if a refresh swaps in a newer one mid-evaluation.
#[derive(Debug, Clone, Default)]
pub struct SharedCatalog {
    current: Arc<RwLock<Arc<RuleCatalog>>>,
}

impl SharedCatalog {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleCatalog> {
        // The lock only guards an Arc swap, so a poisoned guard still holds a whole catalog.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, catalog: RuleCatalog) -> Arc<RuleCatalog> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    pub fn refresh<R>(&self, repository: &R) -> Result<CatalogReport, RepositoryError>
    where
        R: RuleRepository + ?Sized,
    {
        let (catalog, report) = RuleCatalog::load(repository)?;
        info!(
            accepted = report.accepted,
            inactive = report.inactive,
            rejected = report.rejected.len(),
            "rule catalog refreshed"
        );
        self.replace(catalog);
        Ok(report)
    }
}
