//! Join path validation and the run gate.

use std::sync::Arc;

use serde::Serialize;

use super::{JoinPathError, RelationshipIndex};
use crate::catalog::{SchemaCatalog, SchemaField};
use crate::query::{Join, QueryDefinition};

/// Outcome of validating the tables of a definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinValidation {
    Valid,
    /// No path spans the referenced tables.
    Blocked {
        tables: Vec<String>,
        suggestions: Vec<Join>,
    },
    /// The relationship index could not answer.
    Failed { message: String },
}

impl JoinValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, JoinValidation::Valid)
    }

    pub fn error(&self) -> Option<JoinPathError> {
        match self {
            JoinValidation::Valid => None,
            JoinValidation::Blocked { tables, .. } => Some(JoinPathError::NoPath {
                tables: tables.clone(),
            }),
            JoinValidation::Failed { message } => Some(JoinPathError::Index(message.clone())),
        }
    }

    pub fn suggestions(&self) -> &[Join] {
        match self {
            JoinValidation::Blocked { suggestions, .. } => suggestions,
            _ => &[],
        }
    }
}

/// Checks that the tables referenced by a definition are connected.
#[derive(Clone)]
pub struct JoinValidator {
    index: Arc<dyn RelationshipIndex>,
}

impl JoinValidator {
    pub fn new(index: Arc<dyn RelationshipIndex>) -> Self {
        Self { index }
    }

    /// Validate the definition's referenced tables.
    ///
    /// The index is asked about the whole table set first. When it reports
    /// no path, tables linked by the definition's own joins are merged and
    /// the index is asked pairwise between the remaining groups, so adding
    /// a connecting join can only improve the outcome.
    pub async fn validate(&self, def: &QueryDefinition) -> JoinValidation {
        let tables = def.referenced_tables();
        if tables.len() <= 1 {
            return JoinValidation::Valid;
        }
        let Some(connection_id) = def.connection_id.as_deref() else {
            return JoinValidation::Failed {
                message: "no connection selected".to_string(),
            };
        };

        match self.index.path_exists(connection_id, &tables).await {
            Ok(true) => return JoinValidation::Valid,
            Ok(false) => {}
            Err(e) => return JoinValidation::Failed { message: e.0 },
        }

        let mut groups = explicit_components(&tables, &def.joins);
        if let Err(message) = self.merge_via_index(connection_id, &mut groups).await {
            return JoinValidation::Failed { message };
        }
        if groups.len() <= 1 {
            tracing::debug!(tables = ?tables, "tables connected through explicit joins");
            return JoinValidation::Valid;
        }

        match self.index.suggested_joins(connection_id, &tables).await {
            Ok(suggestions) => JoinValidation::Blocked {
                tables,
                suggestions,
            },
            Err(e) => JoinValidation::Failed { message: e.0 },
        }
    }

    /// Merge groups the index can connect, until no pair merges.
    async fn merge_via_index(&self, connection_id: &str, groups: &mut Vec<Vec<String>>) -> Result<(), String> {
        'outer: loop {
            for i in 0..groups.len() {
                for j in (i + 1)..groups.len() {
                    if self.groups_connected(connection_id, &groups[i], &groups[j]).await? {
                        let merged = groups.remove(j);
                        groups[i].extend(merged);
                        continue 'outer;
                    }
                }
            }
            return Ok(());
        }
    }

    async fn groups_connected(&self, connection_id: &str, a: &[String], b: &[String]) -> Result<bool, String> {
        for left in a {
            for right in b {
                let pair = [left.clone(), right.clone()];
                if self.index.path_exists(connection_id, &pair).await.map_err(|e| e.0)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Partition tables into groups linked by explicit joins (union-find).
fn explicit_components(tables: &[String], joins: &[Join]) -> Vec<Vec<String>> {
    let mut parent: Vec<usize> = (0..tables.len()).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        parent[i] = root;
        root
    }

    let position = |table: &str| tables.iter().position(|t| t == table);
    for join in joins {
        if let (Some(a), Some(b)) = (position(&join.left.table), position(&join.right.table)) {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[rb] = ra;
            }
        }
    }

    let mut groups: Vec<(usize, Vec<String>)> = Vec::new();
    for (i, table) in tables.iter().enumerate() {
        let root = find(&mut parent, i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(table.clone()),
            None => groups.push((root, vec![table.clone()])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

/// Fields offered when the user builds a join by hand: catalog fields the
/// definition already references, directly or through a calculated field.
pub fn manual_join_choices<'a>(def: &QueryDefinition, catalog: &'a SchemaCatalog) -> Vec<&'a SchemaField> {
    let candidates = def.join_candidate_fields();
    catalog
        .fields()
        .iter()
        .filter(|f| candidates.contains(&f.field_ref()))
        .collect()
}

/// Enables the run affordance only while the last validation was valid.
#[derive(Debug, Clone, Default)]
pub struct RunGate {
    last: Option<JoinValidation>,
}

impl RunGate {
    pub fn record(&mut self, validation: JoinValidation) {
        self.last = Some(validation);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<&JoinValidation> {
        self.last.as_ref()
    }

    pub fn can_run(&self) -> bool {
        self.last.as_ref().is_some_and(JoinValidation::is_valid)
    }

    pub fn check(&self) -> Result<(), JoinPathError> {
        match &self.last {
            None => Err(JoinPathError::NotValidated),
            Some(validation) => validation.error().map_or(Ok(()), Err),
        }
    }
}
