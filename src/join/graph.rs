//! In-process relationship graph.
//!
//! Tables are nodes and declared relationships are undirected edges. Path
//! queries use BFS with parent pointers.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use super::{IndexResult, RelationshipIndex};
use crate::query::{FieldRef, Join, JoinType};

/// A declared key relationship between two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub from: FieldRef,
    pub to: FieldRef,
}

/// Parent information for path reconstruction.
struct ParentInfo {
    parent: NodeIndex,
    edge_idx: EdgeIndex,
}

/// Relationship graph of a single connection.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: UnGraph<String, Relationship>,
    node_indices: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &str) -> NodeIndex {
        if let Some(idx) = self.node_indices.get(table) {
            return *idx;
        }
        let idx = self.graph.add_node(table.to_string());
        self.node_indices.insert(table.to_string(), idx);
        idx
    }

    /// Declare `from = to`, adding both tables if needed.
    pub fn add_relationship(&mut self, from: FieldRef, to: FieldRef) {
        let a = self.add_table(&from.table);
        let b = self.add_table(&to.table);
        self.graph.add_edge(a, b, Relationship { from, to });
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.node_indices.contains_key(table)
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Shortest join path from one table to another, oriented from `from`.
    ///
    /// Returns `None` when either table is unknown or no path exists.
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<Join>> {
        if from == to {
            return self.has_table(from).then(Vec::new);
        }
        let from_idx = *self.node_indices.get(from)?;
        let to_idx = *self.node_indices.get(to)?;

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut parents: HashMap<NodeIndex, ParentInfo> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        queue.push_back(from_idx);
        visited.insert(from_idx);

        while let Some(current) = queue.pop_front() {
            for edge_ref in self.graph.edges(current) {
                let neighbor = if edge_ref.source() == current {
                    edge_ref.target()
                } else {
                    edge_ref.source()
                };
                if !visited.insert(neighbor) {
                    continue;
                }
                parents.insert(
                    neighbor,
                    ParentInfo {
                        parent: current,
                        edge_idx: edge_ref.id(),
                    },
                );
                if neighbor == to_idx {
                    return Some(self.reconstruct_path(from_idx, neighbor, &parents));
                }
                queue.push_back(neighbor);
            }
        }
        None
    }

    fn reconstruct_path(
        &self,
        from_idx: NodeIndex,
        to_idx: NodeIndex,
        parents: &HashMap<NodeIndex, ParentInfo>,
    ) -> Vec<Join> {
        let mut joins = Vec::new();
        let mut current = to_idx;

        while current != from_idx {
            let info = &parents[&current];
            let rel = &self.graph[info.edge_idx];
            let parent_table = &self.graph[info.parent];
            // Orient the join so the left side is the table reached first.
            let (left, right) = if rel.from.table == *parent_table {
                (rel.from.clone(), rel.to.clone())
            } else {
                (rel.to.clone(), rel.from.clone())
            };
            joins.push(Join {
                left,
                join_type: JoinType::Inner,
                right,
            });
            current = info.parent;
        }

        joins.reverse();
        joins
    }

    /// Whether a single connected path spans all given tables.
    pub fn connects(&self, tables: &[String]) -> bool {
        let Some((root, rest)) = tables.split_first() else {
            return true;
        };
        rest.iter().all(|t| self.find_path(root, t).is_some())
    }

    /// Joins linking every given table to the first one, deduplicated.
    ///
    /// Tables that cannot be reached are skipped, so the result connects as
    /// much of the set as the graph allows.
    pub fn join_tree(&self, tables: &[String]) -> Vec<Join> {
        let mut joins: Vec<Join> = Vec::new();
        let mut pending: Vec<&String> = tables.iter().collect();

        // Start a new tree from the first unreached table until none remain.
        while let Some(root) = pending.first().copied() {
            let mut reached = vec![root];
            for target in pending.iter().skip(1) {
                if let Some(path) = self.find_path(root, target) {
                    reached.push(*target);
                    for join in path {
                        let duplicate = joins
                            .iter()
                            .any(|j| j.connects(&join.left.table, &join.right.table));
                        if !duplicate {
                            joins.push(join);
                        }
                    }
                }
            }
            pending.retain(|t| !reached.contains(t));
        }
        joins
    }
}

#[async_trait]
impl RelationshipIndex for RelationshipGraph {
    async fn path_exists(&self, _connection_id: &str, tables: &[String]) -> IndexResult<bool> {
        Ok(self.connects(tables))
    }

    async fn suggested_joins(&self, _connection_id: &str, tables: &[String]) -> IndexResult<Vec<Join>> {
        Ok(self.join_tree(tables))
    }
}
