//! Migration graph building and validation

use crate::error::{CoreError, CoreResult, GraphIntegrityError};
use crate::migration::{discover_migrations, scaffold_migration, Migration};
use crate::migration_id::MigrationId;
use chrono::NaiveDate;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A validated chain of migrations.
///
/// Edges run from predecessor to successor. A valid graph has exactly one
/// root, no cycles, and no node revised by more than one migration, so the
/// nodes form a single chain and [`ordered`](Self::ordered) is a total order.
#[derive(Debug)]
pub struct MigrationGraph {
    /// The underlying graph
    graph: DiGraph<Migration, ()>,

    /// Map from migration id to node index
    node_map: HashMap<MigrationId, NodeIndex>,

    /// Nodes from root to head
    order: Vec<NodeIndex>,
}

impl MigrationGraph {
    /// Discover and validate every migration under `dir`
    pub fn load(dir: &Path) -> CoreResult<Self> {
        let migrations = discover_migrations(dir)?;
        log::debug!(
            "Discovered {} migration(s) in {}",
            migrations.len(),
            dir.display()
        );
        Ok(Self::from_migrations(migrations)?)
    }

    /// Build and validate a graph from in-memory definitions.
    ///
    /// The input order has no effect on the result.
    pub fn from_migrations(
        mut migrations: Vec<Migration>,
    ) -> Result<Self, GraphIntegrityError> {
        migrations.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.path.cmp(&b.path)));

        let mut graph = DiGraph::with_capacity(migrations.len(), migrations.len());
        let mut node_map: HashMap<MigrationId, NodeIndex> = HashMap::new();

        for migration in migrations {
            if let Some(&existing) = node_map.get(&migration.id) {
                let first: &Migration = &graph[existing];
                return Err(GraphIntegrityError::DuplicateId {
                    id: migration.id.to_string(),
                    path1: first.origin(),
                    path2: migration.origin(),
                });
            }
            let id = migration.id.clone();
            let idx = graph.add_node(migration);
            node_map.insert(id, idx);
        }

        let mut edges = Vec::new();
        for idx in graph.node_indices() {
            let migration = &graph[idx];
            if let Some(pred) = &migration.revises {
                let pred_idx = node_map.get(pred).copied().ok_or_else(|| {
                    GraphIntegrityError::DanglingPredecessor {
                        id: migration.id.to_string(),
                        predecessor: pred.to_string(),
                    }
                })?;
                edges.push((pred_idx, idx));
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        let mut dag = Self {
            graph,
            node_map,
            order: Vec::new(),
        };
        dag.validate()?;
        dag.order = dag.walk_chain();
        Ok(dag)
    }

    /// Check acyclicity, a single root and the absence of branches
    fn validate(&self) -> Result<(), GraphIntegrityError> {
        if let Err(cycle) = toposort(&self.graph, None) {
            return Err(GraphIntegrityError::Cycle {
                cycle: self.find_cycle_path(cycle.node_id()),
            });
        }

        let roots: Vec<&str> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].revises.is_none())
            .map(|idx| self.graph[idx].id.as_str())
            .collect();
        match roots.len() {
            0 if self.graph.node_count() > 0 => return Err(GraphIntegrityError::NoRoot),
            0 | 1 => {}
            _ => {
                return Err(GraphIntegrityError::MultipleRoots {
                    roots: roots.join(", "),
                })
            }
        }

        for idx in self.graph.node_indices() {
            let mut successors: Vec<&str> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| self.graph[e.target()].id.as_str())
                .collect();
            if successors.len() > 1 {
                successors.sort_unstable();
                return Err(GraphIntegrityError::Branch {
                    predecessor: self.graph[idx].id.to_string(),
                    successors: successors.join(", "),
                });
            }
        }

        Ok(())
    }

    /// Find a cycle path for error reporting.
    ///
    /// Every node has at most one predecessor, so walking `revises` links from
    /// any node that can reach a cycle ends up circling it.
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut walk = vec![start];
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut current = start;

        while let Some(edge) = self
            .graph
            .edges_directed(current, Direction::Incoming)
            .next()
        {
            let pred = edge.source();
            walk.push(pred);
            if !visited.insert(pred) {
                break;
            }
            current = pred;
        }

        // Keep only the loop itself; `walk` may have a tail leading into it
        let closing = walk[walk.len() - 1];
        let begin = walk.iter().position(|&n| n == closing).unwrap_or(0);
        let mut cycle: Vec<&str> = walk[begin..]
            .iter()
            .map(|&idx| self.graph[idx].id.as_str())
            .collect();
        cycle.reverse();
        cycle.join(" -> ")
    }

    fn walk_chain(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut current = self
            .graph
            .node_indices()
            .find(|&idx| self.graph[idx].revises.is_none());
        while let Some(idx) = current {
            order.push(idx);
            current = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .next()
                .map(|e| e.target());
        }
        order
    }

    /// Every migration from the root to the newest
    pub fn ordered(&self) -> Vec<&Migration> {
        self.order.iter().map(|&idx| &self.graph[idx]).collect()
    }

    /// Ids in apply order
    pub fn ordered_ids(&self) -> Vec<&MigrationId> {
        self.order.iter().map(|&idx| &self.graph[idx].id).collect()
    }

    /// Look up a migration by id
    pub fn get(&self, id: &str) -> Option<&Migration> {
        self.node_map.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// Zero-based position of `id` in apply order
    pub fn position(&self, id: &str) -> Option<usize> {
        let idx = self.node_map.get(id)?;
        self.order.iter().position(|n| n == idx)
    }

    /// The newest migration
    pub fn head(&self) -> Option<&Migration> {
        self.order.last().map(|&idx| &self.graph[idx])
    }

    /// The migration with no predecessor
    pub fn root(&self) -> Option<&Migration> {
        self.order.first().map(|&idx| &self.graph[idx])
    }

    /// The migration that revises `id`, if any
    pub fn successor(&self, id: &str) -> Option<&Migration> {
        let &idx = self.node_map.get(id)?;
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .next()
            .map(|e| &self.graph[e.target()])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Scaffold a new migration on top of the current head.
    ///
    /// Fails when `id` is already taken or the target directory exists.
    pub fn scaffold_next(
        &self,
        migrations_dir: &Path,
        id: &MigrationId,
        description: &str,
        created: NaiveDate,
    ) -> CoreResult<PathBuf> {
        if let Some(existing) = self.get(id) {
            return Err(CoreError::InvalidMigration {
                path: existing.origin(),
                reason: format!("migration id '{id}' is already in use"),
            });
        }
        let revises = self.head().map(|m| &m.id);
        scaffold_migration(migrations_dir, id, description, revises, created)
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
