//! Variation set hierarchy traversal.
//!
//! Sets form a directed graph through super/sub edges. The graph is expected
//! to be acyclic but the data does not guarantee it, so every traversal keeps
//! a visited set and terminates on cycles.

use crate::entity::DbId;
use crate::error::AdaptorError;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Which way to walk the set graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards super-sets
    Ascendants,
    /// Towards sub-sets
    Descendants,
}

/// Source of set graph edges and set membership
pub trait SetGraph {
    /// Direct neighbours of each set in `sets`, as `(set, neighbour)` pairs
    fn neighbours(
        &self,
        sets: &[DbId],
        direction: Direction,
    ) -> Result<Vec<(DbId, DbId)>, AdaptorError>;

    /// Direct members of each set in `sets`, as `(set, member)` pairs
    fn members(&self, sets: &[DbId]) -> Result<Vec<(DbId, DbId)>, AdaptorError>;
}

/// Breadth-first resolver over a `SetGraph`.
///
/// Each level of the walk is one `neighbours` call for the whole frontier.
pub struct SetHierarchyResolver<'a, G: SetGraph + ?Sized> {
    graph: &'a G,
}

impl<'a, G: SetGraph + ?Sized> SetHierarchyResolver<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        Self { graph }
    }

    /// All super-sets of `start`, in discovery order, excluding `start`
    pub fn ascendants(&self, start: DbId, immediate_only: bool) -> Result<Vec<DbId>, AdaptorError> {
        self.walk(start, Direction::Ascendants, immediate_only)
    }

    /// All sub-sets of `start`, in discovery order, excluding `start`
    pub fn descendants(&self, start: DbId, immediate_only: bool) -> Result<Vec<DbId>, AdaptorError> {
        self.walk(start, Direction::Descendants, immediate_only)
    }

    fn walk(
        &self,
        start: DbId,
        direction: Direction,
        immediate_only: bool,
    ) -> Result<Vec<DbId>, AdaptorError> {
        let mut visited: HashSet<DbId> = HashSet::from([start]);
        let mut found = Vec::new();
        let mut frontier = vec![start];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let edges = self.graph.neighbours(&frontier, direction)?;
            let mut next = Vec::new();
            for (_, neighbour) in edges {
                if neighbour == 0 || !visited.insert(neighbour) {
                    continue;
                }
                found.push(neighbour);
                next.push(neighbour);
            }
            depth += 1;
            if immediate_only {
                break;
            }
            frontier = next;
        }

        debug!(
            "Resolved {} {:?} of set {} in {} levels",
            found.len(),
            direction,
            start,
            depth
        );
        Ok(found)
    }

    /// Members of `start` and of every set below it, deduplicated, by ID
    pub fn members_flattened(&self, start: DbId) -> Result<Vec<DbId>, AdaptorError> {
        let mut sets = vec![start];
        sets.extend(self.descendants(start, false)?);

        let members: BTreeSet<DbId> = self
            .graph
            .members(&sets)?
            .into_iter()
            .map(|(_, member)| member)
            .filter(|&member| member != 0)
            .collect();
        Ok(members.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    /// Edges are `(super, sub)`
    #[derive(Default)]
    struct FakeGraph {
        edges: Vec<(DbId, DbId)>,
        members: Vec<(DbId, DbId)>,
        calls: Cell<usize>,
        fail: bool,
    }

    impl SetGraph for FakeGraph {
        fn neighbours(
            &self,
            sets: &[DbId],
            direction: Direction,
        ) -> Result<Vec<(DbId, DbId)>, AdaptorError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(StoreError::unavailable("down").into());
            }
            Ok(self
                .edges
                .iter()
                .filter_map(|&(sup, sub)| match direction {
                    Direction::Ascendants if sets.contains(&sub) => Some((sub, sup)),
                    Direction::Descendants if sets.contains(&sup) => Some((sup, sub)),
                    _ => None,
                })
                .collect())
        }

        fn members(&self, sets: &[DbId]) -> Result<Vec<(DbId, DbId)>, AdaptorError> {
            Ok(self
                .members
                .iter()
                .filter(|(set, _)| sets.contains(set))
                .copied()
                .collect())
        }
    }

    #[test]
    fn test_two_cycle_terminates() {
        let graph = FakeGraph {
            edges: vec![(1, 2), (2, 1)],
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);

        assert_eq!(resolver.ascendants(1, false).unwrap(), vec![2]);
        assert_eq!(resolver.descendants(1, false).unwrap(), vec![2]);
    }

    #[test]
    fn test_self_loop_excludes_start() {
        let graph = FakeGraph {
            edges: vec![(7, 7)],
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);
        assert!(resolver.descendants(7, false).unwrap().is_empty());
    }

    #[test]
    fn test_diamond_visits_each_set_once() {
        // 1 -> {2, 3} -> 4
        let graph = FakeGraph {
            edges: vec![(1, 2), (1, 3), (2, 4), (3, 4)],
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);

        assert_eq!(resolver.descendants(1, false).unwrap(), vec![2, 3, 4]);
        assert_eq!(resolver.ascendants(4, false).unwrap(), vec![2, 3, 1]);
        // one call per level plus the empty last level
        assert_eq!(graph.calls.get(), 6);
    }

    #[test]
    fn test_immediate_only() {
        let graph = FakeGraph {
            edges: vec![(1, 2), (2, 3)],
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);

        assert_eq!(resolver.descendants(1, true).unwrap(), vec![2]);
        assert_eq!(graph.calls.get(), 1);
        assert_eq!(resolver.ascendants(3, true).unwrap(), vec![2]);
    }

    #[test]
    fn test_members_flattened_deduplicates() {
        let graph = FakeGraph {
            edges: vec![(10, 11), (11, 10)],
            members: vec![(10, 1), (10, 2), (10, 3), (11, 2), (11, 3), (11, 4)],
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);
        assert_eq!(resolver.members_flattened(10).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_leaf_set() {
        let graph = FakeGraph {
            members: vec![(5, 9)],
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);
        assert!(resolver.ascendants(5, false).unwrap().is_empty());
        assert_eq!(resolver.members_flattened(5).unwrap(), vec![9]);
    }

    #[test]
    fn test_graph_failure_propagates() {
        let graph = FakeGraph {
            fail: true,
            ..Default::default()
        };
        let resolver = SetHierarchyResolver::new(&graph);
        let err = resolver.descendants(1, false).unwrap_err();
        assert!(err.is_store_failure());
    }
}
