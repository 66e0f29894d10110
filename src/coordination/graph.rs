//! Wait-for graph for deadlock avoidance
//!
//! The graph is transient: the scheduler rebuilds it for each admission
//! decision from the current lock table and queue, tests whether the
//! candidate acquisition would close a cycle, and throws it away. Nothing
//! here is persisted.
//!
//! An edge `A -> B` means "request A is waiting on a resource held by
//! request B". Because the engine only ever grants a partial acquisition
//! after this check passes, the standing state stays cycle-free and any new
//! cycle must pass through the candidate being tested.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// Directed wait-for graph over request ids
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: HashMap<Uuid, HashSet<Uuid>>,
}

impl WaitForGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a wait edge (`waiter` is waiting on a resource held by `holder`)
    ///
    /// Self-edges are ignored: waiting on a resource you already hold is a
    /// refresh, not a wait.
    pub fn add_wait(&mut self, waiter: Uuid, holder: Uuid) {
        if waiter == holder {
            return;
        }
        self.edges.entry(waiter).or_default().insert(holder);
    }

    /// Number of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashSet::len).sum()
    }

    /// Check whether any path leads from `node` back to itself
    pub fn has_cycle_through(&self, node: Uuid) -> bool {
        let Some(successors) = self.edges.get(&node) else {
            return false;
        };

        let mut visited = HashSet::new();
        let mut stack: Vec<Uuid> = successors.iter().copied().collect();

        while let Some(current) = stack.pop() {
            if current == node {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.edges.get(&current) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    /// Find any cycle in the whole graph (invariant audit, diagnostics)
    pub fn find_cycle(&self) -> Option<Vec<Uuid>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for &start in self.edges.keys() {
            if !visited.contains(&start) {
                if let Some(cycle) =
                    self.dfs_cycle(start, &mut visited, &mut rec_stack, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: Uuid,
        visited: &mut HashSet<Uuid>,
        rec_stack: &mut HashSet<Uuid>,
        path: &mut Vec<Uuid>,
    ) -> Option<Vec<Uuid>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(successors) = self.edges.get(&node) {
            for &next in successors {
                if rec_stack.contains(&next) {
                    // Back-edge: slice the cycle out of the current path
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
                if !visited.contains(&next) {
                    if let Some(cycle) = self.dfs_cycle(next, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.remove(&node);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph_has_no_cycle() {
        let graph = WaitForGraph::new();
        assert!(!graph.has_cycle_through(Uuid::new_v4()));
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_chain_is_acyclic() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut graph = WaitForGraph::new();
        graph.add_wait(a, b);
        graph.add_wait(b, c);

        assert!(!graph.has_cycle_through(a));
        assert!(!graph.has_cycle_through(b));
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_two_node_cycle() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut graph = WaitForGraph::new();
        // A waits on B's resource, B waits on A's
        graph.add_wait(a, b);
        graph.add_wait(b, a);

        assert!(graph.has_cycle_through(a));
        assert!(graph.has_cycle_through(b));
        assert!(graph.find_cycle().is_some());
    }

    #[test]
    fn test_longer_cycle() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut graph = WaitForGraph::new();
        graph.add_wait(a, b);
        graph.add_wait(b, c);
        graph.add_wait(c, a);

        assert!(graph.has_cycle_through(a));
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_cycle_elsewhere_not_through_node() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut graph = WaitForGraph::new();
        graph.add_wait(b, c);
        graph.add_wait(c, b);
        graph.add_wait(a, b);

        // a feeds into the b<->c cycle but is not on it
        assert!(!graph.has_cycle_through(a));
        assert!(graph.has_cycle_through(b));
    }

    #[test]
    fn test_self_edges_ignored() {
        let a = Uuid::new_v4();
        let mut graph = WaitForGraph::new();
        graph.add_wait(a, a);

        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.has_cycle_through(a));
    }
}
