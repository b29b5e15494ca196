//! Longest SOURCE-to-SINK paths in a transition graph

use std::collections::VecDeque;

use super::error::DesignError;
use super::graph::{NodeId, TransitionGraph, SINK, SOURCE};
use super::types::{Path, PrimerKey};

/// Topological order of the live nodes (Kahn), ids ascending among ties.
/// Nodes on a cycle are left out, which cannot happen for built graphs.
pub fn topological_order(graph: &TransitionGraph) -> Vec<NodeId> {
    let n = graph.capacity();
    let mut indegree = vec![0usize; n];
    for (_, e) in graph.all_edges() {
        indegree[e.to] += 1;
    }

    let mut queue: VecDeque<NodeId> = (0..n)
        .filter(|&id| graph.is_live(id) && indegree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(u) = queue.pop_front() {
        order.push(u);
        for e in graph.edges(u) {
            indegree[e.to] -= 1;
            if indegree[e.to] == 0 {
                queue.push_back(e.to);
            }
        }
    }
    order
}

/// Maximum-weight SOURCE-to-SINK path.
///
/// Weights are negated and relaxed once in topological order; among equal
/// totals the first relaxation wins, so ties follow edge insertion order.
pub fn longest_path(graph: &TransitionGraph) -> Result<Path, DesignError> {
    let n = graph.capacity();
    let mut dist = vec![f64::INFINITY; n];
    let mut parent: Vec<Option<NodeId>> = vec![None; n];
    dist[SOURCE] = 0.0;

    for u in topological_order(graph) {
        if !dist[u].is_finite() {
            continue;
        }
        for e in graph.edges(u) {
            let candidate = dist[u] - e.weight;
            if candidate < dist[e.to] {
                dist[e.to] = candidate;
                parent[e.to] = Some(u);
            }
        }
    }

    if !dist[SINK].is_finite() {
        return Err(DesignError::NoPath { target: None });
    }

    let mut primers: Vec<PrimerKey> = Vec::new();
    let mut cursor = parent[SINK];
    while let Some(id) = cursor {
        if id == SOURCE {
            break;
        }
        if let Some(key) = graph.key(id) {
            primers.push(key);
        }
        cursor = parent[id];
    }
    primers.reverse();

    Ok(Path {
        primers,
        score: -dist[SINK],
    })
}

/// Remove every node sharing a strand with one of `primers` and overlapping
/// it by more than `allowed_overlap`. Returns the number of removed nodes.
pub fn remove_colliding_nodes(
    graph: &mut TransitionGraph,
    primers: &[PrimerKey],
    allowed_overlap: i64,
) -> usize {
    let colliding: Vec<PrimerKey> = graph
        .primers()
        .map(|(_, key)| key)
        .filter(|key| primers.iter().any(|p| p.collides_with(key, allowed_overlap)))
        .collect();
    graph.remove_nodes(&colliding);
    colliding.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::types::Strand;
    use approx::assert_relative_eq;

    fn key(start: i64, end: i64, strand: Strand) -> PrimerKey {
        PrimerKey::new(start, end, strand)
    }

    /// SOURCE -> a -> b -> c -> SINK
    fn chain() -> (TransitionGraph, Vec<PrimerKey>) {
        let keys = vec![
            key(-5, 0, Strand::Forward),
            key(10, 15, Strand::Reverse),
            key(12, 17, Strand::Forward),
        ];
        let mut graph = TransitionGraph::new();
        let mut prev = SOURCE;
        for (i, k) in keys.iter().enumerate() {
            let w = 0.1 * (i + 1) as f64;
            let (id, _) = graph.insert_primer(*k, w);
            graph.add_edge(prev, id, w);
            prev = id;
        }
        graph.add_edge(prev, SINK, 0.0);
        (graph, keys)
    }

    #[test]
    fn test_single_chain_is_returned() {
        let (graph, keys) = chain();
        let path = longest_path(&graph).unwrap();
        assert_eq!(path.primers, keys);
        assert_relative_eq!(path.score, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_unreachable_sink_is_no_path() {
        let (mut graph, keys) = chain();
        graph.remove_nodes(&keys[1..2]);
        assert_eq!(
            longest_path(&graph),
            Err(DesignError::NoPath { target: None })
        );

        let empty = TransitionGraph::new();
        assert!(longest_path(&empty).is_err());
    }

    #[test]
    fn test_heavier_branch_wins() {
        let mut graph = TransitionGraph::new();
        let (a, _) = graph.insert_primer(key(-5, 0, Strand::Forward), 0.5);
        let (b, _) = graph.insert_primer(key(3, 8, Strand::Reverse), 0.2);
        let (c, _) = graph.insert_primer(key(4, 9, Strand::Reverse), 0.9);
        graph.add_edge(SOURCE, a, 0.5);
        graph.add_edge(a, b, 0.2);
        graph.add_edge(a, c, 0.9);
        graph.add_edge(b, SINK, 0.0);
        graph.add_edge(c, SINK, 0.0);
        let path = longest_path(&graph).unwrap();
        assert_eq!(path.primers[1], key(4, 9, Strand::Reverse));
    }

    #[test]
    fn test_ties_keep_first_inserted_edge() {
        let mut graph = TransitionGraph::new();
        let (a, _) = graph.insert_primer(key(-5, 0, Strand::Forward), 0.5);
        let (b, _) = graph.insert_primer(key(3, 8, Strand::Reverse), 0.4);
        let (c, _) = graph.insert_primer(key(4, 9, Strand::Reverse), 0.4);
        graph.add_edge(SOURCE, a, 0.5);
        graph.add_edge(a, b, 0.4);
        graph.add_edge(a, c, 0.4);
        graph.add_edge(b, SINK, 0.0);
        graph.add_edge(c, SINK, 0.0);
        let path = longest_path(&graph).unwrap();
        assert_eq!(path.primers[1], key(3, 8, Strand::Reverse));
    }

    #[test]
    fn test_colliding_nodes_are_removed() {
        let mut graph = TransitionGraph::new();
        let f1 = key(-10, -5, Strand::Forward);
        let f2 = key(-7, -2, Strand::Forward);
        let f3 = key(-5, 0, Strand::Forward);
        let r1 = key(-9, -4, Strand::Reverse);
        for k in [f1, f2, f3, r1] {
            graph.insert_primer(k, 0.5);
        }

        // f2 shares two positions with f1, f3 none; r1 is on the other strand
        let removed = remove_colliding_nodes(&mut graph, &[f1], 1);
        assert_eq!(removed, 2);
        assert_eq!(graph.node_id(&f1), None);
        assert_eq!(graph.node_id(&f2), None);
        assert!(graph.node_id(&f3).is_some());
        assert!(graph.node_id(&r1).is_some());
    }
}
