//! Transition graph over primer candidates
//!
//! Nodes are primer keys plus the virtual SOURCE and SINK. An edge u -> v
//! means v may be placed right after u in a left-to-right tiling; its weight
//! is v's efficiency (0 for edges into SINK), so a SOURCE-to-SINK path sums
//! every primer's efficiency exactly once. Every edge keeps or increases the
//! start coordinate and forward-to-reverse edges strictly increase it, so
//! the graph is acyclic.

use std::collections::HashMap;

use super::candidates::{CandidateTable, PrimerCandidate};
use super::types::{DesignParams, FeasibilityThresholds, GraphSummary, PrimerKey, Strand};

pub type NodeId = usize;

pub const SOURCE: NodeId = 0;
pub const SINK: NodeId = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Source,
    Sink,
    Primer(PrimerKey),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphNode {
    pub kind: NodeKind,
    pub efficiency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: NodeId,
    pub weight: f64,
}

/// Arena-backed DAG with tombstoned node removal
#[derive(Debug, Clone)]
pub struct TransitionGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<PrimerKey, NodeId>,
    /// Out-edges in insertion order
    edges: Vec<Vec<Edge>>,
    removed: Vec<bool>,
}

impl Default for TransitionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![
                GraphNode {
                    kind: NodeKind::Source,
                    efficiency: 0.0,
                },
                GraphNode {
                    kind: NodeKind::Sink,
                    efficiency: 0.0,
                },
            ],
            index: HashMap::new(),
            edges: vec![Vec::new(), Vec::new()],
            removed: vec![false, false],
        }
    }

    /// Insert a primer node if absent. Returns its id and whether it is new.
    pub fn insert_primer(&mut self, key: PrimerKey, efficiency: f64) -> (NodeId, bool) {
        if let Some(&id) = self.index.get(&key) {
            return (id, false);
        }
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            kind: NodeKind::Primer(key),
            efficiency,
        });
        self.edges.push(Vec::new());
        self.removed.push(false);
        self.index.insert(key, id);
        (id, true)
    }

    /// Add `from -> to` unless that edge already exists
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, weight: f64) {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return;
        }
        if self.edges[from].iter().any(|e| e.to == to) {
            return;
        }
        self.edges[from].push(Edge { to, weight });
    }

    /// Add `from -> to` without looking for an existing edge. The caller
    /// guarantees the edge is new.
    fn push_edge(&mut self, from: NodeId, to: NodeId, weight: f64) {
        if from < self.nodes.len() && to < self.nodes.len() {
            self.edges[from].push(Edge { to, weight });
        }
    }

    pub fn node_id(&self, key: &PrimerKey) -> Option<NodeId> {
        self.index
            .get(key)
            .copied()
            .filter(|&id| !self.removed[id])
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn key(&self, id: NodeId) -> Option<PrimerKey> {
        match self.nodes.get(id)?.kind {
            NodeKind::Primer(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        id < self.nodes.len() && !self.removed[id]
    }

    /// Upper bound on node ids, live or removed
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Live out-edges of a live node, in insertion order
    pub fn edges(&self, from: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        let live = self.is_live(from);
        self.edges
            .get(from)
            .into_iter()
            .flatten()
            .filter(move |e| live && !self.removed[e.to])
    }

    /// Every live edge as (from, edge)
    pub fn all_edges(&self) -> impl Iterator<Item = (NodeId, &Edge)> + '_ {
        (0..self.nodes.len()).flat_map(move |from| self.edges(from).map(move |e| (from, e)))
    }

    /// Live primer nodes as (id, key)
    pub fn primers(&self) -> impl Iterator<Item = (NodeId, PrimerKey)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(id, _)| !self.removed[*id])
            .filter_map(|(id, n)| match n.kind {
                NodeKind::Primer(key) => Some((id, key)),
                _ => None,
            })
    }

    pub fn remove_node(&mut self, id: NodeId) {
        if id != SOURCE && id != SINK && id < self.removed.len() {
            self.removed[id] = true;
        }
    }

    /// Remove the nodes for the given keys; unknown keys are ignored
    pub fn remove_nodes<'k>(&mut self, keys: impl IntoIterator<Item = &'k PrimerKey>) {
        for key in keys {
            if let Some(&id) = self.index.get(key) {
                self.remove_node(id);
            }
        }
    }

    /// Live nodes, SOURCE and SINK included
    pub fn node_count(&self) -> usize {
        self.removed.iter().filter(|r| !**r).count()
    }

    pub fn edge_count(&self) -> usize {
        self.all_edges().count()
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            nodes: self.node_count(),
            edges: self.edge_count(),
        }
    }
}

/// Legal-successor relation between primers of one tiling
pub trait SuccessorRule: Sync {
    fn successors<'t>(
        &self,
        current: &PrimerKey,
        table: &'t CandidateTable,
    ) -> Vec<&'t PrimerCandidate>;
}

/// Alternating forward/reverse tiling.
///
/// A forward primer is followed by a reverse primer starting at or after its
/// end, with the whole fragment no longer than `max_oligo_span`. A reverse
/// primer is followed by a forward primer starting inside it and sharing at
/// most `allowed_overlap` positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingRule {
    pub allowed_overlap: i64,
    pub max_oligo_span: i64,
}

impl TilingRule {
    pub fn from_params(params: &DesignParams) -> Self {
        Self {
            allowed_overlap: params.allowed_overlap,
            max_oligo_span: params.max_oligo_span,
        }
    }
}

impl SuccessorRule for TilingRule {
    fn successors<'t>(
        &self,
        current: &PrimerKey,
        table: &'t CandidateTable,
    ) -> Vec<&'t PrimerCandidate> {
        match current.strand {
            Strand::Forward => table
                .starting_between(current.end, current.start + self.max_oligo_span)
                .iter()
                .filter(|c| {
                    c.key.strand == Strand::Reverse
                        && c.key.end - current.start <= self.max_oligo_span
                })
                .collect(),
            Strand::Reverse => table
                .starting_between(current.start, current.end)
                .iter()
                .filter(|c| {
                    c.key.strand == Strand::Forward
                        && c.key.overlap(current) <= self.allowed_overlap
                })
                .collect(),
        }
    }
}

/// Builds the transition graph of one target from its candidates
pub struct GraphBuilder<'a> {
    table: &'a CandidateTable,
    target_len: i64,
    feasibility: &'a FeasibilityThresholds,
    rule: &'a dyn SuccessorRule,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        table: &'a CandidateTable,
        target_len: usize,
        feasibility: &'a FeasibilityThresholds,
        rule: &'a dyn SuccessorRule,
    ) -> Self {
        Self {
            table,
            target_len: target_len as i64,
            feasibility,
            rule,
        }
    }

    pub fn is_feasible(&self, candidate: &PrimerCandidate) -> bool {
        self.feasibility
            .passes(candidate.features.tm, candidate.features.gc)
    }

    /// Forward primer ending at or before the target region
    pub fn is_entry(&self, candidate: &PrimerCandidate) -> bool {
        candidate.key.strand == Strand::Forward
            && candidate.key.end <= 0
            && self.is_feasible(candidate)
    }

    /// Reverse primer starting at or beyond the end of the target region
    pub fn is_terminal(&self, candidate: &PrimerCandidate) -> bool {
        candidate.key.strand == Strand::Reverse
            && candidate.key.start >= self.target_len
            && self.is_feasible(candidate)
    }

    /// Depth-first expansion from every entry primer. A terminal primer is
    /// joined to SINK and not expanded further. Every entry and every node
    /// is visited once, so no edge is ever pushed twice.
    pub fn build(&self) -> TransitionGraph {
        let mut graph = TransitionGraph::new();
        let mut worklist: Vec<&PrimerCandidate> = Vec::new();

        for entry in self.table.iter().filter(|c| self.is_entry(c)) {
            let (id, is_new) = graph.insert_primer(entry.key, entry.efficiency);
            graph.push_edge(SOURCE, id, entry.efficiency);
            if is_new {
                worklist.push(entry);
            }

            while let Some(current) = worklist.pop() {
                let Some(id) = graph.node_id(&current.key) else {
                    continue;
                };
                if self.is_terminal(current) {
                    graph.push_edge(id, SINK, 0.0);
                    continue;
                }
                let successors = self.rule.successors(&current.key, self.table);
                let mut discovered = Vec::new();
                for next in successors {
                    if !self.is_feasible(next) {
                        continue;
                    }
                    let (next_id, is_new) = graph.insert_primer(next.key, next.efficiency);
                    graph.push_edge(id, next_id, next.efficiency);
                    if is_new {
                        discovered.push(next);
                    }
                }
                // first successor is expanded first
                worklist.extend(discovered.into_iter().rev());
            }
        }
        graph
    }
}

/// Build a target's graph with the tiling rule and thresholds of `params`
pub fn build_transition_graph(
    table: &CandidateTable,
    target_len: usize,
    params: &DesignParams,
) -> TransitionGraph {
    let rule = TilingRule::from_params(params);
    GraphBuilder::new(table, target_len, &params.feasibility, &rule).build()
}
