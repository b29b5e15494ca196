//! Path selection across targets and libraries
//!
//! Exact strategies turn the transition graphs into a 0/1 program (one
//! variable per edge, flow conservation, mutual exclusion) and hand it to an
//! [`LpOracle`]. Greedy strategies take the best path of each graph in turn
//! and remove primers that cross-hybridize with those already accepted.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc::Sender;

use super::candidates::{enumerate_target, CandidateTable};
use super::error::DesignError;
use super::graph::{build_transition_graph, NodeId, TransitionGraph, SINK, SOURCE};
use super::lp::{BinaryProgram, LpOracle, LpOutcome, Relation};
use super::pairs::PairSets;
use super::paths::{longest_path, remove_colliding_nodes};
use super::scoring::ThermoScorer;
use super::targets::TargetSequence;
use super::thermo::ThermoOracle;
use super::types::{
    DesignParams, ExclusionPolicy, ForbiddenPair, Path, PrimerKey, ProgressUpdate, Span, Strand,
};

/// A target with its scored candidates and transition graph
#[derive(Debug, Clone)]
pub struct PreparedTarget {
    pub target: TargetSequence,
    pub candidates: CandidateTable,
    pub graph: TransitionGraph,
}

impl PreparedTarget {
    pub fn build(
        target: TargetSequence,
        params: &DesignParams,
        scorer: &ThermoScorer,
        progress_tx: Option<&Sender<ProgressUpdate>>,
    ) -> Result<Self, DesignError> {
        let candidates = enumerate_target(
            &target,
            params.primer_lmin,
            params.primer_lmax,
            scorer,
            progress_tx,
        )?;
        let graph = build_transition_graph(&candidates, target.target_len(), params);
        info!(
            "Target {}: {} candidates, graph with {} nodes and {} edges",
            target.name,
            candidates.len(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self {
            target,
            candidates,
            graph,
        })
    }

    pub fn primer_sequence(&self, key: &PrimerKey) -> Option<&str> {
        self.candidates.get(key).map(|c| c.sequence.as_str())
    }
}

// ── Exact strategies ────────────────────────────────────────────────────────

/// Outcome of an exact solve. `objective` is `None` unless the status is
/// optimal, in which case `paths` holds one path per target (or per library).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactSolution {
    pub status: String,
    pub objective: Option<f64>,
    pub paths: Vec<Path>,
    pub num_variables: usize,
    pub num_constraints: usize,
}

impl ExactSolution {
    pub fn is_optimal(&self) -> bool {
        self.objective.is_some()
    }

    pub fn into_result(self) -> Result<Vec<Path>, DesignError> {
        if self.is_optimal() {
            Ok(self.paths)
        } else {
            Err(DesignError::InfeasibleModel {
                status: self.status,
            })
        }
    }
}

/// Edge variables of one graph inside a program
#[derive(Debug, Default)]
struct FlowVariables {
    /// (from, to, weight, variable) in graph edge order
    edges: Vec<(NodeId, NodeId, f64, usize)>,
    outflow: HashMap<NodeId, Vec<usize>>,
}

impl FlowVariables {
    /// One variable per live edge plus conservation constraints carrying
    /// `supply` units from SOURCE to SINK
    fn add(program: &mut BinaryProgram, graph: &TransitionGraph, supply: f64, label: &str) -> Self {
        let mut vars = FlowVariables::default();
        let mut inflow: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (from, e) in graph.all_edges() {
            let var = program.add_variable(e.weight);
            vars.edges.push((from, e.to, e.weight, var));
            vars.outflow.entry(from).or_default().push(var);
            inflow.entry(e.to).or_default().push(var);
        }

        let nodes = [SOURCE, SINK]
            .into_iter()
            .chain(graph.primers().map(|(id, _)| id));
        for node in nodes {
            let mut terms: Vec<(usize, f64)> = Vec::new();
            if let Some(out) = vars.outflow.get(&node) {
                terms.extend(out.iter().map(|&v| (v, 1.0)));
            }
            if let Some(inc) = inflow.get(&node) {
                terms.extend(inc.iter().map(|&v| (v, -1.0)));
            }
            let rhs = match node {
                SOURCE => supply,
                SINK => -supply,
                _ => 0.0,
            };
            if terms.is_empty() && rhs == 0.0 {
                continue;
            }
            program.add_constraint(format!("flow_{}_{}", label, node), terms, Relation::Eq, rhs);
        }
        vars
    }

    fn outflow_of(&self, graph: &TransitionGraph, key: &PrimerKey) -> &[usize] {
        graph
            .node_id(key)
            .and_then(|id| self.outflow.get(&id))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn window_outflow(&self, graph: &TransitionGraph, span: Span) -> Vec<usize> {
        Strand::BOTH
            .iter()
            .flat_map(|&s| self.outflow_of(graph, &span.key(s)).iter().copied())
            .collect()
    }

    /// Split the chosen edges into SOURCE-to-SINK paths
    fn decompose(&self, graph: &TransitionGraph, assignment: &[bool], count: usize) -> Vec<Path> {
        let mut remaining: HashMap<NodeId, Vec<(NodeId, f64)>> = HashMap::new();
        for &(from, to, weight, var) in &self.edges {
            if assignment.get(var).copied().unwrap_or(false) {
                remaining.entry(from).or_default().push((to, weight));
            }
        }
        for out in remaining.values_mut() {
            out.reverse();
        }

        let mut paths = Vec::with_capacity(count);
        for _ in 0..count {
            let mut primers = Vec::new();
            let mut score = 0.0;
            let mut node = SOURCE;
            while node != SINK {
                let Some((next, weight)) = remaining.get_mut(&node).and_then(|out| out.pop()) else {
                    break;
                };
                score += weight;
                if let Some(key) = graph.key(next) {
                    primers.push(key);
                }
                node = next;
            }
            if node != SINK {
                break;
            }
            paths.push(Path { primers, score });
        }
        paths
    }
}

fn add_exclusion(
    program: &mut BinaryProgram,
    policy: ExclusionPolicy,
    left: (&TransitionGraph, &FlowVariables),
    right: (&TransitionGraph, &FlowVariables),
    pair: &ForbiddenPair,
    name: &str,
) {
    match policy {
        ExclusionPolicy::AllOrientations => {
            let a = left.1.window_outflow(left.0, pair.first);
            let b = right.1.window_outflow(right.0, pair.second);
            if a.is_empty() || b.is_empty() {
                return;
            }
            let terms = a.into_iter().chain(b).map(|v| (v, 1.0)).collect();
            program.add_constraint(name, terms, Relation::Le, 1.0);
        }
        ExclusionPolicy::PerOrientation => {
            // same-orientation primers carry the two texts that were found to pair
            for strand in Strand::BOTH {
                let a = left.1.outflow_of(left.0, &pair.first.key(strand));
                let b = right.1.outflow_of(right.0, &pair.second.key(strand));
                if a.is_empty() || b.is_empty() {
                    continue;
                }
                let terms = a.iter().chain(b).map(|&v| (v, 1.0)).collect();
                program.add_constraint(
                    format!("{}_{}", name, strand.symbol()),
                    terms,
                    Relation::Le,
                    1.0,
                );
            }
        }
    }
}

fn sorted_pairs(pairs: &HashSet<ForbiddenPair>) -> Vec<&ForbiddenPair> {
    let mut sorted: Vec<&ForbiddenPair> = pairs.iter().collect();
    sorted.sort();
    sorted
}

fn finish_exact(
    program: &BinaryProgram,
    outcome: LpOutcome,
    reconstruct: impl FnOnce(&[bool]) -> Vec<Path>,
) -> ExactSolution {
    let status = outcome.status().to_string();
    let (objective, paths) = match outcome {
        LpOutcome::Optimal {
            assignment,
            objective,
        } => (Some(objective), reconstruct(&assignment)),
        LpOutcome::Infeasible | LpOutcome::Other(_) => (None, Vec::new()),
    };
    info!(
        "Exact model with {} variables and {} constraints: {}",
        program.num_variables(),
        program.num_constraints(),
        status
    );
    ExactSolution {
        status,
        objective,
        paths,
        num_variables: program.num_variables(),
        num_constraints: program.num_constraints(),
    }
}

/// One path per graph, no two chosen primers forming a forbidden pair.
///
/// `pairs.intra[t]` applies to graph `t`; `pairs.inter` entries `(i, j, _)`
/// have their first window in graph `i` and second in graph `j`.
pub fn solve_multi_target_exact(
    graphs: &[&TransitionGraph],
    pairs: &PairSets,
    policy: ExclusionPolicy,
    lp: &dyn LpOracle,
) -> ExactSolution {
    let mut program = BinaryProgram::new();
    let flows: Vec<FlowVariables> = graphs
        .iter()
        .enumerate()
        .map(|(t, g)| FlowVariables::add(&mut program, g, 1.0, &t.to_string()))
        .collect();

    for (t, intra) in pairs.intra.iter().enumerate().take(graphs.len()) {
        for (n, pair) in sorted_pairs(intra).into_iter().enumerate() {
            let side = (graphs[t], &flows[t]);
            add_exclusion(&mut program, policy, side, side, pair, &format!("intra_{}_{}", t, n));
        }
    }
    for (i, j, inter) in &pairs.inter {
        if *i >= graphs.len() || *j >= graphs.len() {
            continue;
        }
        for (n, pair) in sorted_pairs(inter).into_iter().enumerate() {
            add_exclusion(
                &mut program,
                policy,
                (graphs[*i], &flows[*i]),
                (graphs[*j], &flows[*j]),
                pair,
                &format!("inter_{}_{}_{}", i, j, n),
            );
        }
    }

    let outcome = lp.solve(&program);
    finish_exact(&program, outcome, |assignment| {
        graphs
            .iter()
            .zip(&flows)
            .flat_map(|(g, f)| f.decompose(g, assignment, 1))
            .collect()
    })
}

/// `libraries` tilings of one target. Every same-strand sub-window of length
/// `allowed_overlap + 1 ..= primer_lmax` is covered by at most one chosen
/// primer; with `merge_bins` sub-windows with identical text share one bin.
pub fn solve_library_exact(
    target: &TargetSequence,
    graph: &TransitionGraph,
    libraries: usize,
    allowed_overlap: i64,
    primer_lmax: usize,
    merge_bins: bool,
    lp: &dyn LpOracle,
) -> ExactSolution {
    let mut program = BinaryProgram::new();
    let flow = FlowVariables::add(&mut program, graph, libraries as f64, "lib");

    let min_bin = (allowed_overlap + 1).max(1);
    let max_bin = primer_lmax as i64;
    let mut bins: BTreeMap<(i64, i64, Strand), Vec<NodeId>> = BTreeMap::new();
    for (id, key) in graph.primers() {
        for bin_start in key.start..key.end {
            for len in min_bin..=max_bin {
                let bin_end = bin_start + len;
                if bin_end > key.end {
                    break;
                }
                bins.entry((bin_start, bin_end, key.strand)).or_default().push(id);
            }
        }
    }

    let groups: Vec<Vec<NodeId>> = if merge_bins {
        let mut merged: BTreeMap<(String, Strand), Vec<NodeId>> = BTreeMap::new();
        for ((start, end, strand), nodes) in bins {
            let Ok(text) = target.window(Span::new(start, end)) else {
                continue;
            };
            merged
                .entry((text.to_string(), strand))
                .or_default()
                .extend(nodes);
        }
        merged
            .into_values()
            .map(|mut nodes| {
                nodes.sort_unstable();
                nodes.dedup();
                nodes
            })
            .collect()
    } else {
        bins.into_values().collect()
    };
    debug!("Library model: {} bin constraints", groups.len());

    for (n, nodes) in groups.iter().enumerate() {
        let terms: Vec<(usize, f64)> = nodes
            .iter()
            .filter_map(|id| flow.outflow.get(id))
            .flatten()
            .map(|&v| (v, 1.0))
            .collect();
        if terms.is_empty() {
            continue;
        }
        program.add_constraint(format!("bin_{}", n), terms, Relation::Le, 1.0);
    }

    let outcome = lp.solve(&program);
    finish_exact(&program, outcome, |assignment| {
        flow.decompose(graph, assignment, libraries)
    })
}

// ── Greedy strategies ───────────────────────────────────────────────────────

/// States of the per-sequence greedy repair loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreedyState {
    Building,
    CandidatePath,
    ConflictDetected,
    NodeRemoved,
    NoConflict,
    Accepted,
    NoPath,
    Unresolved,
}

/// Greedy result for one sequence (or one library)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceOutcome {
    Accepted(Path),
    /// Every candidate path conflicted with accepted primers
    Unresolved,
}

impl SequenceOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Accepted(path) => Some(path),
            Self::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreedyStats {
    /// Primers found to cross-hybridize with an accepted primer
    pub cross_hybridizations: usize,
    /// Sequences that needed more than one candidate path
    pub reiterated_targets: usize,
    pub total_reiterations: usize,
}

impl GreedyStats {
    pub fn merge(&mut self, other: &GreedyStats) {
        self.cross_hybridizations += other.cross_hybridizations;
        self.reiterated_targets += other.reiterated_targets;
        self.total_reiterations += other.total_reiterations;
    }
}

/// Accepted primer texts shared by successive greedy resolutions
pub struct GreedyRepair<'a> {
    oracle: &'a dyn ThermoOracle,
    threshold: f64,
    accepted: Vec<String>,
    stats: GreedyStats,
}

impl<'a> GreedyRepair<'a> {
    pub fn new(oracle: &'a dyn ThermoOracle, threshold: f64) -> Self {
        Self {
            oracle,
            threshold,
            accepted: Vec::new(),
            stats: GreedyStats::default(),
        }
    }

    pub fn accepted_primers(&self) -> &[String] {
        &self.accepted
    }

    pub fn stats(&self) -> &GreedyStats {
        &self.stats
    }

    fn conflicts(&self, seq: &str, earlier: &[&str]) -> Result<bool, DesignError> {
        for other in self.accepted.iter().map(|s| s.as_str()).chain(earlier.iter().copied()) {
            if self.oracle.melting_temperature(other, seq)? >= self.threshold {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Repeat best path / conflict check / node removal on `prepared` until
    /// a path has no conflicting primer or no path is left.
    pub fn resolve(
        &mut self,
        label: &str,
        prepared: &mut PreparedTarget,
    ) -> Result<SequenceOutcome, DesignError> {
        let mut state = GreedyState::Building;
        let mut iterations = 0usize;

        let outcome = loop {
            if iterations > 0 {
                self.stats.total_reiterations += 1;
            }
            iterations += 1;

            let path = match longest_path(&prepared.graph) {
                Ok(path) => path,
                Err(_) => {
                    step(label, &mut state, GreedyState::NoPath);
                    step(label, &mut state, GreedyState::Unresolved);
                    warn!("{}: no conflict-free path, left unresolved", label);
                    break SequenceOutcome::Unresolved;
                }
            };
            step(label, &mut state, GreedyState::CandidatePath);

            let mut texts: Vec<&str> = Vec::with_capacity(path.len());
            for key in &path.primers {
                let text = prepared.primer_sequence(key).ok_or_else(|| {
                    DesignError::malformed(format!("{}: primer {} missing from candidates", label, key))
                })?;
                texts.push(text);
            }

            let mut violating: Vec<PrimerKey> = Vec::new();
            for (i, (key, text)) in path.primers.iter().zip(&texts).enumerate() {
                if self.conflicts(text, &texts[..i])? {
                    violating.push(*key);
                }
            }

            if violating.is_empty() {
                step(label, &mut state, GreedyState::NoConflict);
                self.accepted.extend(texts.iter().map(|t| t.to_string()));
                step(label, &mut state, GreedyState::Accepted);
                break SequenceOutcome::Accepted(path);
            }

            step(label, &mut state, GreedyState::ConflictDetected);
            self.stats.cross_hybridizations += violating.len();
            prepared.graph.remove_nodes(&violating);
            step(label, &mut state, GreedyState::NodeRemoved);
        };

        if iterations > 1 {
            self.stats.reiterated_targets += 1;
        }
        Ok(outcome)
    }
}

fn step(label: &str, state: &mut GreedyState, next: GreedyState) {
    debug!("{}: {:?} -> {:?}", label, state, next);
    *state = next;
}

/// One conflict-free path per target, targets processed in order
pub fn solve_multi_target_greedy(
    targets: &mut [PreparedTarget],
    oracle: &dyn ThermoOracle,
    threshold: f64,
) -> Result<(Vec<SequenceOutcome>, GreedyStats), DesignError> {
    let mut repair = GreedyRepair::new(oracle, threshold);
    let mut outcomes = Vec::with_capacity(targets.len());
    for prepared in targets.iter_mut() {
        let label = prepared.target.name.clone();
        outcomes.push(repair.resolve(&label, prepared)?);
    }
    let stats = repair.stats().clone();
    info!(
        "Greedy selection: {}/{} targets resolved, {} cross-hybridizations, {} re-iterations",
        outcomes.iter().filter(|o| o.path().is_some()).count(),
        outcomes.len(),
        stats.cross_hybridizations,
        stats.total_reiterations
    );
    Ok((outcomes, stats))
}

/// `libraries` tilings of one target: before each round, drop the nodes that
/// collide with the previous library, then resolve conflicts against every
/// primer accepted so far. Rounds after the first unresolved one are
/// reported unresolved.
pub fn solve_library_greedy(
    prepared: &mut PreparedTarget,
    libraries: usize,
    allowed_overlap: i64,
    oracle: &dyn ThermoOracle,
    threshold: f64,
) -> Result<(Vec<SequenceOutcome>, GreedyStats), DesignError> {
    let mut repair = GreedyRepair::new(oracle, threshold);
    let mut outcomes: Vec<SequenceOutcome> = Vec::with_capacity(libraries);

    for round in 0..libraries {
        if let Some(SequenceOutcome::Accepted(previous)) = outcomes.last() {
            remove_colliding_nodes(&mut prepared.graph, &previous.primers, allowed_overlap);
        }
        let label = format!("{} library {}", prepared.target.name, round + 1);
        let outcome = repair.resolve(&label, prepared)?;
        let unresolved = outcome == SequenceOutcome::Unresolved;
        outcomes.push(outcome);
        if unresolved {
            warn!(
                "{}: no feasible tiling for library {}; reduce the number of libraries or relax constraints",
                prepared.target.name,
                round + 1
            );
            break;
        }
    }
    outcomes.resize(libraries, SequenceOutcome::Unresolved);
    Ok((outcomes, repair.stats().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::candidates::PrimerCandidate;
    use crate::design::lp::BranchAndBound;
    use crate::design::scoring::ScoreFeatures;
    use crate::design::types::Flanks;
    use approx::assert_relative_eq;

    /// Duplex Tm of 100 for identical texts, 0 otherwise
    struct IdentityOracle;

    impl ThermoOracle for IdentityOracle {
        fn melting_temperature(&self, a: &str, b: &str) -> Result<f64, DesignError> {
            Ok(if a == b { 100.0 } else { 0.0 })
        }
        fn hairpin_temperature(&self, _seq: &str) -> Result<f64, DesignError> {
            Ok(0.0)
        }
        fn end_stability(&self, _seq: &str) -> Result<f64, DesignError> {
            Ok(-8.0)
        }
    }

    fn key(start: i64, end: i64, strand: Strand) -> PrimerKey {
        PrimerKey::new(start, end, strand)
    }

    /// Builds a graph and candidate table from (key, text, efficiency)
    /// primers and (from, to) edges given as primer indices; `None` stands
    /// for SOURCE as origin and SINK as destination.
    fn prepared(
        name: &str,
        primers: &[(PrimerKey, &str, f64)],
        edges: &[(Option<usize>, Option<usize>)],
    ) -> PreparedTarget {
        let mut graph = TransitionGraph::new();
        let ids: Vec<NodeId> = primers
            .iter()
            .map(|(k, _, eff)| graph.insert_primer(*k, *eff).0)
            .collect();
        for &(from, to) in edges {
            let from_id = from.map(|i| ids[i]).unwrap_or(SOURCE);
            let (to_id, weight) = match to {
                Some(i) => (ids[i], primers[i].2),
                None => (SINK, 0.0),
            };
            graph.add_edge(from_id, to_id, weight);
        }
        let candidates = CandidateTable::from_candidates(
            primers
                .iter()
                .map(|(k, text, eff)| PrimerCandidate {
                    key: *k,
                    sequence: text.to_string(),
                    efficiency: *eff,
                    features: ScoreFeatures::default(),
                })
                .collect(),
        );
        let target =
            TargetSequence::new(name, "ACGTACGTACGTACGTACGTACGTACGTAC", &Flanks::new("TTGCATTGCA", "GGATCCGGAT"))
                .unwrap();
        PreparedTarget {
            target,
            candidates,
            graph,
        }
    }

    fn first_target() -> PreparedTarget {
        prepared(
            "first",
            &[
                (key(-10, -5, Strand::Forward), "AAA", 0.9),
                (key(10, 15, Strand::Reverse), "CCC", 0.9),
            ],
            &[(None, Some(0)), (Some(0), Some(1)), (Some(1), None)],
        )
    }

    fn second_target() -> PreparedTarget {
        prepared(
            "second",
            &[
                (key(-10, -5, Strand::Forward), "AAA", 0.9),
                (key(-8, -3, Strand::Forward), "TTT", 0.5),
                (key(12, 17, Strand::Reverse), "GGG", 0.8),
            ],
            &[
                (None, Some(0)),
                (None, Some(1)),
                (Some(0), Some(2)),
                (Some(1), Some(2)),
                (Some(2), None),
            ],
        )
    }

    fn inter_pairs(pairs: Vec<ForbiddenPair>) -> PairSets {
        PairSets {
            intra: vec![HashSet::new(), HashSet::new()],
            inter: vec![(0, 1, pairs.into_iter().collect())],
        }
    }

    #[test]
    fn test_greedy_reroutes_around_conflicts() {
        let mut targets = vec![first_target(), second_target()];
        let (outcomes, stats) = solve_multi_target_greedy(&mut targets, &IdentityOracle, 45.0).unwrap();
        assert_eq!(
            outcomes[0].path().unwrap().primers,
            vec![key(-10, -5, Strand::Forward), key(10, 15, Strand::Reverse)]
        );
        assert_eq!(
            outcomes[1].path().unwrap().primers,
            vec![key(-8, -3, Strand::Forward), key(12, 17, Strand::Reverse)]
        );
        assert_eq!(
            stats,
            GreedyStats {
                cross_hybridizations: 1,
                reiterated_targets: 1,
                total_reiterations: 1,
            }
        );
    }

    #[test]
    fn test_greedy_accepted_set_has_no_conflicts() {
        let third = prepared(
            "third",
            &[(key(-6, -1, Strand::Forward), "CCC", 0.9)],
            &[(None, Some(0)), (Some(0), None)],
        );
        let mut targets = vec![first_target(), second_target(), third];
        let oracle = IdentityOracle;
        let mut repair = GreedyRepair::new(&oracle, 45.0);
        let mut outcomes = Vec::new();
        for t in targets.iter_mut() {
            let label = t.target.name.clone();
            outcomes.push(repair.resolve(&label, t).unwrap());
        }
        assert_eq!(outcomes[2], SequenceOutcome::Unresolved);

        let accepted = repair.accepted_primers();
        for i in 0..accepted.len() {
            for j in (i + 1)..accepted.len() {
                assert!(oracle.melting_temperature(&accepted[i], &accepted[j]).unwrap() < 45.0);
            }
        }
    }

    #[test]
    fn test_greedy_checks_primers_within_one_path() {
        let mut target = prepared(
            "repeat",
            &[
                (key(-10, -5, Strand::Forward), "ACG", 0.9),
                (key(5, 10, Strand::Reverse), "TTG", 0.9),
                (key(6, 11, Strand::Forward), "ACG", 0.9),
                (key(20, 25, Strand::Reverse), "GGC", 0.9),
                (key(8, 13, Strand::Forward), "CAT", 0.2),
            ],
            &[
                (None, Some(0)),
                (Some(0), Some(1)),
                (Some(1), Some(2)),
                (Some(1), Some(4)),
                (Some(2), Some(3)),
                (Some(4), Some(3)),
                (Some(3), None),
            ],
        );
        let (outcomes, _) =
            solve_library_greedy(&mut target, 1, 0, &IdentityOracle, 45.0).unwrap();
        let path = outcomes[0].path().unwrap();
        assert!(path.primers.contains(&key(8, 13, Strand::Forward)));
        assert!(!path.primers.contains(&key(6, 11, Strand::Forward)));
    }

    #[test]
    fn test_exact_avoids_inter_forbidden_pair() {
        let a = first_target();
        let b = second_target();
        let pairs = inter_pairs(vec![ForbiddenPair::new(
            Span::new(-10, -5),
            Span::new(-10, -5),
        )]);
        let solution = solve_multi_target_exact(
            &[&a.graph, &b.graph],
            &pairs,
            ExclusionPolicy::AllOrientations,
            &BranchAndBound::default(),
        );
        assert_eq!(solution.status, "optimal");
        assert_relative_eq!(solution.objective.unwrap(), 3.1, epsilon = 1e-9);
        assert_eq!(
            solution.paths[1].primers,
            vec![key(-8, -3, Strand::Forward), key(12, 17, Strand::Reverse)]
        );
        assert_relative_eq!(solution.paths[0].score, 1.8, epsilon = 1e-9);
    }

    #[test]
    fn test_exact_reports_infeasible_without_objective() {
        let a = first_target();
        let b = second_target();
        let pairs = inter_pairs(vec![
            ForbiddenPair::new(Span::new(-10, -5), Span::new(-10, -5)),
            ForbiddenPair::new(Span::new(-10, -5), Span::new(-8, -3)),
        ]);
        let solution = solve_multi_target_exact(
            &[&a.graph, &b.graph],
            &pairs,
            ExclusionPolicy::AllOrientations,
            &BranchAndBound::default(),
        );
        assert_eq!(solution.objective, None);
        assert!(solution.paths.is_empty());
        assert_eq!(
            solution.into_result(),
            Err(DesignError::InfeasibleModel {
                status: "infeasible".to_string()
            })
        );
    }

    #[test]
    fn test_orientation_policy_changes_exclusions() {
        let a = first_target();
        let b = second_target();
        // forward primer of the first target against the reverse primer of the second
        let pairs = inter_pairs(vec![ForbiddenPair::new(
            Span::new(-10, -5),
            Span::new(12, 17),
        )]);
        let all = solve_multi_target_exact(
            &[&a.graph, &b.graph],
            &pairs,
            ExclusionPolicy::AllOrientations,
            &BranchAndBound::default(),
        );
        assert!(!all.is_optimal());

        let per = solve_multi_target_exact(
            &[&a.graph, &b.graph],
            &pairs,
            ExclusionPolicy::PerOrientation,
            &BranchAndBound::default(),
        );
        assert!(per.is_optimal());
        assert_eq!(per.paths.len(), 2);
    }

    #[test]
    fn test_exact_paths_form_single_chains() {
        let a = first_target();
        let b = second_target();
        let pairs = inter_pairs(Vec::new());
        let solution = solve_multi_target_exact(
            &[&a.graph, &b.graph],
            &pairs,
            ExclusionPolicy::AllOrientations,
            &BranchAndBound::default(),
        );
        let paths = solution.into_result().unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].primers[0], key(-10, -5, Strand::Forward));
        for (path, graph) in paths.iter().zip([&a.graph, &b.graph]) {
            let mut node = SOURCE;
            for k in &path.primers {
                let next = graph.node_id(k).unwrap();
                assert!(graph.edges(node).any(|e| e.to == next));
                node = next;
            }
            assert!(graph.edges(node).any(|e| e.to == SINK));
        }
    }

    fn library_target() -> PreparedTarget {
        prepared(
            "library",
            &[
                (key(-10, -5, Strand::Forward), "AAA", 0.9),
                (key(-5, 0, Strand::Forward), "CCC", 0.8),
                (key(10, 15, Strand::Reverse), "GGG", 0.9),
                (key(20, 25, Strand::Reverse), "TTT", 0.7),
            ],
            &[
                (None, Some(0)),
                (None, Some(1)),
                (Some(0), Some(2)),
                (Some(0), Some(3)),
                (Some(1), Some(2)),
                (Some(1), Some(3)),
                (Some(2), None),
                (Some(3), None),
            ],
        )
    }

    #[test]
    fn test_library_exact_finds_disjoint_tilings() {
        let t = library_target();
        let solution = solve_library_exact(&t.target, &t.graph, 2, 0, 5, false, &BranchAndBound::default());
        assert_relative_eq!(solution.objective.unwrap(), 3.3, epsilon = 1e-9);
        assert_eq!(solution.paths.len(), 2);
        assert_eq!(
            solution.paths[0].primers,
            vec![key(-10, -5, Strand::Forward), key(10, 15, Strand::Reverse)]
        );
        assert_eq!(
            solution.paths[1].primers,
            vec![key(-5, 0, Strand::Forward), key(20, 25, Strand::Reverse)]
        );

        let too_many = solve_library_exact(&t.target, &t.graph, 3, 0, 5, false, &BranchAndBound::default());
        assert_eq!(too_many.status, "infeasible");
    }

    #[test]
    fn test_merged_bins_exclude_identical_text() {
        let t = library_target();
        // both forward windows read TTGCA in the upstream flank
        let solution = solve_library_exact(&t.target, &t.graph, 2, 0, 5, true, &BranchAndBound::default());
        assert!(!solution.is_optimal());
    }

    #[test]
    fn test_library_greedy_removes_colliding_nodes() {
        let mut t = library_target();
        let (outcomes, stats) = solve_library_greedy(&mut t, 3, 0, &IdentityOracle, 45.0).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0].path().unwrap().primers,
            vec![key(-10, -5, Strand::Forward), key(10, 15, Strand::Reverse)]
        );
        assert_eq!(
            outcomes[1].path().unwrap().primers,
            vec![key(-5, 0, Strand::Forward), key(20, 25, Strand::Reverse)]
        );
        assert_eq!(outcomes[2], SequenceOutcome::Unresolved);
        assert_eq!(stats.cross_hybridizations, 0);
    }
}
