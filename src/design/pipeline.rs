//! Design workflows: prepare every target, then run the selected strategy

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

use super::error::DesignError;
use super::lp::LpOracle;
use super::optimizer::{
    solve_library_exact, solve_library_greedy, solve_multi_target_exact,
    solve_multi_target_greedy, GreedyStats, PreparedTarget, SequenceOutcome,
};
use super::pairs::{ForbiddenPairFinder, PairSearchConfig};
use super::paths::longest_path;
use super::scoring::ThermoScorer;
use super::targets::TargetSequence;
use super::thermo::ThermoOracle;
use super::types::{DesignMode, DesignParams, ForbiddenPair, GraphSummary, ProgressUpdate};

/// Result of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub name: String,
    pub candidates: usize,
    /// Graph size before any greedy node removal
    pub graph: GraphSummary,
    pub status: String,
    /// One entry per library; single-path modes have exactly one
    pub outcomes: Vec<SequenceOutcome>,
}

/// A forbidden pair with the indices of the targets holding its windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenPairRecord {
    pub first_target: usize,
    pub second_target: usize,
    pub pair: ForbiddenPair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignReport {
    pub mode: DesignMode,
    pub status: String,
    /// Total path score; `None` when no optimal assignment exists
    pub objective: Option<f64>,
    pub targets: Vec<TargetReport>,
    /// Filled by the multi-target exact mode only
    pub forbidden_pairs: Vec<ForbiddenPairRecord>,
    /// Filled by the greedy modes only
    pub greedy: Option<GreedyStats>,
}

impl DesignReport {
    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn resolved_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| !t.outcomes.is_empty() && t.outcomes.iter().all(|o| o.path().is_some()))
            .count()
    }
}

const COMPLETE: &str = "complete";
const PARTIAL: &str = "partial";

/// Run the workflow selected by `params.mode` over `targets`.
///
/// Unreachable sinks, infeasible models and unresolved sequences are
/// recorded per target. Invalid parameters, malformed sequences, oracle
/// failures and worker pool errors abort the run.
pub fn run_design(
    targets: &[TargetSequence],
    params: &DesignParams,
    thermo: &dyn ThermoOracle,
    lp: &dyn LpOracle,
    progress_tx: Option<&Sender<ProgressUpdate>>,
) -> Result<DesignReport, DesignError> {
    params.validate()?;
    if targets.is_empty() {
        return Err(DesignError::InvalidParams("no targets given".to_string()));
    }
    info!(
        "Designing {} target(s): {}",
        targets.len(),
        params.mode.description()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.thread_count.get_count())
        .build()
        .map_err(|e| DesignError::ThreadPool(e.to_string()))?;

    let scorer = ThermoScorer::new(thermo, &params.scoring);
    let mut prepared = pool.install(|| -> Result<Vec<PreparedTarget>, DesignError> {
        let total = targets.len();
        let mut prepared = Vec::with_capacity(total);
        for (i, target) in targets.iter().enumerate() {
            prepared.push(PreparedTarget::build(
                target.clone(),
                params,
                &scorer,
                progress_tx,
            )?);
            if let Some(tx) = progress_tx {
                let _ = tx.send(ProgressUpdate::new("Preparing targets", i + 1, total));
            }
        }
        Ok(prepared)
    })?;

    let mut reports: Vec<TargetReport> = prepared
        .iter()
        .map(|p| TargetReport {
            name: p.target.name.clone(),
            candidates: p.candidates.len(),
            graph: p.graph.summary(),
            status: String::new(),
            outcomes: Vec::new(),
        })
        .collect();

    let mut report = DesignReport {
        mode: params.mode,
        status: String::new(),
        objective: None,
        targets: Vec::new(),
        forbidden_pairs: Vec::new(),
        greedy: None,
    };

    match params.mode {
        DesignMode::SingleLongestPath => {
            let mut total = 0.0;
            for (p, r) in prepared.iter().zip(reports.iter_mut()) {
                match longest_path(&p.graph) {
                    Ok(path) => {
                        total += path.score;
                        r.status = "accepted".to_string();
                        r.outcomes.push(SequenceOutcome::Accepted(path));
                    }
                    Err(e) if e.is_recoverable() => {
                        let e = e.for_target(&p.target.name);
                        warn!("{}", e);
                        r.status = e.to_string();
                        r.outcomes.push(SequenceOutcome::Unresolved);
                    }
                    Err(e) => return Err(e),
                }
            }
            let all = reports.iter().all(|r| r.outcomes.iter().all(|o| o.path().is_some()));
            report.status = if all { COMPLETE } else { PARTIAL }.to_string();
            report.objective = all.then_some(total);
        }

        DesignMode::MultiTargetExact => {
            let finder = ForbiddenPairFinder::new(thermo, PairSearchConfig::from_params(params));
            let pairs = finder.find_all(targets, progress_tx)?;

            let graphs: Vec<_> = prepared.iter().map(|p| &p.graph).collect();
            let solution = solve_multi_target_exact(&graphs, &pairs, params.exclusion_policy, lp);
            if solution.is_optimal() {
                for (r, path) in reports.iter_mut().zip(&solution.paths) {
                    r.status = "accepted".to_string();
                    r.outcomes.push(SequenceOutcome::Accepted(path.clone()));
                }
            } else {
                warn!("No feasible global assignment: {}", solution.status);
                for r in reports.iter_mut() {
                    r.status = solution.status.clone();
                    r.outcomes.push(SequenceOutcome::Unresolved);
                }
            }

            for (t, intra) in pairs.intra.iter().enumerate() {
                report.forbidden_pairs.extend(intra.iter().map(|&pair| ForbiddenPairRecord {
                    first_target: t,
                    second_target: t,
                    pair,
                }));
            }
            for (i, j, inter) in &pairs.inter {
                report.forbidden_pairs.extend(inter.iter().map(|&pair| ForbiddenPairRecord {
                    first_target: *i,
                    second_target: *j,
                    pair,
                }));
            }
            report.forbidden_pairs.sort_by(|a, b| {
                (a.first_target, a.second_target, a.pair).cmp(&(b.first_target, b.second_target, b.pair))
            });

            report.status = solution.status;
            report.objective = solution.objective;
        }

        DesignMode::MultiTargetGreedy => {
            let (outcomes, stats) =
                solve_multi_target_greedy(&mut prepared, thermo, params.cross_hyb_tm)?;
            for (r, outcome) in reports.iter_mut().zip(outcomes) {
                r.status = outcome_status(&outcome).to_string();
                r.outcomes.push(outcome);
            }
            finish_greedy(&mut report, &reports, stats);
        }

        DesignMode::LibraryExact => {
            let mut objective = Some(0.0);
            let mut status = "optimal".to_string();
            for (p, r) in prepared.iter().zip(reports.iter_mut()) {
                let solution = solve_library_exact(
                    &p.target,
                    &p.graph,
                    params.num_libraries,
                    params.allowed_overlap,
                    params.primer_lmax,
                    params.merge_bins,
                    lp,
                );
                objective = objective.zip(solution.objective).map(|(a, b)| a + b);
                r.status = solution.status.clone();
                if solution.is_optimal() {
                    r.outcomes = solution.paths.into_iter().map(SequenceOutcome::Accepted).collect();
                } else {
                    warn!(
                        "{}: {} libraries cannot be tiled ({}); reduce the number of libraries or relax constraints",
                        p.target.name, params.num_libraries, solution.status
                    );
                    status = PARTIAL.to_string();
                    r.outcomes = vec![SequenceOutcome::Unresolved; params.num_libraries];
                }
            }
            report.status = status;
            report.objective = objective;
        }

        DesignMode::LibraryGreedy => {
            let mut stats = GreedyStats::default();
            for (p, r) in prepared.iter_mut().zip(reports.iter_mut()) {
                let (outcomes, target_stats) = solve_library_greedy(
                    p,
                    params.num_libraries,
                    params.allowed_overlap,
                    thermo,
                    params.cross_hyb_tm,
                )?;
                stats.merge(&target_stats);
                let resolved = outcomes.iter().filter(|o| o.path().is_some()).count();
                r.status = if resolved == outcomes.len() {
                    "accepted".to_string()
                } else {
                    format!("{}/{} libraries resolved", resolved, outcomes.len())
                };
                r.outcomes = outcomes;
            }
            finish_greedy(&mut report, &reports, stats);
        }
    }

    report.targets = reports;
    info!(
        "Design finished: {} ({}/{} targets resolved)",
        report.status,
        report.resolved_count(),
        report.targets.len()
    );
    Ok(report)
}

fn outcome_status(outcome: &SequenceOutcome) -> &'static str {
    match outcome {
        SequenceOutcome::Accepted(_) => "accepted",
        SequenceOutcome::Unresolved => "unresolved",
    }
}

fn finish_greedy(report: &mut DesignReport, targets: &[TargetReport], stats: GreedyStats) {
    let mut total = 0.0;
    let mut all = true;
    for outcome in targets.iter().flat_map(|t| &t.outcomes) {
        match outcome.path() {
            Some(path) => total += path.score,
            None => all = false,
        }
    }
    report.status = if all { COMPLETE } else { PARTIAL }.to_string();
    report.objective = all.then_some(total);
    report.greedy = Some(stats);
}
