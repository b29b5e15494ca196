//! 0/1 linear programs and the solver interface used by the exact strategies

use good_lp::solvers::microlp::microlp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use log::debug;
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Le,
    Eq,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub name: String,
    /// (variable, coefficient)
    pub terms: Vec<(usize, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn is_satisfied(&self, assignment: &[bool]) -> bool {
        let lhs: f64 = self
            .terms
            .iter()
            .filter(|(v, _)| assignment.get(*v).copied().unwrap_or(false))
            .map(|(_, a)| a)
            .sum();
        match self.relation {
            Relation::Le => lhs <= self.rhs + EPS,
            Relation::Ge => lhs >= self.rhs - EPS,
            Relation::Eq => (lhs - self.rhs).abs() <= EPS,
        }
    }
}

/// Binary variables, linear constraints, maximised linear objective
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaryProgram {
    objective: Vec<f64>,
    constraints: Vec<LinearConstraint>,
}

impl BinaryProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable with its objective coefficient; returns its index
    pub fn add_variable(&mut self, weight: f64) -> usize {
        self.objective.push(weight);
        self.objective.len() - 1
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(usize, f64)>,
        relation: Relation,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            terms,
            relation,
            rhs,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.objective.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn evaluate(&self, assignment: &[bool]) -> f64 {
        self.objective
            .iter()
            .zip(assignment)
            .filter(|(_, &x)| x)
            .map(|(w, _)| w)
            .sum()
    }

    pub fn is_feasible(&self, assignment: &[bool]) -> bool {
        assignment.len() == self.objective.len()
            && self.constraints.iter().all(|c| c.is_satisfied(assignment))
    }
}

/// Result of one solver call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LpOutcome {
    Optimal { assignment: Vec<bool>, objective: f64 },
    Infeasible,
    /// Any other termination (limits, numerical trouble, solver errors)
    Other(String),
}

impl LpOutcome {
    pub fn status(&self) -> &str {
        match self {
            Self::Optimal { .. } => "optimal",
            Self::Infeasible => "infeasible",
            Self::Other(reason) => reason,
        }
    }
}

/// Synchronous 0/1 LP solver
pub trait LpOracle {
    fn solve(&self, program: &BinaryProgram) -> LpOutcome;
}

/// Sparse simplex with integer branch and bound, from `microlp` through
/// `good_lp`. This is the solver for full-size tiling models.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLp;

impl LpOracle for MicroLp {
    fn solve(&self, program: &BinaryProgram) -> LpOutcome {
        let n = program.num_variables();
        if n == 0 {
            return if program.is_feasible(&[]) {
                LpOutcome::Optimal {
                    assignment: Vec::new(),
                    objective: 0.0,
                }
            } else {
                LpOutcome::Infeasible
            };
        }
        debug!(
            "microlp model: {} variables, {} constraints",
            n,
            program.num_constraints()
        );

        let mut vars = ProblemVariables::new();
        let x: Vec<Variable> = (0..n).map(|_| vars.add(variable().binary())).collect();
        let objective: Expression = program
            .objective()
            .iter()
            .zip(&x)
            .map(|(&w, &v)| w * v)
            .sum();
        let mut model = vars.maximise(objective).using(microlp);

        for c in program.constraints() {
            let terms: Vec<(usize, f64)> =
                c.terms.iter().copied().filter(|&(v, _)| v < n).collect();
            if terms.is_empty() {
                // nothing to decide; the constant side alone settles it
                if !c.is_satisfied(&[]) {
                    return LpOutcome::Infeasible;
                }
                continue;
            }
            let lhs: Expression = terms.iter().map(|&(v, a)| a * x[v]).sum();
            model = model.with(match c.relation {
                Relation::Le => constraint::leq(lhs, c.rhs),
                Relation::Eq => constraint::eq(lhs, c.rhs),
                Relation::Ge => constraint::geq(lhs, c.rhs),
            });
        }

        match model.solve() {
            Ok(solution) => {
                let assignment: Vec<bool> = x.iter().map(|&v| solution.value(v) > 0.5).collect();
                if !program.is_feasible(&assignment) {
                    return LpOutcome::Other(
                        "solver returned an assignment outside the model".to_string(),
                    );
                }
                let objective = program.evaluate(&assignment);
                LpOutcome::Optimal {
                    assignment,
                    objective,
                }
            }
            Err(ResolutionError::Infeasible) => LpOutcome::Infeasible,
            Err(e) => LpOutcome::Other(e.to_string()),
        }
    }
}

/// Depth-first branch and bound over the variables in index order.
///
/// Each constraint tracks the sum of its fixed terms and the range still
/// reachable by its free terms; a branch is cut as soon as some constraint
/// can no longer be met or the objective cannot beat the incumbent. The
/// bound is weak, so this is only practical for programs of a few dozen
/// variables; ties resolve towards setting lower-indexed variables.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    pub node_limit: u64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            node_limit: 5_000_000,
        }
    }
}

struct SearchState<'p> {
    program: &'p BinaryProgram,
    /// Per variable: (constraint, coefficient)
    occurrences: Vec<Vec<(usize, f64)>>,
    fixed: Vec<f64>,
    free_min: Vec<f64>,
    free_max: Vec<f64>,
    /// Sum of positive objective coefficients of free variables
    free_gain: f64,
    current: Vec<bool>,
    value: f64,
    best: Option<(Vec<bool>, f64)>,
    nodes: u64,
    node_limit: u64,
}

impl<'p> SearchState<'p> {
    fn new(program: &'p BinaryProgram, node_limit: u64) -> Self {
        let n = program.num_variables();
        let m = program.num_constraints();
        let mut occurrences = vec![Vec::new(); n];
        let mut free_min = vec![0.0; m];
        let mut free_max = vec![0.0; m];
        for (c, constraint) in program.constraints().iter().enumerate() {
            for &(v, a) in &constraint.terms {
                if v < n {
                    occurrences[v].push((c, a));
                    free_min[c] += a.min(0.0);
                    free_max[c] += a.max(0.0);
                }
            }
        }
        Self {
            program,
            occurrences,
            fixed: vec![0.0; m],
            free_min,
            free_max,
            free_gain: program.objective().iter().map(|w| w.max(0.0)).sum(),
            current: vec![false; n],
            value: 0.0,
            best: None,
            nodes: 0,
            node_limit,
        }
    }

    fn viable(&self, c: usize) -> bool {
        let constraint = &self.program.constraints()[c];
        let lo = self.fixed[c] + self.free_min[c];
        let hi = self.fixed[c] + self.free_max[c];
        match constraint.relation {
            Relation::Le => lo <= constraint.rhs + EPS,
            Relation::Ge => hi >= constraint.rhs - EPS,
            Relation::Eq => lo <= constraint.rhs + EPS && hi >= constraint.rhs - EPS,
        }
    }

    fn assign(&mut self, v: usize, x: bool) -> bool {
        let w = self.program.objective()[v];
        self.free_gain -= w.max(0.0);
        if x {
            self.value += w;
        }
        self.current[v] = x;
        let mut ok = true;
        for i in 0..self.occurrences[v].len() {
            let (c, a) = self.occurrences[v][i];
            self.free_min[c] -= a.min(0.0);
            self.free_max[c] -= a.max(0.0);
            if x {
                self.fixed[c] += a;
            }
            ok &= self.viable(c);
        }
        ok
    }

    fn unassign(&mut self, v: usize, x: bool) {
        let w = self.program.objective()[v];
        self.free_gain += w.max(0.0);
        if x {
            self.value -= w;
        }
        self.current[v] = false;
        for i in 0..self.occurrences[v].len() {
            let (c, a) = self.occurrences[v][i];
            self.free_min[c] += a.min(0.0);
            self.free_max[c] += a.max(0.0);
            if x {
                self.fixed[c] -= a;
            }
        }
    }

    /// Returns false once the node limit is hit
    fn search(&mut self, v: usize) -> bool {
        self.nodes += 1;
        if self.nodes > self.node_limit {
            return false;
        }
        if let Some((_, best)) = &self.best {
            if self.value + self.free_gain <= *best + EPS {
                return true;
            }
        }
        if v == self.current.len() {
            self.best = Some((self.current.clone(), self.value));
            return true;
        }
        for x in [true, false] {
            let viable = self.assign(v, x);
            let completed = !viable || self.search(v + 1);
            self.unassign(v, x);
            if !completed {
                return false;
            }
        }
        true
    }
}

impl LpOracle for BranchAndBound {
    fn solve(&self, program: &BinaryProgram) -> LpOutcome {
        let mut state = SearchState::new(program, self.node_limit);
        let initially_viable = (0..program.num_constraints()).all(|c| state.viable(c));
        if initially_viable && !state.search(0) {
            return LpOutcome::Other(format!(
                "node limit of {} reached",
                self.node_limit
            ));
        }
        match state.best {
            Some((assignment, objective)) => LpOutcome::Optimal {
                assignment,
                objective,
            },
            None => LpOutcome::Infeasible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_picks_best_feasible_subset() {
        // max 3a + 2b + 2c  s.t.  a + b <= 1, a + c <= 1
        let mut p = BinaryProgram::new();
        let a = p.add_variable(3.0);
        let b = p.add_variable(2.0);
        let c = p.add_variable(2.0);
        p.add_constraint("ab", vec![(a, 1.0), (b, 1.0)], Relation::Le, 1.0);
        p.add_constraint("ac", vec![(a, 1.0), (c, 1.0)], Relation::Le, 1.0);
        match BranchAndBound::default().solve(&p) {
            LpOutcome::Optimal {
                assignment,
                objective,
            } => {
                assert_eq!(assignment, vec![false, true, true]);
                assert_relative_eq!(objective, 4.0);
                assert!(p.is_feasible(&assignment));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_equality_and_negative_coefficients() {
        // a - b = 0, a + c = 1, maximize b + c
        let mut p = BinaryProgram::new();
        let a = p.add_variable(0.0);
        let b = p.add_variable(1.0);
        let c = p.add_variable(1.5);
        p.add_constraint("link", vec![(a, 1.0), (b, -1.0)], Relation::Eq, 0.0);
        p.add_constraint("choose", vec![(a, 1.0), (c, 1.0)], Relation::Eq, 1.0);
        let outcome = BranchAndBound::default().solve(&p);
        assert_eq!(
            outcome,
            LpOutcome::Optimal {
                assignment: vec![false, false, true],
                objective: 1.5
            }
        );
    }

    #[test]
    fn test_infeasible_program() {
        let mut p = BinaryProgram::new();
        let a = p.add_variable(1.0);
        let b = p.add_variable(1.0);
        p.add_constraint("both", vec![(a, 1.0), (b, 1.0)], Relation::Ge, 2.0);
        p.add_constraint("one", vec![(a, 1.0), (b, 1.0)], Relation::Le, 1.0);
        assert_eq!(BranchAndBound::default().solve(&p), LpOutcome::Infeasible);
    }

    #[test]
    fn test_node_limit_is_reported() {
        let mut p = BinaryProgram::new();
        for _ in 0..20 {
            p.add_variable(1.0);
        }
        let solver = BranchAndBound { node_limit: 5 };
        assert!(matches!(solver.solve(&p), LpOutcome::Other(_)));
        assert_eq!(LpOutcome::Infeasible.status(), "infeasible");
    }

    #[test]
    fn test_microlp_agrees_with_branch_and_bound() {
        let mut p = BinaryProgram::new();
        let a = p.add_variable(3.0);
        let b = p.add_variable(2.0);
        let c = p.add_variable(2.0);
        let d = p.add_variable(0.5);
        p.add_constraint("ab", vec![(a, 1.0), (b, 1.0)], Relation::Le, 1.0);
        p.add_constraint("ac", vec![(a, 1.0), (c, 1.0)], Relation::Le, 1.0);
        p.add_constraint("cd", vec![(c, 1.0), (d, -1.0)], Relation::Eq, 0.0);
        let outcome = MicroLp.solve(&p);
        assert_eq!(outcome, BranchAndBound::default().solve(&p));
        match outcome {
            LpOutcome::Optimal {
                assignment,
                objective,
            } => {
                assert_eq!(assignment, vec![false, true, true, true]);
                assert_relative_eq!(objective, 4.5);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_microlp_reports_infeasible_programs() {
        let mut p = BinaryProgram::new();
        let a = p.add_variable(1.0);
        let b = p.add_variable(1.0);
        p.add_constraint("both", vec![(a, 1.0), (b, 1.0)], Relation::Ge, 2.0);
        p.add_constraint("one", vec![(a, 1.0), (b, 1.0)], Relation::Le, 1.0);
        assert_eq!(MicroLp.solve(&p), LpOutcome::Infeasible);

        let mut q = BinaryProgram::new();
        q.add_variable(1.0);
        q.add_constraint("constant", vec![], Relation::Ge, 1.0);
        assert_eq!(MicroLp.solve(&q), LpOutcome::Infeasible);
        assert_eq!(
            MicroLp.solve(&BinaryProgram::new()),
            LpOutcome::Optimal {
                assignment: vec![],
                objective: 0.0
            }
        );
    }

    #[test]
    fn test_empty_program_is_trivially_optimal() {
        let p = BinaryProgram::new();
        assert_eq!(
            BranchAndBound::default().solve(&p),
            LpOutcome::Optimal {
                assignment: vec![],
                objective: 0.0
            }
        );
    }
}
