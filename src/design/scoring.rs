//! Piecewise-logistic primer quality scoring

use serde::{Deserialize, Serialize};

use super::error::DesignError;
use super::nucleotides::{gc_fraction, standard_length, trailing_a_run};
use super::thermo::ThermoOracle;

/// Six breakpoints of one "goodness" curve.
///
/// Inside `[opt_min, opt_max]` the score is 1. Each side falls along a
/// logistic curve centred halfway between the optimum and reject bounds,
/// offset so that it reaches 0 at the absolute bound; the result is clamped
/// to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringCurve {
    pub opt_min: f64,
    pub opt_max: f64,
    pub abs_min: f64,
    pub abs_max: f64,
    pub reject_min: f64,
    pub reject_max: f64,
}

impl ScoringCurve {
    pub const fn new(
        opt_min: f64,
        opt_max: f64,
        abs_min: f64,
        abs_max: f64,
        reject_min: f64,
        reject_max: f64,
    ) -> Self {
        Self {
            opt_min,
            opt_max,
            abs_min,
            abs_max,
            reject_min,
            reject_max,
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        if x < self.opt_min {
            branch(x, self.opt_min, self.abs_min, self.reject_min)
        } else if x <= self.opt_max {
            1.0
        } else {
            branch(x, self.opt_max, self.abs_max, self.reject_max)
        }
    }
}

fn branch(x: f64, optimum: f64, absolute: f64, reject: f64) -> f64 {
    if optimum == reject {
        return 0.0;
    }
    let k = 10.0 / (optimum - reject);
    let x0 = (optimum + reject) / 2.0;
    let y0 = (k * (absolute - x0)).exp();
    ((1.0 + y0) * sigmoid(k * (x - x0)) - y0).clamp(0.0, 1.0)
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

/// Relative weight of each feature in the final efficiency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub tm: f64,
    pub gc: f64,
    pub self_structure: f64,
    pub trailing_a: f64,
    pub end_stability: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            tm: 1.0,
            gc: 1.0,
            self_structure: 1.0,
            trailing_a: 1.0,
            end_stability: 1.0,
        }
    }
}

/// The five curves plus their weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringModel {
    pub tm: ScoringCurve,
    pub gc: ScoringCurve,
    /// Applied to max(hairpin Tm, homodimer Tm)
    pub self_structure: ScoringCurve,
    pub trailing_a: ScoringCurve,
    /// Applied to the free energy of the last five bases
    pub end_stability: ScoringCurve,
    pub weights: FeatureWeights,
}

impl Default for ScoringModel {
    fn default() -> Self {
        Self {
            tm: ScoringCurve::new(60.0, 61.0, 58.0, 65.0, 55.0, 70.0),
            gc: ScoringCurve::new(0.55, 0.60, 0.45, 0.65, 0.30, 0.70),
            self_structure: ScoringCurve::new(-50.0, 45.0, -50.0, 50.0, -50.0, 55.0),
            trailing_a: ScoringCurve::new(1.0, 1.0, 0.0, 4.0, -1.0, 7.0),
            end_stability: ScoringCurve::new(-9.0, -7.0, -12.0, -6.0, -14.0, -5.0),
            weights: FeatureWeights::default(),
        }
    }
}

/// Physical features of one primer, computed once per candidate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreFeatures {
    pub tm: f64,
    /// Fraction in [0, 1]
    pub gc: f64,
    pub hairpin_tm: f64,
    pub homodimer_tm: f64,
    pub trailing_a: usize,
    /// kcal/mol
    pub end_stability: f64,
}

impl ScoreFeatures {
    pub fn self_structure_tm(&self) -> f64 {
        self.hairpin_tm.max(self.homodimer_tm)
    }
}

/// Scores primer sequences against a model using a thermodynamic oracle
pub struct ThermoScorer<'a> {
    oracle: &'a dyn ThermoOracle,
    model: &'a ScoringModel,
}

impl<'a> ThermoScorer<'a> {
    pub fn new(oracle: &'a dyn ThermoOracle, model: &'a ScoringModel) -> Self {
        Self { oracle, model }
    }

    pub fn oracle(&self) -> &'a dyn ThermoOracle {
        self.oracle
    }

    pub fn features(&self, seq: &str) -> Result<ScoreFeatures, DesignError> {
        if standard_length(seq) == 0 {
            return Err(DesignError::malformed(format!(
                "primer '{}' has no standard bases",
                seq
            )));
        }
        let upper = seq.to_ascii_uppercase();
        Ok(ScoreFeatures {
            tm: self.oracle.oligo_melting_temperature(&upper)?,
            gc: gc_fraction(&upper),
            hairpin_tm: self.oracle.hairpin_temperature(&upper)?,
            homodimer_tm: self.oracle.homodimer_temperature(&upper)?,
            trailing_a: trailing_a_run(&upper),
            end_stability: self.oracle.end_stability(&upper)?,
        })
    }

    /// Weighted mean of the five feature scores, in [0, 1]
    pub fn efficiency(&self, features: &ScoreFeatures) -> f64 {
        let m = self.model;
        let w = &m.weights;
        let weighted = [
            (w.tm, m.tm.evaluate(features.tm)),
            (w.gc, m.gc.evaluate(features.gc)),
            (w.self_structure, m.self_structure.evaluate(features.self_structure_tm())),
            (w.trailing_a, m.trailing_a.evaluate(features.trailing_a as f64)),
            (w.end_stability, m.end_stability.evaluate(features.end_stability)),
        ];
        let total: f64 = weighted.iter().map(|(w, _)| w).sum();
        if total <= 0.0 {
            return 0.0;
        }
        weighted.iter().map(|(w, s)| w * s).sum::<f64>() / total
    }

    /// Efficiency and features of a primer. A primer without any standard
    /// base scores 0 with empty features.
    pub fn score(&self, seq: &str) -> Result<(f64, ScoreFeatures), DesignError> {
        if standard_length(seq) == 0 {
            return Ok((0.0, ScoreFeatures::default()));
        }
        let features = self.features(seq)?;
        Ok((self.efficiency(&features), features))
    }
}
