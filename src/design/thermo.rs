//! Thermodynamic oracle: duplex, hairpin and 3'-end stability estimates
//!
//! The built-in implementation uses the SantaLucia & Hicks (2004) unified
//! nearest-neighbour parameters. Energies are kept as integer tenths
//! (kcal/mol for enthalpy, cal/K/mol for entropy) so that sums over a
//! sequence and over its reverse complement are bit-identical.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::error::DesignError;
use super::nucleotides::{base_index, indices_pair, reverse_complement};

/// Gas constant, cal/(K·mol)
const GAS_CONSTANT: f64 = 1.9872;
const KELVIN: f64 = 273.15;
const BODY_TEMPERATURE_K: f64 = 310.15;

/// Duplex initiation, tenths
const INIT_H: i32 = 2;
const INIT_S: i32 = -57;
/// Terminal A/T penalty, tenths
const TERMINAL_AT_H: i32 = 22;
const TERMINAL_AT_S: i32 = 69;
/// Self-complementary duplex symmetry correction, tenths
const SYMMETRY_S: i32 = -14;

/// Shortest hairpin loop considered
const MIN_HAIRPIN_LOOP: usize = 3;
/// Number of 3' bases used for end stability
const END_WINDOW: usize = 5;

/// Nearest-neighbour stacks indexed by the top strand dinucleotide 5'-XY-3'
/// (A=0, C=1, G=2, T=3), holding (enthalpy, entropy) in tenths.
static STACKS: Lazy<[[(i32, i32); 4]; 4]> = Lazy::new(|| {
    let unique: [(&[u8; 2], i32, i32); 10] = [
        (b"AA", -79, -222),
        (b"AT", -72, -204),
        (b"TA", -72, -213),
        (b"CA", -85, -227),
        (b"GT", -84, -224),
        (b"CT", -78, -210),
        (b"GA", -82, -222),
        (b"CG", -106, -272),
        (b"GC", -98, -244),
        (b"GG", -80, -199),
    ];
    let mut table = [[(0, 0); 4]; 4];
    for (pair, dh, ds) in unique {
        let x = base_index(pair[0]).unwrap_or(0);
        let y = base_index(pair[1]).unwrap_or(0);
        table[x][y] = (dh, ds);
        // the same stack read on the other strand: 5'-comp(Y)comp(X)-3'
        table[3 - y][3 - x] = (dh, ds);
    }
    table
});

/// Hairpin loop free energies (kcal/mol) for loops of 3..=9 bases
const HAIRPIN_LOOP_DG: [f64; 7] = [3.5, 3.5, 3.3, 4.0, 4.2, 4.3, 4.5];

/// Reaction conditions used for salt and strand-concentration terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionConditions {
    /// Monovalent cations, mM
    pub mv_conc: f64,
    /// Divalent cations, mM
    pub dv_conc: f64,
    /// dNTPs, mM
    pub dntp_conc: f64,
    /// Oligo strand concentration, nM
    pub dna_conc: f64,
}

impl Default for ReactionConditions {
    fn default() -> Self {
        Self {
            mv_conc: 50.0,
            dv_conc: 1.5,
            dntp_conc: 0.6,
            dna_conc: 50.0,
        }
    }
}

impl ReactionConditions {
    /// Monovalent-equivalent salt in molar, with divalent ions converted by
    /// the von Ahsen relation.
    pub fn sodium_equivalent(&self) -> f64 {
        let free_divalent = (self.dv_conc - self.dntp_conc).max(0.0);
        (self.mv_conc + 120.0 * free_divalent.sqrt()) / 1000.0
    }
}

/// Source of thermodynamic estimates. Implementations must be deterministic
/// and shareable across worker threads.
///
/// All sequences are given 5' to 3'. Temperatures are in °C; 0.0 means no
/// stable structure.
pub trait ThermoOracle: Sync {
    /// Melting temperature of the duplex formed by `a` and `b`
    fn melting_temperature(&self, a: &str, b: &str) -> Result<f64, DesignError>;

    fn hairpin_temperature(&self, seq: &str) -> Result<f64, DesignError>;

    fn homodimer_temperature(&self, seq: &str) -> Result<f64, DesignError> {
        self.melting_temperature(seq, seq)
    }

    /// Free energy (kcal/mol) of the 3' end binding its perfect complement
    fn end_stability(&self, seq: &str) -> Result<f64, DesignError>;

    /// Melting temperature of `seq` against its perfect complement
    fn oligo_melting_temperature(&self, seq: &str) -> Result<f64, DesignError> {
        self.melting_temperature(seq, &reverse_complement(seq))
    }
}

/// Nearest-neighbour oracle without mismatches or dangling ends.
///
/// A duplex is scored as the best contiguous perfectly paired stretch over
/// every antiparallel alignment of the two strands. Because any stretch of a
/// shorter window is also a stretch of a window containing it, the estimate
/// never decreases when either window grows.
#[derive(Debug, Clone)]
pub struct NearestNeighborThermo {
    conditions: ReactionConditions,
    /// 0.368 * ln[Na+], applied per phosphate
    salt_per_phosphate: f64,
    /// R * ln(Ct / 4) for distinct strands
    hetero_conc_term: f64,
    /// R * ln(Ct) for self-complementary strands
    self_conc_term: f64,
}

impl Default for NearestNeighborThermo {
    fn default() -> Self {
        Self::new(ReactionConditions::default())
    }
}

impl NearestNeighborThermo {
    pub fn new(conditions: ReactionConditions) -> Self {
        let strand_molar = (conditions.dna_conc * 1e-9).max(f64::MIN_POSITIVE);
        Self {
            salt_per_phosphate: 0.368 * conditions.sodium_equivalent().max(f64::MIN_POSITIVE).ln(),
            hetero_conc_term: GAS_CONSTANT * (strand_molar / 4.0).ln(),
            self_conc_term: GAS_CONSTANT * strand_molar.ln(),
            conditions,
        }
    }

    pub fn conditions(&self) -> &ReactionConditions {
        &self.conditions
    }

    /// Tm of the paired stretch `top[start..=end]` against its complement
    fn stretch_tm(&self, top: &[u8], start: usize, end: usize, dh: i32, ds: i32) -> Option<f64> {
        let mut dh = dh + INIT_H;
        let mut ds = ds + INIT_S;
        for &b in [top[start], top[end]].iter() {
            if matches!(base_index(b), Some(0) | Some(3)) {
                dh += TERMINAL_AT_H;
                ds += TERMINAL_AT_S;
            }
        }
        let self_complementary = is_self_complementary(&top[start..=end]);
        let conc_term = if self_complementary {
            ds += SYMMETRY_S;
            self.self_conc_term
        } else {
            self.hetero_conc_term
        };
        let phosphates = (end - start) as f64;
        let entropy = ds as f64 / 10.0 + self.salt_per_phosphate * phosphates + conc_term;
        melting_point(dh, entropy)
    }

    /// Best Tm over every sub-stretch of the paired run `top[start..end]`
    fn best_in_run(&self, top: &[u8], start: usize, end: usize) -> f64 {
        let mut best = 0.0f64;
        for s in start..end.saturating_sub(1) {
            let mut dh = 0;
            let mut ds = 0;
            for e in (s + 1)..end {
                let (h, st) = stack(top[e - 1], top[e]);
                dh += h;
                ds += st;
                if let Some(tm) = self.stretch_tm(top, s, e, dh, ds) {
                    best = best.max(tm);
                }
            }
        }
        best
    }
}

impl ThermoOracle for NearestNeighborThermo {
    fn melting_temperature(&self, a: &str, b: &str) -> Result<f64, DesignError> {
        let (a, b) = (a.as_bytes(), b.as_bytes());
        if a.is_empty() || b.is_empty() {
            return Err(DesignError::malformed("empty sequence given to duplex estimate"));
        }

        let (n, m) = (a.len(), b.len());
        let mut best = 0.0f64;
        // a[i] faces b[j] whenever i + j == d
        for d in 0..(n + m - 1) {
            let lo = d.saturating_sub(m - 1);
            let hi = d.min(n - 1);
            let mut run_start: Option<usize> = None;
            for i in lo..=hi {
                let paired = match (base_index(a[i]), base_index(b[d - i])) {
                    (Some(x), Some(y)) => indices_pair(x, y),
                    _ => false,
                };
                match (paired, run_start) {
                    (true, None) => run_start = Some(i),
                    (false, Some(s)) => {
                        best = best.max(self.best_in_run(a, s, i));
                        run_start = None;
                    }
                    _ => {}
                }
            }
            if let Some(s) = run_start {
                best = best.max(self.best_in_run(a, s, hi + 1));
            }
        }
        Ok(best)
    }

    fn hairpin_temperature(&self, seq: &str) -> Result<f64, DesignError> {
        let s = seq.as_bytes();
        if s.is_empty() {
            return Err(DesignError::malformed("empty sequence given to hairpin estimate"));
        }

        let n = s.len();
        let mut best = 0.0f64;
        // (i, j) closes the loop; the stem grows outward to (i - k, j + k)
        for i in 1..n {
            for j in (i + MIN_HAIRPIN_LOOP + 1)..n.saturating_sub(1) {
                if !pairs(s[i], s[j]) {
                    continue;
                }
                let loop_entropy = -hairpin_loop_dg(j - i - 1) * 1000.0 / BODY_TEMPERATURE_K;
                let mut dh = 0;
                let mut ds = 0;
                let mut k = 1;
                while k <= i && j + k < n && pairs(s[i - k], s[j + k]) {
                    let (h, st) = stack(s[i - k], s[i - k + 1]);
                    dh += h;
                    ds += st;
                    let mut stem_h = dh;
                    let mut stem_s = ds;
                    if matches!(base_index(s[i - k]), Some(0) | Some(3)) {
                        stem_h += TERMINAL_AT_H;
                        stem_s += TERMINAL_AT_S;
                    }
                    let entropy = stem_s as f64 / 10.0
                        + loop_entropy
                        + self.salt_per_phosphate * k as f64;
                    if let Some(tm) = melting_point(stem_h, entropy) {
                        best = best.max(tm);
                    }
                    k += 1;
                }
            }
        }
        Ok(best)
    }

    fn end_stability(&self, seq: &str) -> Result<f64, DesignError> {
        let s = seq.as_bytes();
        if s.is_empty() {
            return Err(DesignError::malformed("empty sequence given to end stability"));
        }
        let tail = &s[s.len().saturating_sub(END_WINDOW)..];
        let mut dh = 0;
        let mut ds = 0;
        for w in tail.windows(2) {
            if base_index(w[0]).is_none() || base_index(w[1]).is_none() {
                continue;
            }
            let (h, st) = stack(w[0], w[1]);
            dh += h;
            ds += st;
        }
        Ok(dh as f64 / 10.0 - BODY_TEMPERATURE_K * (ds as f64 / 10.0) / 1000.0)
    }
}

#[inline]
fn stack(x: u8, y: u8) -> (i32, i32) {
    match (base_index(x), base_index(y)) {
        (Some(i), Some(j)) => STACKS[i][j],
        _ => (0, 0),
    }
}

#[inline]
fn pairs(x: u8, y: u8) -> bool {
    match (base_index(x), base_index(y)) {
        (Some(i), Some(j)) => indices_pair(i, j),
        _ => false,
    }
}

fn is_self_complementary(seg: &[u8]) -> bool {
    let n = seg.len();
    n % 2 == 0 && (0..n / 2).all(|k| pairs(seg[k], seg[n - 1 - k]))
}

/// Tm in °C from enthalpy (tenths of kcal/mol) and total entropy (cal/K/mol),
/// or `None` when the structure is never stable.
fn melting_point(dh_tenths: i32, entropy: f64) -> Option<f64> {
    if dh_tenths >= 0 || entropy >= 0.0 {
        return None;
    }
    let tm = dh_tenths as f64 * 100.0 / entropy - KELVIN;
    Some(tm.max(0.0))
}

/// Jacobson-Stockmayer extrapolation beyond the tabulated loop sizes
fn hairpin_loop_dg(loop_len: usize) -> f64 {
    let last = HAIRPIN_LOOP_DG.len() + MIN_HAIRPIN_LOOP - 1;
    if loop_len <= last {
        HAIRPIN_LOOP_DG[loop_len.max(MIN_HAIRPIN_LOOP) - MIN_HAIRPIN_LOOP]
    } else {
        HAIRPIN_LOOP_DG[HAIRPIN_LOOP_DG.len() - 1]
            + 2.44 * GAS_CONSTANT * BODY_TEMPERATURE_K * (loop_len as f64 / last as f64).ln()
                / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PRIMER: &str = "AGCGTCATTGACCTGAGGTC";

    #[test]
    fn test_stack_table_is_strand_symmetric() {
        for x in 0..4 {
            for y in 0..4 {
                assert_eq!(STACKS[x][y], STACKS[3 - y][3 - x]);
                assert!(STACKS[x][y].0 < 0);
            }
        }
    }

    #[test]
    fn test_perfect_complement_melts_in_primer_range() {
        let thermo = NearestNeighborThermo::default();
        let tm = thermo.oligo_melting_temperature(PRIMER).unwrap();
        assert!(tm > 45.0 && tm < 80.0, "tm = {}", tm);
    }

    #[test]
    fn test_non_complementary_strands_do_not_melt() {
        let thermo = NearestNeighborThermo::default();
        assert_eq!(thermo.melting_temperature("AAAAAAAAAA", "AAAAAAAAAA").unwrap(), 0.0);
        assert_eq!(thermo.homodimer_temperature("CCCCCCCC").unwrap(), 0.0);
    }

    #[test]
    fn test_empty_input_is_malformed() {
        let thermo = NearestNeighborThermo::default();
        assert!(matches!(
            thermo.melting_temperature("", "ACGT"),
            Err(DesignError::MalformedSequence { .. })
        ));
        assert!(thermo.hairpin_temperature("").is_err());
        assert!(thermo.end_stability("").is_err());
    }

    #[test]
    fn test_stable_hairpin_detected() {
        let thermo = NearestNeighborThermo::default();
        // GCGCGC stem, TTTT loop
        let hairpin = thermo.hairpin_temperature("GCGCGCTTTTGCGCGC").unwrap();
        assert!(hairpin > 30.0, "hairpin = {}", hairpin);
        assert_eq!(thermo.hairpin_temperature("AAAAAAAAAAAAAA").unwrap(), 0.0);
    }

    #[test]
    fn test_end_stability_gc_rich_is_more_negative() {
        let thermo = NearestNeighborThermo::default();
        let gc_end = thermo.end_stability("ATATATGCGCG").unwrap();
        let at_end = thermo.end_stability("GCGCGCATATA").unwrap();
        assert!(gc_end < at_end);
        assert!(gc_end < -7.0);
    }

    #[test]
    fn test_case_does_not_change_estimates() {
        let thermo = NearestNeighborThermo::default();
        let lower = PRIMER.to_ascii_lowercase();
        assert_eq!(
            thermo.oligo_melting_temperature(PRIMER).unwrap(),
            thermo.oligo_melting_temperature(&lower).unwrap()
        );
        assert_eq!(
            thermo.hairpin_temperature(PRIMER).unwrap(),
            thermo.hairpin_temperature(&lower).unwrap()
        );
    }

    #[test]
    fn test_salt_equivalent_ignores_chelated_magnesium() {
        let conditions = ReactionConditions {
            dv_conc: 0.5,
            dntp_conc: 0.6,
            ..Default::default()
        };
        approx::assert_relative_eq!(conditions.sodium_equivalent(), 0.05);
    }

    proptest! {
        #[test]
        fn test_duplex_estimate_is_symmetric(a in "[ACGT]{1,30}", b in "[ACGT]{1,30}") {
            let thermo = NearestNeighborThermo::default();
            prop_assert_eq!(
                thermo.melting_temperature(&a, &b).unwrap(),
                thermo.melting_temperature(&b, &a).unwrap()
            );
        }

        #[test]
        fn test_duplex_estimate_grows_with_window(
            a in "[ACGT]{4,24}",
            b in "[ACGT]{4,24}",
            trim in 0usize..3,
        ) {
            let thermo = NearestNeighborThermo::default();
            let inner = &a[trim..a.len() - 1];
            prop_assert!(
                thermo.melting_temperature(inner, &b).unwrap()
                    <= thermo.melting_temperature(&a, &b).unwrap()
            );
        }
    }
}
