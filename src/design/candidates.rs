//! Primer candidate enumeration and scoring

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;

use super::error::DesignError;
use super::nucleotides::{normalize_sequence, reverse_complement};
use super::scoring::{ScoreFeatures, ThermoScorer};
use super::targets::TargetSequence;
use super::types::{PrimerKey, ProgressUpdate, Strand};

/// A scored primer window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerCandidate {
    pub key: PrimerKey,
    /// 5' to 3' primer text (reverse complemented for reverse primers)
    pub sequence: String,
    pub efficiency: f64,
    pub features: ScoreFeatures,
}

impl PrimerCandidate {
    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

/// All candidates of one sequence, ordered by (start, end, strand)
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    candidates: Vec<PrimerCandidate>,
    index: HashMap<PrimerKey, usize>,
}

impl CandidateTable {
    pub fn from_candidates(mut candidates: Vec<PrimerCandidate>) -> Self {
        candidates.sort_by(|a, b| a.key.cmp(&b.key));
        candidates.dedup_by(|a, b| a.key == b.key);
        let index = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key, i))
            .collect();
        Self { candidates, index }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, key: &PrimerKey) -> Option<&PrimerCandidate> {
        self.index.get(key).map(|&i| &self.candidates[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrimerCandidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[PrimerCandidate] {
        &self.candidates
    }

    /// Candidates whose start lies in `[lo, hi]`
    pub fn starting_between(&self, lo: i64, hi: i64) -> &[PrimerCandidate] {
        if lo > hi {
            return &[];
        }
        let first = self.candidates.partition_point(|c| c.key.start < lo);
        let last = self.candidates.partition_point(|c| c.key.start <= hi);
        &self.candidates[first..last]
    }
}

/// Enumerate every window of length `min_len..=max_len` over `sequence`,
/// forward and reverse, and score them. `offset` is subtracted from every
/// coordinate so that position 0 is the first base of the target region.
///
/// Runs on the current rayon pool.
pub fn enumerate_candidates(
    sequence: &str,
    offset: usize,
    min_len: usize,
    max_len: usize,
    scorer: &ThermoScorer,
    progress_tx: Option<&Sender<ProgressUpdate>>,
) -> Result<CandidateTable, DesignError> {
    if min_len == 0 || min_len > max_len {
        return Err(DesignError::InvalidParams(format!(
            "invalid primer length range {}..={}",
            min_len, max_len
        )));
    }
    let seq = normalize_sequence(sequence);
    if seq.len() < min_len {
        return Err(DesignError::malformed(format!(
            "sequence of length {} is shorter than the minimum primer length {}",
            seq.len(),
            min_len
        )));
    }

    let mut windows: Vec<(usize, usize)> = Vec::new();
    for len in min_len..=max_len.min(seq.len()) {
        for start in 0..=(seq.len() - len) {
            windows.push((start, start + len));
        }
    }

    let total = windows.len();
    let completed = AtomicUsize::new(0);
    let offset = offset as i64;

    let scored: Vec<[PrimerCandidate; 2]> = windows
        .par_iter()
        .map(|&(start, end)| -> Result<[PrimerCandidate; 2], DesignError> {
            let forward = &seq[start..end];
            let reverse = reverse_complement(forward);
            let (f_eff, f_features) = scorer.score(forward)?;
            let (r_eff, r_features) = scorer.score(&reverse)?;

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(tx) = progress_tx {
                if done % 10 == 0 || done == total {
                    let _ = tx.send(ProgressUpdate::new("Scoring candidates", done, total));
                }
            }

            let (s, e) = (start as i64 - offset, end as i64 - offset);
            Ok([
                PrimerCandidate {
                    key: PrimerKey::new(s, e, Strand::Forward),
                    sequence: forward.to_string(),
                    efficiency: f_eff,
                    features: f_features,
                },
                PrimerCandidate {
                    key: PrimerKey::new(s, e, Strand::Reverse),
                    sequence: reverse,
                    efficiency: r_eff,
                    features: r_features,
                },
            ])
        })
        .collect::<Result<Vec<_>, DesignError>>()?;

    Ok(CandidateTable::from_candidates(
        scored.into_iter().flatten().collect(),
    ))
}

/// Enumerate the candidates of a target using its flank offset
pub fn enumerate_target(
    target: &TargetSequence,
    min_len: usize,
    max_len: usize,
    scorer: &ThermoScorer,
    progress_tx: Option<&Sender<ProgressUpdate>>,
) -> Result<CandidateTable, DesignError> {
    enumerate_candidates(
        &target.full,
        target.upstream_len,
        min_len,
        max_len,
        scorer,
        progress_tx,
    )
    .map_err(|e| match e {
        DesignError::MalformedSequence { reason } => {
            DesignError::malformed(format!("target '{}': {}", target.name, reason))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::scoring::ScoringModel;
    use crate::design::thermo::NearestNeighborThermo;
    use proptest::prelude::*;

    fn table(seq: &str, offset: usize, lmin: usize, lmax: usize) -> CandidateTable {
        let thermo = NearestNeighborThermo::default();
        let model = ScoringModel::default();
        let scorer = ThermoScorer::new(&thermo, &model);
        enumerate_candidates(seq, offset, lmin, lmax, &scorer, None).unwrap()
    }

    #[test]
    fn test_fixed_length_window_count() {
        let t = table("AAAAACCCCCGGGGGTTTTT", 0, 5, 5);
        assert_eq!(t.len(), 32);
        let forward = t.iter().filter(|c| c.key.strand == Strand::Forward).count();
        assert_eq!(forward, 16);
    }

    #[test]
    fn test_reverse_candidate_is_reverse_complement() {
        let t = table("AAAAACCCCCGGGGGTTTTT", 0, 5, 5);
        let rev = t.get(&PrimerKey::new(0, 5, Strand::Reverse)).unwrap();
        assert_eq!(rev.sequence, "TTTTT");
        let fwd = t.get(&PrimerKey::new(3, 8, Strand::Forward)).unwrap();
        assert_eq!(fwd.sequence, "AACCC");
    }

    #[test]
    fn test_offset_shifts_coordinates() {
        let t = table("GGGGGACGTACGTAC", 5, 4, 4);
        let first = &t.as_slice()[0];
        assert_eq!(first.key, PrimerKey::new(-5, -1, Strand::Forward));
        assert_eq!(t.starting_between(0, 0).len(), 2);
        assert!(t.starting_between(3, 2).is_empty());
    }

    #[test]
    fn test_non_standard_characters_are_scored_not_rejected() {
        let t = table("ACGTÅACGTACGT", 0, 4, 4);
        assert_eq!(t.len(), 2 * 10);
        let odd = t.get(&PrimerKey::new(2, 6, Strand::Forward)).unwrap();
        assert_eq!(odd.sequence, "GTNA");

        let t = table("ACGTACNNNNNNGTACGT", 0, 5, 5);
        assert_eq!(t.len(), 2 * 14);
        let blank = t.get(&PrimerKey::new(6, 11, Strand::Reverse)).unwrap();
        assert_eq!(blank.sequence, "NNNNN");
        assert_eq!(blank.efficiency, 0.0);
    }

    #[test]
    fn test_short_sequence_is_malformed() {
        let thermo = NearestNeighborThermo::default();
        let model = ScoringModel::default();
        let scorer = ThermoScorer::new(&thermo, &model);
        let err = enumerate_candidates("ACGT", 0, 5, 6, &scorer, None).unwrap_err();
        assert!(matches!(err, DesignError::MalformedSequence { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn test_candidate_count_and_ordering(
            seq in "[ACGT]{8,30}",
            lmin in 3usize..6,
            extra in 0usize..3,
        ) {
            let lmax = lmin + extra;
            let t = table(&seq, 0, lmin, lmax);
            let n = seq.len();
            let expected: usize = (lmin..=lmax).map(|l| 2 * (n - l + 1)).sum();
            prop_assert_eq!(t.len(), expected);
            for c in t.iter() {
                prop_assert!(c.key.start < c.key.end);
                prop_assert_eq!(c.sequence.len(), c.len());
                prop_assert!((0.0..=1.0).contains(&c.efficiency));
            }
            for pair in t.as_slice().windows(2) {
                prop_assert!(pair[0].key < pair[1].key);
            }
        }
    }
}
