//! Cross-hybridization search
//!
//! Stage 1 takes every full-length window of the first sequence and bisects
//! the second sequence, dropping any half whose duplex Tm with the window
//! stays below the threshold. Bands of at most twice the maximum primer
//! length are enumerated by a memoized shrink down to full-length windows.
//! Stage 2 expands every surviving full-length pair into all sub-window
//! pairs of the allowed lengths.
//!
//! Pruning is exact as long as the oracle's duplex Tm never decreases when a
//! window grows, which holds for `NearestNeighborThermo`.

use log::info;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;

use super::error::DesignError;
use super::targets::TargetSequence;
use super::thermo::ThermoOracle;
use super::types::{DesignParams, ForbiddenPair, ProgressUpdate, Span, ThreadCount};

/// Parameters of one pair search
#[derive(Debug, Clone, PartialEq)]
pub struct PairSearchConfig {
    pub primer_lmin: usize,
    pub primer_lmax: usize,
    /// Tm at or above which two windows are forbidden together
    pub threshold: f64,
    /// Maximum shared positions between the two windows of an intra pair
    pub allowed_overlap: i64,
    pub thread_count: ThreadCount,
}

impl PairSearchConfig {
    pub fn from_params(params: &DesignParams) -> Self {
        Self {
            primer_lmin: params.primer_lmin,
            primer_lmax: params.primer_lmax,
            threshold: params.cross_hyb_tm,
            allowed_overlap: params.allowed_overlap,
            thread_count: params.thread_count,
        }
    }
}

/// Forbidden pairs of a whole target list
#[derive(Debug, Clone, Default)]
pub struct PairSets {
    /// Indexed like the targets
    pub intra: Vec<HashSet<ForbiddenPair>>,
    /// (i, j, pairs) for i < j; `first` windows lie in target i
    pub inter: Vec<(usize, usize, HashSet<ForbiddenPair>)>,
}

impl PairSets {
    pub fn total(&self) -> usize {
        self.intra.iter().map(|s| s.len()).sum::<usize>()
            + self.inter.iter().map(|(_, _, s)| s.len()).sum::<usize>()
    }
}

/// Stage 1 state for one full-length window of the first sequence
struct WindowScan<'s> {
    oracle: &'s dyn ThermoOracle,
    window: &'s str,
    other: &'s str,
    lmax: usize,
    threshold: f64,
    /// (start, end) band -> starts of offending full-length windows
    memo: HashMap<(usize, usize), Vec<usize>>,
}

impl<'s> WindowScan<'s> {
    fn hits(&self, start: usize, end: usize) -> Result<bool, DesignError> {
        Ok(self
            .oracle
            .melting_temperature(self.window, &self.other[start..end])?
            >= self.threshold)
    }

    fn bisect(&mut self, start: usize, end: usize) -> Result<Vec<usize>, DesignError> {
        if end < start + self.lmax {
            return Ok(Vec::new());
        }
        if end - start <= 2 * self.lmax {
            return if self.hits(start, end)? {
                self.shrink(start, end)
            } else {
                Ok(Vec::new())
            };
        }

        // halves overlap by lmax - 1 so every full-length window lies in one
        let mid = (start + end) / 2;
        let left_end = (mid + self.lmax - 1).min(end);
        let right_start = (mid + 1).saturating_sub(self.lmax).max(start);

        let mut found = Vec::new();
        if self.hits(start, left_end)? {
            found.extend(self.bisect(start, left_end)?);
        }
        if self.hits(right_start, end)? {
            found.extend(self.bisect(right_start, end)?);
        }
        Ok(found)
    }

    fn shrink(&mut self, start: usize, end: usize) -> Result<Vec<usize>, DesignError> {
        if let Some(found) = self.memo.get(&(start, end)) {
            return Ok(found.clone());
        }
        let found = if end - start < self.lmax {
            Vec::new()
        } else if end - start == self.lmax {
            if self.hits(start, end)? {
                vec![start]
            } else {
                Vec::new()
            }
        } else {
            let mut merged = self.shrink(start + 1, end)?;
            merged.extend(self.shrink(start, end - 1)?);
            merged.sort_unstable();
            merged.dedup();
            merged
        };
        self.memo.insert((start, end), found.clone());
        Ok(found)
    }
}

/// Two-stage forbidden-pair search on a dedicated worker pool
pub struct ForbiddenPairFinder<'a> {
    oracle: &'a dyn ThermoOracle,
    config: PairSearchConfig,
}

impl<'a> ForbiddenPairFinder<'a> {
    pub fn new(oracle: &'a dyn ThermoOracle, config: PairSearchConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &PairSearchConfig {
        &self.config
    }

    fn build_pool(&self) -> Result<rayon::ThreadPool, DesignError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.thread_count.get_count())
            .build()
            .map_err(|e| DesignError::ThreadPool(e.to_string()))
    }

    /// Pairs within `a` when `b` is `None` or the same sequence as `a`,
    /// otherwise pairs between `a` and `b` with `first` in `a`. Coordinates
    /// are target-relative.
    pub fn find(
        &self,
        a: &TargetSequence,
        b: Option<&TargetSequence>,
        progress_tx: Option<&Sender<ProgressUpdate>>,
    ) -> Result<HashSet<ForbiddenPair>, DesignError> {
        let pool = self.build_pool()?;
        pool.install(|| self.find_in_pool(a, b, progress_tx))
    }

    /// Intra pairs of every target and inter pairs of every unordered
    /// target pair
    pub fn find_all(
        &self,
        targets: &[TargetSequence],
        progress_tx: Option<&Sender<ProgressUpdate>>,
    ) -> Result<PairSets, DesignError> {
        let pool = self.build_pool()?;
        pool.install(|| -> Result<PairSets, DesignError> {
            let mut sets = PairSets::default();
            for target in targets {
                sets.intra.push(self.find_in_pool(target, None, progress_tx)?);
            }
            for i in 0..targets.len() {
                for j in (i + 1)..targets.len() {
                    let pairs = self.find_in_pool(&targets[i], Some(&targets[j]), progress_tx)?;
                    sets.inter.push((i, j, pairs));
                }
            }
            info!(
                "Forbidden pair search over {} targets: {} pairs",
                targets.len(),
                sets.total()
            );
            Ok(sets)
        })
    }

    fn find_in_pool(
        &self,
        a: &TargetSequence,
        b: Option<&TargetSequence>,
        progress_tx: Option<&Sender<ProgressUpdate>>,
    ) -> Result<HashSet<ForbiddenPair>, DesignError> {
        let intra = b.map_or(true, |b| b.full == a.full && b.upstream_len == a.upstream_len);
        let b = b.unwrap_or(a);
        let candidates = self.full_length_candidates(a, b, intra, progress_tx)?;
        let pairs = self.expand(a, b, intra, &candidates, progress_tx)?;
        info!(
            "Pair search {} vs {}: {} full-length hits, {} forbidden pairs",
            a.name,
            b.name,
            candidates.len(),
            pairs.len()
        );
        Ok(pairs)
    }

    /// Stage 1: (start in a, start in b) of offending full-length windows
    fn full_length_candidates(
        &self,
        a: &TargetSequence,
        b: &TargetSequence,
        intra: bool,
        progress_tx: Option<&Sender<ProgressUpdate>>,
    ) -> Result<Vec<(usize, usize)>, DesignError> {
        let lmax = self.config.primer_lmax;
        let seq_a = a.full.as_str();
        let seq_b = b.full.as_str();
        if lmax == 0 || seq_a.len() < lmax || seq_b.len() < lmax {
            return Ok(Vec::new());
        }

        let total = seq_a.len() - lmax + 1;
        let completed = AtomicUsize::new(0);

        let per_window: Vec<Vec<(usize, usize)>> = (0..total)
            .into_par_iter()
            .map(|p1| -> Result<Vec<(usize, usize)>, DesignError> {
                let p1_end = p1 + lmax;
                // containers may overlap; sub-window pairs are filtered in stage 2
                let search_start = if intra { p1 } else { 0 };
                let mut scan = WindowScan {
                    oracle: self.oracle,
                    window: &seq_a[p1..p1_end],
                    other: seq_b,
                    lmax,
                    threshold: self.config.threshold,
                    memo: HashMap::new(),
                };
                let mut starts = if search_start < seq_b.len() {
                    scan.bisect(search_start, seq_b.len())?
                } else {
                    Vec::new()
                };
                starts.sort_unstable();
                starts.dedup();

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(tx) = progress_tx {
                    if done % 10 == 0 || done == total {
                        let _ = tx.send(ProgressUpdate::new("Pair search stage 1", done, total));
                    }
                }
                Ok(starts.into_iter().map(|p2| (p1, p2)).collect())
            })
            .collect::<Result<Vec<_>, DesignError>>()?;

        Ok(per_window.into_iter().flatten().collect())
    }

    /// Stage 2: every sub-window pair of the surviving full-length pairs
    fn expand(
        &self,
        a: &TargetSequence,
        b: &TargetSequence,
        intra: bool,
        candidates: &[(usize, usize)],
        progress_tx: Option<&Sender<ProgressUpdate>>,
    ) -> Result<HashSet<ForbiddenPair>, DesignError> {
        let lmin = self.config.primer_lmin;
        let lmax = self.config.primer_lmax;
        let total = candidates.len();
        let completed = AtomicUsize::new(0);

        let expanded: Vec<Vec<ForbiddenPair>> = candidates
            .par_iter()
            .map(|&(p1, p2)| -> Result<Vec<ForbiddenPair>, DesignError> {
                let mut found = Vec::new();
                for len1 in lmin..=lmax {
                    for s1 in 0..=(lmax - len1) {
                        let w1 = &a.full[p1 + s1..p1 + s1 + len1];
                        for len2 in lmin..=lmax {
                            for s2 in 0..=(lmax - len2) {
                                let w2 = &b.full[p2 + s2..p2 + s2 + len2];
                                if self.oracle.melting_temperature(w1, w2)? < self.config.threshold {
                                    continue;
                                }
                                let first = rebase(a, p1 + s1, len1);
                                let second = rebase(b, p2 + s2, len2);
                                if intra
                                    && (first == second
                                        || first.overlap(&second) > self.config.allowed_overlap)
                                {
                                    continue;
                                }
                                found.push(if intra && second < first {
                                    ForbiddenPair::new(second, first)
                                } else {
                                    ForbiddenPair::new(first, second)
                                });
                            }
                        }
                    }
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(tx) = progress_tx {
                    if done % 10 == 0 || done == total {
                        let _ = tx.send(ProgressUpdate::new("Pair search stage 2", done, total));
                    }
                }
                Ok(found)
            })
            .collect::<Result<Vec<_>, DesignError>>()?;

        Ok(expanded.into_iter().flatten().collect())
    }
}

fn rebase(target: &TargetSequence, start: usize, len: usize) -> Span {
    let start = start as i64 - target.upstream_len as i64;
    Span::new(start, start + len as i64)
}
