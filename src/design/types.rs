//! Data types shared across the primer design pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::DesignError;
use super::scoring::ScoringModel;
use super::thermo::ReactionConditions;

/// Which workflow `run_design` executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesignMode {
    /// Best single tiling of every target, each on its own
    SingleLongestPath,
    /// One tiling per target, exact model solved by the LP oracle
    MultiTargetExact,
    /// One tiling per target, greedy conflict repair
    MultiTargetGreedy,
    /// `num_libraries` non-overlapping tilings of every target, exact model per target
    LibraryExact,
    /// `num_libraries` non-overlapping tilings of every target, greedy per target
    LibraryGreedy,
}

impl Default for DesignMode {
    fn default() -> Self {
        Self::SingleLongestPath
    }
}

impl DesignMode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::SingleLongestPath => "single target, longest path",
            Self::MultiTargetExact => "multiple targets, exact model",
            Self::MultiTargetGreedy => "multiple targets, greedy repair",
            Self::LibraryExact => "multiple libraries, exact model",
            Self::LibraryGreedy => "multiple libraries, greedy repair",
        }
    }
}

/// Thread count configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadCount {
    /// Use all available CPU cores
    Auto,
    /// Use a specific number of threads
    Fixed(usize),
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self::Auto
    }
}

impl ThreadCount {
    /// Get the actual number of threads to use
    pub fn get_count(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            Self::Fixed(n) => (*n).max(1),
        }
    }
}

/// Strand a primer anneals to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub const BOTH: [Strand; 2] = [Strand::Forward, Strand::Reverse];

    pub fn symbol(&self) -> char {
        match self {
            Self::Forward => 'f',
            Self::Reverse => 'r',
        }
    }
}

/// Identity of a primer candidate: target-relative window plus strand.
///
/// Ordering is (start, end, strand) with forward before reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimerKey {
    pub start: i64,
    pub end: i64,
    pub strand: Strand,
}

impl PrimerKey {
    pub fn new(start: i64, end: i64, strand: Strand) -> Self {
        Self { start, end, strand }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    /// Number of positions shared with `other`, regardless of strand
    pub fn overlap(&self, other: &PrimerKey) -> i64 {
        self.span().overlap(&other.span())
    }

    /// Same strand and sharing more than `allowed_overlap` positions
    pub fn collides_with(&self, other: &PrimerKey, allowed_overlap: i64) -> bool {
        self.strand == other.strand && self.overlap(other) > allowed_overlap
    }
}

impl fmt::Display for PrimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.start, self.end, self.strand.symbol())
    }
}

/// Half-open coordinate window, target-relative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: i64,
    pub end: i64,
}

impl Span {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlap(&self, other: &Span) -> i64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0)
    }

    pub fn key(&self, strand: Strand) -> PrimerKey {
        PrimerKey::new(self.start, self.end, strand)
    }
}

/// Two windows whose duplex Tm reaches the cross-hybridization threshold.
///
/// For intra-target pairs `first` is the left window; for inter-target pairs
/// `first` lies in the first target of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForbiddenPair {
    pub first: Span,
    pub second: Span,
}

impl ForbiddenPair {
    pub fn new(first: Span, second: Span) -> Self {
        Self { first, second }
    }

    pub fn swapped(&self) -> Self {
        Self {
            first: self.second,
            second: self.first,
        }
    }
}

/// How a forbidden pair is turned into mutual-exclusion constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionPolicy {
    /// One constraint over both orientations of both windows (at most one of
    /// the four primers). Also excludes forward/reverse at the same window.
    AllOrientations,
    /// One constraint per orientation pair, so only physically paired
    /// primers exclude each other.
    PerOrientation,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::AllOrientations
    }
}

/// Optional Tm / GC filter applied to graph nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityThresholds {
    pub enabled: bool,
    /// Percent
    pub min_gc: f64,
    /// Percent
    pub max_gc: f64,
    pub min_tm: f64,
    pub max_tm: f64,
}

impl Default for FeasibilityThresholds {
    fn default() -> Self {
        Self {
            enabled: false,
            min_gc: 40.0,
            max_gc: 60.0,
            min_tm: 55.0,
            max_tm: 65.0,
        }
    }
}

impl FeasibilityThresholds {
    /// `gc` is a fraction in [0, 1]
    pub fn passes(&self, tm: f64, gc: f64) -> bool {
        if !self.enabled {
            return true;
        }
        let gc_min = self.min_gc / 100.0;
        let gc_max = self.max_gc / 100.0;
        gc_min <= gc && gc <= gc_max && self.min_tm <= tm && tm <= self.max_tm
    }
}

/// Fixed sequence surrounding every target region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flanks {
    pub upstream: String,
    pub downstream: String,
}

impl Default for Flanks {
    fn default() -> Self {
        Self {
            upstream: "GCTAGTGGTGCTAGCCCCGCGAAATTAATACGACTCACTATAGGGTCTAGAAATAATTTTGTTTAACTTTAAGAAGGAGATATACAT".to_string(),
            downstream: "GGAGGGTCTGGGGGAGGAGGCAGTGGCATGGTGAGCAAGGGCGAGGAGCTGTTCACCGGGGTGGTGCCCATCCTGGTCGAGCTGGACGGCGACGTAAACGGCCACAAGTTCAGCGTGTCCGGCGAGGGCGAGGGCGATGCCACCTACGGCAAGCTGACCCTGAAGTTCATCTGCACCACCGGCAAGCTGCCCG".to_string(),
        }
    }
}

impl Flanks {
    pub fn new(upstream: &str, downstream: &str) -> Self {
        Self {
            upstream: upstream.to_ascii_uppercase(),
            downstream: downstream.to_ascii_uppercase(),
        }
    }

    /// No flanking sequence at all
    pub fn none() -> Self {
        Self::new("", "")
    }
}

/// Global design parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignParams {
    pub mode: DesignMode,
    pub primer_lmin: usize,
    pub primer_lmax: usize,
    pub feasibility: FeasibilityThresholds,
    /// Positions two primers may share before they count as overlapping
    pub allowed_overlap: i64,
    /// Duplex Tm at or above which two primers cross-hybridize
    pub cross_hyb_tm: f64,
    /// Number of non-overlapping tilings for the library modes
    pub num_libraries: usize,
    /// Maximum distance from a forward primer's start to its reverse
    /// partner's end
    pub max_oligo_span: i64,
    pub exclusion_policy: ExclusionPolicy,
    /// Unite library bins whose sub-window sequences are identical
    pub merge_bins: bool,
    pub thread_count: ThreadCount,
    pub flanks: Flanks,
    pub scoring: ScoringModel,
    pub conditions: ReactionConditions,
}

impl Default for DesignParams {
    fn default() -> Self {
        Self {
            mode: DesignMode::SingleLongestPath,
            primer_lmin: 18,
            primer_lmax: 25,
            feasibility: FeasibilityThresholds::default(),
            allowed_overlap: 5,
            cross_hyb_tm: 45.0,
            num_libraries: 1,
            max_oligo_span: 250,
            exclusion_policy: ExclusionPolicy::AllOrientations,
            merge_bins: false,
            thread_count: ThreadCount::Auto,
            flanks: Flanks::default(),
            scoring: ScoringModel::default(),
            conditions: ReactionConditions::default(),
        }
    }
}

impl DesignParams {
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.primer_lmin == 0 {
            return Err(DesignError::InvalidParams(
                "minimum primer length must be positive".to_string(),
            ));
        }
        if self.primer_lmin > self.primer_lmax {
            return Err(DesignError::InvalidParams(format!(
                "minimum primer length {} exceeds maximum {}",
                self.primer_lmin, self.primer_lmax
            )));
        }
        if self.allowed_overlap < 0 {
            return Err(DesignError::InvalidParams(
                "allowed overlap cannot be negative".to_string(),
            ));
        }
        if self.num_libraries == 0 {
            return Err(DesignError::InvalidParams(
                "at least one library is required".to_string(),
            ));
        }
        if self.max_oligo_span <= 0 {
            return Err(DesignError::InvalidParams(
                "maximum oligo span must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One accepted tiling: primer keys from source to sink, exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub primers: Vec<PrimerKey>,
    /// Sum of primer efficiencies along the path
    pub score: f64,
}

impl Path {
    pub fn len(&self) -> usize {
        self.primers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primers.is_empty()
    }
}

/// Read-only size summary of a transition graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Progress update during long-running stages
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: String,
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: &str, completed: usize, total: usize) -> Self {
        Self {
            stage: stage.to_string(),
            completed,
            total,
            message: format!("{}: {}/{}", stage, completed, total),
        }
    }
}
