//! Nucleotide text utilities

use bio::alphabets::dna;

/// Check if a byte is a standard DNA base (either case)
#[inline]
pub fn is_standard_base(b: u8) -> bool {
    matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

/// Index of a base in the A, C, G, T order used by the stacking tables.
/// Returns `None` for anything that is not a standard base.
#[inline]
pub fn base_index(b: u8) -> Option<usize> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Watson-Crick pairing on base indices
#[inline]
pub fn indices_pair(a: usize, b: usize) -> bool {
    a + b == 3
}

/// Reverse complement of a DNA string. Case is preserved; bytes outside the
/// DNA alphabet are passed through by position.
pub fn reverse_complement(seq: &str) -> String {
    String::from_utf8_lossy(&dna::revcomp(seq.as_bytes())).into_owned()
}

/// GC fraction over the standard bases only. Other characters are excluded
/// from the denominator; a sequence without any standard base yields 0.
pub fn gc_fraction(seq: &str) -> f64 {
    let mut gc = 0usize;
    let mut counted = 0usize;
    for b in seq.bytes() {
        match b.to_ascii_uppercase() {
            b'G' | b'C' => {
                gc += 1;
                counted += 1;
            }
            b'A' | b'T' => counted += 1,
            _ => {}
        }
    }
    if counted == 0 {
        0.0
    } else {
        gc as f64 / counted as f64
    }
}

/// Length of the run of A at the 3' end
pub fn trailing_a_run(seq: &str) -> usize {
    seq.bytes()
        .rev()
        .take_while(|b| b.to_ascii_uppercase() == b'A')
        .count()
}

/// Uppercase copy with one ASCII byte per position; characters outside ASCII
/// become `N`, so byte offsets and positions coincide.
pub fn normalize_sequence(seq: &str) -> String {
    seq.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_uppercase() } else { 'N' })
        .collect()
}

/// Number of standard bases in the sequence
pub fn standard_length(seq: &str) -> usize {
    seq.bytes().filter(|&b| is_standard_base(b)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("AACGTT"), "AACGTT");
        assert_eq!(reverse_complement("AAAAC"), "GTTTT");
        assert_eq!(reverse_complement("acg"), "cgt");
    }

    #[test]
    fn test_gc_fraction_ignores_other_characters() {
        assert_eq!(gc_fraction("GGCC"), 1.0);
        assert_eq!(gc_fraction("GCAT"), 0.5);
        assert_eq!(gc_fraction("GCNN"), 1.0);
        assert_eq!(gc_fraction("NNN"), 0.0);
        assert_eq!(gc_fraction("gcat"), 0.5);
    }

    #[test]
    fn test_trailing_a_run() {
        assert_eq!(trailing_a_run("GCTAAA"), 3);
        assert_eq!(trailing_a_run("GCTaa"), 2);
        assert_eq!(trailing_a_run("AAAG"), 0);
        assert_eq!(trailing_a_run(""), 0);
    }

    #[test]
    fn test_normalize_keeps_one_byte_per_position() {
        let seq = normalize_sequence("acgÅtn");
        assert_eq!(seq, "ACGNTN");
        assert_eq!(seq.len(), 6);
    }

    #[test]
    fn test_base_index_pairs() {
        let a = base_index(b'A').unwrap();
        let t = base_index(b't').unwrap();
        let c = base_index(b'C').unwrap();
        let g = base_index(b'G').unwrap();
        assert!(indices_pair(a, t));
        assert!(indices_pair(c, g));
        assert!(!indices_pair(a, g));
        assert_eq!(base_index(b'N'), None);
    }

    proptest! {
        #[test]
        fn test_reverse_complement_twice_is_identity(seq in "[ACGTacgt]{0,60}") {
            prop_assert_eq!(reverse_complement(&reverse_complement(&seq)), seq);
        }
    }
}
