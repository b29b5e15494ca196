//! Primer Tiler - PCR primer tiling design
//!
//! Scores candidate primers over target regions wrapped in fixed flanks,
//! links them into transition graphs of alternating forward/reverse
//! primers, and picks tilings per target or jointly across targets while
//! avoiding primer pairs that cross-hybridize.

pub mod design;

pub use design::*;
