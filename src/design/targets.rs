//! Target sequences: a variable region wrapped in fixed flanks
//!
//! Input text is either FASTA or tab-separated `name<TAB>region` lines.

use serde::{Deserialize, Serialize};

use super::error::DesignError;
use super::nucleotides::is_standard_base;
use super::types::{Flanks, Span};

/// One target: region plus flanks, coordinates relative to the region start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSequence {
    pub name: String,
    /// The target region only
    pub region: String,
    /// upstream + region + downstream
    pub full: String,
    pub upstream_len: usize,
}

impl TargetSequence {
    pub fn new(name: &str, region: &str, flanks: &Flanks) -> Result<Self, DesignError> {
        let region = region.trim().to_ascii_uppercase();
        if region.is_empty() {
            return Err(DesignError::malformed(format!(
                "target '{}' has an empty region",
                name
            )));
        }
        check_bases(name, "region", &region)?;
        check_bases(name, "upstream flank", &flanks.upstream)?;
        check_bases(name, "downstream flank", &flanks.downstream)?;
        let full = format!("{}{}{}", flanks.upstream, region, flanks.downstream);
        Ok(Self {
            name: name.to_string(),
            upstream_len: flanks.upstream.len(),
            region,
            full,
        })
    }

    /// Length of the target region (the sink boundary)
    pub fn target_len(&self) -> usize {
        self.region.len()
    }

    /// Convert a target-relative coordinate to an index into `full`
    pub fn absolute(&self, pos: i64) -> i64 {
        pos + self.upstream_len as i64
    }

    /// Target-relative coordinate of the first base of `full`
    pub fn first_position(&self) -> i64 {
        -(self.upstream_len as i64)
    }

    /// Target-relative coordinate one past the last base of `full`
    pub fn last_position(&self) -> i64 {
        (self.full.len() - self.upstream_len) as i64
    }

    /// Forward-strand text of a target-relative window
    pub fn window(&self, span: Span) -> Result<&str, DesignError> {
        let start = self.absolute(span.start);
        let end = self.absolute(span.end);
        if start < 0 || end > self.full.len() as i64 || start >= end {
            return Err(DesignError::malformed(format!(
                "window [{}, {}) lies outside target '{}'",
                span.start, span.end, self.name
            )));
        }
        Ok(&self.full[start as usize..end as usize])
    }
}

fn check_bases(name: &str, part: &str, seq: &str) -> Result<(), DesignError> {
    match seq.chars().enumerate().find(|&(_, c)| !c.is_ascii() || !is_standard_base(c as u8)) {
        Some((i, c)) => Err(DesignError::malformed(format!(
            "target '{}' {} contains invalid character '{}' at position {}",
            name,
            part,
            c,
            i + 1
        ))),
        None => Ok(()),
    }
}

/// Parse targets from FASTA or tab-separated text, wrapping each region in
/// the given flanks. Blank lines and `#` comments are skipped in
/// tab-separated input.
pub fn parse_targets(text: &str, flanks: &Flanks) -> Result<Vec<TargetSequence>, DesignError> {
    let records = if text.trim_start().starts_with('>') {
        parse_fasta_records(text)
    } else {
        parse_tabular_records(text)?
    };

    if records.is_empty() {
        return Err(DesignError::malformed("no target sequences found in input"));
    }

    records
        .iter()
        .map(|(name, region)| TargetSequence::new(name, region, flanks))
        .collect()
}

fn parse_fasta_records(text: &str) -> Vec<(String, String)> {
    let mut records = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_seq = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('>') {
            if let Some(prev) = current_name.take() {
                records.push((prev, std::mem::take(&mut current_seq)));
            }
            current_name = Some(name.trim().to_string());
        } else {
            current_seq.extend(line.chars().filter(|c| !c.is_whitespace()));
        }
    }
    if let Some(prev) = current_name {
        records.push((prev, current_seq));
    }
    records
}

fn parse_tabular_records(text: &str) -> Result<Vec<(String, String)>, DesignError> {
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('\t');
        match (fields.next(), fields.next()) {
            (Some(name), Some(region)) => {
                records.push((name.trim().to_string(), region.trim().to_string()))
            }
            _ => {
                return Err(DesignError::malformed(format!(
                    "line {} is not 'name<TAB>sequence'",
                    i + 1
                )))
            }
        }
    }
    Ok(records)
}
