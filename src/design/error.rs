//! Error taxonomy for primer design

use thiserror::Error;

/// Errors raised while designing primer tilings.
///
/// `NoPath` and `InfeasibleModel` are local to one target and are recorded
/// per target by the batch workflows. `MalformedSequence` and
/// `InvalidParams` abort the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DesignError {
    /// The sink is not reachable from the source in a transition graph
    #[error("no source-to-sink path in the transition graph{}", fmt_target(.target))]
    NoPath { target: Option<String> },

    /// The LP oracle did not return an optimal assignment
    #[error("no feasible global assignment (solver status: {status})")]
    InfeasibleModel { status: String },

    /// Input sequence unusable for the requested operation
    #[error("malformed sequence: {reason}")]
    MalformedSequence { reason: String },

    /// Configuration rejected by validation
    #[error("invalid design parameters: {0}")]
    InvalidParams(String),

    /// The worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

fn fmt_target(target: &Option<String>) -> String {
    match target {
        Some(name) => format!(" for target '{}'", name),
        None => String::new(),
    }
}

impl DesignError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSequence {
            reason: reason.into(),
        }
    }

    /// Attach a target name to a `NoPath` error; other variants pass through.
    pub fn for_target(self, name: &str) -> Self {
        match self {
            Self::NoPath { .. } => Self::NoPath {
                target: Some(name.to_string()),
            },
            other => other,
        }
    }

    /// Whether the error is local to one target (recorded, not fatal).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoPath { .. } | Self::InfeasibleModel { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_path_message_names_target() {
        let err = DesignError::NoPath { target: None }.for_target("GFP");
        assert_eq!(
            err.to_string(),
            "no source-to-sink path in the transition graph for target 'GFP'"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_malformed_is_fatal() {
        let err = DesignError::malformed("empty sequence");
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "malformed sequence: empty sequence");
    }
}
