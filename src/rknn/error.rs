//! Error handling for the RkNN protocol
//!
//! Every fallible operation in the crate reports one `RknnError`. Failures
//! from the parallel outsourcing phases are collected per worker and
//! surfaced together as [`RknnError::Phase`].

use std::fmt;

use thiserror::Error;

/// RkNN operation error
#[derive(Debug, Error)]
pub enum RknnError {
    /// Missing, empty or malformed point/query input
    #[error("input error: {0}")]
    Input(String),

    /// Points with differing coordinate counts
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// Singular matrix or failed matrix generation
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Caller-side precondition not met (e.g. reference set smaller than k_max)
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// One or more workers of a parallel phase failed
    #[error(
        "{phase} phase failed in {count} worker(s): {joined}",
        count = .errors.len(),
        joined = JoinedErrors(.errors)
    )]
    Phase {
        phase: &'static str,
        errors: Vec<RknnError>,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RknnError {
    /// Create an input error with the given message
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a numerical error with the given message
    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    /// Create a precondition error with the given message
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

impl From<bincode::Error> for RknnError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RknnError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

struct JoinedErrors<'a>(&'a [RknnError]);

impl fmt::Display for JoinedErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// Result type for RkNN operations
pub type Result<T> = std::result::Result<T, RknnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_error_lists_every_worker() {
        let err = RknnError::Phase {
            phase: "encrypt",
            errors: vec![
                RknnError::input("row 3 has a NaN coordinate"),
                RknnError::input("row 9 has a NaN coordinate"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 worker(s)"));
        assert!(msg.contains("row 3"));
        assert!(msg.contains("row 9"));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RknnError::dimension_mismatch("reference set", 2, 3);
        assert_eq!(
            err.to_string(),
            "dimension mismatch in reference set: expected 2, found 3"
        );
    }
}
