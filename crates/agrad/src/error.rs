//! Error types for agrad.
//!
//! Numeric edge cases (division by zero, logarithm of a negative number, ...)
//! are never reported here: they propagate as IEEE `NaN`/`inf` values through
//! both the forward values and the adjoints.

use thiserror::Error;

/// Errors that can occur in shape-checked operations and drivers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdError {
    /// Two operands that must agree in size do not.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Operation requires a square matrix.
    #[error("matrix must be square: got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    /// Index outside the valid range.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation is undefined on an empty input.
    #[error("{what} requires a non-empty input")]
    EmptyInput { what: &'static str },
}

impl AdError {
    pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len() {
        assert!(AdError::check_len("v", 3, 3).is_ok());
        let err = AdError::check_len("v", 3, 2).unwrap_err();
        assert_eq!(
            err,
            AdError::DimensionMismatch {
                what: "v",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_display() {
        let err = AdError::NotSquare { rows: 2, cols: 3 };
        assert_eq!(err.to_string(), "matrix must be square: got 2x3");
        let err = AdError::EmptyInput { what: "log_sum_exp" };
        assert_eq!(err.to_string(), "log_sum_exp requires a non-empty input");
    }
}
