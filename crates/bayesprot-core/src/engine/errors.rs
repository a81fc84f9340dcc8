//! Error types for protein inference.

use thiserror::Error;

/// Errors that can occur while configuring, compiling, or running inference.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Configuration errors are fatal for a run and surface before any inference
/// work begins. Structural and numerical errors are scoped to a single
/// connected component: the orchestration layer logs them and moves on.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Invalid option value or unsupported option (e.g. out-of-range hyperparameter).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed evidence or factor structure (e.g. a PSM with no upstream evidence).
    #[error("structural error: {0}")]
    Structural(String),

    /// Numerical failure (NaN/Inf, zero probability mass, contradictory evidence).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal invariant violation (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl InferenceError {
    /// Whether the error only invalidates one connected component.
    pub fn is_component_scoped(&self) -> bool {
        matches!(
            self,
            InferenceError::Structural(_) | InferenceError::Numerical(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_scope_classification() {
        assert!(InferenceError::Structural("x".into()).is_component_scoped());
        assert!(InferenceError::Numerical("x".into()).is_component_scoped());
        assert!(!InferenceError::Configuration("x".into()).is_component_scoped());
        assert!(!InferenceError::Internal("x".into()).is_component_scoped());
    }

    #[test]
    fn display_carries_category_prefix() {
        let err = InferenceError::Configuration("dampening_lambda must be in [0, 1]".into());
        assert_eq!(
            err.to_string(),
            "configuration error: dampening_lambda must be in [0, 1]"
        );
    }
}
