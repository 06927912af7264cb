//! Error types for the LSTM sequence engine.

use thiserror::Error;

/// Result type alias for LSTM sequence operations.
pub type Result<T> = core::result::Result<T, LstmError>;

/// Errors raised while building or running an LSTM sequence.
///
/// Every variant is raised before any computation starts, so a failed call
/// never yields partial outputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LstmError {
    /// A tensor or weight does not have the shape implied by the configuration.
    #[error("invalid shape for {name}: expected {expected:?}, got {actual:?}")]
    InvalidShape {
        /// What was being checked.
        name: String,
        /// Expected dimensions.
        expected: Vec<usize>,
        /// Actual dimensions.
        actual: Vec<usize>,
    },

    /// The activation set does not contain exactly three names.
    #[error("expected exactly 3 activation functions, got {0}")]
    InvalidActivationSet(usize),

    /// An activation name is not one of `relu`, `sigmoid` or `tanh`.
    #[error("unknown activation function: {0:?}")]
    UnknownActivation(String),

    /// A sequence length is negative or longer than the padded sequence.
    #[error("invalid sequence length {length} for batch entry {batch_index}: must be within 0..={max}")]
    InvalidSequenceLength {
        /// Batch row the length belongs to.
        batch_index: usize,
        /// The offending length.
        length: i64,
        /// Padded sequence length `T`.
        max: usize,
    },

    /// The clip threshold is negative or not finite.
    #[error("clip threshold must be a finite non-negative number, got {0}")]
    InvalidClip(f32),
}

impl LstmError {
    pub(crate) fn shape(name: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::InvalidShape {
            name: name.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
