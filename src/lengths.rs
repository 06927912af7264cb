/*!
# Sequence lengths

Per-row valid lengths of a padded batch and the step masks derived from
them. Lengths may come from the host or from an integer tensor; both are
resolved and checked against `T` before the recurrence starts.
*/

use burn::tensor::{backend::Backend, Bool, Int, Tensor, TensorData};

use crate::error::{LstmError, Result};

/// Valid length of every sequence in a batch.
///
/// The recurrence is identical whichever variant is used; they only differ
/// in where the lengths come from.
#[derive(Debug, Clone)]
pub enum SequenceLengths<B: Backend> {
    /// Every sequence spans all `T` steps.
    Full,
    /// Lengths known on the host.
    Constant(alloc::vec::Vec<usize>),
    /// Lengths supplied as an integer tensor `[B]`, read back before the run.
    Tensor(Tensor<B, 1, Int>),
}

impl<B: Backend> SequenceLengths<B> {
    /// Resolves to one length per batch row, each within `0..=seq_length`.
    pub fn resolve(&self, batch_size: usize, seq_length: usize) -> Result<alloc::vec::Vec<usize>> {
        let raw: alloc::vec::Vec<i64> = match self {
            Self::Full => return Ok(alloc::vec![seq_length; batch_size]),
            Self::Constant(lengths) => lengths.iter().map(|&l| l as i64).collect(),
            Self::Tensor(lengths) => lengths.clone().into_data().iter::<i64>().collect(),
        };

        if raw.len() != batch_size {
            return Err(LstmError::shape("sequence lengths", &[batch_size], &[raw.len()]));
        }

        raw.into_iter()
            .enumerate()
            .map(|(batch_index, length)| {
                if length < 0 || length as usize > seq_length {
                    Err(LstmError::InvalidSequenceLength {
                        batch_index,
                        length,
                        max: seq_length,
                    })
                } else {
                    Ok(length as usize)
                }
            })
            .collect()
    }
}

/// Per-step validity masks for a batch with resolved lengths.
#[derive(Debug, Clone)]
pub(crate) struct StepMasks {
    lengths: alloc::vec::Vec<usize>,
    hidden_size: usize,
}

impl StepMasks {
    pub(crate) fn new(lengths: alloc::vec::Vec<usize>, hidden_size: usize) -> Self {
        Self { lengths, hidden_size }
    }

    pub(crate) fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// True when no row is padded at step `t`.
    pub(crate) fn all_valid(&self, t: usize) -> bool {
        self.lengths.iter().all(|&l| t < l)
    }

    /// `[B, H]` mask, true where step `t` lies within the row's length.
    pub(crate) fn at<B: Backend>(&self, t: usize, device: &B::Device) -> Tensor<B, 2, Bool> {
        let values: alloc::vec::Vec<bool> = self
            .lengths
            .iter()
            .flat_map(|&l| core::iter::repeat(t < l).take(self.hidden_size))
            .collect();
        Tensor::from_data(TensorData::new(values, [self.lengths.len(), self.hidden_size]), device)
    }
}
