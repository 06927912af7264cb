/*!
# Precision

Evaluation precision of a run and the tolerances used when comparing
against the scalar reference. Half precision is emulated by rounding
through `half::f16`, so it runs on any float backend.
*/

use burn::tensor::{backend::Backend, Tensor, TensorData};
use half::f16;
use serde::{Deserialize, Serialize};

/// Floating-point precision a sequence is evaluated in.
///
/// `F16` is emulated: tensors stay in the backend's float type but are
/// rounded through IEEE half precision at every storage point of the
/// recurrence (inputs, weights, gate pre-activations, activated gates, cell
/// and hidden states).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    F32,
    F16,
}

/// Absolute and relative bounds for comparing against a reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub absolute: f32,
    pub relative: f32,
}

impl Tolerance {
    /// `|actual - expected| <= absolute + relative * |expected|`
    pub fn accepts(&self, actual: f32, expected: f32) -> bool {
        (actual - expected).abs() <= self.absolute + self.relative * expected.abs()
    }
}

impl Precision {
    /// Short name used in case names (`FP32` / `FP16`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::F32 => "FP32",
            Self::F16 => "FP16",
        }
    }

    pub fn tolerance(&self) -> Tolerance {
        match self {
            Self::F32 => Tolerance {
                absolute: 1e-4,
                relative: 1e-3,
            },
            Self::F16 => Tolerance {
                absolute: 2e-2,
                relative: 2e-2,
            },
        }
    }

    pub fn round_scalar(&self, value: f32) -> f32 {
        match self {
            Self::F32 => value,
            Self::F16 => f16::from_f32(value).to_f32(),
        }
    }

    pub fn round_slice(&self, values: &mut [f32]) {
        if *self == Self::F16 {
            values.iter_mut().for_each(|v| *v = self.round_scalar(*v));
        }
    }

    /// Rounds every element of `tensor` to this precision.
    pub fn round<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::F32 => tensor,
            Self::F16 => {
                let device = tensor.device();
                let dims = tensor.dims();
                let values: alloc::vec::Vec<f32> = tensor
                    .into_data()
                    .iter::<f32>()
                    .map(|v| f16::from_f32(v).to_f32())
                    .collect();
                Tensor::from_data(TensorData::new(values, dims), &device)
            }
        }
    }
}
