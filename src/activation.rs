/*!
# Gate activations

An LSTM sequence takes its three nonlinearities by name. Names are resolved
once, when the sequence is built, into [`Activation`] values; unknown names
never reach the recurrence.
*/

use core::fmt;
use core::str::FromStr;

use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{LstmError, Result};

/// Elementwise nonlinearity usable at any of the three activation slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    /// `max(0, x)`
    Relu,
    /// `1 / (1 + e^-x)`
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    /// Lowercase name as used in activation lists.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
        }
    }

    /// Applies the activation to every element of `tensor`.
    pub fn forward<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu => activation::relu(tensor),
            Self::Sigmoid => activation::sigmoid(tensor),
            Self::Tanh => activation::tanh(tensor),
        }
    }

    /// Scalar form, used by the reference implementation.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Self::Relu => x.max(0.0),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Tanh => x.tanh(),
        }
    }
}

impl FromStr for Activation {
    type Err = LstmError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "relu" => Ok(Self::Relu),
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            other => Err(LstmError::UnknownActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three activations of an LSTM, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationSet {
    /// Input, forget and output gates.
    pub gate: Activation,
    /// Cell candidate.
    pub candidate: Activation,
    /// Applied to the new cell state to produce the hidden state.
    pub output: Activation,
}

impl ActivationSet {
    pub fn new(gate: Activation, candidate: Activation, output: Activation) -> Self {
        Self {
            gate,
            candidate,
            output,
        }
    }

    /// Parses `[gate, candidate, output]` names.
    ///
    /// Fails with [`LstmError::InvalidActivationSet`] unless exactly three
    /// names are given, and with [`LstmError::UnknownActivation`] on the
    /// first unrecognized name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.len() != 3 {
            return Err(LstmError::InvalidActivationSet(names.len()));
        }
        Ok(Self {
            gate: names[0].as_ref().parse()?,
            candidate: names[1].as_ref().parse()?,
            output: names[2].as_ref().parse()?,
        })
    }

    pub fn names(&self) -> [&'static str; 3] {
        [self.gate.name(), self.candidate.name(), self.output.name()]
    }
}

impl Default for ActivationSet {
    /// The classic LSTM nonlinearities: `sigmoid`, `tanh`, `tanh`.
    fn default() -> Self {
        Self::new(Activation::Sigmoid, Activation::Tanh, Activation::Tanh)
    }
}

impl fmt::Display for ActivationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}.{}.{})", self.gate, self.candidate, self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn_ndarray::NdArray<f32>;

    #[test]
    fn test_parse_known_names() {
        let set = ActivationSet::from_names(&["relu", "sigmoid", "tanh"]).unwrap();
        assert_eq!(set.gate, Activation::Relu);
        assert_eq!(set.candidate, Activation::Sigmoid);
        assert_eq!(set.output, Activation::Tanh);
        assert_eq!(set.to_string(), "(relu.sigmoid.tanh)");
    }

    #[test]
    fn test_reject_wrong_count() {
        assert_eq!(
            ActivationSet::from_names(&["sigmoid", "tanh"]),
            Err(LstmError::InvalidActivationSet(2))
        );
        assert_eq!(
            ActivationSet::from_names(&["sigmoid", "tanh", "tanh", "tanh"]),
            Err(LstmError::InvalidActivationSet(4))
        );
    }

    #[test]
    fn test_reject_unknown_name() {
        assert_eq!(
            ActivationSet::from_names(&["sigmoid", "gelu", "tanh"]),
            Err(LstmError::UnknownActivation("gelu".to_string()))
        );
    }

    #[test]
    fn test_tensor_matches_scalar() {
        let device = Default::default();
        let values = [-2.0f32, -0.5, 0.0, 0.5, 2.0];
        let input = Tensor::<TestBackend, 1>::from_data(TensorData::new(values.to_vec(), [5]), &device);

        for act in [Activation::Relu, Activation::Sigmoid, Activation::Tanh] {
            let out: alloc::vec::Vec<f32> = act.forward(input.clone()).into_data().iter::<f32>().collect();
            for (x, y) in values.iter().zip(out) {
                assert!((act.apply(*x) - y).abs() < 1e-6, "{act} mismatch at {x}");
            }
        }
    }
}
