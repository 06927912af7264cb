/*!
# Weight sets

One [`LstmWeights`] holds the parameters of one direction: input weights
`[4H, input_size]`, recurrent weights `[4H, H]` and an optional bias of
`4H` entries, or `8H` when input and recurrent biases are kept apart.

The `4H` axis is four stacked gate blocks. [`GateOrder`] tells in which
order the blocks were laid out by whoever produced the weights; the engine
re-lays them to input, forget, cell, output once, at construction.
*/

use burn::tensor::{backend::Backend, Distribution, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{LstmError, Result};

/// Order of the four gate blocks along the `4H` axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GateOrder {
    /// input, forget, cell, output
    #[default]
    Ifgo,
    /// forget, input, cell, output
    Figo,
}

impl GateOrder {
    /// Position of each canonical gate (input, forget, cell, output) in this layout.
    pub fn positions(&self) -> [usize; 4] {
        match self {
            Self::Ifgo => [0, 1, 2, 3],
            Self::Figo => [1, 0, 2, 3],
        }
    }

    /// Reorders the gate blocks of `tensor` along `dim` into input, forget, cell, output.
    pub(crate) fn to_canonical<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
        match self {
            Self::Ifgo => tensor,
            Self::Figo => {
                let chunks = tensor.chunk(4, dim);
                let blocks = self.positions().iter().map(|&p| chunks[p].clone()).collect();
                Tensor::cat(blocks, dim)
            }
        }
    }
}

/// Parameters of one recurrence direction.
#[derive(Debug, Clone)]
pub struct LstmWeights<B: Backend> {
    /// `[4H, input_size]`
    pub weight_ih: Tensor<B, 2>,
    /// `[4H, H]`
    pub weight_hh: Tensor<B, 2>,
    /// `[4H]` or `[8H]`
    pub bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> LstmWeights<B> {
    pub fn new(weight_ih: Tensor<B, 2>, weight_hh: Tensor<B, 2>, bias: Option<Tensor<B, 1>>) -> Self {
        Self {
            weight_ih,
            weight_hh,
            bias,
        }
    }

    /// Uniform weights in `[-range, range]`.
    pub fn random(input_size: usize, hidden_size: usize, range: f64, device: &B::Device) -> Self {
        let dist = Distribution::Uniform(-range, range);
        Self {
            weight_ih: Tensor::random([4 * hidden_size, input_size], dist, device),
            weight_hh: Tensor::random([4 * hidden_size, hidden_size], dist, device),
            bias: Some(Tensor::random([4 * hidden_size], dist, device)),
        }
    }

    /// Hidden size implied by the recurrent weights.
    pub fn hidden_size(&self) -> usize {
        self.weight_hh.dims()[1]
    }

    /// Checks the shapes against `input_size` / `hidden_size` and returns the
    /// weights in canonical gate order with a `4H` bias.
    pub(crate) fn canonicalize(
        self,
        input_size: usize,
        hidden_size: usize,
        order: GateOrder,
        device: &B::Device,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 1>)> {
        let gates = 4 * hidden_size;

        let ih = self.weight_ih.dims();
        if ih != [gates, input_size] {
            return Err(LstmError::shape("input weights", &[gates, input_size], &ih));
        }
        let hh = self.weight_hh.dims();
        if hh != [gates, hidden_size] {
            return Err(LstmError::shape("recurrent weights", &[gates, hidden_size], &hh));
        }

        let bias = match self.bias {
            None => Tensor::zeros([gates], device),
            Some(bias) => match bias.dims() {
                [n] if n == gates => bias,
                [n] if n == 2 * gates => bias.clone().narrow(0, 0, gates) + bias.narrow(0, gates, gates),
                other => return Err(LstmError::shape("bias", &[gates], &other)),
            },
        };

        Ok((
            order.to_canonical(self.weight_ih, 0),
            order.to_canonical(self.weight_hh, 0),
            order.to_canonical(bias, 0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn values<const D: usize>(t: Tensor<TestBackend, D>) -> alloc::vec::Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_figo_is_relaid() {
        let device = Default::default();
        // hidden 1, input 1: one row per gate, tagged by value
        let w = Tensor::<TestBackend, 2>::from_data(TensorData::new(alloc::vec![10.0f32, 20.0, 30.0, 40.0], [4, 1]), &device);
        let r = Tensor::<TestBackend, 2>::zeros([4, 1], &device);
        let weights = LstmWeights::new(w, r, None);

        let (ih, _, bias) = weights.canonicalize(1, 1, GateOrder::Figo, &device).unwrap();

        assert_eq!(values(ih), alloc::vec![20.0, 10.0, 30.0, 40.0]);
        assert_eq!(values(bias), alloc::vec![0.0; 4]);
    }

    #[test]
    fn test_split_bias_is_folded() {
        let device = Default::default();
        let bias = Tensor::<TestBackend, 1>::from_data(
            TensorData::new(alloc::vec![1.0f32, 2.0, 3.0, 4.0, 0.5, 0.5, 0.5, 0.5], [8]),
            &device,
        );
        let weights = LstmWeights::new(
            Tensor::<TestBackend, 2>::zeros([4, 3], &device),
            Tensor::<TestBackend, 2>::zeros([4, 1], &device),
            Some(bias),
        );

        let (_, _, bias) = weights.canonicalize(3, 1, GateOrder::Ifgo, &device).unwrap();

        assert_eq!(values(bias), alloc::vec![1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_shape_errors() {
        let device = Default::default();
        let bad_ih = LstmWeights::new(
            Tensor::<TestBackend, 2>::zeros([8, 3], &device),
            Tensor::<TestBackend, 2>::zeros([8, 2], &device),
            None,
        );
        assert!(matches!(
            bad_ih.canonicalize(4, 2, GateOrder::Ifgo, &device),
            Err(LstmError::InvalidShape { .. })
        ));

        let bad_hh = LstmWeights::new(
            Tensor::<TestBackend, 2>::zeros([8, 3], &device),
            Tensor::<TestBackend, 2>::zeros([8, 3], &device),
            None,
        );
        assert!(matches!(
            bad_hh.canonicalize(3, 2, GateOrder::Ifgo, &device),
            Err(LstmError::InvalidShape { .. })
        ));

        let bad_bias = LstmWeights::new(
            Tensor::<TestBackend, 2>::zeros([8, 3], &device),
            Tensor::<TestBackend, 2>::zeros([8, 2], &device),
            Some(Tensor::<TestBackend, 1>::zeros([6], &device)),
        );
        assert!(matches!(
            bad_bias.canonicalize(3, 2, GateOrder::Ifgo, &device),
            Err(LstmError::InvalidShape { .. })
        ));
    }
}
