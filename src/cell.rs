/*!
# LSTM cell

A single direction of the recurrence. The cell owns one weight set in
input, forget, cell, output gate order and computes one time step at a time;
sequencing, masking and direction live in [`crate::sequence`].
*/

use burn::{
    module::{Module, Param},
    tensor::{backend::Backend, Tensor},
};

use crate::activation::ActivationSet;
use crate::precision::Precision;

/// Cell and hidden state of an LSTM.
///
/// Per-step states are `[batch, hidden]`; sequence states carry a leading
/// direction axis, `[num_directions, batch, hidden]`.
#[derive(Clone, Debug)]
pub struct LstmState<B: Backend, const D: usize> {
    pub cell: Tensor<B, D>,
    pub hidden: Tensor<B, D>,
}

impl<B: Backend, const D: usize> LstmState<B, D> {
    pub fn new(cell: Tensor<B, D>, hidden: Tensor<B, D>) -> Self {
        Self { cell, hidden }
    }
}

/// Step-invariant settings shared by every time step of a run.
#[derive(Clone, Copy, Debug)]
pub struct StepOptions {
    pub activations: ActivationSet,
    pub clip: f32,
    pub precision: Precision,
}

#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    /// `[4H, input_size]`
    pub weight_ih: Param<Tensor<B, 2>>,
    /// `[4H, H]`
    pub weight_hh: Param<Tensor<B, 2>>,
    /// `[4H]`
    pub bias: Param<Tensor<B, 1>>,
    pub input_size: usize,
    pub hidden_size: usize,
}

impl<B: Backend> LstmCell<B> {
    /// Builds a cell from canonical (input, forget, cell, output) weights,
    /// rounded to `precision`.
    pub fn new(weight_ih: Tensor<B, 2>, weight_hh: Tensor<B, 2>, bias: Tensor<B, 1>, precision: Precision) -> Self {
        let [gates, input_size] = weight_ih.dims();
        Self {
            weight_ih: Param::from_tensor(precision.round(weight_ih)),
            weight_hh: Param::from_tensor(precision.round(weight_hh)),
            bias: Param::from_tensor(precision.round(bias)),
            input_size,
            hidden_size: gates / 4,
        }
    }

    /// Input projection `x·Wxᵀ + b` for a whole sequence: `[B, T, I]` to `[B, T, 4H]`.
    pub fn project_sequence(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        input.matmul(self.weight_ih.val().transpose().unsqueeze_dim::<3>(0))
            + self.bias.val().unsqueeze_dim::<2>(0).unsqueeze_dim::<3>(0)
    }

    /// Input projection for one step: `[B, I]` to `[B, 4H]`.
    pub fn project(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input.matmul(self.weight_ih.val().transpose()) + self.bias.val().unsqueeze_dim(0)
    }

    /// Gate pre-activations after clipping, `[B, 4H]`.
    ///
    /// Rounded before clamping, so no entry exceeds `clip` in any precision.
    pub fn gate_preactivations(&self, input_projected: Tensor<B, 2>, hidden: Tensor<B, 2>, options: &StepOptions) -> Tensor<B, 2> {
        let gates = options
            .precision
            .round(input_projected + hidden.matmul(self.weight_hh.val().transpose()));
        if options.clip > 0.0 {
            gates.clamp(-options.clip, options.clip)
        } else {
            gates
        }
    }

    /// Advances the state by one step from a pre-computed input projection.
    pub fn forward_step(&self, input_projected: Tensor<B, 2>, state: LstmState<B, 2>, options: &StepOptions) -> LstmState<B, 2> {
        let LstmState { cell, hidden } = state;
        let acts = &options.activations;
        let precision = options.precision;

        let gates = self.gate_preactivations(input_projected, hidden, options);
        let chunks = gates.chunk(4, 1);

        let input_gate = precision.round(acts.gate.forward(chunks[0].clone()));
        let forget_gate = precision.round(acts.gate.forward(chunks[1].clone()));
        let candidate = precision.round(acts.candidate.forward(chunks[2].clone()));
        let output_gate = precision.round(acts.gate.forward(chunks[3].clone()));

        let cell = precision.round(forget_gate * cell + input_gate * candidate);
        let hidden = precision.round(output_gate * acts.output.forward(cell.clone()));

        LstmState::new(cell, hidden)
    }

    /// Advances the state by one step from the raw input `[B, I]`.
    pub fn forward(&self, input: Tensor<B, 2>, state: LstmState<B, 2>, options: &StepOptions) -> LstmState<B, 2> {
        self.forward_step(self.project(input), state, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn constant_cell(weight: f32, bias: f32, device: &<TestBackend as Backend>::Device) -> LstmCell<TestBackend> {
        LstmCell::new(
            Tensor::full([4, 1], weight, device),
            Tensor::full([4, 1], weight, device),
            Tensor::full([4], bias, device),
            Precision::F32,
        )
    }

    fn scalar(t: Tensor<TestBackend, 2>) -> f32 {
        t.into_data().iter::<f32>().next().unwrap()
    }

    #[test]
    fn test_single_step_by_hand() {
        let device = Default::default();
        let cell = constant_cell(0.0, 1.0, &device);
        let options = StepOptions {
            activations: ActivationSet::default(),
            clip: 0.0,
            precision: Precision::F32,
        };
        let state = LstmState::new(Tensor::zeros([1, 1], &device), Tensor::zeros([1, 1], &device));

        let state = cell.forward(Tensor::zeros([1, 1], &device), state, &options);

        // i = f = o = sigmoid(1), g = tanh(1)
        assert!((scalar(state.cell.clone()) - 0.556_769_9).abs() < 1e-5);
        assert!((scalar(state.hidden) - 0.369_606_35).abs() < 1e-5);
    }

    #[test]
    fn test_clip_bounds_preactivations() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(
            Tensor::random([8, 3], Distribution::Uniform(-5.0, 5.0), &device),
            Tensor::random([8, 2], Distribution::Uniform(-5.0, 5.0), &device),
            Tensor::random([8], Distribution::Uniform(-5.0, 5.0), &device),
            Precision::F32,
        );
        let options = StepOptions {
            activations: ActivationSet::new(Activation::Relu, Activation::Relu, Activation::Relu),
            clip: 0.7,
            precision: Precision::F32,
        };
        let input = Tensor::<TestBackend, 2>::random([4, 3], Distribution::Uniform(-5.0, 5.0), &device);
        let hidden = Tensor::<TestBackend, 2>::random([4, 2], Distribution::Uniform(-5.0, 5.0), &device);

        let gates = cell.gate_preactivations(cell.project(input), hidden, &options);

        assert!(gates.into_data().iter::<f32>().all(|v| v.abs() <= 0.7));
    }

    #[test]
    fn test_clip_bounds_preactivations_in_half_precision() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(
            Tensor::zeros([4, 1], &device),
            Tensor::zeros([4, 1], &device),
            Tensor::full([4], 5.0, &device),
            Precision::F16,
        );
        let options = StepOptions {
            activations: ActivationSet::default(),
            clip: 0.7,
            precision: Precision::F16,
        };

        let gates = cell.gate_preactivations(
            cell.project(Tensor::zeros([1, 1], &device)),
            Tensor::zeros([1, 1], &device),
            &options,
        );

        let gates: alloc::vec::Vec<f32> = gates.into_data().iter::<f32>().collect();
        assert_eq!(gates, alloc::vec![0.7; 4]);
    }

    #[test]
    fn test_zero_clip_leaves_preactivations() {
        let device = Default::default();
        let cell = constant_cell(3.0, 2.0, &device);
        let options = StepOptions {
            activations: ActivationSet::default(),
            clip: 0.0,
            precision: Precision::F32,
        };
        let input = Tensor::<TestBackend, 2>::from_data(TensorData::new(alloc::vec![1.0f32], [1, 1]), &device);

        let gates = cell.gate_preactivations(cell.project(input), Tensor::ones([1, 1], &device), &options);

        // 3*1 + 3*1 + 2
        assert!(gates.into_data().iter::<f32>().all(|v| (v - 8.0).abs() < 1e-6));
    }
}
