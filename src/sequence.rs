/*!
# LSTM sequence

Runs the LSTM recurrence over a padded batch `[B, T, input_size]` in the
forward, reverse or both directions, honouring per-row sequence lengths.

A row whose length is `L` only updates its state at steps `t < L`; at the
other steps the previous state is carried through a masked select, so
padding never reaches valid positions. The reverse pass visits
`T-1, ..., 0` and therefore meets the padded steps first: its recurrence
effectively starts at `L-1` from the initial state.

Padded output positions are zero by default. With [`PaddingMode::HoldLast`]
they repeat the row's hidden state at step `L-1` in both directions.
*/

use burn::{
    config::Config,
    module::{Ignored, Module},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::ActivationSet;
use crate::cell::{LstmCell, LstmState, StepOptions};
use crate::error::LstmError;
use crate::lengths::{SequenceLengths, StepMasks};
use crate::precision::Precision;
use crate::weights::{GateOrder, LstmWeights};

/// Temporal traversal order(s) of the recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
    Bidirectional,
}

impl Direction {
    pub fn num_directions(&self) -> usize {
        match self {
            Self::Forward | Self::Reverse => 1,
            Self::Bidirectional => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Bidirectional => "bidirectional",
        }
    }

    /// Whether pass `index` of this direction walks the sequence backwards.
    fn is_reversed(&self, index: usize) -> bool {
        match self {
            Self::Forward => false,
            Self::Reverse => true,
            Self::Bidirectional => index == 1,
        }
    }
}

/// What the output holds at steps beyond a row's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaddingMode {
    /// Zeros.
    #[default]
    Zero,
    /// The hidden state at the row's last valid step.
    HoldLast,
}

/// How the input projection is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Execution {
    /// One matmul projects every step before the loop.
    #[default]
    Fused,
    /// Each step projects its own input, like an unrolled tensor iterator.
    Unrolled,
}

fn default_activations() -> alloc::vec::Vec<String> {
    ActivationSet::default().names().iter().map(|n| n.to_string()).collect()
}

/// Configuration for [`LstmSequence`].
#[derive(Config, Debug)]
pub struct LstmSequenceConfig {
    /// Features per time step.
    pub input_size: usize,
    /// Hidden state size `H`.
    pub hidden_size: usize,
    #[config(default = "Direction::Forward")]
    pub direction: Direction,
    /// `[gate, candidate, output]` activation names.
    #[config(default = "default_activations()")]
    pub activations: alloc::vec::Vec<String>,
    /// Symmetric clamp applied to gate pre-activations; `0` disables it.
    #[config(default = "0.0")]
    pub clip: f32,
    /// Gate layout of weights handed to `init_with_weights`.
    #[config(default = "GateOrder::Ifgo")]
    pub gate_order: GateOrder,
    #[config(default = "PaddingMode::Zero")]
    pub padding: PaddingMode,
    #[config(default = "Precision::F32")]
    pub precision: Precision,
    #[config(default = "Execution::Fused")]
    pub execution: Execution,
    /// Bound of the uniform initializer; `1/sqrt(H)` when unset.
    pub weight_range: Option<f64>,
}

impl LstmSequenceConfig {
    /// Initializes a sequence with random weights for every direction.
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<LstmSequence<B>> {
        self.check_sizes()?;
        let range = self
            .weight_range
            .unwrap_or_else(|| 1.0 / (self.hidden_size.max(1) as f64).sqrt());
        let weights = (0..self.direction.num_directions())
            .map(|_| LstmWeights::random(self.input_size, self.hidden_size, range, device))
            .collect();

        // random weights are generated in canonical order
        self.build(weights, GateOrder::Ifgo, device)
    }

    /// Initializes a sequence from explicit weight sets, one per direction
    /// (forward first for bidirectional sequences), laid out in `gate_order`.
    pub fn init_with_weights<B: Backend>(&self, weights: alloc::vec::Vec<LstmWeights<B>>, device: &B::Device) -> crate::Result<LstmSequence<B>> {
        self.build(weights, self.gate_order, device)
    }

    fn check_sizes(&self) -> crate::Result<()> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err(LstmError::shape(
                "input and hidden sizes",
                &[self.input_size.max(1), self.hidden_size.max(1)],
                &[self.input_size, self.hidden_size],
            ));
        }
        Ok(())
    }

    fn build<B: Backend>(
        &self,
        weights: alloc::vec::Vec<LstmWeights<B>>,
        gate_order: GateOrder,
        device: &B::Device,
    ) -> crate::Result<LstmSequence<B>> {
        let activations = ActivationSet::from_names(&self.activations)?;
        self.check_sizes()?;

        if !self.clip.is_finite() || self.clip < 0.0 {
            return Err(LstmError::InvalidClip(self.clip));
        }

        let num_directions = self.direction.num_directions();
        if weights.len() != num_directions {
            return Err(LstmError::shape("weight sets", &[num_directions], &[weights.len()]));
        }

        let cells = weights
            .into_iter()
            .map(|w| {
                let (weight_ih, weight_hh, bias) = w.canonicalize(self.input_size, self.hidden_size, gate_order, device)?;
                Ok(LstmCell::new(weight_ih, weight_hh, bias, self.precision))
            })
            .collect::<crate::Result<alloc::vec::Vec<_>>>()?;

        debug!(
            input_size = self.input_size,
            hidden_size = self.hidden_size,
            direction = self.direction.name(),
            activations = %activations,
            clip = self.clip,
            "initialized lstm sequence"
        );

        Ok(LstmSequence {
            cells,
            direction: Ignored(self.direction),
            options: Ignored(StepOptions {
                activations,
                clip: self.clip,
                precision: self.precision,
            }),
            padding: Ignored(self.padding),
            execution: Ignored(self.execution),
            input_size: self.input_size,
            hidden_size: self.hidden_size,
        })
    }

    /// Builds a sequence from `weights` and runs it once on `input`.
    pub fn run<B: Backend>(
        &self,
        weights: alloc::vec::Vec<LstmWeights<B>>,
        input: Tensor<B, 3>,
        lengths: SequenceLengths<B>,
        state: Option<LstmState<B, 3>>,
    ) -> crate::Result<LstmSequenceOutput<B>> {
        let device = input.device();
        self.init_with_weights(weights, &device)?.forward(input, lengths, state)
    }
}

/// Result of an LSTM sequence run.
#[derive(Clone, Debug)]
pub struct LstmSequenceOutput<B: Backend> {
    /// Hidden state of every step, `[B, T, num_directions * H]`, forward half first.
    pub output: Tensor<B, 3>,
    /// Final states, `[num_directions, B, H]`.
    pub state: LstmState<B, 3>,
}

/// An LSTM sequence operator with its weights and settings.
#[derive(Module, Debug)]
pub struct LstmSequence<B: Backend> {
    /// One cell per direction, forward first.
    pub cells: alloc::vec::Vec<LstmCell<B>>,
    pub direction: Ignored<Direction>,
    pub options: Ignored<StepOptions>,
    pub padding: Ignored<PaddingMode>,
    pub execution: Ignored<Execution>,
    pub input_size: usize,
    pub hidden_size: usize,
}

impl<B: Backend> LstmSequence<B> {
    /// Runs the sequence.
    ///
    /// - `input`: `[B, T, input_size]`, `T >= 1`.
    /// - `lengths`: valid length of every row.
    /// - `state`: initial states `[num_directions, B, H]`; zeros when `None`.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        lengths: SequenceLengths<B>,
        state: Option<LstmState<B, 3>>,
    ) -> crate::Result<LstmSequenceOutput<B>> {
        let device = input.device();
        let [batch_size, seq_length, input_size] = input.dims();
        let num_directions = self.direction.num_directions();
        let state_dims = [num_directions, batch_size, self.hidden_size];

        if input_size != self.input_size || seq_length == 0 || batch_size == 0 {
            return Err(LstmError::shape(
                "input",
                &[batch_size.max(1), seq_length.max(1), self.input_size],
                &[batch_size, seq_length, input_size],
            ));
        }
        let lengths = lengths.resolve(batch_size, seq_length)?;

        let state = match state {
            Some(state) => {
                for (name, dims) in [("initial cell state", state.cell.dims()), ("initial hidden state", state.hidden.dims())] {
                    if dims != state_dims {
                        return Err(LstmError::shape(name, &state_dims, &dims));
                    }
                }
                state
            }
            None => LstmState::new(Tensor::zeros(state_dims, &device), Tensor::zeros(state_dims, &device)),
        };

        debug!(batch_size, seq_length, ?lengths, direction = self.direction.name(), "running lstm sequence");

        let precision = self.options.precision;
        let input = precision.round(input);
        let masks = StepMasks::new(lengths, self.hidden_size);

        let mut outputs = alloc::vec::Vec::with_capacity(num_directions);
        let mut cells = alloc::vec::Vec::with_capacity(num_directions);
        let mut hiddens = alloc::vec::Vec::with_capacity(num_directions);

        for (index, cell) in self.cells.iter().enumerate() {
            let initial = LstmState::new(
                precision.round(direction_slice(&state.cell, index)),
                precision.round(direction_slice(&state.hidden, index)),
            );
            let (output, last) = self.run_direction(cell, &input, &masks, initial, self.direction.is_reversed(index));
            outputs.push(output);
            cells.push(last.cell);
            hiddens.push(last.hidden);
        }

        Ok(LstmSequenceOutput {
            output: Tensor::cat(outputs, 2),
            state: LstmState::new(Tensor::stack(cells, 0), Tensor::stack(hiddens, 0)),
        })
    }

    /// One pass of the recurrence in the given traversal order.
    ///
    /// Returns the per-step hidden states in time order, `[B, T, H]`, and the
    /// final state.
    fn run_direction(
        &self,
        cell: &LstmCell<B>,
        input: &Tensor<B, 3>,
        masks: &StepMasks,
        mut state: LstmState<B, 2>,
        reversed: bool,
    ) -> (Tensor<B, 3>, LstmState<B, 2>) {
        let device = input.device();
        let [batch_size, seq_length, input_size] = input.dims();
        let gates = 4 * self.hidden_size;

        let projected = match *self.execution {
            Execution::Fused => Some(cell.project_sequence(input.clone())),
            Execution::Unrolled => None,
        };

        let steps: alloc::vec::Vec<usize> = if reversed {
            (0..seq_length).rev().collect()
        } else {
            (0..seq_length).collect()
        };

        let mut outputs = alloc::vec::Vec::with_capacity(seq_length);
        for t in steps {
            let input_projected = match &projected {
                Some(projected) => projected
                    .clone()
                    .slice([0..batch_size, t..(t + 1), 0..gates])
                    .reshape([batch_size, gates]),
                None => cell.project(
                    input
                        .clone()
                        .slice([0..batch_size, t..(t + 1), 0..input_size])
                        .reshape([batch_size, input_size]),
                ),
            };

            let next = cell.forward_step(input_projected, state.clone(), &self.options);

            let (next, step_output) = if masks.all_valid(t) {
                let hidden = next.hidden.clone();
                (next, hidden)
            } else {
                let mask = masks.at::<B>(t, &device);
                let next = LstmState::new(
                    state.cell.mask_where(mask.clone(), next.cell),
                    state.hidden.mask_where(mask.clone(), next.hidden),
                );
                let step_output = match *self.padding {
                    PaddingMode::HoldLast => next.hidden.clone(),
                    PaddingMode::Zero => next.hidden.zeros_like().mask_where(mask, next.hidden.clone()),
                };
                (next, step_output)
            };

            state = next;
            outputs.push(step_output);
        }

        if reversed {
            outputs.reverse();
            if *self.padding == PaddingMode::HoldLast {
                hold_last_valid(&mut outputs, masks, &device);
            }
        }

        let outputs = outputs.into_iter().map(|o| o.unsqueeze_dim::<3>(1)).collect();
        (Tensor::cat(outputs, 1), state)
    }
}

/// Overwrites padded steps of time-ordered reverse outputs with each row's
/// hidden state at step `L-1`.
///
/// A reverse pass reaches its padded steps before any valid one, so they
/// hold the initial state until filled here. Rows with `L = 0` keep it.
fn hold_last_valid<B: Backend>(outputs: &mut [Tensor<B, 2>], masks: &StepMasks, device: &B::Device) {
    let [_, hidden_size] = outputs[0].dims();
    let rows = masks
        .lengths()
        .iter()
        .enumerate()
        .map(|(b, &length)| outputs[length.saturating_sub(1)].clone().slice([b..(b + 1), 0..hidden_size]))
        .collect();
    let hold = Tensor::cat(rows, 0);

    for (t, output) in outputs.iter_mut().enumerate() {
        if !masks.all_valid(t) {
            *output = hold.clone().mask_where(masks.at::<B>(t, device), output.clone());
        }
    }
}

/// `[D, B, H]` to the `[B, H]` state of direction `index`.
fn direction_slice<B: Backend>(state: &Tensor<B, 3>, index: usize) -> Tensor<B, 2> {
    let [_, batch_size, hidden_size] = state.dims();
    state
        .clone()
        .slice([index..(index + 1), 0..batch_size, 0..hidden_size])
        .reshape([batch_size, hidden_size])
}

/// Runs an LSTM sequence in one call.
///
/// `input_size` is taken from `input` and the hidden size from the first
/// weight set; weights use the input, forget, cell, output gate layout. Fails
/// with [`LstmError::InvalidShape`] when the weights disagree with those sizes.
pub fn run<B: Backend, S: AsRef<str>>(
    input: Tensor<B, 3>,
    weights: alloc::vec::Vec<LstmWeights<B>>,
    activations: &[S],
    clip: f32,
    direction: Direction,
    lengths: SequenceLengths<B>,
    state: Option<LstmState<B, 3>>,
) -> crate::Result<LstmSequenceOutput<B>> {
    let [_, _, input_size] = input.dims();
    let hidden_size = weights.first().map(|w| w.hidden_size()).unwrap_or(0);

    LstmSequenceConfig::new(input_size, hidden_size)
        .with_direction(direction)
        .with_activations(activations.iter().map(|a| a.as_ref().to_string()).collect())
        .with_clip(clip)
        .run(weights, input, lengths, state)
}
