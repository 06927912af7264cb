/*!
# LSTM Sequence

This library implements the LSTM sequence operator: the LSTM recurrence run
over a padded batch of variable-length sequences, forward, reverse or in
both directions, with caller-selected gate activations and optional clipping
of gate pre-activations.

## Features

- **LstmSequence**: the operator, configured through `LstmSequenceConfig`
- **Variable lengths**: per-row lengths as host constants or an integer tensor,
  with frozen state beyond each length
- **Directions**: forward, reverse and bidirectional with independent weights
- **Precision**: native backend floats or emulated half precision
- **Reference**: a scalar implementation used to check the tensor engine
- **Conformance matrix**: the operator's registered test suites, runnable
  against the reference

## Example

```rust,no_run
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use lstm_sequence::{Direction, LstmSequenceConfig, SequenceLengths};

type Backend = NdArray<f32>;

let device = Default::default();
let lstm = LstmSequenceConfig::new(10, 16)
    .with_direction(Direction::Bidirectional)
    .with_activations(vec!["sigmoid".into(), "tanh".into(), "tanh".into()])
    .with_clip(0.7)
    .init::<Backend>(&device)?;

let input = Tensor::<Backend, 3>::random([4, 20, 10], Distribution::Default, &device);
let out = lstm.forward(input, SequenceLengths::Constant(vec![20, 12, 5, 1]), None)?;

assert_eq!(out.output.dims(), [4, 20, 32]);
assert_eq!(out.state.hidden.dims(), [2, 4, 16]);
# Ok::<(), lstm_sequence::LstmError>(())
```
*/

extern crate alloc;

mod activation;
mod cell;
mod error;
mod lengths;
pub mod matrix;
mod precision;
pub mod reference;
mod sequence;
mod weights;

pub use activation::{Activation, ActivationSet};
pub use cell::{LstmCell, LstmState, StepOptions};
pub use error::{LstmError, Result};
pub use lengths::SequenceLengths;
pub use precision::{Precision, Tolerance};
pub use sequence::{run, Direction, Execution, LstmSequence, LstmSequenceConfig, LstmSequenceOutput, PaddingMode};
pub use weights::{GateOrder, LstmWeights};

pub const VERSION: &str = "0.1.0";
