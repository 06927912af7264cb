/*!
# Conformance matrix

Enumerates combinations of LSTM sequence parameters, runs each one through
the tensor engine and the scalar [reference](crate::reference), and checks
that they agree within the tolerance of the case's precision.

The four [`Suite`]s reproduce the registrations of the operator's layer
tests: zero clip with short sequences, the same with weights supplied at
call time, a non-zero clip with long sequences, and a small smoke subset of
the latter.
*/

use core::fmt;

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::activation::{Activation, ActivationSet};
use crate::cell::LstmState;
use crate::error::Result;
use crate::lengths::SequenceLengths;
use crate::precision::Precision;
use crate::reference::{ReferenceLstm, ReferenceWeights};
use crate::sequence::{Direction, Execution, LstmSequenceConfig, PaddingMode};
use crate::weights::{GateOrder, LstmWeights};

/// How sequence lengths are produced and which execution strategy runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceMode {
    PureSeq,
    PureSeqRandSeqLenConst,
    PureSeqRandSeqLenParam,
    ConvertToTiMaxSeqLenConst,
    ConvertToTiRandSeqLenConst,
    ConvertToTiRandSeqLenParam,
}

impl SequenceMode {
    pub const ALL: [SequenceMode; 6] = [
        Self::ConvertToTiMaxSeqLenConst,
        Self::ConvertToTiRandSeqLenConst,
        Self::ConvertToTiRandSeqLenParam,
        Self::PureSeqRandSeqLenConst,
        Self::PureSeqRandSeqLenParam,
        Self::PureSeq,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PureSeq => "PURE_SEQ",
            Self::PureSeqRandSeqLenConst => "PURE_SEQ_RAND_SEQ_LEN_CONST",
            Self::PureSeqRandSeqLenParam => "PURE_SEQ_RAND_SEQ_LEN_PARAM",
            Self::ConvertToTiMaxSeqLenConst => "CONVERT_TO_TI_MAX_SEQ_LEN_CONST",
            Self::ConvertToTiRandSeqLenConst => "CONVERT_TO_TI_RAND_SEQ_LEN_CONST",
            Self::ConvertToTiRandSeqLenParam => "CONVERT_TO_TI_RAND_SEQ_LEN_PARAM",
        }
    }

    pub fn execution(&self) -> Execution {
        match self {
            Self::PureSeq | Self::PureSeqRandSeqLenConst | Self::PureSeqRandSeqLenParam => Execution::Fused,
            _ => Execution::Unrolled,
        }
    }

    /// Whether lengths are drawn at random rather than spanning the whole sequence.
    pub fn random_lengths(&self) -> bool {
        !matches!(self, Self::PureSeq | Self::ConvertToTiMaxSeqLenConst)
    }

    /// Whether lengths reach the engine as an integer tensor.
    pub fn lengths_as_tensor(&self) -> bool {
        matches!(self, Self::PureSeqRandSeqLenParam | Self::ConvertToTiRandSeqLenParam)
    }
}

/// Where the weights of a case come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightSource {
    /// Baked into a sequence module built ahead of the run.
    Constant,
    /// Handed over with the call, in forget-input-cell-output layout.
    Parameter,
}

impl WeightSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant => "CONSTANT",
            Self::Parameter => "PARAMETER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetDevice {
    #[default]
    Cpu,
}

impl TargetDevice {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
        }
    }
}

/// One parameter combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LstmSequenceCase {
    pub mode: SequenceMode,
    pub seq_length: usize,
    pub batch_size: usize,
    pub hidden_size: usize,
    pub input_size: usize,
    pub activations: ActivationSet,
    pub clip: f32,
    pub direction: Direction,
    pub weight_source: WeightSource,
    pub precision: Precision,
    pub device: TargetDevice,
}

impl LstmSequenceCase {
    fn base() -> Self {
        Self {
            mode: SequenceMode::PureSeq,
            seq_length: 1,
            batch_size: 1,
            hidden_size: 1,
            input_size: 1,
            activations: ActivationSet::default(),
            clip: 0.0,
            direction: Direction::Forward,
            weight_source: WeightSource::Constant,
            precision: Precision::F32,
            device: TargetDevice::Cpu,
        }
    }

    /// Name encoding every parameter of the case.
    pub fn name(&self) -> String {
        format!(
            "mode={}_seq_lengths={}_batch={}_hidden_size={}_input_size={}_activations={}_direction={}_clip={}_WRBType={}_netPRC={}_targetDevice={}",
            self.mode.name(),
            self.seq_length,
            self.batch_size,
            self.hidden_size,
            self.input_size,
            self.activations,
            self.direction.name(),
            self.clip,
            self.weight_source.name(),
            self.precision.name(),
            self.device.name(),
        )
    }
}

impl fmt::Display for LstmSequenceCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Registered groups of cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suite {
    CommonZeroClip,
    CommonZeroClipNonConstantWrb,
    CommonClip,
    SmokeCommonClip,
}

const ACTIVATION_SETS: [[Activation; 3]; 6] = {
    use Activation::{Relu, Sigmoid, Tanh};
    [
        [Relu, Sigmoid, Tanh],
        [Sigmoid, Tanh, Tanh],
        [Tanh, Relu, Sigmoid],
        [Sigmoid, Sigmoid, Sigmoid],
        [Tanh, Tanh, Tanh],
        [Relu, Relu, Relu],
    ]
};

impl Suite {
    pub const ALL: [Suite; 4] = [
        Self::CommonZeroClip,
        Self::CommonZeroClipNonConstantWrb,
        Self::CommonClip,
        Self::SmokeCommonClip,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CommonZeroClip => "LSTMSequenceCommonZeroClip",
            Self::CommonZeroClipNonConstantWrb => "LSTMSequenceCommonZeroClipNonConstantWRB",
            Self::CommonClip => "LSTMSequenceCommonClip",
            Self::SmokeCommonClip => "smoke_LSTMSequenceCommonClip",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Every case of the suite, last parameter varying fastest.
    pub fn cases(&self) -> alloc::vec::Vec<LstmSequenceCase> {
        let all_activations: alloc::vec::Vec<ActivationSet> =
            ACTIVATION_SETS.iter().map(|[g, c, o]| ActivationSet::new(*g, *c, *o)).collect();

        let (modes, seq_length, hidden_sizes, activations, clip, source) = match self {
            Self::CommonZeroClip => (SequenceMode::ALL.to_vec(), 2, alloc::vec![1, 10], all_activations, 0.0, WeightSource::Constant),
            Self::CommonZeroClipNonConstantWrb => (
                alloc::vec![SequenceMode::PureSeq],
                2,
                alloc::vec![1, 10],
                all_activations,
                0.0,
                WeightSource::Parameter,
            ),
            Self::CommonClip => (SequenceMode::ALL.to_vec(), 20, alloc::vec![1, 10], all_activations, 0.7, WeightSource::Constant),
            Self::SmokeCommonClip => (
                SequenceMode::ALL.to_vec(),
                20,
                alloc::vec![1],
                alloc::vec![ActivationSet::new(Activation::Relu, Activation::Sigmoid, Activation::Tanh)],
                0.7,
                WeightSource::Constant,
            ),
        };

        let cases = alloc::vec![LstmSequenceCase {
            seq_length,
            batch_size: 10,
            input_size: 10,
            clip,
            weight_source: source,
            ..LstmSequenceCase::base()
        }];
        let cases = expand(cases, &modes, |c, v| c.mode = v);
        let cases = expand(cases, &hidden_sizes, |c, v| c.hidden_size = v);
        let cases = expand(cases, &activations, |c, v| c.activations = v);
        let cases = expand(
            cases,
            &[Direction::Forward, Direction::Reverse, Direction::Bidirectional],
            |c, v| c.direction = v,
        );
        expand(cases, &[Precision::F32, Precision::F16], |c, v| c.precision = v)
    }
}

fn expand<T: Copy>(
    cases: alloc::vec::Vec<LstmSequenceCase>,
    values: &[T],
    set: impl Fn(&mut LstmSequenceCase, T),
) -> alloc::vec::Vec<LstmSequenceCase> {
    let set = &set;
    cases
        .into_iter()
        .flat_map(|case| {
            values.iter().map(move |&v| {
                let mut case = case;
                set(&mut case, v);
                case
            })
        })
        .collect()
}

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub name: String,
    /// Largest absolute difference over outputs and final states.
    pub max_abs_error: f32,
    pub passed: bool,
}

struct CaseData {
    input: alloc::vec::Vec<f32>,
    lengths: alloc::vec::Vec<usize>,
    h0: alloc::vec::Vec<f32>,
    c0: alloc::vec::Vec<f32>,
    /// Per direction: input weights, recurrent weights, bias; forget-input-cell-output layout.
    weights: alloc::vec::Vec<[alloc::vec::Vec<f32>; 3]>,
}

impl CaseData {
    fn generate(case: &LstmSequenceCase, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let (b, t, i, h) = (case.batch_size, case.seq_length, case.input_size, case.hidden_size);
        let d = case.direction.num_directions();
        let range = 1.0 / (h as f32).sqrt();

        let mut uniform = |n: usize, bound: f32| -> alloc::vec::Vec<f32> {
            (0..n).map(|_| rng.random_range(-bound..bound)).collect()
        };

        let input = uniform(b * t * i, 1.0);
        let h0 = uniform(d * b * h, 1.0);
        let c0 = uniform(d * b * h, 1.0);
        let weights = (0..d)
            .map(|_| [uniform(4 * h * i, range), uniform(4 * h * h, range), uniform(4 * h, range)])
            .collect();

        let lengths = if case.mode.random_lengths() {
            (0..b).map(|_| rng.random_range(0..=t)).collect()
        } else {
            alloc::vec![t; b]
        };

        Self {
            input,
            lengths,
            h0,
            c0,
            weights,
        }
    }
}

fn tensor<B: Backend, const D: usize>(values: &[f32], dims: [usize; D], device: &B::Device) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values.to_vec(), dims), device)
}

fn max_error(actual: &[f32], expected: &[f32], precision: Precision) -> (f32, bool) {
    let tolerance = precision.tolerance();
    actual.iter().zip(expected).fold((0.0f32, actual.len() == expected.len()), |(max, ok), (a, e)| {
        ((a - e).abs().max(max), ok && tolerance.accepts(*a, *e))
    })
}

/// Runs `case` through the engine and the reference with data drawn from `seed`.
pub fn run_case<B: Backend>(case: &LstmSequenceCase, seed: u64, device: &B::Device) -> Result<CaseReport> {
    let data = CaseData::generate(case, seed);
    let (b, t, i, h) = (case.batch_size, case.seq_length, case.input_size, case.hidden_size);
    let d = case.direction.num_directions();

    let reference = ReferenceLstm::new(
        i,
        h,
        case.activations,
        case.clip,
        case.direction,
        PaddingMode::Zero,
        case.precision,
        data.weights
            .iter()
            .map(|[w, r, bias]| ReferenceWeights::from_layout(w, r, bias, h, GateOrder::Figo))
            .collect(),
    )?
    .forward(&data.input, b, t, &data.lengths, &data.h0, &data.c0)?;

    let weights = data
        .weights
        .iter()
        .map(|[w, r, bias]| {
            LstmWeights::new(
                tensor::<B, 2>(w, [4 * h, i], device),
                tensor::<B, 2>(r, [4 * h, h], device),
                Some(tensor::<B, 1>(bias, [4 * h], device)),
            )
        })
        .collect();

    let lengths = if !case.mode.random_lengths() {
        SequenceLengths::Full
    } else if case.mode.lengths_as_tensor() {
        let values: alloc::vec::Vec<i64> = data.lengths.iter().map(|&l| l as i64).collect();
        SequenceLengths::Tensor(Tensor::<B, 1, Int>::from_data(TensorData::new(values, [b]), device))
    } else {
        SequenceLengths::Constant(data.lengths.clone())
    };

    let input = tensor::<B, 3>(&data.input, [b, t, i], device);
    let state = LstmState::new(tensor::<B, 3>(&data.c0, [d, b, h], device), tensor::<B, 3>(&data.h0, [d, b, h], device));

    let config = LstmSequenceConfig::new(i, h)
        .with_direction(case.direction)
        .with_activations(case.activations.names().iter().map(|n| n.to_string()).collect())
        .with_clip(case.clip)
        .with_gate_order(GateOrder::Figo)
        .with_padding(PaddingMode::Zero)
        .with_precision(case.precision)
        .with_execution(case.mode.execution());

    let output = match case.weight_source {
        WeightSource::Constant => config.init_with_weights(weights, device)?.forward(input, lengths, Some(state))?,
        WeightSource::Parameter => config.run(weights, input, lengths, Some(state))?,
    };

    let values = |t: Tensor<B, 3>| -> alloc::vec::Vec<f32> { t.into_data().iter::<f32>().collect() };
    let checks = [
        (values(output.output), &reference.output),
        (values(output.state.hidden), &reference.hidden),
        (values(output.state.cell), &reference.cell),
    ];
    let (max_abs_error, passed) = checks.iter().fold((0.0f32, true), |(max, ok), (actual, expected)| {
        let (err, pass) = max_error(actual, expected, case.precision);
        (max.max(err), ok && pass)
    });

    let name = case.name();
    if passed {
        debug!(case = %name, max_abs_error, "case passed");
    } else {
        warn!(case = %name, max_abs_error, "case failed");
    }

    Ok(CaseReport {
        name,
        max_abs_error,
        passed,
    })
}
