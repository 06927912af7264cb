use burn::module::Ignored;
use burn::tensor::{Distribution, Int, Tensor, TensorData};
use lstm_sequence::reference::{ReferenceLstm, ReferenceWeights};
use lstm_sequence::{
    ActivationSet, Direction, Execution, GateOrder, LstmSequence, LstmSequenceConfig, LstmState, LstmWeights,
    PaddingMode, Precision, SequenceLengths,
};

type TestBackend = burn_ndarray::NdArray<f32>;

fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
    t.into_data().iter::<f32>().collect()
}

fn max_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

fn build(direction: Direction, execution: Execution, clip: f32) -> LstmSequence<TestBackend> {
    LstmSequenceConfig::new(6, 5)
        .with_direction(direction)
        .with_activations(vec!["tanh".into(), "relu".into(), "sigmoid".into()])
        .with_clip(clip)
        .with_execution(execution)
        .init::<TestBackend>(&Default::default())
        .unwrap()
}

#[test]
fn fused_and_unrolled_agree() {
    let device = Default::default();
    let (batch, seq, input_size) = (3, 7, 6);

    for direction in [Direction::Forward, Direction::Reverse, Direction::Bidirectional] {
        let fused = build(direction, Execution::Fused, 0.7);
        let unrolled = LstmSequence {
            execution: Ignored(Execution::Unrolled),
            ..fused.clone()
        };
        let input = Tensor::<TestBackend, 3>::random([batch, seq, input_size], Distribution::Default, &device);
        let lengths = SequenceLengths::Constant(vec![7, 4, 0]);

        let a = fused.forward(input.clone(), lengths.clone(), None).unwrap();
        let b = unrolled.forward(input, lengths, None).unwrap();

        let diff = max_diff(&values(a.output), &values(b.output));
        assert!(diff < 1e-5, "{direction:?}: output difference {diff:.2e}");
        let diff = max_diff(&values(a.state.cell), &values(b.state.cell));
        assert!(diff < 1e-5, "{direction:?}: cell difference {diff:.2e}");
    }
}

#[test]
fn constant_and_tensor_lengths_agree() {
    let device = Default::default();
    let lstm = build(Direction::Bidirectional, Execution::Fused, 0.0);
    let input = Tensor::<TestBackend, 3>::random([3, 5, 6], Distribution::Default, &device);
    let tensor_lengths = Tensor::<TestBackend, 1, Int>::from_ints([5, 2, 3], &device);

    let a = lstm.forward(input.clone(), SequenceLengths::Constant(vec![5, 2, 3]), None).unwrap();
    let b = lstm.forward(input, SequenceLengths::Tensor(tensor_lengths), None).unwrap();

    assert_eq!(values(a.output), values(b.output));
    assert_eq!(values(a.state.hidden), values(b.state.hidden));
}

fn compare_with_reference(direction: Direction, padding: PaddingMode, precision: Precision) {
    let device = Default::default();
    let (batch, seq, input_size, hidden) = (4, 6, 3, 2);
    let d = direction.num_directions();
    let activations = ActivationSet::from_names(&["sigmoid", "tanh", "tanh"]).unwrap();

    let random = |dims: Vec<usize>| -> Vec<f32> {
        let n = dims.iter().product::<usize>();
        values(Tensor::<TestBackend, 1>::random([n], Distribution::Uniform(-1.0, 1.0), &device))
    };
    let sets: Vec<[Vec<f32>; 3]> = (0..d)
        .map(|_| {
            [
                random(vec![4 * hidden, input_size]),
                random(vec![4 * hidden, hidden]),
                random(vec![8 * hidden]),
            ]
        })
        .collect();
    let input = random(vec![batch, seq, input_size]);
    let h0 = random(vec![d, batch, hidden]);
    let c0 = random(vec![d, batch, hidden]);
    let lengths = vec![6, 1, 0, 4];

    let to_tensor = |v: &[f32], dims: Vec<usize>| TensorData::new(v.to_vec(), dims);

    let weights: Vec<LstmWeights<TestBackend>> = sets
        .iter()
        .map(|[w, r, b]| {
            LstmWeights::new(
                Tensor::from_data(to_tensor(w, vec![4 * hidden, input_size]), &device),
                Tensor::from_data(to_tensor(r, vec![4 * hidden, hidden]), &device),
                Some(Tensor::from_data(to_tensor(b, vec![8 * hidden]), &device)),
            )
        })
        .collect();
    let engine = LstmSequenceConfig::new(input_size, hidden)
        .with_direction(direction)
        .with_gate_order(GateOrder::Figo)
        .with_padding(padding)
        .with_precision(precision)
        .init_with_weights(weights, &device)
        .unwrap()
        .forward(
            Tensor::<TestBackend, 3>::from_data(to_tensor(&input, vec![batch, seq, input_size]), &device),
            SequenceLengths::Constant(lengths.clone()),
            Some(LstmState::new(
                Tensor::from_data(to_tensor(&c0, vec![d, batch, hidden]), &device),
                Tensor::from_data(to_tensor(&h0, vec![d, batch, hidden]), &device),
            )),
        )
        .unwrap();

    let reference = ReferenceLstm::new(
        input_size,
        hidden,
        activations,
        0.0,
        direction,
        padding,
        precision,
        sets.iter()
            .map(|[w, r, b]| ReferenceWeights::from_layout(w, r, b, hidden, GateOrder::Figo))
            .collect(),
    )
    .unwrap()
    .forward(&input, batch, seq, &lengths, &h0, &c0)
    .unwrap();

    let tolerance = precision.tolerance().absolute;
    let diff = max_diff(&values(engine.output), &reference.output);
    assert!(diff < tolerance, "{direction:?}/{padding:?}/{precision:?}: output difference {diff:.2e}");
    let diff = max_diff(&values(engine.state.hidden), &reference.hidden);
    assert!(diff < tolerance, "{direction:?}/{padding:?}/{precision:?}: hidden difference {diff:.2e}");
    let diff = max_diff(&values(engine.state.cell), &reference.cell);
    assert!(diff < tolerance, "{direction:?}/{padding:?}/{precision:?}: cell difference {diff:.2e}");
}

#[test]
fn engine_matches_reference() {
    for direction in [Direction::Forward, Direction::Reverse, Direction::Bidirectional] {
        for padding in [PaddingMode::HoldLast, PaddingMode::Zero] {
            compare_with_reference(direction, padding, Precision::F32);
        }
    }
}

#[test]
fn engine_matches_reference_in_half_precision() {
    for direction in [Direction::Forward, Direction::Bidirectional] {
        compare_with_reference(direction, PaddingMode::HoldLast, Precision::F16);
    }
}
