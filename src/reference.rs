/*!
# Scalar reference

A plain-loop LSTM sequence over row-major `f32` buffers, used to check the
tensor engine. It implements the same recurrence, masking, padding and
rounding rules as [`crate::LstmSequence`] without touching a tensor library.

Buffer layouts:
- input `[B, T, I]`
- weights `[4H, I]` and `[4H, H]`, bias `[4H]`, gates in input, forget,
  cell, output order
- states `[D, B, H]`, output `[B, T, D * H]`
*/

use crate::activation::ActivationSet;
use crate::error::{LstmError, Result};
use crate::precision::Precision;
use crate::sequence::{Direction, PaddingMode};
use crate::weights::GateOrder;

/// Row-major weights of one direction in canonical gate order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceWeights {
    pub weight_ih: alloc::vec::Vec<f32>,
    pub weight_hh: alloc::vec::Vec<f32>,
    pub bias: alloc::vec::Vec<f32>,
}

impl ReferenceWeights {
    /// Re-lays weights given in `order` with a `4H` or `8H` bias.
    pub fn from_layout(
        weight_ih: &[f32],
        weight_hh: &[f32],
        bias: &[f32],
        hidden_size: usize,
        order: GateOrder,
    ) -> Self {
        let gates = 4 * hidden_size;
        let folded: alloc::vec::Vec<f32> = if bias.len() == 2 * gates {
            bias[..gates].iter().zip(&bias[gates..]).map(|(a, b)| a + b).collect()
        } else {
            bias.to_vec()
        };

        let relay = |values: &[f32]| -> alloc::vec::Vec<f32> {
            let block = values.len() / 4;
            order
                .positions()
                .iter()
                .flat_map(|&p| values[p * block..(p + 1) * block].iter().copied())
                .collect()
        };

        Self {
            weight_ih: relay(weight_ih),
            weight_hh: relay(weight_hh),
            bias: relay(&folded),
        }
    }
}

/// Outputs of a reference run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOutput {
    /// `[B, T, D * H]`
    pub output: alloc::vec::Vec<f32>,
    /// `[D, B, H]`
    pub hidden: alloc::vec::Vec<f32>,
    /// `[D, B, H]`
    pub cell: alloc::vec::Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ReferenceLstm {
    input_size: usize,
    hidden_size: usize,
    activations: ActivationSet,
    clip: f32,
    direction: Direction,
    padding: PaddingMode,
    precision: Precision,
    weights: alloc::vec::Vec<ReferenceWeights>,
}

impl ReferenceLstm {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        activations: ActivationSet,
        clip: f32,
        direction: Direction,
        padding: PaddingMode,
        precision: Precision,
        mut weights: alloc::vec::Vec<ReferenceWeights>,
    ) -> Result<Self> {
        if !clip.is_finite() || clip < 0.0 {
            return Err(LstmError::InvalidClip(clip));
        }
        let num_directions = direction.num_directions();
        if weights.len() != num_directions {
            return Err(LstmError::shape("weight sets", &[num_directions], &[weights.len()]));
        }

        let gates = 4 * hidden_size;
        for w in weights.iter_mut() {
            for (name, buffer, expected) in [
                ("input weights", &mut w.weight_ih, gates * input_size),
                ("recurrent weights", &mut w.weight_hh, gates * hidden_size),
                ("bias", &mut w.bias, gates),
            ] {
                if buffer.len() != expected {
                    return Err(LstmError::shape(name, &[expected], &[buffer.len()]));
                }
                precision.round_slice(buffer);
            }
        }

        Ok(Self {
            input_size,
            hidden_size,
            activations,
            clip,
            direction,
            padding,
            precision,
            weights,
        })
    }

    pub fn forward(
        &self,
        input: &[f32],
        batch_size: usize,
        seq_length: usize,
        lengths: &[usize],
        h0: &[f32],
        c0: &[f32],
    ) -> Result<ReferenceOutput> {
        let (h, d) = (self.hidden_size, self.direction.num_directions());
        let state_len = d * batch_size * h;

        if input.len() != batch_size * seq_length * self.input_size {
            return Err(LstmError::shape(
                "input",
                &[batch_size, seq_length, self.input_size],
                &[input.len()],
            ));
        }
        if lengths.len() != batch_size {
            return Err(LstmError::shape("sequence lengths", &[batch_size], &[lengths.len()]));
        }
        if let Some((batch_index, &length)) = lengths.iter().enumerate().find(|&(_, &l)| l > seq_length) {
            return Err(LstmError::InvalidSequenceLength {
                batch_index,
                length: length as i64,
                max: seq_length,
            });
        }
        if h0.len() != state_len || c0.len() != state_len {
            return Err(LstmError::shape("initial state", &[d, batch_size, h], &[h0.len().max(c0.len())]));
        }

        let mut input = input.to_vec();
        self.precision.round_slice(&mut input);

        let mut out = ReferenceOutput {
            output: alloc::vec![0.0; batch_size * seq_length * d * h],
            hidden: alloc::vec![0.0; state_len],
            cell: alloc::vec![0.0; state_len],
        };

        for (dir, weights) in self.weights.iter().enumerate() {
            let reversed = match self.direction {
                Direction::Forward => false,
                Direction::Reverse => true,
                Direction::Bidirectional => dir == 1,
            };
            for b in 0..batch_size {
                let offset = (dir * batch_size + b) * h;
                let mut hidden: alloc::vec::Vec<f32> =
                    h0[offset..offset + h].iter().map(|&v| self.precision.round_scalar(v)).collect();
                let mut cell: alloc::vec::Vec<f32> =
                    c0[offset..offset + h].iter().map(|&v| self.precision.round_scalar(v)).collect();

                let steps: alloc::vec::Vec<usize> = if reversed {
                    (0..seq_length).rev().collect()
                } else {
                    (0..seq_length).collect()
                };
                for t in steps {
                    let valid = t < lengths[b];
                    if valid {
                        let x = &input[(b * seq_length + t) * self.input_size..][..self.input_size];
                        let (c, hn) = self.step(weights, x, &hidden, &cell);
                        cell = c;
                        hidden = hn;
                    }
                    let dst = &mut out.output[((b * seq_length + t) * d + dir) * h..][..h];
                    match (valid, self.padding) {
                        (false, PaddingMode::Zero) => dst.fill(0.0),
                        _ => dst.copy_from_slice(&hidden),
                    }
                }

                // reverse padding was written before step L-1 was reached
                let length = lengths[b];
                if reversed && self.padding == PaddingMode::HoldLast && length > 0 {
                    let last = ((b * seq_length + length - 1) * d + dir) * h;
                    for t in length..seq_length {
                        out.output.copy_within(last..last + h, ((b * seq_length + t) * d + dir) * h);
                    }
                }

                out.hidden[offset..offset + h].copy_from_slice(&hidden);
                out.cell[offset..offset + h].copy_from_slice(&cell);
            }
        }

        Ok(out)
    }

    fn step(&self, w: &ReferenceWeights, x: &[f32], hidden: &[f32], cell: &[f32]) -> (alloc::vec::Vec<f32>, alloc::vec::Vec<f32>) {
        let h = self.hidden_size;
        let p = self.precision;
        let acts = &self.activations;

        let gates: alloc::vec::Vec<f32> = (0..4 * h)
            .map(|row| {
                let wx: f32 = w.weight_ih[row * self.input_size..][..self.input_size]
                    .iter()
                    .zip(x)
                    .map(|(a, b)| a * b)
                    .sum();
                let rh: f32 = w.weight_hh[row * h..][..h].iter().zip(hidden).map(|(a, b)| a * b).sum();
                let g = p.round_scalar(wx + w.bias[row] + rh);
                if self.clip > 0.0 {
                    g.clamp(-self.clip, self.clip)
                } else {
                    g
                }
            })
            .collect();

        let mut new_cell = alloc::vec::Vec::with_capacity(h);
        let mut new_hidden = alloc::vec::Vec::with_capacity(h);
        for j in 0..h {
            let i = p.round_scalar(acts.gate.apply(gates[j]));
            let f = p.round_scalar(acts.gate.apply(gates[h + j]));
            let g = p.round_scalar(acts.candidate.apply(gates[2 * h + j]));
            let o = p.round_scalar(acts.gate.apply(gates[3 * h + j]));
            let c = p.round_scalar(f * cell[j] + i * g);
            new_cell.push(c);
            new_hidden.push(p.round_scalar(o * acts.output.apply(c)));
        }
        (new_cell, new_hidden)
    }
}
