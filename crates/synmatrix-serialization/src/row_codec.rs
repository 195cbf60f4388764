// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Synapse row encoding.

An indirect row holds every synapse from one pre-synaptic neuron to one
post-synaptic core within one delay stage:

```text
word 0        P = number of plastic words
words 1..=P   plastic region: header bytes, then one u16 weight per synapse
word P+1      number of static synapses (F)
word P+2      number of plastic control half-words (C)
F words       static synapses: weight << 16 | control
C half-words  plastic controls, padded to a whole word
```

A direct row is a single static word.

Rows are exactly [`SynapseDynamics::n_words_for_connections`] words long, so
the size computed while planning always matches what is written.
*/

use synmatrix_neural::synapse::{decode_weight, encode_weight};
use synmatrix_neural::{ConnectionTuple, SynapseDynamics, SynapseRowFormat, VertexSlice};

use crate::error::{SerializationError, SerializationResult};

const ROW_HEADER_WORDS: usize = 3;

/// Everything needed to encode or decode rows for one block
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub format: SynapseRowFormat,
    pub dynamics: &'a SynapseDynamics,
    /// Post-synaptic atoms served by the core
    pub post_slice: VertexSlice,
    /// Fixed-point multiplier per synapse type
    pub weight_scales: &'a [f64],
    pub timestep_ms: f64,
    /// Delay-extension stage the rows belong to
    pub delay_stage: u32,
}

impl RowContext<'_> {
    fn weight_scale(&self, synapse_type: u8) -> SerializationResult<f64> {
        self.weight_scales
            .get(synapse_type as usize)
            .copied()
            .ok_or_else(|| {
                SerializationError::MalformedRow(format!(
                    "no weight scale for synapse type {} ({} known)",
                    synapse_type,
                    self.weight_scales.len()
                ))
            })
    }

    /// Control half-word and fixed-point weight of one connection
    fn encode_synapse(&self, conn: &ConnectionTuple) -> SerializationResult<(u16, u16, bool)> {
        let target = conn.target as u32;
        let local = self
            .post_slice
            .local_index(target)
            .ok_or_else(|| {
                SerializationError::MalformedRow(format!(
                    "target {} outside post slice {}",
                    target, self.post_slice
                ))
            })?;
        if local >= self.format.max_neurons() {
            return Err(SerializationError::PostIndexOutOfRange {
                index: local,
                bits: self.format.n_neuron_index_bits(),
            });
        }

        let ticks = delay_to_ticks(conn.delay, self.timestep_ms);
        let (stage, intra) = self.format.split_delay(ticks);
        if stage != self.delay_stage {
            return Err(SerializationError::DelayOutOfStage {
                ticks,
                stage: self.delay_stage,
            });
        }

        let scale = self.weight_scale(conn.synapse_type)?;
        let weight = encode_weight(conn.weight, scale, self.dynamics.are_weights_signed());
        let control = self.format.pack_control(local, conn.synapse_type, intra);
        Ok((control, weight.raw, weight.saturated))
    }

    /// Connection tuple of one decoded control half-word
    fn decode_synapse(&self, source: u32, control: u16, raw_weight: u16) -> SerializationResult<ConnectionTuple> {
        let (local, synapse_type, intra) = self.format.unpack_control(control);
        let target = self.post_slice.lo_atom() + local;
        let target = u16::try_from(target).map_err(|_| {
            SerializationError::MalformedRow(format!("decoded target {} does not fit 16 bits", target))
        })?;
        let ticks = self.delay_stage * self.format.max_delay_per_stage() + intra;
        let scale = self.weight_scale(synapse_type)?;
        Ok(ConnectionTuple::new(
            source,
            target,
            decode_weight(raw_weight, scale, self.dynamics.are_weights_signed()),
            ticks as f64 * self.timestep_ms,
            synapse_type,
        ))
    }
}

/// An encoded row with its numeric-degradation count
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedRow {
    pub words: Vec<u32>,
    /// Weights that did not fit their fixed-point field
    pub n_saturated: u32,
}

/// Whole ticks of a delay, at least one
#[inline]
pub fn delay_to_ticks(delay_ms: f64, timestep_ms: f64) -> u32 {
    let ticks = (delay_ms / timestep_ms).round();
    if ticks.is_finite() && ticks >= 1.0 {
        ticks.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

fn put_half_word(words: &mut [u32], base_word: usize, index: usize, value: u16) {
    let word = &mut words[base_word + index / 2];
    if index % 2 == 0 {
        *word = (*word & 0xFFFF_0000) | value as u32;
    } else {
        *word = (*word & 0x0000_FFFF) | ((value as u32) << 16);
    }
}

fn get_half_word(words: &[u32], base_word: usize, index: usize) -> u16 {
    let word = words[base_word + index / 2];
    if index % 2 == 0 {
        word as u16
    } else {
        (word >> 16) as u16
    }
}

/// Encode the synapses of one pre-synaptic neuron
pub fn encode_row(connections: &[ConnectionTuple], ctx: &RowContext<'_>) -> SerializationResult<EncodedRow> {
    let n = connections.len();
    let n_words = ctx.dynamics.n_words_for_connections(n);
    let mut words = vec![0u32; n_words];
    let mut n_saturated = 0u32;

    if ctx.dynamics.is_plastic() {
        let header_bytes = ctx.dynamics.n_header_bytes();
        let plastic_words = (header_bytes + 2 * n).div_ceil(4);
        let fixed_base = 1 + plastic_words;
        let controls_base = fixed_base + 2;
        words[0] = plastic_words as u32;
        words[fixed_base] = 0;
        words[fixed_base + 1] = n as u32;

        // Header bytes stay zero; weights start after them
        let weight_half_word_offset = header_bytes / 2;
        for (i, conn) in connections.iter().enumerate() {
            let (control, weight, saturated) = ctx.encode_synapse(conn)?;
            n_saturated += saturated as u32;
            put_half_word(&mut words, 1, weight_half_word_offset + i, weight);
            put_half_word(&mut words, controls_base, i, control);
        }
    } else {
        words[0] = 0;
        words[1] = n as u32;
        words[2] = 0;
        for (i, conn) in connections.iter().enumerate() {
            let (control, weight, saturated) = ctx.encode_synapse(conn)?;
            n_saturated += saturated as u32;
            words[ROW_HEADER_WORDS + i] = ((weight as u32) << 16) | control as u32;
        }
    }

    Ok(EncodedRow { words, n_saturated })
}

/// Decode one row; returns the connections and the number of words the row occupies
pub fn decode_row(
    words: &[u32],
    source: u32,
    ctx: &RowContext<'_>,
) -> SerializationResult<(Vec<ConnectionTuple>, usize)> {
    let truncated = |needed: usize| {
        SerializationError::MalformedRow(format!("row needs {} words, only {} available", needed, words.len()))
    };

    let plastic_words = *words.first().ok_or_else(|| truncated(1))? as usize;
    let fixed_base = 1 + plastic_words;
    if words.len() < fixed_base + 2 {
        return Err(truncated(fixed_base + 2));
    }
    let n_static = words[fixed_base] as usize;
    let n_plastic = words[fixed_base + 1] as usize;
    let static_base = fixed_base + 2;
    let controls_base = static_base + n_static;
    let total = controls_base + n_plastic.div_ceil(2);
    if words.len() < total {
        return Err(truncated(total));
    }

    let mut connections = Vec::with_capacity(n_static + n_plastic);
    for word in &words[static_base..controls_base] {
        connections.push(ctx.decode_synapse(source, *word as u16, (word >> 16) as u16)?);
    }

    if n_plastic > 0 {
        let header_bytes = ctx.dynamics.n_header_bytes();
        if plastic_words * 4 < header_bytes + 2 * n_plastic {
            return Err(SerializationError::MalformedRow(format!(
                "{} plastic words cannot hold {} weights",
                plastic_words, n_plastic
            )));
        }
        let weight_half_word_offset = header_bytes / 2;
        for i in 0..n_plastic {
            let control = get_half_word(words, controls_base, i);
            let weight = get_half_word(words, 1, weight_half_word_offset + i);
            connections.push(ctx.decode_synapse(source, control, weight)?);
        }
    }

    Ok((connections, total))
}

/// Encode a direct row: a single static word and whether its weight saturated
pub fn encode_direct_word(conn: &ConnectionTuple, ctx: &RowContext<'_>) -> SerializationResult<(u32, bool)> {
    let (control, weight, saturated) = ctx.encode_synapse(conn)?;
    Ok((((weight as u32) << 16) | control as u32, saturated))
}

pub fn decode_direct_word(word: u32, source: u32, ctx: &RowContext<'_>) -> SerializationResult<ConnectionTuple> {
    ctx.decode_synapse(source, word as u16, (word >> 16) as u16)
}
