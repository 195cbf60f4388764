// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bit packing of the 16-bit synapse control half-word
//!
//! ```text
//!  15            type+index bits                     0
//! +------------+---------------+----------------------+
//! |   delay    | synapse type  |  post neuron index   |
//! +------------+---------------+----------------------+
//! ```
//!
//! The same packing is used in static words (where the weight occupies the
//! upper 16 bits of the 32-bit word), in plastic control half-words and in
//! direct rows. Intra-stage delays `1..=2^n_delay_bits` are stored modulo
//! `2^n_delay_bits`; a stored zero means a full stage.

use crate::types::{NeuralError, NeuralResult};

const CONTROL_BITS: u32 = 16;

/// Canonical synapse row packing, shared by encoder and decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapseRowFormat {
    n_neuron_index_bits: u8,
    n_synapse_type_bits: u8,
    n_delay_bits: u8,
}

impl SynapseRowFormat {
    /// Build the packing for `n_synapse_types` receptor types
    pub fn new(n_synapse_types: u8, n_neuron_index_bits: u8, n_delay_bits: u8) -> NeuralResult<Self> {
        if n_synapse_types == 0 {
            return Err(NeuralError::InvalidParameter(
                "at least one synapse type is required".to_string(),
            ));
        }
        let n_synapse_type_bits = Self::bits_for(n_synapse_types as u32);
        let needed = n_neuron_index_bits as u32 + n_synapse_type_bits as u32 + n_delay_bits as u32;
        if needed > CONTROL_BITS || n_delay_bits == 0 || n_neuron_index_bits == 0 {
            return Err(NeuralError::RowFormatTooWide {
                needed,
                available: CONTROL_BITS,
            });
        }
        Ok(Self {
            n_neuron_index_bits,
            n_synapse_type_bits,
            n_delay_bits,
        })
    }

    /// ceil(log2(n)), zero for a single value
    fn bits_for(n: u32) -> u8 {
        if n <= 1 {
            0
        } else {
            (32 - (n - 1).leading_zeros()) as u8
        }
    }

    #[inline]
    pub fn n_neuron_index_bits(&self) -> u8 {
        self.n_neuron_index_bits
    }

    #[inline]
    pub fn n_synapse_type_bits(&self) -> u8 {
        self.n_synapse_type_bits
    }

    #[inline]
    pub fn n_delay_bits(&self) -> u8 {
        self.n_delay_bits
    }

    /// Post-synaptic neurons addressable by one core
    #[inline]
    pub fn max_neurons(&self) -> u32 {
        1 << self.n_neuron_index_bits
    }

    /// Longest delay in ticks handled without a delay extension
    #[inline]
    pub fn max_delay_per_stage(&self) -> u32 {
        1 << self.n_delay_bits
    }

    #[inline]
    fn type_shift(&self) -> u32 {
        self.n_neuron_index_bits as u32
    }

    #[inline]
    fn delay_shift(&self) -> u32 {
        self.n_neuron_index_bits as u32 + self.n_synapse_type_bits as u32
    }

    /// Pack index, type and intra-stage delay (1..=max_delay_per_stage)
    pub fn pack_control(&self, post_index: u32, synapse_type: u8, delay_ticks: u32) -> u16 {
        let index_mask = (1u32 << self.n_neuron_index_bits) - 1;
        let type_mask = (1u32 << self.n_synapse_type_bits) - 1;
        let delay_mask = (1u32 << self.n_delay_bits) - 1;
        let word = ((delay_ticks & delay_mask) << self.delay_shift())
            | ((synapse_type as u32 & type_mask) << self.type_shift())
            | (post_index & index_mask);
        word as u16
    }

    /// Inverse of [`pack_control`](Self::pack_control): `(post_index, synapse_type, delay_ticks)`
    pub fn unpack_control(&self, control: u16) -> (u32, u8, u32) {
        let control = control as u32;
        let index = control & ((1u32 << self.n_neuron_index_bits) - 1);
        let synapse_type = (control >> self.type_shift()) & ((1u32 << self.n_synapse_type_bits) - 1);
        let mut delay = (control >> self.delay_shift()) & ((1u32 << self.n_delay_bits) - 1);
        if delay == 0 {
            delay = self.max_delay_per_stage();
        }
        (index, synapse_type as u8, delay)
    }

    /// Split a delay of at least one tick into `(stage, intra_stage_ticks)`
    ///
    /// Stage 0 is served by the core itself; stage `s > 0` by the delay
    /// extension, which adds `s * max_delay_per_stage` ticks.
    pub fn split_delay(&self, delay_ticks: u32) -> (u32, u32) {
        let per_stage = self.max_delay_per_stage();
        let ticks = delay_ticks.max(1);
        let stage = (ticks - 1) / per_stage;
        (stage, ticks - stage * per_stage)
    }

    /// Number of delay-extension stages needed for delays up to `max_delay_ticks`
    pub fn n_delay_stages_for(&self, max_delay_ticks: u32) -> u32 {
        self.split_delay(max_delay_ticks).0
    }
}
