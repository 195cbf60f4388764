// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! STDP parameters and exponential-decay lookup tables for the dynamics region.

use synmatrix_neural::StdpDynamics;

use crate::types::{MatrixError, MatrixResult};

/// Timestep the lookup tables are sampled at, in microseconds
pub const LUT_TIMESTEP_US: u32 = 1000;

/// Fixed-point one of the lookup tables
const LUT_ONE: f64 = 2048.0;

/// Longest table written
const MAX_LUT_ENTRIES: usize = 1024;

/// `exp(-t / tau)` in 1/2048 units for `t = 0, 1, 2, ...` ms
///
/// The table stops at the first entry that rounds to zero and is padded to an
/// even length so it packs into whole words.
pub fn exp_decay_lut(tau_ms: f64, timestep_us: u32) -> MatrixResult<Vec<u16>> {
    if timestep_us != LUT_TIMESTEP_US {
        return Err(MatrixError::UnsupportedTimestep {
            timestep_us,
            required_us: LUT_TIMESTEP_US,
        });
    }
    if !(tau_ms > 0.0) {
        return Err(MatrixError::Configuration(format!(
            "time constant must be positive, got {}",
            tau_ms
        )));
    }
    let mut lut: Vec<u16> = (0..MAX_LUT_ENTRIES)
        .map(|t| (LUT_ONE * (-(t as f64) / tau_ms).exp()).round() as u16)
        .take_while(|v| *v > 0)
        .collect();
    if lut.len() % 2 != 0 {
        lut.push(0);
    }
    Ok(lut)
}

/// Pack half-words two to a word, low half first
pub fn pack_half_words(values: &[u16]) -> Vec<u32> {
    values
        .chunks(2)
        .map(|pair| pair[0] as u32 | (pair.get(1).copied().unwrap_or(0) as u32) << 16)
        .collect()
}

/// Words of the STDP block: both LUTs (length-prefixed), then the amplitudes and bounds
pub fn stdp_region_words(stdp: &StdpDynamics, timestep_us: u32) -> MatrixResult<Vec<u32>> {
    let mut words = Vec::new();
    for tau in [stdp.tau_plus, stdp.tau_minus] {
        let lut = exp_decay_lut(tau, timestep_us)?;
        words.push(lut.len() as u32);
        words.extend(pack_half_words(&lut));
    }
    for value in [stdp.a_plus, stdp.a_minus, stdp.w_min, stdp.w_max] {
        words.push((value as f32).to_bits());
    }
    Ok(words)
}
