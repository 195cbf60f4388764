// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `synmatrix.toml`.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SynmatrixConfig {
    pub simulation: SimulationConfig,
    pub synapses: SynapsesConfig,
    pub row_format: RowFormatConfig,
    pub delays: DelaysConfig,
    pub population_table: PopulationTableConfig,
    pub logging: LoggingConfig,
}

/// Simulation clock configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Length of one timer tick on the simulation core, in microseconds
    pub machine_time_step_us: u32,
    /// Slow-down factor applied to real time (informational for the loader)
    pub time_scale_factor: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            machine_time_step_us: 1000,
            time_scale_factor: 1,
        }
    }
}

impl SimulationConfig {
    /// Timestep in milliseconds
    pub fn timestep_ms(&self) -> f64 {
        self.machine_time_step_us as f64 / 1000.0
    }

    /// Number of timer ticks per simulated second
    pub fn steps_per_second(&self) -> f64 {
        1_000_000.0 / self.machine_time_step_us as f64
    }
}

/// Synaptic matrix and ring-buffer scaling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SynapsesConfig {
    /// Assumed firing rate of pre-synaptic neurons that declare no rate
    pub spikes_per_second: f64,
    /// Number of standard deviations of headroom in the ring buffer
    pub ring_buffer_sigma: f64,
    /// Ceiling applied to the computed left shift before the signed-weight bit
    pub max_ring_buffer_shift: u8,
    /// Safety factor applied to the raw synaptic matrix estimate
    pub sdram_overscale: f64,
    /// Allow connectors to be expanded by the simulation core itself
    pub generate_on_machine: bool,
    /// Budget for the single-word direct matrix
    pub max_direct_matrix_bytes: usize,
    /// Largest post-synaptic slice a single core may hold
    pub max_atoms_per_core: u32,
}

impl Default for SynapsesConfig {
    fn default() -> Self {
        Self {
            spikes_per_second: 30.0,
            ring_buffer_sigma: 5.0,
            max_ring_buffer_shift: 12,
            sdram_overscale: 1.1,
            generate_on_machine: true,
            max_direct_matrix_bytes: 64 * 1024,
            max_atoms_per_core: 256,
        }
    }
}

/// Bit packing of the 16-bit synapse control half-word
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RowFormatConfig {
    pub n_neuron_index_bits: u8,
    pub n_delay_bits: u8,
}

impl Default for RowFormatConfig {
    fn default() -> Self {
        Self {
            n_neuron_index_bits: 8,
            n_delay_bits: 4,
        }
    }
}

impl RowFormatConfig {
    /// Longest delay (in ticks) a single core can apply without a delay extension
    pub fn max_delay_per_stage(&self) -> u32 {
        1u32 << self.n_delay_bits
    }
}

/// Delay extension configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DelaysConfig {
    /// Number of additional delay stages a delay extension chain can provide
    pub max_delay_stages: u32,
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            max_delay_stages: 8,
        }
    }
}

/// Master population table configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PopulationTableConfig {
    /// Rows start on multiples of this many bytes (power of two)
    pub address_granularity_bytes: u32,
}

impl Default for PopulationTableConfig {
    fn default() -> Self {
        Self {
            address_granularity_bytes: 16,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: String,
    pub file_logging: bool,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: "./logs".to_string(),
            file_logging: false,
            retention_runs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_delay_per_stage() {
        let format = RowFormatConfig::default();
        assert_eq!(format.max_delay_per_stage(), 16);
    }

    #[test]
    fn test_steps_per_second() {
        let sim = SimulationConfig {
            machine_time_step_us: 100,
            time_scale_factor: 1,
        };
        assert_eq!(sim.steps_per_second(), 10_000.0);
        assert!((sim.timestep_ms() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_serde_roundtrip_json() {
        let config = SynmatrixConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SynmatrixConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.synapses.max_ring_buffer_shift, 12);
        assert_eq!(back.population_table.address_granularity_bytes, 16);
    }
}
