// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks that configuration values are within valid ranges and consistent
//! with each other. All problems are collected and reported together.

use crate::{ConfigError, ConfigResult, SynmatrixConfig};

/// Bits available in the synapse control half-word
const CONTROL_WORD_BITS: u8 = 16;

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

fn invalid(errors: &mut Vec<ConfigValidationError>, field: &str, reason: &str) {
    errors.push(ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    });
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &SynmatrixConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_simulation(config, &mut errors);
    validate_synapses(config, &mut errors);
    validate_row_format(config, &mut errors);
    validate_population_table(config, &mut errors);

    if config.logging.level.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "logging.level".to_string(),
        });
    }

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_simulation(config: &SynmatrixConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.simulation.machine_time_step_us == 0 {
        invalid(errors, "simulation.machine_time_step_us", "must be positive");
    }
    if config.simulation.time_scale_factor == 0 {
        invalid(errors, "simulation.time_scale_factor", "must be positive");
    }
}

fn validate_synapses(config: &SynmatrixConfig, errors: &mut Vec<ConfigValidationError>) {
    let synapses = &config.synapses;
    if !(synapses.spikes_per_second > 0.0) {
        invalid(errors, "synapses.spikes_per_second", "must be positive");
    }
    if !(synapses.ring_buffer_sigma > 0.0) {
        invalid(errors, "synapses.ring_buffer_sigma", "must be positive");
    }
    if synapses.max_ring_buffer_shift > 15 {
        invalid(
            errors,
            "synapses.max_ring_buffer_shift",
            "must leave at least one bit of a 16-bit weight (0-15)",
        );
    }
    if !(synapses.sdram_overscale >= 1.0) {
        invalid(errors, "synapses.sdram_overscale", "must be at least 1.0");
    }
    if synapses.max_atoms_per_core == 0 {
        invalid(errors, "synapses.max_atoms_per_core", "must be positive");
    }
    if synapses.max_direct_matrix_bytes % 4 != 0 {
        invalid(
            errors,
            "synapses.max_direct_matrix_bytes",
            "must be a multiple of 4",
        );
    }
}

fn validate_row_format(config: &SynmatrixConfig, errors: &mut Vec<ConfigValidationError>) {
    let format = &config.row_format;
    if format.n_neuron_index_bits == 0 || format.n_delay_bits == 0 {
        invalid(errors, "row_format", "index and delay fields need at least one bit");
    }
    // one bit is always reserved for the synapse type
    if format.n_neuron_index_bits as u32 + format.n_delay_bits as u32 + 1
        > CONTROL_WORD_BITS as u32
    {
        invalid(
            errors,
            "row_format",
            "neuron index and delay bits leave no room for a synapse type in 16 bits",
        );
    }
    if (1u32 << format.n_neuron_index_bits.min(31)) < config.synapses.max_atoms_per_core {
        invalid(
            errors,
            "synapses.max_atoms_per_core",
            "exceeds the neurons addressable by row_format.n_neuron_index_bits",
        );
    }
}

fn validate_population_table(config: &SynmatrixConfig, errors: &mut Vec<ConfigValidationError>) {
    let granularity = config.population_table.address_granularity_bytes;
    if granularity < 4 || !granularity.is_power_of_two() {
        invalid(
            errors,
            "population_table.address_granularity_bytes",
            "must be a power of two of at least 4",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SynmatrixConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_granularity_must_be_power_of_two() {
        let mut config = SynmatrixConfig::default();
        config.population_table.address_granularity_bytes = 24;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("address_granularity_bytes"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_row_format_bit_budget() {
        let mut config = SynmatrixConfig::default();
        config.row_format.n_neuron_index_bits = 10;
        config.row_format.n_delay_bits = 6;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("row_format"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_multiple_errors_reported_together() {
        let mut config = SynmatrixConfig::default();
        config.synapses.ring_buffer_sigma = 0.0;
        config.synapses.sdram_overscale = 0.5;
        config.simulation.machine_time_step_us = 0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("ring_buffer_sigma"));
            assert!(msg.contains("sdram_overscale"));
            assert!(msg.contains("machine_time_step_us"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_atoms_per_core_vs_index_bits() {
        let mut config = SynmatrixConfig::default();
        config.synapses.max_atoms_per_core = 512;

        assert!(validate_config(&config).is_err());
    }
}
