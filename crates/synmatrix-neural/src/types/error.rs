// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for neural type construction

/// Errors raised while building slices, row formats or dynamics records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NeuralError {
    #[error("Invalid slice: hi atom {hi} is below lo atom {lo}")]
    InvalidSlice { lo: u32, hi: u32 },

    #[error("Slices do not partition {n_atoms} atoms: {reason}")]
    InvalidPartition { n_atoms: u32, reason: String },

    #[error("Row format needs {needed} bits but the control word has {available}")]
    RowFormatTooWide { needed: u32, available: u32 },

    #[error("Invalid synapse dynamics: {0}")]
    InvalidDynamics(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for neural type operations
pub type NeuralResult<T> = Result<T, NeuralError>;
