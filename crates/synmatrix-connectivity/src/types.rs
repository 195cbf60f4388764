// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Error types for connectivity construction and generation.

Everything here is a configuration error: it is raised when a projection or
connector is built, before any machine resources are planned.
*/

use synmatrix_neural::NeuralError;

/// Result type for connectivity operations
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Errors that can occur while describing or generating connectivity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("Invalid connection probability {0}: must be within [0, 1]")]
    InvalidProbability(f64),

    #[error("Population size mismatch: pre has {pre} atoms, post has {post}")]
    PopulationSizeMismatch { pre: u32, post: u32 },

    #[error("List entry {index} ({pre} -> {post}) is outside the populations")]
    ListEntryOutOfRange { index: usize, pre: u32, post: u32 },

    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Synapse type {synapse_type} out of range (vertex has {n_types} types)")]
    InvalidSynapseType { synapse_type: u8, n_types: u8 },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Neural(#[from] NeuralError),
}
