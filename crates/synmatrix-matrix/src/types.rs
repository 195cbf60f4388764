// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Error type for synaptic matrix generation.

Configuration errors surface before any memory is planned; capacity and
unsupported-feature errors abort the vertex being generated. Numeric
degradation (clipped delays, saturated weights) is never an error and is
reported through provenance instead.
*/

use synmatrix_connectivity::ConnectivityError;
use synmatrix_neural::NeuralError;
use synmatrix_serialization::{DataSpecError, SerializationError};

use crate::manager::GenerationStage;

/// Result type for matrix generation
pub type MatrixResult<T> = Result<T, MatrixError>;

/// Errors that abort generation for a vertex
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Illegal transition from {from:?} to {to:?}")]
    InvalidState { from: GenerationStage, to: GenerationStage },

    #[error("No routing key for pre vertex {pre_vertex} (delay stage {delay_stage})")]
    MissingRoutingKey { pre_vertex: u32, delay_stage: u32 },

    #[error(
        "Row length mismatch in {label}: planned {planned} words, encoding needs {actual}"
    )]
    RowLengthMismatch { label: String, planned: usize, actual: usize },

    #[error("Row of {n_connections} synapses in {label} exceeds the planned maximum of {max}")]
    RowTooLong { label: String, n_connections: usize, max: usize },

    #[error("Too much synaptic memory written for {vertex}: {written} bytes into a budget of {budget}")]
    SdramOverflow { vertex: String, written: usize, budget: usize },

    #[error("Projection {label} needs {needed} delay stages, at most {max} are supported")]
    TooManyDelayStages { label: String, needed: u32, max: u32 },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Timestep of {timestep_us} us is not supported, lookup tables need {required_us} us")]
    UnsupportedTimestep { timestep_us: u32, required_us: u32 },

    #[error("Nothing has been written for placement {0}")]
    UnknownPlacement(String),

    #[error("Projection {0} is not part of this placement")]
    UnknownProjection(String),

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Neural(#[from] NeuralError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<DataSpecError> for MatrixError {
    fn from(err: DataSpecError) -> Self {
        MatrixError::Serialization(SerializationError::DataSpec(err))
    }
}
