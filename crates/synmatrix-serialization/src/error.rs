// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for binary encoding and region writing

use synmatrix_neural::NeuralError;

/// Result type for serialization operations
pub type SerializationResult<T> = Result<T, SerializationError>;

/// Errors raised by the region writer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataSpecError {
    #[error("Region {0} is already reserved")]
    RegionAlreadyReserved(u32),

    #[error("Region {0} has not been reserved")]
    RegionNotReserved(u32),

    #[error("Region {region} overflow: {attempted} bytes written into {size} reserved")]
    RegionOverflow { region: u32, size: usize, attempted: usize },

    #[error("No region has focus")]
    NoFocus,
}

/// Errors raised while encoding or decoding binary structures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializationError {
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Post index {index} does not fit the {bits}-bit neuron index field")]
    PostIndexOutOfRange { index: u32, bits: u8 },

    #[error("Delay of {ticks} ticks is outside delay stage {stage}")]
    DelayOutOfStage { ticks: u32, stage: u32 },

    #[error("Address {address:#x} is not aligned to {granularity} bytes")]
    AddressNotAligned { address: u32, granularity: u32 },

    #[error("Address {address:#x} exceeds the addressable range of {max:#x} bytes")]
    AddressOutOfRange { address: u64, max: u64 },

    #[error("Row length {row_words} words is outside 1..={max}")]
    RowLengthOutOfRange { row_words: u32, max: u32 },

    #[error("Key {key:#010x} already present with mask {existing:#010x}, not {mask:#010x}")]
    ConflictingEntry { key: u32, mask: u32, existing: u32 },

    #[error("Malformed population table: {0}")]
    MalformedTable(String),

    #[error("Invalid address granularity {0}: must be a power of two of at least 4")]
    InvalidGranularity(u32),

    #[error(transparent)]
    DataSpec(#[from] DataSpecError),

    #[error(transparent)]
    Neural(#[from] NeuralError),
}
