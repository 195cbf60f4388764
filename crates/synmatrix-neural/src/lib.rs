// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synmatrix neural types
//!
//! Leaf crate shared by every other synmatrix crate:
//! - **Types**: `ConnectionTuple`, `VertexSlice`, error types
//! - **Synapse**: row bit-packing (`SynapseRowFormat`), synapse dynamics
//!   records and fixed-point weight conversion
//! - **Stats**: running statistics and the special functions used to bound
//!   ring-buffer input (log-gamma, incomplete gamma, distribution quantiles)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod stats;
pub mod synapse;
pub mod types;

pub use stats::RunningStats;
pub use synapse::{
    decode_weight, encode_weight, weight_scale_for_shift, EncodedWeight, StdpDynamics,
    StructuralDynamics, SynapseDynamics, SynapseRowFormat,
};
pub use types::{validate_partition, ConnectionTuple, NeuralError, NeuralResult, VertexSlice};
