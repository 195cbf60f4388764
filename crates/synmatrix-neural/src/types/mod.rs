// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core type definitions

pub mod connection;
pub mod error;
pub mod slice;

pub use connection::{sort_by_row, ConnectionTuple};
pub use error::{NeuralError, NeuralResult};
pub use slice::{validate_partition, VertexSlice};
