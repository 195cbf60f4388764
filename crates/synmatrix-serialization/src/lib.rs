// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synmatrix serialization
//!
//! Binary formats consumed by the simulation core, all little-endian `u32`
//! words:
//!
//! - **[`row_codec`]** - synapse rows (indirect plastic/static rows and direct
//!   single-word rows), encoding and decoding
//! - **[`population_table`]** - the master population table that maps routing
//!   keys to row blocks
//! - **[`data_spec`]** - the region writer abstraction (`DataSpecWriter`) and an
//!   in-memory implementation
//!
//! ```rust
//! use synmatrix_serialization::{DataSpecWriter, MemoryDataSpec};
//!
//! let mut spec = MemoryDataSpec::new();
//! spec.reserve_region(0, 8).unwrap();
//! spec.switch_focus(0).unwrap();
//! spec.write_array(&[1, 2]).unwrap();
//! assert_eq!(spec.region(0).unwrap(), &[1, 0, 0, 0, 2, 0, 0, 0]);
//! ```

pub mod data_spec;
pub mod error;
pub mod population_table;
pub mod row_codec;

pub use data_spec::{bytes_to_words, words_to_bytes, DataRegion, DataSpecWriter, MemoryDataSpec};
pub use error::{DataSpecError, SerializationError, SerializationResult};
pub use population_table::{
    AddressEntry, MasterPopTableBuilder, MasterPopulationEntry, MasterPopulationTable, RowLocation,
};
pub use row_codec::{
    decode_direct_word, decode_row, delay_to_ticks, encode_direct_word, encode_row, EncodedRow, RowContext,
};
