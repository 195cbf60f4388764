// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synmatrix-observability
//!
//! Logging set-up shared by every synmatrix crate, with per-crate debug flag
//! support (`--debug-synmatrix-matrix`, `SYNMATRIX_DEBUG=all`, ...).
//!
//! ## Features
//! - `file-logging`: per-run JSON log files with retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known synmatrix crate names for debug flags and log targets
pub const KNOWN_CRATES: &[&str] = &[
    "synmatrix-config",
    "synmatrix-neural",
    "synmatrix-connectivity",
    "synmatrix-serialization",
    "synmatrix-matrix",
];
