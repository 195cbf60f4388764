// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synapse-level definitions: row bit packing, dynamics records and
//! fixed-point weight conversion.

pub mod dynamics;
pub mod format;
pub mod weight;

pub use dynamics::{StdpDynamics, StructuralDynamics, SynapseDynamics};
pub use format::SynapseRowFormat;
pub use weight::{decode_weight, encode_weight, weight_scale_for_shift, EncodedWeight};
