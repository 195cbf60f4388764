// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synmatrix matrix
//!
//! Builds everything a post-synaptic machine vertex needs to receive spikes:
//!
//! - **[`planner`]** - per-block encoding choice, row lengths, delay stages and
//!   aligned addresses, and the region sizes that follow from them
//! - **[`ring_buffer`]** - per-synapse-type left shifts from a statistical
//!   bound on the input each ring-buffer slot can accumulate
//! - **[`manager`]** - the generation pass: plan, scale, build in memory,
//!   then write through a [`DataSpecWriter`](synmatrix_serialization::DataSpecWriter),
//!   and read connections back from region bytes
//! - **[`generator`]** - descriptors for rows expanded on the machine, and a
//!   host emulation of that expander
//! - **[`stdp`]** / **[`structural`]** - lookup tables and parameter words of
//!   the synapse dynamics region
//!
//! Generation is deterministic: the same projections, seeds and configuration
//! always produce the same bytes.

pub mod generator;
pub mod graph;
pub mod manager;
pub mod planner;
pub mod provenance;
pub mod ring_buffer;
pub mod row_blocks;
pub mod stdp;
pub mod structural;
pub mod types;

pub use generator::{expand_descriptor, expand_generated_blocks, BlockTarget, GeneratorDescriptor};
pub use graph::{KeyAndMask, Placement, PreVertex, ProjectionEdge, RoutingInfo, RoutingTable};
pub use manager::{ConnectionReader, GenerationStage, RegionMap, SynapticManager};
pub use planner::{plan_synapses, BlockEncoding, BlockPlan, PlanParams, RegionSizes, RowBlock, SynapticPlan};
pub use provenance::{EdgeProvenance, SynapticProvenance};
pub use ring_buffer::{RingBufferParams, RingBufferScaler, RingBufferShifts};
pub use row_blocks::{read_row_blocks, write_row_blocks, RowBlockLayout};
pub use structural::{PostToPreTable, RewiringSource};
pub use types::{MatrixError, MatrixResult};
