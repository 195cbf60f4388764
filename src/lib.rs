// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synmatrix - synaptic matrices for neuromorphic cores
//!
//! Given the projections into a post-synaptic population and how both sides
//! are split across cores, synmatrix decides how every block of synapses is
//! stored, sizes the memory regions, scales weights into fixed point so the
//! input ring buffers cannot overflow, and writes the binary regions a
//! simulation core loads. Connections can be read back from those regions.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use synmatrix::prelude::*;
//!
//! let pre = Arc::new(PopulationDescriptor::new("input", 100));
//! let post = Arc::new(PopulationDescriptor::new("excitatory", 100));
//! let connector = Arc::new(FixedProbabilityConnector::new(0.1, false)?.with_seed(42));
//! let info = Arc::new(SynapseInfo::new("input->excitatory", pre, post, connector).with_weights(0.5));
//!
//! let slice = VertexSlice::whole(100)?;
//! let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info.clone())];
//! let mut routing = RoutingTable::new();
//! routing.insert(1, KeyAndMask::new(0x1_0000, 0xFFFF_FF00));
//!
//! let mut manager = SynapticManager::new("excitatory", 2, &SynmatrixConfig::default())?;
//! let mut spec = MemoryDataSpec::new();
//! let placement = Placement::new(0, 0, 1);
//! manager.write_data_spec(&mut spec, placement, &slice, &edges, &routing)?;
//!
//! let mut regions = spec.into_regions();
//! manager.expand_on_host(&mut regions)?;
//! let connections = manager.get_connections_from_machine(placement, &edges[0], &info, &regions)?;
//! assert!(!connections.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: synmatrix-config, synmatrix-observability  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Model: synmatrix-neural, synmatrix-connectivity        │
//! │  (slices, row format, dynamics, connectors)             │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Data: synmatrix-serialization                          │
//! │  (row codec, master population table, data spec)        │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Generation: synmatrix-matrix                           │
//! │  (planning, ring-buffer scaling, synaptic manager)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use synmatrix_config as config;
pub use synmatrix_connectivity as connectivity;
pub use synmatrix_matrix as matrix;
pub use synmatrix_neural as neural;
pub use synmatrix_observability as observability;
pub use synmatrix_serialization as serialization;

/// Everything needed to describe projections and generate their regions
pub mod prelude {
    pub use synmatrix_config::{load_config, SynmatrixConfig};
    pub use synmatrix_connectivity::{
        AllToAllConnector, Connector, DistanceDependentProbabilityConnector, FixedProbabilityConnector,
        FromListConnector, KernelConnector, ListEntry, OneToOneConnector, ParameterSpec, PopulationDescriptor,
        RandomDistribution, SynapseInfo,
    };
    pub use synmatrix_matrix::{
        KeyAndMask, MatrixError, MatrixResult, Placement, PreVertex, ProjectionEdge, RegionMap, RoutingInfo,
        RoutingTable, SynapticManager, SynapticProvenance,
    };
    pub use synmatrix_neural::{
        ConnectionTuple, StdpDynamics, StructuralDynamics, SynapseDynamics, VertexSlice,
    };
    pub use synmatrix_serialization::{DataRegion, DataSpecWriter, MemoryDataSpec};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
