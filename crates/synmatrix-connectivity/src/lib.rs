// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# synmatrix connectivity

Describes projections between populations and turns them into connection
tuples for one (pre slice, post slice) pair at a time.

## Modules
- **synapse_info**: `SynapseInfo`, the immutable description of one projection
- **params**: weight/delay specifications (`ParameterSpec`, `RandomDistribution`)
- **expression**: sandboxed distance-expression evaluator
- **connectors**: the `Connector` contract and its variants

Every connector declares upper bounds on the connections it may produce and
never exceeds them during generation; generation is deterministic for a
given seed and slice pair, so size planning, row writing and on-machine
expansion agree.
*/

pub mod connectors;
pub mod expression;
pub mod params;
pub mod rng;
pub mod synapse_info;
pub mod types;

pub use connectors::{
    AllToAllConnector, Connector, ConnectorDescriptor, ConnectorKind, DistanceDependentProbabilityConnector,
    FixedProbabilityConnector, FromListConnector, GenerationContext, KernelConnector, ListEntry,
    OneToOneConnector, WeightStats,
};
pub use expression::{DistanceExpression, DistanceVariables};
pub use params::{ParamDescriptor, ParameterSpec, RandomDistribution};
pub use synapse_info::{Grid2D, PopulationDescriptor, SynapseInfo};
pub use types::{ConnectivityError, ConnectivityResult};
