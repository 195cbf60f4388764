// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
One-to-one connectivity: neuron `i` of the pre population connects to neuron
`i` of an equally sized post population.
*/

use synmatrix_neural::{ConnectionTuple, VertexSlice};

use super::{delay_limited, Connector, ConnectorCore, ConnectorDescriptor, ConnectorKind, GenerationContext};
use crate::synapse_info::SynapseInfo;
use crate::types::{ConnectivityError, ConnectivityResult};

#[derive(Debug)]
pub struct OneToOneConnector {
    core: ConnectorCore,
}

impl Default for OneToOneConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl OneToOneConnector {
    pub fn new() -> Self {
        Self {
            core: ConnectorCore::new(true),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.core.seed = seed;
        self
    }
}

impl Connector for OneToOneConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::OneToOne
    }

    fn validate(&self, info: &SynapseInfo) -> ConnectivityResult<()> {
        if info.pre().n_atoms != info.post().n_atoms {
            return Err(ConnectivityError::PopulationSizeMismatch {
                pre: info.pre().n_atoms,
                post: info.post().n_atoms,
            });
        }
        Ok(())
    }

    fn n_array_values(&self, info: &SynapseInfo) -> usize {
        info.pre().n_atoms as usize
    }

    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        _post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize {
        delay_limited(info, 1, min_delay, max_delay)
    }

    fn max_connections_to_post_vertex(&self, _info: &SynapseInfo) -> usize {
        1
    }

    fn generate(
        &self,
        info: &SynapseInfo,
        pre_slice: &VertexSlice,
        post_slice: &VertexSlice,
        ctx: &GenerationContext,
    ) -> ConnectivityResult<Vec<ConnectionTuple>> {
        let lo = pre_slice.lo_atom().max(post_slice.lo_atom());
        let hi = pre_slice.hi_atom().min(post_slice.hi_atom());
        if lo > hi {
            return Ok(Vec::new());
        }
        let mut rng = self.core.rng(pre_slice, post_slice);
        (lo..=hi)
            .map(|atom| self.core.connection(info, &mut rng, atom, atom, atom as usize, ctx))
            .collect()
    }

    fn generator_descriptor(&self, _info: &SynapseInfo) -> Option<ConnectorDescriptor> {
        Some(ConnectorDescriptor {
            kind: ConnectorKind::OneToOne,
            seed: self.core.seed,
            allow_self_connections: true,
            params: Vec::new(),
        })
    }

    fn delays_clipped(&self) -> u64 {
        self.core.delays_clipped()
    }
}
