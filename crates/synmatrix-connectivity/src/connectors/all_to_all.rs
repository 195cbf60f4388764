// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
All-to-all connectivity: every pre neuron connects to every post neuron.
*/

use synmatrix_neural::{ConnectionTuple, VertexSlice};

use super::{delay_limited, Connector, ConnectorCore, ConnectorDescriptor, ConnectorKind, GenerationContext};
use crate::synapse_info::SynapseInfo;
use crate::types::ConnectivityResult;

#[derive(Debug)]
pub struct AllToAllConnector {
    core: ConnectorCore,
}

impl AllToAllConnector {
    pub fn new(allow_self_connections: bool) -> Self {
        Self {
            core: ConnectorCore::new(allow_self_connections),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.core.seed = seed;
        self
    }
}

impl Connector for AllToAllConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::AllToAll
    }

    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize {
        delay_limited(info, post_slice.n_atoms() as usize, min_delay, max_delay)
    }

    fn max_connections_to_post_vertex(&self, info: &SynapseInfo) -> usize {
        info.pre().n_atoms as usize
    }

    fn generate(
        &self,
        info: &SynapseInfo,
        pre_slice: &VertexSlice,
        post_slice: &VertexSlice,
        ctx: &GenerationContext,
    ) -> ConnectivityResult<Vec<ConnectionTuple>> {
        let n_post = info.post().n_atoms as usize;
        let mut rng = self.core.rng(pre_slice, post_slice);
        let mut connections = Vec::with_capacity(pre_slice.n_atoms() as usize * post_slice.n_atoms() as usize);
        for source in pre_slice.atoms() {
            for target in post_slice.atoms() {
                if self.core.excludes(info, source, target) {
                    continue;
                }
                let index = source as usize * n_post + target as usize;
                connections.push(self.core.connection(info, &mut rng, source, target, index, ctx)?);
            }
        }
        Ok(connections)
    }

    fn generator_descriptor(&self, _info: &SynapseInfo) -> Option<ConnectorDescriptor> {
        Some(ConnectorDescriptor {
            kind: ConnectorKind::AllToAll,
            seed: self.core.seed,
            allow_self_connections: self.core.allow_self_connections,
            params: Vec::new(),
        })
    }

    fn delays_clipped(&self) -> u64 {
        self.core.delays_clipped()
    }
}
