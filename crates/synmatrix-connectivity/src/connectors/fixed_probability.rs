// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Fixed-probability connectivity: each (pre, post) pair is connected
independently with probability `p_connect`.
*/

use rand::Rng;
use synmatrix_neural::{ConnectionTuple, VertexSlice};

use super::{
    delay_fraction, probable_maximum_selected, Connector, ConnectorCore, ConnectorDescriptor, ConnectorKind,
    GenerationContext,
};
use crate::synapse_info::SynapseInfo;
use crate::types::{ConnectivityError, ConnectivityResult};

#[derive(Debug)]
pub struct FixedProbabilityConnector {
    core: ConnectorCore,
    p_connect: f64,
}

impl FixedProbabilityConnector {
    pub fn new(p_connect: f64, allow_self_connections: bool) -> ConnectivityResult<Self> {
        if !(0.0..=1.0).contains(&p_connect) {
            return Err(ConnectivityError::InvalidProbability(p_connect));
        }
        Ok(Self {
            core: ConnectorCore::new(allow_self_connections),
            p_connect,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.core.seed = seed;
        self
    }

    pub fn p_connect(&self) -> f64 {
        self.p_connect
    }
}

impl Connector for FixedProbabilityConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::FixedProbability
    }

    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize {
        let probability = self.p_connect * delay_fraction(info, min_delay, max_delay);
        if probability <= 0.0 {
            return 0;
        }
        probable_maximum_selected(info.n_potential_connections(), post_slice.n_atoms() as u64, probability)
    }

    fn max_connections_to_post_vertex(&self, info: &SynapseInfo) -> usize {
        probable_maximum_selected(info.n_potential_connections(), info.pre().n_atoms as u64, self.p_connect)
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
        let mut connections = Vec::new();
        for source in pre_slice.atoms() {
            for target in post_slice.atoms() {
                // Draw for every pair so excluded pairs do not shift the stream
                let draw: f64 = rng.gen();
                if self.core.excludes(info, source, target) || draw >= self.p_connect {
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
            kind: ConnectorKind::FixedProbability,
            seed: self.core.seed,
            allow_self_connections: self.core.allow_self_connections,
            params: vec![self.p_connect],
        })
    }

    fn delays_clipped(&self) -> u64 {
        self.core.delays_clipped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse_info::PopulationDescriptor;
    use std::sync::Arc;

    fn info(p: f64, allow_self: bool) -> SynapseInfo {
        SynapseInfo::new(
            "a->b",
            Arc::new(PopulationDescriptor::new("a", 100)),
            Arc::new(PopulationDescriptor::new("b", 100)),
            Arc::new(FixedProbabilityConnector::new(p, allow_self).unwrap()),
        )
    }

    fn count(info: &SynapseInfo) -> usize {
        let slice = VertexSlice::whole(100).unwrap();
        info.connector()
            .generate(info, &slice, &slice, &GenerationContext::new(1.0, 16.0))
            .unwrap()
            .len()
    }

    #[test]
    fn test_probability_one_connects_everything() {
        assert_eq!(count(&info(1.0, true)), 10_000);
    }

    #[test]
    fn test_probability_zero_connects_nothing() {
        assert_eq!(count(&info(0.0, true)), 0);
        let info = info(0.0, true);
        let slice = VertexSlice::whole(100).unwrap();
        assert_eq!(info.connector().max_connections_from_pre_vertex(&info, &slice, None, None), 0);
    }

    #[test]
    fn test_invalid_probability() {
        assert!(matches!(
            FixedProbabilityConnector::new(1.5, true),
            Err(ConnectivityError::InvalidProbability(_))
        ));
        assert!(FixedProbabilityConnector::new(-0.1, true).is_err());
        assert!(FixedProbabilityConnector::new(f64::NAN, true).is_err());
    }

    #[test]
    fn test_deterministic_per_slice_pair() {
        let info = info(0.3, true);
        let pre = VertexSlice::new(0, 49).unwrap();
        let post = VertexSlice::new(50, 99).unwrap();
        let ctx = GenerationContext::new(1.0, 16.0);
        let first = info.connector().generate(&info, &pre, &post, &ctx).unwrap();
        let second = info.connector().generate(&info, &pre, &post, &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bound_is_between_mean_and_slice_size() {
        let info = info(0.1, true);
        let post = VertexSlice::whole(100).unwrap();
        let bound = info.connector().max_connections_from_pre_vertex(&info, &post, None, None);
        assert!(bound > 10 && bound <= 100);
    }
}
