// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Distance-dependent connectivity: each pair is connected with a probability
given by a distance expression, e.g. `"exp(-d / 3)"`.
*/

use rand::Rng;
use synmatrix_neural::{ConnectionTuple, VertexSlice};

use super::{delay_fraction, probable_maximum_selected, Connector, ConnectorCore, ConnectorKind, GenerationContext};
use crate::expression::DistanceExpression;
use crate::synapse_info::SynapseInfo;
use crate::types::ConnectivityResult;

#[derive(Debug)]
pub struct DistanceDependentProbabilityConnector {
    core: ConnectorCore,
    d_expression: DistanceExpression,
}

impl DistanceDependentProbabilityConnector {
    pub fn new(d_expression: &str, allow_self_connections: bool) -> ConnectivityResult<Self> {
        Ok(Self {
            core: ConnectorCore::new(allow_self_connections),
            d_expression: DistanceExpression::parse(d_expression)?,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.core.seed = seed;
        self
    }

    fn probability(&self, info: &SynapseInfo, source: u32, target: u32) -> f64 {
        let p = self.d_expression.evaluate(&info.distance_variables(source, target));
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }

    /// Highest connection probability of any pair with a post atom in `targets`
    fn max_probability(&self, info: &SynapseInfo, targets: impl Iterator<Item = u32> + Clone) -> f64 {
        let mut max: f64 = 0.0;
        for source in 0..info.pre().n_atoms {
            for target in targets.clone() {
                if !self.core.excludes(info, source, target) {
                    max = max.max(self.probability(info, source, target));
                }
            }
        }
        max
    }
}

impl Connector for DistanceDependentProbabilityConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::DistanceDependentProbability
    }

    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize {
        let probability = self.max_probability(info, post_slice.atoms()) * delay_fraction(info, min_delay, max_delay);
        if probability <= 0.0 {
            return 0;
        }
        probable_maximum_selected(info.n_potential_connections(), post_slice.n_atoms() as u64, probability)
    }

    fn max_connections_to_post_vertex(&self, info: &SynapseInfo) -> usize {
        let probability = self.max_probability(info, 0..info.post().n_atoms);
        if probability <= 0.0 {
            return 0;
        }
        probable_maximum_selected(info.n_potential_connections(), info.pre().n_atoms as u64, probability)
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
                let draw: f64 = rng.gen();
                if self.core.excludes(info, source, target) || draw >= self.probability(info, source, target) {
                    continue;
                }
                let index = source as usize * n_post + target as usize;
                connections.push(self.core.connection(info, &mut rng, source, target, index, ctx)?);
            }
        }
        Ok(connections)
    }

    fn delays_clipped(&self) -> u64 {
        self.core.delays_clipped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse_info::{Grid2D, PopulationDescriptor};
    use crate::types::ConnectivityError;
    use std::sync::Arc;

    fn grid_info(expression: &str) -> SynapseInfo {
        let pop = Arc::new(
            PopulationDescriptor::new("sheet", 25)
                .with_grid(Grid2D::new(5, 5).unwrap())
                .unwrap(),
        );
        SynapseInfo::new(
            "sheet->sheet",
            pop.clone(),
            pop,
            Arc::new(DistanceDependentProbabilityConnector::new(expression, false).unwrap()),
        )
    }

    #[test]
    fn test_step_expression_connects_neighbours_only() {
        let info = grid_info("d < 1.5");
        let slice = VertexSlice::whole(25).unwrap();
        let conns = info
            .connector()
            .generate(&info, &slice, &slice, &GenerationContext::new(1.0, 16.0))
            .unwrap();
        for c in &conns {
            let vars = info.distance_variables(c.source, c.target as u32);
            assert!(vars.d < 1.5 && vars.d > 0.0);
        }
        // Centre neuron has all 8 neighbours
        assert_eq!(conns.iter().filter(|c| c.source == 12).count(), 8);
    }

    #[test]
    fn test_rejects_disallowed_expression() {
        assert!(matches!(
            DistanceDependentProbabilityConnector::new("import(d)", true),
            Err(ConnectivityError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_zero_probability_bound() {
        let info = grid_info("0 * d");
        let slice = VertexSlice::whole(25).unwrap();
        assert_eq!(info.connector().max_connections_from_pre_vertex(&info, &slice, None, None), 0);
    }
}
