// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Convolution-kernel connectivity between two 2D populations.

Post neuron `(px, py)` is centred on pre neuron
`(pre_start_x + px * step_x, pre_start_y + py * step_y)` and receives one
connection from every pre neuron under the kernel window around that centre.
Kernel weights and delays, when given, are indexed row-major by kernel
position.
*/

use synmatrix_neural::{ConnectionTuple, VertexSlice};

use super::{
    delay_fraction, min_max, spec_bounds, spec_weight_stats, value_stats, Connector, ConnectorCore, ConnectorKind,
    GenerationContext, WeightStats,
};
use crate::synapse_info::{Grid2D, SynapseInfo};
use crate::types::{ConnectivityError, ConnectivityResult};

#[derive(Debug)]
pub struct KernelConnector {
    core: ConnectorCore,
    /// `[width, height]` of the kernel
    shape: [u32; 2],
    /// `[x, y]` stride over the pre grid per post neuron
    step: [u32; 2],
    /// `[x, y]` pre position of post neuron (0, 0)
    pre_start: [u32; 2],
    weights: Option<Vec<f64>>,
    delays: Option<Vec<f64>>,
}

impl KernelConnector {
    pub fn new(shape: [u32; 2], step: [u32; 2], pre_start: [u32; 2]) -> ConnectivityResult<Self> {
        if shape.contains(&0) || step.contains(&0) {
            return Err(ConnectivityError::InvalidKernel(format!(
                "shape {:?} and step {:?} must be non-zero",
                shape, step
            )));
        }
        Ok(Self {
            core: ConnectorCore::new(true),
            shape,
            step,
            pre_start,
            weights: None,
            delays: None,
        })
    }

    fn kernel_len(&self) -> usize {
        (self.shape[0] * self.shape[1]) as usize
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> ConnectivityResult<Self> {
        if weights.len() != self.kernel_len() {
            return Err(ConnectivityError::InvalidKernel(format!(
                "{} kernel weights for a {}x{} kernel",
                weights.len(),
                self.shape[0],
                self.shape[1]
            )));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn with_delays(mut self, delays: Vec<f64>) -> ConnectivityResult<Self> {
        if delays.len() != self.kernel_len() {
            return Err(ConnectivityError::InvalidKernel(format!(
                "{} kernel delays for a {}x{} kernel",
                delays.len(),
                self.shape[0],
                self.shape[1]
            )));
        }
        self.delays = Some(delays);
        Ok(self)
    }

    pub fn with_self_connections(mut self, allow: bool) -> Self {
        self.core.allow_self_connections = allow;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.core.seed = seed;
        self
    }

    fn grids(info: &SynapseInfo) -> ConnectivityResult<(Grid2D, Grid2D)> {
        match (info.pre().grid, info.post().grid) {
            (Some(pre), Some(post)) => Ok((pre, post)),
            _ => Err(ConnectivityError::InvalidKernel(format!(
                "projection {} needs a grid on both populations",
                info.label()
            ))),
        }
    }

    /// `(pre atom, kernel index)` pairs feeding one post atom
    fn sources_of(&self, pre_grid: &Grid2D, post_grid: &Grid2D, target: u32) -> Vec<(u32, usize)> {
        let (px, py) = post_grid.position(target);
        let cx = (self.pre_start[0] + px * self.step[0]) as i64;
        let cy = (self.pre_start[1] + py * self.step[1]) as i64;
        let half_w = (self.shape[0] / 2) as i64;
        let half_h = (self.shape[1] / 2) as i64;
        let mut sources = Vec::new();
        for ky in 0..self.shape[1] {
            for kx in 0..self.shape[0] {
                let x = cx + kx as i64 - half_w;
                let y = cy + ky as i64 - half_h;
                if let Some(source) = pre_grid.atom_at(x, y) {
                    sources.push((source, (ky * self.shape[0] + kx) as usize));
                }
            }
        }
        sources
    }
}

impl Connector for KernelConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Kernel
    }

    fn validate(&self, info: &SynapseInfo) -> ConnectivityResult<()> {
        Self::grids(info).map(|_| ())
    }

    fn n_array_values(&self, _info: &SynapseInfo) -> usize {
        self.kernel_len()
    }

    fn estimate_delay_bounds(&self, info: &SynapseInfo) -> (f64, f64) {
        match &self.delays {
            Some(delays) => min_max(delays.iter().copied()),
            None => spec_bounds(info.delays(), info),
        }
    }

    fn estimate_weight_bounds(&self, info: &SynapseInfo) -> WeightStats {
        match &self.weights {
            Some(weights) => {
                let (stats, max) = value_stats(weights.iter().copied());
                WeightStats {
                    mean: stats.mean(),
                    variance: stats.variance(),
                    max,
                }
            }
            None => spec_weight_stats(info.weights(), info),
        }
    }

    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize {
        let in_range = match &self.delays {
            Some(delays) => delays.iter().any(|d| {
                min_delay.map_or(true, |lo| *d >= lo) && max_delay.map_or(true, |hi| *d <= hi)
            }),
            None => delay_fraction(info, min_delay, max_delay) > 0.0,
        };
        if !in_range {
            return 0;
        }
        let per_pre = self.shape[0].div_ceil(self.step[0]) * self.shape[1].div_ceil(self.step[1]);
        (per_pre as usize).min(post_slice.n_atoms() as usize)
    }

    fn max_connections_to_post_vertex(&self, info: &SynapseInfo) -> usize {
        self.kernel_len().min(info.pre().n_atoms as usize)
    }

    fn generate(
        &self,
        info: &SynapseInfo,
        pre_slice: &VertexSlice,
        post_slice: &VertexSlice,
        ctx: &GenerationContext,
    ) -> ConnectivityResult<Vec<ConnectionTuple>> {
        let (pre_grid, post_grid) = Self::grids(info)?;
        let mut rng = self.core.rng(pre_slice, post_slice);
        let mut connections = Vec::new();
        for target in post_slice.atoms() {
            for (source, k) in self.sources_of(&pre_grid, &post_grid, target) {
                if !pre_slice.contains(source) || self.core.excludes(info, source, target) {
                    continue;
                }
                let vars = info.distance_variables(source, target);
                let weight = match &self.weights {
                    Some(weights) => weights[k],
                    None => info.weights().value(&mut rng, k, &vars)?,
                };
                let delay = match &self.delays {
                    Some(delays) => delays[k],
                    None => info.delays().value(&mut rng, k, &vars)?,
                };
                connections.push(ConnectionTuple::new(
                    source,
                    target as u16,
                    weight,
                    self.core.clip_delay(delay, ctx),
                    info.synapse_type(),
                ));
            }
        }
        Ok(connections)
    }

    fn delays_clipped(&self) -> u64 {
        self.core.delays_clipped()
    }
}
