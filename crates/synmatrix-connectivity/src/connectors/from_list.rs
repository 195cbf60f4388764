// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Explicit connectivity: a list of `(source, target)` pairs, each optionally
carrying its own weight and delay.

Entries without an explicit value take it from the projection's weight or
delay specification; array specifications are indexed by list position.
*/

use ahash::AHashMap;
use synmatrix_neural::stats::RunningStats;
use synmatrix_neural::{ConnectionTuple, VertexSlice};

use super::{
    delay_fraction, min_max, spec_bounds, spec_weight_stats, value_stats, Connector, ConnectorCore, ConnectorKind,
    GenerationContext, WeightStats,
};
use crate::synapse_info::SynapseInfo;
use crate::types::{ConnectivityError, ConnectivityResult};

/// One connection of a list
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ListEntry {
    pub source: u32,
    pub target: u32,
    pub weight: Option<f64>,
    pub delay: Option<f64>,
}

impl ListEntry {
    pub fn new(source: u32, target: u32) -> Self {
        Self {
            source,
            target,
            weight: None,
            delay: None,
        }
    }

    pub fn with_values(source: u32, target: u32, weight: f64, delay: f64) -> Self {
        Self {
            source,
            target,
            weight: Some(weight),
            delay: Some(delay),
        }
    }
}

#[derive(Debug)]
pub struct FromListConnector {
    core: ConnectorCore,
    entries: Vec<ListEntry>,
}

impl FromListConnector {
    pub fn new(entries: Vec<ListEntry>) -> Self {
        Self {
            core: ConnectorCore::new(true),
            entries,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.core.seed = seed;
        self
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    /// Entry might fall into the delay range
    fn delay_may_be_in_range(&self, info: &SynapseInfo, entry: &ListEntry, lo: Option<f64>, hi: Option<f64>) -> bool {
        match entry.delay {
            Some(delay) => lo.map_or(true, |lo| delay >= lo) && hi.map_or(true, |hi| delay <= hi),
            None => delay_fraction(info, lo, hi) > 0.0,
        }
    }
}

impl Connector for FromListConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::FromList
    }

    fn validate(&self, info: &SynapseInfo) -> ConnectivityResult<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.source >= info.pre().n_atoms || entry.target >= info.post().n_atoms {
                return Err(ConnectivityError::ListEntryOutOfRange {
                    index,
                    pre: entry.source,
                    post: entry.target,
                });
            }
            if entry.delay.is_some_and(|d| d < 0.0 || !d.is_finite()) {
                return Err(ConnectivityError::InvalidParameter(format!(
                    "list entry {} has an invalid delay",
                    index
                )));
            }
        }
        Ok(())
    }

    fn n_array_values(&self, _info: &SynapseInfo) -> usize {
        self.entries.len()
    }

    fn estimate_delay_bounds(&self, info: &SynapseInfo) -> (f64, f64) {
        let explicit = min_max(self.entries.iter().filter_map(|e| e.delay));
        if self.entries.iter().all(|e| e.delay.is_some()) {
            return explicit;
        }
        let (lo, hi) = spec_bounds(info.delays(), info);
        if self.entries.iter().any(|e| e.delay.is_some()) {
            (lo.min(explicit.0), hi.max(explicit.1))
        } else {
            (lo, hi)
        }
    }

    fn estimate_weight_bounds(&self, info: &SynapseInfo) -> WeightStats {
        let (mut stats, mut max) = value_stats(self.entries.iter().filter_map(|e| e.weight));
        let n_implicit = self.entries.iter().filter(|e| e.weight.is_none()).count() as u64;
        if n_implicit > 0 {
            let spec = spec_weight_stats(info.weights(), info);
            stats.add_items(spec.mean, spec.variance, n_implicit);
            max = max.max(spec.max);
        }
        finish(stats, max)
    }

    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize {
        let mut per_source: AHashMap<u32, usize> = AHashMap::new();
        for entry in &self.entries {
            if post_slice.contains(entry.target) && self.delay_may_be_in_range(info, entry, min_delay, max_delay) {
                *per_source.entry(entry.source).or_default() += 1;
            }
        }
        per_source.values().copied().max().unwrap_or(0)
    }

    fn max_connections_to_post_vertex(&self, _info: &SynapseInfo) -> usize {
        let mut per_target: AHashMap<u32, usize> = AHashMap::new();
        for entry in &self.entries {
            *per_target.entry(entry.target).or_default() += 1;
        }
        per_target.values().copied().max().unwrap_or(0)
    }

    fn generate(
        &self,
        info: &SynapseInfo,
        pre_slice: &VertexSlice,
        post_slice: &VertexSlice,
        ctx: &GenerationContext,
    ) -> ConnectivityResult<Vec<ConnectionTuple>> {
        let mut rng = self.core.rng(pre_slice, post_slice);
        let mut connections = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if !pre_slice.contains(entry.source) || !post_slice.contains(entry.target) {
                continue;
            }
            let vars = info.distance_variables(entry.source, entry.target);
            let weight = match entry.weight {
                Some(w) => w,
                None => info.weights().value(&mut rng, index, &vars)?,
            };
            let delay = match entry.delay {
                Some(d) => d,
                None => info.delays().value(&mut rng, index, &vars)?,
            };
            connections.push(ConnectionTuple::new(
                entry.source,
                entry.target as u16,
                weight,
                self.core.clip_delay(delay, ctx),
                info.synapse_type(),
            ));
        }
        Ok(connections)
    }

    fn delays_clipped(&self) -> u64 {
        self.core.delays_clipped()
    }
}

fn finish(stats: RunningStats, max: f64) -> WeightStats {
    WeightStats {
        mean: stats.mean(),
        variance: stats.variance(),
        max,
    }
}
