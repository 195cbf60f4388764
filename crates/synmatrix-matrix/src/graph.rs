// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Machine graph view: incoming edges, routing keys and placements.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use synmatrix_connectivity::SynapseInfo;
use synmatrix_neural::VertexSlice;

use crate::types::{MatrixError, MatrixResult};

/// Core a post-synaptic machine vertex runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub p: u32,
}

impl Placement {
    pub fn new(x: u32, y: u32, p: u32) -> Self {
        Self { x, y, p }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.p)
    }
}

/// Pre-synaptic machine vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreVertex {
    /// Identifier the routing information is keyed by
    pub id: u32,
    pub slice: VertexSlice,
}

impl PreVertex {
    pub fn new(id: u32, slice: VertexSlice) -> Self {
        Self { id, slice }
    }
}

/// Incoming machine edge with the projections it carries
#[derive(Debug, Clone)]
pub struct ProjectionEdge {
    pub pre_vertex: PreVertex,
    pub synapse_infos: Vec<Arc<SynapseInfo>>,
}

impl ProjectionEdge {
    pub fn new(pre_vertex: PreVertex, synapse_infos: Vec<Arc<SynapseInfo>>) -> Self {
        Self {
            pre_vertex,
            synapse_infos,
        }
    }

    pub fn single(pre_vertex: PreVertex, synapse_info: Arc<SynapseInfo>) -> Self {
        Self::new(pre_vertex, vec![synapse_info])
    }
}

/// Routing key and mask of a multicast source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyAndMask {
    pub key: u32,
    pub mask: u32,
}

impl KeyAndMask {
    pub fn new(key: u32, mask: u32) -> Self {
        Self { key, mask }
    }

    /// Number of distinct neuron indices the unmasked bits can carry
    #[inline]
    pub fn n_keys(&self) -> u64 {
        (!self.mask) as u64 + 1
    }

    /// Check the unmasked bits can address `n_atoms` neurons
    pub fn check_covers(&self, n_atoms: u64) -> MatrixResult<()> {
        if self.key & !self.mask != 0 {
            return Err(MatrixError::Configuration(format!(
                "key {:#010x} has bits outside mask {:#010x}",
                self.key, self.mask
            )));
        }
        if self.n_keys() < n_atoms {
            return Err(MatrixError::Configuration(format!(
                "mask {:#010x} leaves room for {} neurons, {} needed",
                self.mask,
                self.n_keys(),
                n_atoms
            )));
        }
        Ok(())
    }
}

/// Source of routing keys, supplied by the router collaborator
pub trait RoutingInfo {
    /// Key of spikes sent by a pre vertex
    fn key_and_mask(&self, pre_vertex: u32) -> Option<KeyAndMask>;

    /// Key of spikes relayed by the delay extension of a pre vertex
    fn delay_key_and_mask(&self, pre_vertex: u32) -> Option<KeyAndMask>;
}

/// Routing information held in maps
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    keys: AHashMap<u32, KeyAndMask>,
    delay_keys: AHashMap<u32, KeyAndMask>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pre_vertex: u32, key_and_mask: KeyAndMask) {
        self.keys.insert(pre_vertex, key_and_mask);
    }

    pub fn insert_delay(&mut self, pre_vertex: u32, key_and_mask: KeyAndMask) {
        self.delay_keys.insert(pre_vertex, key_and_mask);
    }
}

impl RoutingInfo for RoutingTable {
    fn key_and_mask(&self, pre_vertex: u32) -> Option<KeyAndMask> {
        self.keys.get(&pre_vertex).copied()
    }

    fn delay_key_and_mask(&self, pre_vertex: u32) -> Option<KeyAndMask> {
        self.delay_keys.get(&pre_vertex).copied()
    }
}
