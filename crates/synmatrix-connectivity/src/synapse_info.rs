// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Projection descriptions.

A `SynapseInfo` is built once per projection and shared (`Arc`) between
every edge and slice that uses it. It is immutable apart from the
`has_changed` flag that tells the matrix builder cached results are stale.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use synmatrix_neural::SynapseDynamics;

use crate::connectors::Connector;
use crate::expression::DistanceVariables;
use crate::params::ParameterSpec;
use crate::types::{ConnectivityError, ConnectivityResult};

/// Largest post-synaptic population addressable by a `u16` target
const MAX_POST_ATOMS: u32 = u16::MAX as u32 + 1;

/// Row-major 2D arrangement of a population's atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Grid2D {
    pub width: u32,
    pub height: u32,
}

impl Grid2D {
    pub fn new(width: u32, height: u32) -> ConnectivityResult<Self> {
        if width == 0 || height == 0 {
            return Err(ConnectivityError::InvalidParameter(format!(
                "grid dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn n_cells(&self) -> u32 {
        self.width * self.height
    }

    /// `(x, y)` of an atom
    #[inline]
    pub fn position(&self, atom: u32) -> (u32, u32) {
        (atom % self.width, atom / self.width)
    }

    /// Atom at `(x, y)`, if inside the grid
    #[inline]
    pub fn atom_at(&self, x: i64, y: i64) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            None
        } else {
            Some(y as u32 * self.width + x as u32)
        }
    }
}

/// What the connectivity layer needs to know about a population
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PopulationDescriptor {
    pub label: String,
    pub n_atoms: u32,
    pub grid: Option<Grid2D>,
    /// Maximum firing rate in Hz of a Poisson source population
    pub max_rate: Option<ParameterSpec>,
}

impl PopulationDescriptor {
    pub fn new(label: impl Into<String>, n_atoms: u32) -> Self {
        Self {
            label: label.into(),
            n_atoms,
            grid: None,
            max_rate: None,
        }
    }

    pub fn with_grid(mut self, grid: Grid2D) -> ConnectivityResult<Self> {
        if grid.n_cells() != self.n_atoms {
            return Err(ConnectivityError::InvalidParameter(format!(
                "grid {}x{} does not cover {} atoms of {}",
                grid.width, grid.height, self.n_atoms, self.label
            )));
        }
        self.grid = Some(grid);
        Ok(self)
    }

    pub fn with_max_rate(mut self, rate: impl Into<ParameterSpec>) -> Self {
        self.max_rate = Some(rate.into());
        self
    }

    /// Position in space; populations without a grid lie on a line
    pub fn position(&self, atom: u32) -> (f64, f64) {
        match &self.grid {
            Some(grid) => {
                let (x, y) = grid.position(atom);
                (x as f64, y as f64)
            }
            None => (atom as f64, 0.0),
        }
    }
}

/// Immutable description of one projection
#[derive(Debug)]
pub struct SynapseInfo {
    label: String,
    pre: Arc<PopulationDescriptor>,
    post: Arc<PopulationDescriptor>,
    connector: Arc<dyn Connector>,
    weights: ParameterSpec,
    delays: ParameterSpec,
    synapse_type: u8,
    synapse_dynamics: SynapseDynamics,
    has_changed: AtomicBool,
}

impl SynapseInfo {
    /// Projection with unit weights, 1 ms delays, synapse type 0 and static dynamics
    pub fn new(
        label: impl Into<String>,
        pre: Arc<PopulationDescriptor>,
        post: Arc<PopulationDescriptor>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            label: label.into(),
            pre,
            post,
            connector,
            weights: ParameterSpec::Scalar(1.0),
            delays: ParameterSpec::Scalar(1.0),
            synapse_type: 0,
            synapse_dynamics: SynapseDynamics::Static,
            has_changed: AtomicBool::new(true),
        }
    }

    pub fn with_weights(mut self, weights: impl Into<ParameterSpec>) -> Self {
        self.weights = weights.into();
        self
    }

    pub fn with_delays(mut self, delays: impl Into<ParameterSpec>) -> Self {
        self.delays = delays.into();
        self
    }

    pub fn with_synapse_type(mut self, synapse_type: u8) -> Self {
        self.synapse_type = synapse_type;
        self
    }

    pub fn with_dynamics(mut self, dynamics: SynapseDynamics) -> Self {
        self.synapse_dynamics = dynamics;
        self
    }

    /// Check the projection against a post vertex with `n_synapse_types` receptor types
    pub fn validate(&self, n_synapse_types: u8) -> ConnectivityResult<()> {
        if self.synapse_type >= n_synapse_types {
            return Err(ConnectivityError::InvalidSynapseType {
                synapse_type: self.synapse_type,
                n_types: n_synapse_types,
            });
        }
        if self.pre.n_atoms == 0 || self.post.n_atoms == 0 {
            return Err(ConnectivityError::InvalidParameter(format!(
                "projection {} connects an empty population",
                self.label
            )));
        }
        if self.post.n_atoms > MAX_POST_ATOMS {
            return Err(ConnectivityError::InvalidParameter(format!(
                "post population {} has {} atoms, at most {} are addressable",
                self.post.label, self.post.n_atoms, MAX_POST_ATOMS
            )));
        }

        self.weights.validate()?;
        self.delays.validate()?;
        self.synapse_dynamics.validate()?;

        if self.weights.has_negative_values() && !self.synapse_dynamics.are_weights_signed() {
            return Err(ConnectivityError::InvalidParameter(format!(
                "projection {} has negative weights but unsigned synapse dynamics; \
                 use an inhibitory synapse type instead",
                self.label
            )));
        }
        if self.delays.has_negative_values() {
            return Err(ConnectivityError::InvalidParameter(format!(
                "projection {} has negative delays",
                self.label
            )));
        }

        let expected = self.connector.n_array_values(self);
        for (name, spec) in [("weights", &self.weights), ("delays", &self.delays)] {
            if let ParameterSpec::Array(values) = spec {
                if values.len() != expected {
                    return Err(ConnectivityError::InvalidParameter(format!(
                        "{} array of projection {} has {} values, {} expected",
                        name,
                        self.label,
                        values.len(),
                        expected
                    )));
                }
            }
        }

        self.connector.validate(self)
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn pre(&self) -> &PopulationDescriptor {
        &self.pre
    }

    #[inline]
    pub fn post(&self) -> &PopulationDescriptor {
        &self.post
    }

    #[inline]
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    #[inline]
    pub fn weights(&self) -> &ParameterSpec {
        &self.weights
    }

    #[inline]
    pub fn delays(&self) -> &ParameterSpec {
        &self.delays
    }

    #[inline]
    pub fn synapse_type(&self) -> u8 {
        self.synapse_type
    }

    #[inline]
    pub fn synapse_dynamics(&self) -> &SynapseDynamics {
        &self.synapse_dynamics
    }

    /// Pre and post are the same population
    ///
    /// Identity is the shared descriptor; distinct populations may carry
    /// the same label.
    pub fn is_self_projection(&self) -> bool {
        Arc::ptr_eq(&self.pre, &self.post)
    }

    pub fn distance_variables(&self, source: u32, target: u32) -> DistanceVariables {
        DistanceVariables::between(self.pre.position(source), self.post.position(target))
    }

    /// Number of (pre, post) atom pairs in the projection
    #[inline]
    pub fn n_potential_connections(&self) -> u64 {
        self.pre.n_atoms as u64 * self.post.n_atoms as u64
    }

    pub fn mark_changed(&self) {
        self.has_changed.store(true, Ordering::Release);
    }

    /// Read and clear the changed flag
    pub fn take_changed(&self) -> bool {
        self.has_changed.swap(false, Ordering::AcqRel)
    }
}
