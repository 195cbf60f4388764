// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synapse dynamics records
//!
//! Dynamics are tagged variants rather than a class hierarchy. Every size
//! and capability query is a method on [`SynapseDynamics`] keyed on the tag,
//! so size planning and row writing always consult the same function.

use crate::types::{NeuralError, NeuralResult};

const BYTES_PER_WORD: usize = 4;
/// Words preceding the synapse data of every indirect row
const ROW_HEADER_WORDS: usize = 3;
/// Bytes of a static synapse word
const STATIC_SYNAPSE_BYTES: usize = 4;
/// Bytes of a plastic weight half-word
const PLASTIC_WEIGHT_BYTES: usize = 2;
/// Bytes of a plastic control half-word
const PLASTIC_CONTROL_BYTES: usize = 2;
/// Pre-synaptic event history kept at the head of each plastic row:
/// last spike time and trace value, both u32
const STDP_HEADER_BYTES: usize = 8;

/// Pair-based additive STDP
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StdpDynamics {
    /// Potentiation time constant in ms
    pub tau_plus: f64,
    /// Depression time constant in ms
    pub tau_minus: f64,
    pub a_plus: f64,
    pub a_minus: f64,
    pub w_min: f64,
    pub w_max: f64,
}

impl StdpDynamics {
    pub fn validate(&self) -> NeuralResult<()> {
        if !(self.tau_plus > 0.0) || !(self.tau_minus > 0.0) {
            return Err(NeuralError::InvalidDynamics(format!(
                "STDP time constants must be positive (tau_plus={}, tau_minus={})",
                self.tau_plus, self.tau_minus
            )));
        }
        if self.w_max < self.w_min {
            return Err(NeuralError::InvalidDynamics(format!(
                "w_max {} is below w_min {}",
                self.w_max, self.w_min
            )));
        }
        if self.a_plus < 0.0 || self.a_minus < 0.0 {
            return Err(NeuralError::InvalidDynamics(
                "STDP amplitudes must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StdpDynamics {
    fn default() -> Self {
        Self {
            tau_plus: 20.0,
            tau_minus: 20.0,
            a_plus: 0.01,
            a_minus: 0.012,
            w_min: 0.0,
            w_max: 1.0,
        }
    }
}

/// Structural plasticity parameters: random rewiring over a 2D grid
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructuralDynamics {
    /// Plasticity of the rewired synapses themselves; `None` means static
    pub plastic: Option<StdpDynamics>,
    /// Maximum synapses per post-synaptic neuron
    pub s_max: u32,
    /// Grid extent `[width, height]`; a zero dimension disables wrap-around
    pub grid: [u32; 2],
    pub p_form_forward: f64,
    pub p_form_lateral: f64,
    pub sigma_form_forward: f64,
    pub sigma_form_lateral: f64,
    pub p_elim_dep: f64,
    pub p_elim_pot: f64,
    /// Rewiring frequency in Hz
    pub f_rew: f64,
    pub initial_weight: f64,
    /// Delay of formed synapses in ms
    pub initial_delay: f64,
    pub lateral_inhibition: bool,
    pub seed: u64,
}

impl StructuralDynamics {
    pub fn validate(&self) -> NeuralResult<()> {
        if self.s_max == 0 {
            return Err(NeuralError::InvalidDynamics("s_max must be at least 1".to_string()));
        }
        for (name, p) in [
            ("p_form_forward", self.p_form_forward),
            ("p_form_lateral", self.p_form_lateral),
            ("p_elim_dep", self.p_elim_dep),
            ("p_elim_pot", self.p_elim_pot),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(NeuralError::InvalidDynamics(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        if !(self.sigma_form_forward > 0.0) || !(self.sigma_form_lateral > 0.0) {
            return Err(NeuralError::InvalidDynamics(
                "formation sigmas must be positive".to_string(),
            ));
        }
        if !(self.f_rew > 0.0) {
            return Err(NeuralError::InvalidDynamics(format!(
                "rewiring frequency must be positive, got {}",
                self.f_rew
            )));
        }
        if let Some(stdp) = &self.plastic {
            stdp.validate()?;
        }
        Ok(())
    }
}

impl Default for StructuralDynamics {
    fn default() -> Self {
        Self {
            plastic: None,
            s_max: 32,
            grid: [16, 16],
            p_form_forward: 0.16,
            p_form_lateral: 1.0,
            sigma_form_forward: 2.5,
            sigma_form_lateral: 1.0,
            p_elim_dep: 0.0245,
            p_elim_pot: 1.36e-4,
            f_rew: 10_000.0,
            initial_weight: 0.05,
            initial_delay: 1.0,
            lateral_inhibition: false,
            seed: 0,
        }
    }
}

/// Plasticity attached to a projection
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SynapseDynamics {
    #[default]
    Static,
    Stdp(StdpDynamics),
    Structural(StructuralDynamics),
}

impl SynapseDynamics {
    pub fn validate(&self) -> NeuralResult<()> {
        match self {
            SynapseDynamics::Static => Ok(()),
            SynapseDynamics::Stdp(stdp) => stdp.validate(),
            SynapseDynamics::Structural(structural) => structural.validate(),
        }
    }

    /// STDP rule governing the synapse weights, if any
    pub fn stdp(&self) -> Option<&StdpDynamics> {
        match self {
            SynapseDynamics::Static => None,
            SynapseDynamics::Stdp(stdp) => Some(stdp),
            SynapseDynamics::Structural(structural) => structural.plastic.as_ref(),
        }
    }

    pub fn structural(&self) -> Option<&StructuralDynamics> {
        match self {
            SynapseDynamics::Structural(structural) => Some(structural),
            _ => None,
        }
    }

    /// Rows carry a plastic region
    #[inline]
    pub fn is_plastic(&self) -> bool {
        self.stdp().is_some()
    }

    /// Plastic-region header bytes per row
    pub fn n_header_bytes(&self) -> usize {
        if self.is_plastic() {
            STDP_HEADER_BYTES
        } else {
            0
        }
    }

    /// Bytes one synapse occupies across the row's sub-blocks
    pub fn bytes_per_synapse(&self) -> usize {
        if self.is_plastic() {
            PLASTIC_WEIGHT_BYTES + PLASTIC_CONTROL_BYTES
        } else {
            STATIC_SYNAPSE_BYTES
        }
    }

    /// Words of an indirect row holding `n_connections` synapses
    ///
    /// This is the only row-size function; planning and writing both call it.
    ///
    /// # Example
    /// ```
    /// use synmatrix_neural::SynapseDynamics;
    ///
    /// assert_eq!(SynapseDynamics::Static.n_words_for_connections(10), 13);
    /// ```
    pub fn n_words_for_connections(&self, n_connections: usize) -> usize {
        if self.is_plastic() {
            let plastic_bytes = self.n_header_bytes() + PLASTIC_WEIGHT_BYTES * n_connections;
            let control_bytes = PLASTIC_CONTROL_BYTES * n_connections;
            ROW_HEADER_WORDS
                + plastic_bytes.div_ceil(BYTES_PER_WORD)
                + control_bytes.div_ceil(BYTES_PER_WORD)
        } else {
            ROW_HEADER_WORDS + n_connections
        }
    }

    /// Weights may be negative and are stored in two's complement
    pub fn are_weights_signed(&self) -> bool {
        self.stdp().map(|stdp| stdp.w_min < 0.0).unwrap_or(false)
    }

    /// A machine-side expander can build rows for these dynamics
    pub fn supports_generation_on_machine(&self) -> bool {
        !matches!(self, SynapseDynamics::Structural(_))
    }

    /// Identifier written into generator descriptors and the dynamics region
    pub fn dynamics_id(&self) -> u32 {
        match self {
            SynapseDynamics::Static => 0,
            SynapseDynamics::Stdp(_) => 1,
            SynapseDynamics::Structural(s) if s.plastic.is_none() => 2,
            SynapseDynamics::Structural(_) => 3,
        }
    }

    /// Largest weight the synapses can reach, given the connector's maximum
    pub fn weight_maximum(&self, connector_max: f64) -> f64 {
        let mut maximum = connector_max;
        if let Some(stdp) = self.stdp() {
            maximum = maximum.max(stdp.w_max.abs()).max(stdp.w_min.abs());
        }
        if let Some(structural) = self.structural() {
            maximum = maximum.max(structural.initial_weight.abs());
        }
        maximum
    }

    /// Weight `(mean, variance)` for ring-buffer bounds
    ///
    /// Plastic weights may drift anywhere up to their maximum, so they are
    /// bounded by that maximum with no spread.
    pub fn weight_mean_and_variance(&self, mean: f64, variance: f64, connector_max: f64) -> (f64, f64) {
        if self.is_plastic() {
            (self.weight_maximum(connector_max), 0.0)
        } else {
            (mean, variance)
        }
    }

    /// Combine the dynamics of two projections onto the same post vertex
    ///
    /// Static combines with anything; two plastic rules must be identical.
    pub fn merge(&self, other: &SynapseDynamics) -> NeuralResult<SynapseDynamics> {
        match (self, other) {
            (SynapseDynamics::Static, x) | (x, SynapseDynamics::Static) => Ok(x.clone()),
            (a, b) if a == b => Ok(a.clone()),
            (a, b) => Err(NeuralError::InvalidDynamics(format!(
                "incompatible synapse dynamics on one post vertex: {} and {}",
                a.name(),
                b.name()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SynapseDynamics::Static => "static",
            SynapseDynamics::Stdp(_) => "stdp",
            SynapseDynamics::Structural(_) => "structural",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_row_words() {
        let dynamics = SynapseDynamics::Static;
        assert_eq!(dynamics.n_words_for_connections(0), 3);
        assert_eq!(dynamics.n_words_for_connections(256), 259);
    }

    #[test]
    fn test_plastic_row_words() {
        let dynamics = SynapseDynamics::Stdp(StdpDynamics::default());
        // header 8 bytes + 2 bytes weight -> 3 words, 2 bytes control -> 1 word
        assert_eq!(dynamics.n_words_for_connections(1), 3 + 3 + 1);
        // 8 + 20 bytes -> 7 words, 20 bytes -> 5 words
        assert_eq!(dynamics.n_words_for_connections(10), 3 + 7 + 5);
        assert_eq!(dynamics.n_words_for_connections(0), 3 + 2);
    }

    #[test]
    fn test_signed_weights() {
        let mut stdp = StdpDynamics::default();
        assert!(!SynapseDynamics::Stdp(stdp.clone()).are_weights_signed());
        stdp.w_min = -0.5;
        assert!(SynapseDynamics::Stdp(stdp).are_weights_signed());
        assert!(!SynapseDynamics::Static.are_weights_signed());
    }

    #[test]
    fn test_structural_not_generated_on_machine() {
        let structural = SynapseDynamics::Structural(StructuralDynamics::default());
        assert!(!structural.supports_generation_on_machine());
        assert!(!structural.is_plastic());
        assert_eq!(structural.dynamics_id(), 2);
        assert!(SynapseDynamics::Static.supports_generation_on_machine());
    }

    #[test]
    fn test_merge() {
        let stdp = SynapseDynamics::Stdp(StdpDynamics::default());
        assert_eq!(SynapseDynamics::Static.merge(&stdp).unwrap(), stdp);
        assert_eq!(stdp.merge(&stdp).unwrap(), stdp);

        let other = SynapseDynamics::Stdp(StdpDynamics {
            w_max: 2.0,
            ..StdpDynamics::default()
        });
        assert!(stdp.merge(&other).is_err());
    }

    #[test]
    fn test_plastic_weight_statistics() {
        let stdp = SynapseDynamics::Stdp(StdpDynamics {
            w_max: 2.0,
            ..StdpDynamics::default()
        });
        assert_eq!(stdp.weight_mean_and_variance(0.5, 0.1, 1.0), (2.0, 0.0));
        assert_eq!(SynapseDynamics::Static.weight_mean_and_variance(0.5, 0.1, 1.0), (0.5, 0.1));
    }

    #[test]
    fn test_validation() {
        let bad = StdpDynamics {
            tau_plus: 0.0,
            ..StdpDynamics::default()
        };
        assert!(SynapseDynamics::Stdp(bad).validate().is_err());

        let bad = StructuralDynamics {
            p_form_forward: 1.5,
            ..StructuralDynamics::default()
        };
        assert!(SynapseDynamics::Structural(bad).validate().is_err());
    }
}
