// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Ring-buffer left shifts.

The simulation core accumulates synaptic input in fixed-point ring buffers.
For each synapse type a left shift `s` is chosen so that the largest input
expected over a run fits: weights are stored as `w * 2^(15 - s)` and the
core shifts the accumulated value left by `s` when it reads it.

The bound on the accumulated value combines the weight statistics of every
incoming projection with a Poisson model of pre-synaptic firing, taking
`sigma` standard deviations of headroom.
*/

use synmatrix_connectivity::{ParameterSpec, SynapseInfo};
use synmatrix_neural::stats::{gamma_q, ln_gamma, normal_cdf, poisson_ppf};
use synmatrix_neural::{weight_scale_for_shift, RunningStats};
use tracing::debug;

/// Standard deviations summed over when modelling Poisson spike counts
const POISSON_SIGMA_SUMMATION_LIMIT: f64 = 5.0;

/// Largest exponent passed to `exp` in the variance identity
const EXP_GUARD: f64 = 701.0;

/// Inputs of the shift computation that come from configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingBufferParams {
    pub timestep_ms: f64,
    /// Assumed rate of sources that declare none
    pub spikes_per_second: f64,
    pub sigma: f64,
    pub max_shift: u8,
    /// Multiplier the neuron model applies to every weight
    pub global_weight_scale: f64,
}

impl RingBufferParams {
    #[inline]
    pub fn steps_per_second(&self) -> f64 {
        1000.0 / self.timestep_ms
    }
}

/// One left shift per synapse type of a post-synaptic vertex
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RingBufferShifts(pub Vec<u8>);

impl RingBufferShifts {
    #[inline]
    pub fn shifts(&self) -> &[u8] {
        &self.0
    }

    pub fn n_synapse_types(&self) -> usize {
        self.0.len()
    }

    /// Fixed-point weight multiplier per synapse type
    pub fn weight_scales(&self, global_weight_scale: f64) -> Vec<f64> {
        self.0
            .iter()
            .map(|shift| weight_scale_for_shift(*shift, global_weight_scale))
            .collect()
    }

    /// Words of the synapse parameters region
    pub fn to_words(&self) -> Vec<u32> {
        self.0.iter().map(|shift| *shift as u32).collect()
    }
}

/// Upper bound on the value accumulated in one ring-buffer slot
///
/// `n_synapses_in` synapses with weights of the given mean and standard
/// deviation each receive Poisson spikes at `spikes_per_second`. The
/// weight-variance term uses the closed form of the Poisson-modulated sum
/// via the regularised upper incomplete gamma function; it is evaluated in
/// log space and skipped when the exponent leaves the representable range.
pub fn expected_upper_bound(
    weight_mean: f64,
    weight_std_dev: f64,
    spikes_per_second: f64,
    timestep_ms: f64,
    n_synapses_in: u64,
    sigma: f64,
) -> f64 {
    let steps_per_second = 1000.0 / timestep_ms;
    let average_spikes_per_timestep = n_synapses_in as f64 * spikes_per_second / steps_per_second;

    let poisson_variance = average_spikes_per_timestep * weight_mean * weight_mean;

    let upper_bound = (average_spikes_per_timestep
        + POISSON_SIGMA_SUMMATION_LIMIT * average_spikes_per_timestep.sqrt())
    .round();

    let mut weight_variance = 0.0;
    if weight_std_dev > 0.0 && average_spikes_per_timestep > 0.0 {
        let lngamma = ln_gamma(1.0 + upper_bound);
        let gammai = gamma_q(1.0 + upper_bound, average_spikes_per_timestep);
        let big_ratio = average_spikes_per_timestep.ln() * upper_bound - lngamma;

        if -EXP_GUARD < big_ratio && big_ratio < EXP_GUARD && big_ratio != 0.0 {
            let inner = average_spikes_per_timestep.exp() * gammai - big_ratio.exp();
            if inner > 0.0 {
                weight_variance = (-average_spikes_per_timestep
                    + average_spikes_per_timestep.ln()
                    + 2.0 * weight_std_dev.ln()
                    + inner.ln())
                .exp();
            }
        }
    }

    average_spikes_per_timestep * weight_mean + sigma * (poisson_variance + weight_variance).sqrt()
}

/// Smallest shift whose range `[0, 2^shift)` holds `max_weight`
pub fn shift_for_maximum(max_weight: f64) -> u8 {
    if max_weight <= 0.0 || !max_weight.is_finite() {
        return 0;
    }
    let mut shift = max_weight.log2().max(0.0).ceil() as i32;
    if 2f64.powi(shift) <= max_weight {
        shift += 1;
    }
    shift.clamp(0, u8::MAX as i32) as u8
}

/// Statistics of one synapse type across every incoming projection
#[derive(Debug, Clone, Copy, Default)]
struct SynapseTypeTotals {
    weights: RunningStats,
    delays: RunningStats,
    rates: RunningStats,
    biggest_weight: f64,
    total_weight: f64,
}

/// Highest value a rate specification is expected to take over `n` neurons
fn maximum_rate(spec: &ParameterSpec, n: u64, default: f64) -> f64 {
    match spec {
        ParameterSpec::Scalar(v) => *v,
        ParameterSpec::Random(distribution) => distribution.maximum_probable(n),
        ParameterSpec::Array(values) => values.iter().copied().fold(0.0, f64::max),
        ParameterSpec::Expression(_) => default,
    }
}

/// Variance of the delays a projection generates
fn delay_variance(spec: &ParameterSpec) -> f64 {
    match spec {
        ParameterSpec::Random(distribution) => distribution.variance(),
        ParameterSpec::Array(values) => {
            let mut stats = RunningStats::new();
            for v in values {
                stats.add_item(*v);
            }
            stats.variance()
        }
        ParameterSpec::Scalar(_) | ParameterSpec::Expression(_) => 0.0,
    }
}

/// Computes ring-buffer shifts for one post-synaptic application vertex
#[derive(Debug, Clone, Copy)]
pub struct RingBufferScaler {
    params: RingBufferParams,
}

impl RingBufferScaler {
    pub fn new(params: RingBufferParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RingBufferParams {
        &self.params
    }

    /// Spikes one source neuron can send in one tick, and its rate in Hz
    fn source_activity(&self, info: &SynapseInfo) -> (f64, f64) {
        let steps = self.params.steps_per_second();
        match &info.pre().max_rate {
            Some(rate_spec) => {
                let n_atoms = info.pre().n_atoms.max(1);
                let rate = maximum_rate(rate_spec, n_atoms as u64, self.params.spikes_per_second);
                let tail = (1.0 - normal_cdf(self.params.sigma)) / n_atoms as f64;
                let spikes = poisson_ppf(1.0 - tail, rate / steps) as f64;
                (spikes.max(1.0), rate)
            }
            None => {
                let rate = self.params.spikes_per_second;
                ((rate / steps).max(1.0), rate)
            }
        }
    }

    /// Shifts for `n_synapse_types` given every projection into the vertex
    ///
    /// Each projection must appear once, however many machine edges carry it.
    pub fn compute<'a>(
        &self,
        n_synapse_types: u8,
        synapse_infos: impl IntoIterator<Item = &'a SynapseInfo>,
    ) -> RingBufferShifts {
        let scale = self.params.global_weight_scale;
        let mut totals = vec![SynapseTypeTotals::default(); n_synapse_types as usize];
        let mut weights_signed = false;

        for info in synapse_infos {
            let Some(type_totals) = totals.get_mut(info.synapse_type() as usize) else {
                continue;
            };
            let connector = info.connector();
            let dynamics = info.synapse_dynamics();
            let stats = connector.estimate_weight_bounds(info);
            let (mean, variance) = dynamics.weight_mean_and_variance(stats.mean, stats.variance, stats.max);
            let weight_max = dynamics.weight_maximum(stats.max) * scale;
            let n_connections = connector.max_connections_to_post_vertex(info) as u64;
            let (spikes_per_tick, rate) = self.source_activity(info);

            type_totals
                .weights
                .add_items(mean * scale, variance * scale * scale, n_connections);
            type_totals
                .delays
                .add_items(0.0, delay_variance(info.delays()), n_connections);
            type_totals.rates.add_items(rate, 0.0, n_connections);
            type_totals.biggest_weight = type_totals.biggest_weight.max(weight_max);
            type_totals.total_weight += spikes_per_tick * weight_max * n_connections as f64;

            weights_signed |= dynamics.are_weights_signed();
        }

        let shifts = totals
            .iter()
            .enumerate()
            .map(|(synapse_type, t)| {
                let max_weight = if t.delays.variance() == 0.0 || t.weights.n_items() == 0 {
                    t.total_weight.max(t.biggest_weight)
                } else {
                    expected_upper_bound(
                        t.weights.mean(),
                        t.weights.standard_deviation(),
                        t.rates.mean(),
                        self.params.timestep_ms,
                        t.weights.n_items(),
                        self.params.sigma,
                    )
                    .min(t.total_weight)
                    .max(t.biggest_weight)
                };
                let mut shift = shift_for_maximum(max_weight).min(self.params.max_shift);
                if weights_signed {
                    shift += 1;
                }
                debug!(
                    target: "synmatrix-matrix",
                    "synapse type {}: max accumulated input {:.4}, shift {}",
                    synapse_type, max_weight, shift
                );
                shift
            })
            .collect();

        RingBufferShifts(shifts)
    }
}
