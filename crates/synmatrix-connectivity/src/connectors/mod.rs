// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Connectors: the contract shared by every connectivity pattern.

A connector answers two kinds of question about a projection:
- **bounds**, asked while planning memory (`estimate_*`, `max_connections_*`)
- **generation**, asked while writing rows (`generate`)

Generation never exceeds the declared bounds and is deterministic for a
given seed and slice pair. The only state a connector mutates is its count
of clipped delays.
*/

pub mod all_to_all;
pub mod distance_dependent;
pub mod fixed_probability;
pub mod from_list;
pub mod kernel;
pub mod one_to_one;

pub use all_to_all::AllToAllConnector;
pub use distance_dependent::DistanceDependentProbabilityConnector;
pub use fixed_probability::FixedProbabilityConnector;
pub use from_list::{FromListConnector, ListEntry};
pub use kernel::KernelConnector;
pub use one_to_one::OneToOneConnector;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use synmatrix_neural::stats::{binomial_ppf, RunningStats};
use synmatrix_neural::{ConnectionTuple, VertexSlice};

use crate::params::{ParameterSpec, BOUND_CHANCE};
use crate::rng::{slice_pair_rng, DEFAULT_SEED};
use crate::synapse_info::SynapseInfo;
use crate::types::{ConnectivityError, ConnectivityResult};

/// Weight statistics over a projection, in absolute value
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct WeightStats {
    pub mean: f64,
    pub variance: f64,
    pub max: f64,
}

/// Connectivity pattern identifiers, also written into generator descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConnectorKind {
    AllToAll,
    OneToOne,
    FixedProbability,
    FromList,
    DistanceDependentProbability,
    Kernel,
}

impl ConnectorKind {
    pub fn id(self) -> u32 {
        match self {
            ConnectorKind::AllToAll => 0,
            ConnectorKind::OneToOne => 1,
            ConnectorKind::FixedProbability => 2,
            ConnectorKind::FromList => 3,
            ConnectorKind::DistanceDependentProbability => 4,
            ConnectorKind::Kernel => 5,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0 => ConnectorKind::AllToAll,
            1 => ConnectorKind::OneToOne,
            2 => ConnectorKind::FixedProbability,
            3 => ConnectorKind::FromList,
            4 => ConnectorKind::DistanceDependentProbability,
            5 => ConnectorKind::Kernel,
            _ => return None,
        })
    }
}

/// Delay limits applied while generating, in ms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationContext {
    pub timestep_ms: f64,
    /// Minimum transmission delay, one timestep
    pub min_delay_ms: f64,
    /// Largest delay the plan has room for
    pub max_delay_ms: f64,
}

impl GenerationContext {
    pub fn new(timestep_ms: f64, max_delay_ms: f64) -> Self {
        Self {
            timestep_ms,
            min_delay_ms: timestep_ms,
            max_delay_ms: max_delay_ms.max(timestep_ms),
        }
    }
}

/// Parameters a machine-side expander needs to rebuild a connector
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConnectorDescriptor {
    pub kind: ConnectorKind,
    pub seed: u64,
    pub allow_self_connections: bool,
    pub params: Vec<f64>,
}

impl ConnectorDescriptor {
    /// Rebuild the connector described
    pub fn instantiate(&self) -> ConnectivityResult<Arc<dyn Connector>> {
        let connector: Arc<dyn Connector> = match self.kind {
            ConnectorKind::AllToAll => {
                Arc::new(AllToAllConnector::new(self.allow_self_connections).with_seed(self.seed))
            }
            ConnectorKind::OneToOne => Arc::new(OneToOneConnector::new().with_seed(self.seed)),
            ConnectorKind::FixedProbability => {
                let p = self.params.first().copied().ok_or_else(|| {
                    ConnectivityError::InvalidParameter(
                        "fixed-probability descriptor without a probability".to_string(),
                    )
                })?;
                Arc::new(FixedProbabilityConnector::new(p, self.allow_self_connections)?.with_seed(self.seed))
            }
            other => {
                return Err(ConnectivityError::Unsupported(format!(
                    "{:?} connectors cannot be generated on machine",
                    other
                )))
            }
        };
        Ok(connector)
    }
}

/// Contract shared by every connectivity pattern
pub trait Connector: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ConnectorKind;

    /// Check the connector against the projection it is used in
    fn validate(&self, _info: &SynapseInfo) -> ConnectivityResult<()> {
        Ok(())
    }

    /// Length an array weight or delay specification must have
    fn n_array_values(&self, info: &SynapseInfo) -> usize {
        info.n_potential_connections() as usize
    }

    /// `(min, max)` delay in ms any generated connection may have
    fn estimate_delay_bounds(&self, info: &SynapseInfo) -> (f64, f64) {
        spec_bounds(info.delays(), info)
    }

    fn estimate_weight_bounds(&self, info: &SynapseInfo) -> WeightStats {
        spec_weight_stats(info.weights(), info)
    }

    /// Most connections one pre neuron makes into `post_slice` with a delay
    /// inside `[min_delay, max_delay]` ms (unbounded where `None`)
    fn max_connections_from_pre_vertex(
        &self,
        info: &SynapseInfo,
        post_slice: &VertexSlice,
        min_delay: Option<f64>,
        max_delay: Option<f64>,
    ) -> usize;

    /// Most connections one post neuron receives
    fn max_connections_to_post_vertex(&self, info: &SynapseInfo) -> usize;

    /// Connections between the two slices, in population coordinates
    fn generate(
        &self,
        info: &SynapseInfo,
        pre_slice: &VertexSlice,
        post_slice: &VertexSlice,
        ctx: &GenerationContext,
    ) -> ConnectivityResult<Vec<ConnectionTuple>>;

    /// Descriptor for on-machine generation, if this connector supports it
    fn generator_descriptor(&self, _info: &SynapseInfo) -> Option<ConnectorDescriptor> {
        None
    }

    /// Delays moved into the supported range so far
    fn delays_clipped(&self) -> u64;
}

/// State shared by all connector implementations
#[derive(Debug)]
pub(crate) struct ConnectorCore {
    pub seed: u64,
    pub allow_self_connections: bool,
    delays_clipped: AtomicU64,
}

impl ConnectorCore {
    pub fn new(allow_self_connections: bool) -> Self {
        Self {
            seed: DEFAULT_SEED,
            allow_self_connections,
            delays_clipped: AtomicU64::new(0),
        }
    }

    pub fn rng(&self, pre_slice: &VertexSlice, post_slice: &VertexSlice) -> StdRng {
        slice_pair_rng(self.seed, pre_slice, post_slice)
    }

    /// Diagonal of a self projection that must not be connected
    #[inline]
    pub fn excludes(&self, info: &SynapseInfo, source: u32, target: u32) -> bool {
        !self.allow_self_connections && source == target && info.is_self_projection()
    }

    /// Draw weight and delay for one connection
    ///
    /// `index` selects the element of array specifications.
    pub fn connection(
        &self,
        info: &SynapseInfo,
        rng: &mut StdRng,
        source: u32,
        target: u32,
        index: usize,
        ctx: &GenerationContext,
    ) -> ConnectivityResult<ConnectionTuple> {
        let vars = info.distance_variables(source, target);
        let weight = info.weights().value(rng, index, &vars)?;
        let delay = info.delays().value(rng, index, &vars)?;
        Ok(ConnectionTuple::new(
            source,
            target as u16,
            weight,
            self.clip_delay(delay, ctx),
            info.synapse_type(),
        ))
    }

    /// Move a delay into `[min_delay, max_delay]`, counting every move
    pub fn clip_delay(&self, delay: f64, ctx: &GenerationContext) -> f64 {
        if delay < ctx.min_delay_ms {
            self.delays_clipped.fetch_add(1, Ordering::Relaxed);
            ctx.min_delay_ms
        } else if delay > ctx.max_delay_ms {
            self.delays_clipped.fetch_add(1, Ordering::Relaxed);
            ctx.max_delay_ms
        } else {
            delay
        }
    }

    pub fn delays_clipped(&self) -> u64 {
        self.delays_clipped.load(Ordering::Relaxed)
    }
}

/// Values a specification takes over every (pre, post) pair of a projection
fn expression_values(spec: &ParameterSpec, info: &SynapseInfo) -> Vec<f64> {
    let mut values = Vec::new();
    if let ParameterSpec::Expression(expression) = spec {
        for source in 0..info.pre().n_atoms {
            for target in 0..info.post().n_atoms {
                values.push(expression.evaluate(&info.distance_variables(source, target)));
            }
        }
    }
    values
}

/// `(min, max)` a specification can produce over a projection
pub(crate) fn spec_bounds(spec: &ParameterSpec, info: &SynapseInfo) -> (f64, f64) {
    let n = info.n_potential_connections();
    match spec {
        ParameterSpec::Scalar(v) => (*v, *v),
        ParameterSpec::Random(distribution) => {
            (distribution.minimum_probable(n), distribution.maximum_probable(n))
        }
        ParameterSpec::Array(values) => min_max(values.iter().copied()),
        ParameterSpec::Expression(_) => min_max(expression_values(spec, info).into_iter()),
    }
}

pub(crate) fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo > hi {
        (0.0, 0.0)
    } else {
        (lo, hi)
    }
}

/// Absolute-value statistics of explicit values
pub(crate) fn value_stats(values: impl Iterator<Item = f64>) -> (RunningStats, f64) {
    let mut stats = RunningStats::new();
    let mut max: f64 = 0.0;
    for v in values {
        stats.add_item(v.abs());
        max = max.max(v.abs());
    }
    (stats, max)
}

pub(crate) fn spec_weight_stats(spec: &ParameterSpec, info: &SynapseInfo) -> WeightStats {
    let n = info.n_potential_connections();
    match spec {
        ParameterSpec::Scalar(v) => WeightStats {
            mean: v.abs(),
            variance: 0.0,
            max: v.abs(),
        },
        ParameterSpec::Random(distribution) => WeightStats {
            mean: distribution.mean().abs(),
            variance: distribution.variance(),
            max: distribution
                .maximum_probable(n)
                .abs()
                .max(distribution.minimum_probable(n).abs()),
        },
        ParameterSpec::Array(values) => {
            let (stats, max) = value_stats(values.iter().copied());
            WeightStats {
                mean: stats.mean(),
                variance: stats.variance(),
                max,
            }
        }
        ParameterSpec::Expression(_) => {
            let (stats, max) = value_stats(expression_values(spec, info).into_iter());
            WeightStats {
                mean: stats.mean(),
                variance: stats.variance(),
                max,
            }
        }
    }
}

/// Probability that a generated delay falls inside `[min_delay, max_delay]`
pub(crate) fn delay_fraction(info: &SynapseInfo, min_delay: Option<f64>, max_delay: Option<f64>) -> f64 {
    let lo = min_delay.unwrap_or(f64::NEG_INFINITY);
    let hi = max_delay.unwrap_or(f64::INFINITY);
    let in_range = |v: f64| v >= lo && v <= hi;
    if min_delay.is_none() && max_delay.is_none() {
        return 1.0;
    }
    let fraction_of = |values: &[f64]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().filter(|v| in_range(**v)).count() as f64 / values.len() as f64
        }
    };
    match info.delays() {
        ParameterSpec::Scalar(v) => {
            if in_range(*v) {
                1.0
            } else {
                0.0
            }
        }
        ParameterSpec::Random(distribution) => {
            let below = if lo.is_finite() { distribution.cdf(lo) } else { 0.0 };
            let above = if hi.is_finite() { distribution.cdf(hi) } else { 1.0 };
            (above - below).clamp(0.0, 1.0)
        }
        ParameterSpec::Array(values) => fraction_of(values),
        spec @ ParameterSpec::Expression(_) => fraction_of(&expression_values(spec, info)),
    }
}

/// Number of selections out of `n_selected` trials, each with probability
/// `probability`, not exceeded anywhere across `n_total` trials except with
/// probability `BOUND_CHANCE`
pub(crate) fn probable_maximum_selected(n_total: u64, n_selected: u64, probability: f64) -> usize {
    if probability >= 1.0 {
        return n_selected as usize;
    }
    let q = 1.0 - BOUND_CHANCE / n_total.max(1) as f64;
    binomial_ppf(q, n_selected, probability) as usize
}

/// Bound on `n` candidate connections once restricted to a delay range
pub(crate) fn delay_limited(
    info: &SynapseInfo,
    n: usize,
    min_delay: Option<f64>,
    max_delay: Option<f64>,
) -> usize {
    let fraction = delay_fraction(info, min_delay, max_delay);
    if fraction >= 1.0 {
        n
    } else if fraction <= 0.0 {
        0
    } else if matches!(info.delays(), ParameterSpec::Random(_)) {
        probable_maximum_selected(info.n_potential_connections(), n as u64, fraction)
    } else {
        // Explicit values can all land in one range for a given neuron
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RandomDistribution;
    use crate::synapse_info::PopulationDescriptor;

    fn info_with_delays(delays: ParameterSpec) -> SynapseInfo {
        let pre = Arc::new(PopulationDescriptor::new("pre", 10));
        let post = Arc::new(PopulationDescriptor::new("post", 10));
        SynapseInfo::new("pre->post", pre, post, Arc::new(AllToAllConnector::new(true))).with_delays(delays)
    }

    #[test]
    fn test_clip_delay_counts() {
        let core = ConnectorCore::new(true);
        let ctx = GenerationContext::new(1.0, 16.0);
        assert_eq!(core.clip_delay(0.2, &ctx), 1.0);
        assert_eq!(core.clip_delay(20.0, &ctx), 16.0);
        assert_eq!(core.clip_delay(5.0, &ctx), 5.0);
        assert_eq!(core.delays_clipped(), 2);
    }

    #[test]
    fn test_delay_fraction() {
        let info = info_with_delays(ParameterSpec::Scalar(3.0));
        assert_eq!(delay_fraction(&info, None, Some(16.5)), 1.0);
        assert_eq!(delay_fraction(&info, Some(16.5), None), 0.0);

        let info = info_with_delays(ParameterSpec::Random(RandomDistribution::Uniform { low: 0.0, high: 20.0 }));
        assert!((delay_fraction(&info, None, Some(10.0)) - 0.5).abs() < 1e-12);
        assert_eq!(delay_limited(&info, 10, Some(30.0), None), 0);
    }

    #[test]
    fn test_spec_bounds() {
        let info = info_with_delays(ParameterSpec::Array(vec![2.0, 7.0, 3.0]));
        assert_eq!(spec_bounds(info.delays(), &info), (2.0, 7.0));
        assert_eq!(min_max(std::iter::empty()), (0.0, 0.0));
    }

    #[test]
    fn test_kind_ids_roundtrip() {
        for kind in [
            ConnectorKind::AllToAll,
            ConnectorKind::OneToOne,
            ConnectorKind::FixedProbability,
            ConnectorKind::FromList,
            ConnectorKind::DistanceDependentProbability,
            ConnectorKind::Kernel,
        ] {
            assert_eq!(ConnectorKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(ConnectorKind::from_id(99), None);
    }

    #[test]
    fn test_descriptor_instantiation() {
        let descriptor = ConnectorDescriptor {
            kind: ConnectorKind::FixedProbability,
            seed: 11,
            allow_self_connections: false,
            params: vec![0.25],
        };
        let connector = descriptor.instantiate().unwrap();
        assert_eq!(connector.kind(), ConnectorKind::FixedProbability);

        let list = ConnectorDescriptor {
            kind: ConnectorKind::FromList,
            seed: 0,
            allow_self_connections: true,
            params: vec![],
        };
        assert!(matches!(list.instantiate(), Err(ConnectivityError::Unsupported(_))));
    }
}
