// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Weight and delay specifications.

A specification is a scalar, a bounded or unbounded random distribution, an
explicit per-connection array, or a distance expression. Bounds are derived
from the specification alone so they can be computed before generation.
*/

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use synmatrix_neural::stats::{normal_cdf, normal_ppf};

use crate::expression::{DistanceExpression, DistanceVariables};
use crate::types::{ConnectivityError, ConnectivityResult};

/// Chance of exceeding a "probable" maximum over a whole projection
pub const BOUND_CHANCE: f64 = 1e-5;

const MAX_REJECTION_DRAWS: usize = 1_000;

/// Random distributions a weight or delay may be drawn from
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum RandomDistribution {
    Uniform { low: f64, high: f64 },
    Normal { mu: f64, sigma: f64 },
    NormalClipped { mu: f64, sigma: f64, low: f64, high: f64 },
    Exponential { beta: f64 },
}

fn standard_normal_pdf(x: f64) -> f64 {
    if x.is_infinite() {
        0.0
    } else {
        (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
    }
}

impl RandomDistribution {
    pub fn validate(&self) -> ConnectivityResult<()> {
        let ok = match *self {
            RandomDistribution::Uniform { low, high } => low <= high,
            RandomDistribution::Normal { sigma, .. } => sigma >= 0.0,
            RandomDistribution::NormalClipped { sigma, low, high, .. } => sigma > 0.0 && low < high,
            RandomDistribution::Exponential { beta } => beta > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(ConnectivityError::InvalidParameter(format!(
                "invalid distribution parameters: {:?}",
                self
            )))
        }
    }

    /// Support of the distribution
    pub fn boundaries(&self) -> (f64, f64) {
        match *self {
            RandomDistribution::Uniform { low, high } => (low, high),
            RandomDistribution::Normal { .. } => (f64::NEG_INFINITY, f64::INFINITY),
            RandomDistribution::NormalClipped { low, high, .. } => (low, high),
            RandomDistribution::Exponential { .. } => (0.0, f64::INFINITY),
        }
    }

    fn truncation(mu: f64, sigma: f64, low: f64, high: f64) -> (f64, f64, f64) {
        let alpha = (low - mu) / sigma;
        let beta = (high - mu) / sigma;
        let z = (normal_cdf(beta) - normal_cdf(alpha)).max(f64::MIN_POSITIVE);
        (alpha, beta, z)
    }

    pub fn mean(&self) -> f64 {
        match *self {
            RandomDistribution::Uniform { low, high } => 0.5 * (low + high),
            RandomDistribution::Normal { mu, .. } => mu,
            RandomDistribution::NormalClipped { mu, sigma, low, high } => {
                let (alpha, beta, z) = Self::truncation(mu, sigma, low, high);
                mu + sigma * (standard_normal_pdf(alpha) - standard_normal_pdf(beta)) / z
            }
            RandomDistribution::Exponential { beta } => beta,
        }
    }

    pub fn variance(&self) -> f64 {
        match *self {
            RandomDistribution::Uniform { low, high } => (high - low).powi(2) / 12.0,
            RandomDistribution::Normal { sigma, .. } => sigma * sigma,
            RandomDistribution::NormalClipped { mu, sigma, low, high } => {
                let (alpha, beta, z) = Self::truncation(mu, sigma, low, high);
                let pa = standard_normal_pdf(alpha);
                let pb = standard_normal_pdf(beta);
                let a_term = if alpha.is_finite() { alpha * pa } else { 0.0 };
                let b_term = if beta.is_finite() { beta * pb } else { 0.0 };
                let shift = (pa - pb) / z;
                (sigma * sigma * (1.0 + (a_term - b_term) / z - shift * shift)).max(0.0)
            }
            RandomDistribution::Exponential { beta } => beta * beta,
        }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        match *self {
            RandomDistribution::Uniform { low, high } => {
                if x < low {
                    0.0
                } else if x >= high {
                    1.0
                } else {
                    (x - low) / (high - low)
                }
            }
            RandomDistribution::Normal { mu, sigma } => {
                if sigma == 0.0 {
                    if x >= mu {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    normal_cdf((x - mu) / sigma)
                }
            }
            RandomDistribution::NormalClipped { mu, sigma, low, high } => {
                if x < low {
                    0.0
                } else if x >= high {
                    1.0
                } else {
                    let (alpha, _, z) = Self::truncation(mu, sigma, low, high);
                    (normal_cdf((x - mu) / sigma) - normal_cdf(alpha)) / z
                }
            }
            RandomDistribution::Exponential { beta } => {
                if x <= 0.0 {
                    0.0
                } else {
                    1.0 - (-x / beta).exp()
                }
            }
        }
    }

    /// Quantile function
    pub fn ppf(&self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        match *self {
            RandomDistribution::Uniform { low, high } => low + p * (high - low),
            RandomDistribution::Normal { mu, sigma } => mu + sigma * normal_ppf(p),
            RandomDistribution::NormalClipped { mu, sigma, low, high } => {
                let (alpha, _, z) = Self::truncation(mu, sigma, low, high);
                let x = mu + sigma * normal_ppf(normal_cdf(alpha) + p * z);
                x.clamp(low, high)
            }
            RandomDistribution::Exponential { beta } => -beta * (1.0 - p).ln(),
        }
    }

    /// Value exceeded with probability at most `BOUND_CHANCE` over `n_items` draws
    pub fn maximum_probable(&self, n_items: u64) -> f64 {
        let (_, high) = self.boundaries();
        if high.is_finite() {
            return high;
        }
        let n = n_items.max(1) as f64;
        self.ppf(1.0 - BOUND_CHANCE / n)
    }

    /// Value undercut with probability at most `BOUND_CHANCE` over `n_items` draws
    pub fn minimum_probable(&self, n_items: u64) -> f64 {
        let (low, _) = self.boundaries();
        if low.is_finite() {
            return low;
        }
        let n = n_items.max(1) as f64;
        self.ppf(BOUND_CHANCE / n)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            RandomDistribution::Uniform { low, high } => {
                if high > low {
                    Uniform::new(low, high).sample(rng)
                } else {
                    low
                }
            }
            RandomDistribution::Normal { mu, sigma } => mu + sigma * sample_standard_normal(rng),
            RandomDistribution::NormalClipped { mu, sigma, low, high } => {
                for _ in 0..MAX_REJECTION_DRAWS {
                    let x = mu + sigma * sample_standard_normal(rng);
                    if (low..=high).contains(&x) {
                        return x;
                    }
                }
                mu.clamp(low, high)
            }
            RandomDistribution::Exponential { beta } => {
                let u: f64 = rng.gen();
                -beta * (1.0 - u).ln()
            }
        }
    }

    /// Identifier and parameters of the machine-side sampler
    fn descriptor(&self) -> ParamDescriptor {
        match *self {
            RandomDistribution::Uniform { low, high } => ParamDescriptor {
                kind: ParamDescriptor::UNIFORM,
                params: vec![low, high],
            },
            RandomDistribution::Normal { mu, sigma } => ParamDescriptor {
                kind: ParamDescriptor::NORMAL,
                params: vec![mu, sigma],
            },
            RandomDistribution::NormalClipped { mu, sigma, low, high } => ParamDescriptor {
                kind: ParamDescriptor::NORMAL_CLIPPED,
                params: vec![mu, sigma, low, high],
            },
            RandomDistribution::Exponential { beta } => ParamDescriptor {
                kind: ParamDescriptor::EXPONENTIAL,
                params: vec![beta],
            },
        }
    }
}

/// Box-Muller transform
fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// How a weight or delay is specified for a projection
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSpec {
    Scalar(f64),
    Random(RandomDistribution),
    Array(Vec<f64>),
    Expression(DistanceExpression),
}

impl From<f64> for ParameterSpec {
    fn from(value: f64) -> Self {
        ParameterSpec::Scalar(value)
    }
}

impl From<RandomDistribution> for ParameterSpec {
    fn from(distribution: RandomDistribution) -> Self {
        ParameterSpec::Random(distribution)
    }
}

impl ParameterSpec {
    pub fn validate(&self) -> ConnectivityResult<()> {
        match self {
            ParameterSpec::Scalar(v) if !v.is_finite() => Err(ConnectivityError::InvalidParameter(
                format!("scalar value {} is not finite", v),
            )),
            ParameterSpec::Random(distribution) => distribution.validate(),
            ParameterSpec::Array(values) if values.iter().any(|v| !v.is_finite()) => Err(
                ConnectivityError::InvalidParameter("array contains non-finite values".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Explicitly negative scalar or array values
    pub fn has_negative_values(&self) -> bool {
        match self {
            ParameterSpec::Scalar(v) => *v < 0.0,
            ParameterSpec::Array(values) => values.iter().any(|v| *v < 0.0),
            _ => false,
        }
    }

    /// Draw the value for one connection
    ///
    /// `index` selects the element of an array specification; `vars` feed
    /// expression specifications.
    pub fn value<R: Rng + ?Sized>(&self, rng: &mut R, index: usize, vars: &DistanceVariables) -> ConnectivityResult<f64> {
        match self {
            ParameterSpec::Scalar(v) => Ok(*v),
            ParameterSpec::Random(distribution) => Ok(distribution.sample(rng)),
            ParameterSpec::Array(values) => values.get(index).copied().ok_or_else(|| {
                ConnectivityError::InvalidParameter(format!(
                    "array of {} values has no element {}",
                    values.len(),
                    index
                ))
            }),
            ParameterSpec::Expression(expression) => Ok(expression.evaluate(vars)),
        }
    }

    /// Descriptor for a machine-side generator, when one can produce the values
    pub fn descriptor(&self) -> Option<ParamDescriptor> {
        match self {
            ParameterSpec::Scalar(v) => Some(ParamDescriptor {
                kind: ParamDescriptor::CONSTANT,
                params: vec![*v],
            }),
            ParameterSpec::Random(distribution) => Some(distribution.descriptor()),
            ParameterSpec::Array(_) | ParameterSpec::Expression(_) => None,
        }
    }
}

/// Compact encoding of a scalar or random specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamDescriptor {
    pub kind: u32,
    pub params: Vec<f64>,
}

impl ParamDescriptor {
    pub const CONSTANT: u32 = 0;
    pub const UNIFORM: u32 = 1;
    pub const NORMAL: u32 = 2;
    pub const NORMAL_CLIPPED: u32 = 3;
    pub const EXPONENTIAL: u32 = 4;

    /// Rebuild the specification the descriptor was made from
    pub fn to_spec(&self) -> ConnectivityResult<ParameterSpec> {
        let p = |i: usize| {
            self.params.get(i).copied().ok_or_else(|| {
                ConnectivityError::InvalidParameter(format!(
                    "descriptor kind {} is missing parameter {}",
                    self.kind, i
                ))
            })
        };
        Ok(match self.kind {
            Self::CONSTANT => ParameterSpec::Scalar(p(0)?),
            Self::UNIFORM => ParameterSpec::Random(RandomDistribution::Uniform { low: p(0)?, high: p(1)? }),
            Self::NORMAL => ParameterSpec::Random(RandomDistribution::Normal { mu: p(0)?, sigma: p(1)? }),
            Self::NORMAL_CLIPPED => ParameterSpec::Random(RandomDistribution::NormalClipped {
                mu: p(0)?,
                sigma: p(1)?,
                low: p(2)?,
                high: p(3)?,
            }),
            Self::EXPONENTIAL => ParameterSpec::Random(RandomDistribution::Exponential { beta: p(0)? }),
            other => {
                return Err(ConnectivityError::Unsupported(format!(
                    "unknown parameter descriptor kind {}",
                    other
                )))
            }
        })
    }
}
