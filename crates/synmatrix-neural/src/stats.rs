// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Running statistics and special functions
//!
//! Used to bound the input a ring buffer may accumulate and to turn random
//! distributions into probable maxima. Accuracy targets are those of the
//! fixed-point formats they feed (1e-7 relative or better).

use std::f64::consts::PI;

const MAX_ITERATIONS: usize = 10_000;
const EPSILON: f64 = 1e-15;
const FP_MIN: f64 = 1e-300;

/// Mean and variance accumulated over batches of items
///
/// Batches are merged with the parallel form of Welford's update, so adding
/// `n` items of known mean and variance costs the same as adding one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: f64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, value: f64) {
        self.add_items(value, 0.0, 1);
    }

    /// Merge `n_items` values with the given mean and population variance
    pub fn add_items(&mut self, mean: f64, variance: f64, n_items: u64) {
        if n_items == 0 {
            return;
        }
        let n = n_items as f64;
        let total = self.count + n;
        let delta = mean - self.mean;
        self.mean += delta * n / total;
        self.m2 += variance * n + delta * delta * self.count * n / total;
        self.count = total;
    }

    #[inline]
    pub fn n_items(&self) -> u64 {
        self.count as u64
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance, zero when empty
    pub fn variance(&self) -> f64 {
        if self.count > 0.0 {
            (self.m2 / self.count).max(0.0)
        } else {
            0.0
        }
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Natural log of the gamma function (Lanczos, g = 7)
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection
        return (PI / (PI * x).sin().abs()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let mut a = COEFFICIENTS[0];
    for (i, c) in COEFFICIENTS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularised upper incomplete gamma function Q(a, x) = Γ(a, x) / Γ(a)
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_continued_fraction(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut term = sum;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_q_continued_fraction(a: f64, x: f64) -> f64 {
    // Modified Lentz
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FP_MIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FP_MIN {
            d = FP_MIN;
        }
        c = b + an / c;
        if c.abs() < FP_MIN {
            c = FP_MIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Complementary error function (Chebyshev fit, |error| < 1.2e-7)
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// Standard normal cumulative distribution
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal quantile (Acklam's rational approximation)
pub fn normal_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Smallest `k` with `P(X <= k) >= q` for `X ~ Poisson(mu)`
pub fn poisson_ppf(q: f64, mu: f64) -> u64 {
    if mu <= 0.0 || q <= 0.0 {
        return 0;
    }
    let limit = (mu + 50.0 * mu.sqrt() + 50.0).ceil() as u64;
    let ln_mu = mu.ln();
    let mut cdf = 0.0;
    for k in 0..=limit {
        let kf = k as f64;
        cdf += (-mu + kf * ln_mu - ln_gamma(kf + 1.0)).exp();
        if cdf >= q {
            return k;
        }
    }
    limit
}

/// Smallest `k` with `P(X <= k) >= q` for `X ~ Binomial(n, p)`
pub fn binomial_ppf(q: f64, n: u64, p: f64) -> u64 {
    if n == 0 || p <= 0.0 || q <= 0.0 {
        return 0;
    }
    if p >= 1.0 || q >= 1.0 {
        return n;
    }
    let nf = n as f64;
    let ln_p = p.ln();
    let ln_not_p = (-p).ln_1p();
    let ln_n_factorial = ln_gamma(nf + 1.0);
    let mut cdf = 0.0;
    for k in 0..=n {
        let kf = k as f64;
        let ln_choose = ln_n_factorial - ln_gamma(kf + 1.0) - ln_gamma(nf - kf + 1.0);
        cdf += (ln_choose + kf * ln_p + (nf - kf) * ln_not_p).exp();
        if cdf >= q {
            return k;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn test_running_stats_items() {
        let mut stats = RunningStats::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            stats.add_item(v);
        }
        assert!(close(stats.mean(), 2.5, 1e-12));
        assert!(close(stats.variance(), 1.25, 1e-12));
        assert_eq!(stats.n_items(), 4);
    }

    #[test]
    fn test_running_stats_batches() {
        let mut stats = RunningStats::new();
        stats.add_items(2.0, 0.0, 3);
        stats.add_items(4.0, 0.0, 1);
        assert!(close(stats.mean(), 2.5, 1e-12));
        assert!(close(stats.variance(), 0.75, 1e-12));

        stats.add_items(100.0, 5.0, 0);
        assert_eq!(stats.n_items(), 4);
    }

    #[test]
    fn test_empty_stats() {
        let stats = RunningStats::new();
        assert_eq!(stats.variance(), 0.0);
        assert_eq!(stats.mean(), 0.0);
    }

    #[test]
    fn test_ln_gamma() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-12));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-12));
        assert!(close(ln_gamma(101.0), 363.739_375_555_563_5, 1e-8));
    }

    #[test]
    fn test_gamma_q() {
        for x in [0.1, 1.0, 2.5, 10.0] {
            assert!(close(gamma_q(1.0, x), (-x).exp(), 1e-12));
        }
        // Q(2, x) = (1 + x) e^-x
        assert!(close(gamma_q(2.0, 3.0), 4.0 * (-3.0f64).exp(), 1e-12));
        assert_eq!(gamma_q(3.0, 0.0), 1.0);
    }

    #[test]
    fn test_normal() {
        assert!(close(erf(0.0), 0.0, 1e-7));
        assert!(close(normal_cdf(1.959_964), 0.975, 1e-6));
        assert!(close(normal_ppf(0.975), 1.959_964, 1e-6));
        assert!(close(normal_ppf(0.5), 0.0, 1e-9));
        assert!(close(normal_ppf(1e-4), -3.719_016, 1e-5));
        assert_eq!(normal_ppf(1.0), f64::INFINITY);
    }

    #[test]
    fn test_poisson_ppf() {
        assert_eq!(poisson_ppf(0.5, 1.0), 1);
        assert_eq!(poisson_ppf(0.3, 1.0), 0);
        assert_eq!(poisson_ppf(0.99, 0.0), 0);
        assert!(poisson_ppf(1.0 - 1e-9, 0.01) >= 2);
    }

    #[test]
    fn test_binomial_ppf() {
        assert_eq!(binomial_ppf(0.5, 10, 0.5), 5);
        assert_eq!(binomial_ppf(0.999, 100, 0.0), 0);
        assert_eq!(binomial_ppf(0.5, 100, 1.0), 100);
        let bound = binomial_ppf(1.0 - 1e-5, 100, 0.1);
        assert!(bound > 10 && bound < 40);
    }
}
