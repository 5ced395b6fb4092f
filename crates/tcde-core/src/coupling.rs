// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Contextual Coupling
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! C(p) = ∫ K_σ(p,q)·Φ(q) dq with K_σ = exp(−d_g(p,q)²/2σ²), by Monte-Carlo.
//!
//! The metric g is frozen at p for the integral. Samples come from the
//! caller's PRNG, normally the one owned by the field, so a fixed seed gives
//! a fixed result.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use tcde_math::complex::{self, Complex32, Complex64};
use tcde_math::linalg::{self, Matrix6d};
use tcde_math::metric::Metric;
use tcde_types::config::CouplingStrategy;
use tcde_types::constants::{COUPLING_THRESHOLD, DIM, REGULARIZATION_SHIFT};
use tcde_types::state::Point;

use crate::evaluator::to_f64;
use crate::field::Field;
use crate::geometry::inverse_regularized;

/// exp(−d²/2σ²) with d² = (p−q)ᵀ g (p−q).
pub fn geodesic_kernel(metric: &Metric, p: &Point, q: &Point, sigma: f32) -> f32 {
    let d: [f64; DIM] = p.delta(q).map(|v| v as f64);
    let s = sigma as f64;
    (-metric.quadratic_form(&d) / (2.0 * s * s)).exp() as f32
}

/// Distance at which the kernel falls to `threshold`: σ·√(−2·ln threshold).
pub fn coupling_radius(sigma: f32, threshold: f32) -> f32 {
    let t = threshold.clamp(f32::MIN_POSITIVE, 1.0);
    sigma * (-2.0 * t.ln()).sqrt()
}

/// Centers within geodesic distance `radius` of `p` under the global metric.
pub fn count_neighbors(field: &Field, p: &Point, radius: f32) -> usize {
    let r2 = radius as f64 * radius as f64;
    field
        .centers()
        .iter()
        .filter(|c| {
            let d: [f64; DIM] = p.delta(&c.point).map(|v| v as f64);
            field.metric().quadratic_form(&d) <= r2
        })
        .count()
}

/// Monte-Carlo estimate of C(p) with `samples` draws.
pub fn contextual_coupling(
    field: &Field,
    metric: &Metric,
    p: &Point,
    sigma: f32,
    samples: usize,
    strategy: CouplingStrategy,
    rng: &mut StdRng,
) -> Complex32 {
    if field.is_empty() || samples == 0 {
        return Complex32::new(0.0, 0.0);
    }
    let g = metric.components();
    let (ginv, det, _) = inverse_regularized(&g, REGULARIZATION_SHIFT as f64);
    let x = to_f64(p);
    let sigma = sigma as f64;
    let value = match strategy {
        CouplingStrategy::Importance => importance(field, &x, &ginv, det, sigma, samples, rng),
        CouplingStrategy::UniformBox => uniform_box(field, &x, &g, &ginv, sigma, samples, rng),
    };
    complex::narrow(value)
}

/// Draws q ~ N(p, σ²g⁻¹). The kernel is that density up to
/// the constant (2πσ²)³/√det g, so the estimate is the constant times mean Φ(q).
fn importance(
    field: &Field,
    x: &[f64; DIM],
    ginv: &Matrix6d,
    det: f64,
    sigma: f64,
    samples: usize,
    rng: &mut StdRng,
) -> Complex64 {
    let chol = linalg::cholesky(ginv).unwrap_or_else(|| diagonal_sqrt(ginv));
    let norm = (2.0 * PI * sigma * sigma).powi(3) / det.sqrt();
    let mut acc = Complex64::new(0.0, 0.0);
    for _ in 0..samples {
        let mut z = [0.0f64; DIM];
        for zk in z.iter_mut() {
            *zk = rng.sample(StandardNormal);
        }
        let offset = linalg::mat_vec(&chol, &z);
        let mut q = *x;
        for k in 0..DIM {
            q[k] += sigma * offset[k];
        }
        acc += field.sample(&q);
    }
    acc * (norm / samples as f64)
}

/// Uniform draws in the axis box enclosing the ellipsoid d_g ≤ r, with r the
/// radius where the kernel drops to 1%.
fn uniform_box(
    field: &Field,
    x: &[f64; DIM],
    g: &Matrix6d,
    ginv: &Matrix6d,
    sigma: f64,
    samples: usize,
    rng: &mut StdRng,
) -> Complex64 {
    let r = coupling_radius(sigma as f32, COUPLING_THRESHOLD) as f64;
    let mut half = [0.0f64; DIM];
    let mut volume = 1.0f64;
    for k in 0..DIM {
        half[k] = r * ginv[k][k].max(0.0).sqrt();
        volume *= 2.0 * half[k];
    }
    let inv_two_s2 = 1.0 / (2.0 * sigma * sigma);
    let mut acc = Complex64::new(0.0, 0.0);
    for _ in 0..samples {
        let mut q = *x;
        let mut d = [0.0f64; DIM];
        for k in 0..DIM {
            let u: f64 = rng.gen_range(-1.0..1.0);
            d[k] = u * half[k];
            q[k] += d[k];
        }
        let mut d2 = 0.0f64;
        for i in 0..DIM {
            for j in 0..DIM {
                d2 += d[i] * g[i][j] * d[j];
            }
        }
        acc += field.sample(&q) * (-d2 * inv_two_s2).exp();
    }
    acc * (volume / samples as f64)
}

fn diagonal_sqrt(a: &Matrix6d) -> Matrix6d {
    let mut l = [[0.0; DIM]; DIM];
    for (i, row) in l.iter_mut().enumerate() {
        row[i] = a[i][i].max(0.0).sqrt();
    }
    l
}
