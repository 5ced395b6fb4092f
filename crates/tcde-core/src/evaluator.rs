// ─────────────────────────────────────────────────────────────────────
// TCDE Core — RBF Evaluator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Φ(p) = Σ c_i·φ(d_i/ε_i) and its analytic derivatives.
//!
//! d_i² = Δᵀ g_i Δ with Δ = p − p_i and g_i the center's own metric, or the
//! field's global metric when it has none. With u = d²/ε² and s = g·Δ:
//!
//! ∂_k φ = φ′(u)·2s_k/ε²,   ∂_k∂_l φ = φ″(u)·4s_k s_l/ε⁴ + φ′(u)·2g_kl/ε².
//!
//! Sums run in f64 and are rounded to single precision on return.

use tcde_math::complex::{self, Complex32, Complex64};
use tcde_math::metric::Metric;
use tcde_math::rbf::{laplacian_normalization, RadialProfile};
use tcde_math::stencil;
use tcde_types::config::RbfKind;
use tcde_types::constants::{DIM, FD_STEP};
use tcde_types::state::Point;

use crate::field::{Center, Field};

const CZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Value, gradient and Hessian of Φ at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jet {
    pub value: Complex64,
    pub grad: [Complex64; DIM],
    pub hess: [[Complex64; DIM]; DIM],
}

impl Jet {
    fn zero() -> Self {
        Jet {
            value: CZERO,
            grad: [CZERO; DIM],
            hess: [[CZERO; DIM]; DIM],
        }
    }
}

/// How each center's derivatives enter a [`Jet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    /// Plain derivatives of Φ.
    Unit,
    /// Second and first derivatives scaled by ε²/(1+ε²) per center, the form
    /// fed to the diffusion operator.
    Normalized,
}

#[inline]
pub(crate) fn to_f64(p: &Point) -> [f64; DIM] {
    let mut x = [0.0; DIM];
    for (k, xk) in x.iter_mut().enumerate() {
        *xk = p.coords[k] as f64;
    }
    x
}

#[inline]
fn delta_to(x: &[f64; DIM], c: &Center) -> [f64; DIM] {
    let mut d = [0.0; DIM];
    for (k, dk) in d.iter_mut().enumerate() {
        *dk = x[k] - c.point.coords[k] as f64;
    }
    d
}

#[inline]
fn contribution(kind: RbfKind, global: &Metric, c: &Center, x: &[f64; DIM]) -> Complex64 {
    let delta = delta_to(x, c);
    let e2 = c.epsilon as f64 * c.epsilon as f64;
    let u = c.metric_or(global).quadratic_form_fast(&delta) / e2;
    complex::widen(c.coeff) * kind.value(u)
}

impl Field {
    /// Φ at f64 coordinates.
    pub(crate) fn sample(&self, x: &[f64; DIM]) -> Complex64 {
        let kind = self.kernel();
        let global = self.metric();
        let mut acc = CZERO;
        for c in self.centers() {
            acc += contribution(kind, global, c, x);
        }
        acc
    }

    /// Φ restricted to the given center indices.
    pub(crate) fn sample_subset<I>(&self, x: &[f64; DIM], indices: I) -> Complex64
    where
        I: IntoIterator<Item = usize>,
    {
        let kind = self.kernel();
        let global = self.metric();
        let centers = self.centers();
        let mut acc = CZERO;
        for i in indices {
            acc += contribution(kind, global, &centers[i], x);
        }
        acc
    }

    /// Analytic gradient at f64 coordinates.
    pub(crate) fn gradient_at(&self, x: &[f64; DIM]) -> [Complex64; DIM] {
        let kind = self.kernel();
        let global = self.metric();
        let mut grad = [CZERO; DIM];
        for c in self.centers() {
            let metric = c.metric_or(global);
            let delta = delta_to(x, c);
            let e2 = c.epsilon as f64 * c.epsilon as f64;
            let u = metric.quadratic_form_fast(&delta) / e2;
            let s = metric.apply(&delta);
            let w = complex::widen(c.coeff) * (kind.first(u) * 2.0 / e2);
            for k in 0..DIM {
                grad[k] += w * s[k];
            }
        }
        grad
    }

    /// Value, gradient and Hessian in one pass over the centers.
    pub fn jet_at(&self, x: &[f64; DIM], weighting: Weighting) -> Jet {
        let kind = self.kernel();
        let global = self.metric();
        let mut jet = Jet::zero();
        for c in self.centers() {
            let metric = c.metric_or(global);
            let delta = delta_to(x, c);
            let e2 = c.epsilon as f64 * c.epsilon as f64;
            let u = metric.quadratic_form_fast(&delta) / e2;
            let s = metric.apply(&delta);
            let coeff = complex::widen(c.coeff);
            let norm = match weighting {
                Weighting::Unit => 1.0,
                Weighting::Normalized => laplacian_normalization(c.epsilon),
            };

            jet.value += coeff * kind.value(u);
            let f1 = kind.first(u);
            let f2 = kind.second(u);
            let w1 = coeff * (norm * f1 * 2.0 / e2);
            let w2 = coeff * (norm * f2 * 4.0 / (e2 * e2));
            for k in 0..DIM {
                jet.grad[k] += w1 * s[k];
                for l in 0..DIM {
                    jet.hess[k][l] += w2 * (s[k] * s[l]) + w1 * metric.get(k, l) as f64;
                }
            }
        }
        jet
    }

    /// Φ(p).
    pub fn evaluate(&self, p: &Point) -> Complex32 {
        complex::narrow(self.sample(&to_f64(p)))
    }

    /// ∇Φ(p) by differentiating every kernel analytically.
    pub fn gradient(&self, p: &Point) -> [Complex32; DIM] {
        self.gradient_at(&to_f64(p)).map(complex::narrow)
    }

    /// ∇Φ(p) by 4th-order central differences with h = 10⁻⁵.
    pub fn gradient_fd(&self, p: &Point) -> [Complex32; DIM] {
        let x = to_f64(p);
        let h = FD_STEP as f64;
        let mut grad = [Complex32::new(0.0, 0.0); DIM];
        for (k, g) in grad.iter_mut().enumerate() {
            let [re, im] = stencil::first_derivative_into(
                |o| {
                    let mut y = x;
                    y[k] += o;
                    let v = self.sample(&y);
                    [v.re, v.im]
                },
                h,
            );
            *g = Complex32::new(re as f32, im as f32);
        }
        grad
    }

    /// ‖∇Φ(p)‖ = √Σ|∂_kΦ|².
    pub fn gradient_norm(&self, p: &Point) -> f32 {
        gradient_norm(&self.gradient_at(&to_f64(p)))
    }

    pub fn hessian(&self, p: &Point) -> [[Complex32; DIM]; DIM] {
        let jet = self.jet_at(&to_f64(p), Weighting::Unit);
        jet.hess.map(|row| row.map(complex::narrow))
    }

    /// Normalized flat Laplacian Σ_k ∂_k∂_k Φ with each center's second
    /// derivatives scaled by ε²/(1+ε²).
    pub fn laplacian(&self, p: &Point) -> Complex32 {
        let jet = self.jet_at(&to_f64(p), Weighting::Normalized);
        let mut trace = CZERO;
        for k in 0..DIM {
            trace += jet.hess[k][k];
        }
        complex::narrow(trace)
    }
}

pub(crate) fn gradient_norm(grad: &[Complex64; DIM]) -> f32 {
    grad.iter().map(|g| g.norm_sqr()).sum::<f64>().sqrt() as f32
}
