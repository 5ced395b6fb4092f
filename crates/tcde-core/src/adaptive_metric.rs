//! Field-adapted metric g_ij(x) = g⁰_ij·(1 + α·tanh(β·|Φ(x)|²)).
//!
//! The scale factor is a positive scalar for α > −1, so positive-definiteness
//! and block structure of g⁰ carry over. Its derivatives are the only source
//! of curvature in the system.

use tcde_math::complex::Complex64;
use tcde_math::linalg::Matrix6d;
use tcde_math::metric::Metric;
use tcde_types::config::AdaptationParams;
use tcde_types::constants::DIM;
use tcde_types::state::Point;

use crate::evaluator::to_f64;
use crate::field::Field;
use crate::geometry::{MetricField, Tensor3d, ZERO3};

/// Adapted metric view over a field. The base is the field's global metric.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveMetric<'a> {
    field: &'a Field,
    params: AdaptationParams,
}

impl<'a> AdaptiveMetric<'a> {
    pub fn new(field: &'a Field, params: AdaptationParams) -> Self {
        AdaptiveMetric { field, params }
    }

    pub fn params(&self) -> &AdaptationParams {
        &self.params
    }

    pub fn base(&self) -> &Metric {
        self.field.metric()
    }

    /// 1 + α·tanh(β·|Φ|²).
    #[inline]
    fn scale(&self, phi: Complex64) -> f64 {
        let a = self.params.alpha as f64;
        let b = self.params.beta as f64;
        1.0 + a * (b * phi.norm_sqr()).tanh()
    }

    pub fn scale_at(&self, p: &Point) -> f32 {
        self.scale(self.field.sample(&to_f64(p))) as f32
    }

    /// Derivatives from the chain rule:
    /// ∂_k g_ij = g⁰_ij·αβ·sech²(β|Φ|²)·2Re(Φ̄·∂_kΦ).
    pub fn analytic_derivatives(&self, x: &[f64; DIM]) -> Tensor3d {
        if !self.params.is_active() {
            return ZERO3;
        }
        let a = self.params.alpha as f64;
        let b = self.params.beta as f64;
        let phi = self.field.sample(x);
        let grad = self.field.gradient_at(x);
        let th = (b * phi.norm_sqr()).tanh();
        let sech2 = 1.0 - th * th;
        let g0 = self.field.metric().components();

        let mut dg = ZERO3;
        for (k, dgk) in dg.iter_mut().enumerate() {
            let d_mod_sq = 2.0 * (phi.conj() * grad[k]).re;
            let factor = a * b * sech2 * d_mod_sq;
            for i in 0..DIM {
                for j in 0..DIM {
                    dgk[i][j] = g0[i][j] * factor;
                }
            }
        }
        dg
    }
}

impl MetricField for AdaptiveMetric<'_> {
    fn components_at(&self, x: &[f64; DIM]) -> Matrix6d {
        let mut g = self.field.metric().components();
        if !self.params.is_active() {
            return g;
        }
        let s = self.scale(self.field.sample(x));
        for row in g.iter_mut() {
            for v in row.iter_mut() {
                *v *= s;
            }
        }
        g
    }

    fn derivatives_at(&self, x: &[f64; DIM]) -> Tensor3d {
        self.analytic_derivatives(x)
    }
}

/// The adapted metric at `p` as a concrete [`Metric`].
pub fn adapted_metric(field: &Field, params: AdaptationParams, p: &Point) -> Metric {
    AdaptiveMetric::new(field, params).metric_at(p)
}
