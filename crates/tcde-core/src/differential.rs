// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Differential Operators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Laplace–Beltrami and torsion of Φ, by direct differentiation of the RBF sum.
//!
//! ∇²_g Φ = (1/√|g|) ∂_i(√|g| g^{ij} ∂_j Φ) = g^{ij}(∂_i∂_j Φ − Γ^k_ij ∂_k Φ).
//!
//! The diffusion form uses the normalized jet: each center's derivatives are
//! scaled by ε²/(1+ε²), which keeps the operator O(1) for narrow kernels.

use tcde_math::complex::{self, Complex32, Complex64};
use tcde_types::constants::{BLOCKS, DIM, REGULARIZATION_SHIFT};
use tcde_types::state::Point;

use crate::evaluator::{to_f64, Jet, Weighting};
use crate::field::Field;
use crate::geometry::{LocalGeometry, MetricField};

const CZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Complex 6×6 tensor.
pub type ComplexMatrix6 = [[Complex32; DIM]; DIM];

#[inline]
fn lb_entry(jet: &Jet, geo: &LocalGeometry, i: usize, j: usize) -> Complex64 {
    let mut conn = CZERO;
    for k in 0..DIM {
        conn += jet.grad[k] * geo.christoffel[k][i][j];
    }
    (jet.hess[i][j] - conn) * geo.inverse[i][j]
}

/// g^{ij}(H_ij − Γ^k_ij ∂_kΦ) over all 36 index pairs, row-major.
pub fn laplace_beltrami_from(jet: &Jet, geo: &LocalGeometry) -> Complex64 {
    let mut acc = CZERO;
    for i in 0..DIM {
        for j in 0..DIM {
            acc += lb_entry(jet, geo, i, j);
        }
    }
    acc
}

/// Sum of three block Laplacians: only pairs (i,j) inside a diagonal block,
/// where g^{ij} is non-zero for a block-diagonal metric. The retained pairs
/// are visited in the same order as the general sum.
pub fn laplace_beltrami_blocks_from(jet: &Jet, geo: &LocalGeometry) -> Complex64 {
    let mut acc = CZERO;
    for &(lo, hi) in &BLOCKS {
        for i in lo..hi {
            for j in lo..hi {
                acc += lb_entry(jet, geo, i, j);
            }
        }
    }
    acc
}

/// Normalized Laplace–Beltrami of Φ at `p` under the metric field `mf`.
pub fn laplace_beltrami<M: MetricField + ?Sized>(field: &Field, mf: &M, p: &Point) -> Complex32 {
    let x = to_f64(p);
    let geo = LocalGeometry::at(mf, &x, REGULARIZATION_SHIFT);
    let jet = field.jet_at(&x, Weighting::Normalized);
    complex::narrow(laplace_beltrami_from(&jet, &geo))
}

/// Block-diagonal fast path of [`laplace_beltrami`].
pub fn laplace_beltrami_blocks<M: MetricField + ?Sized>(
    field: &Field,
    mf: &M,
    p: &Point,
) -> Complex32 {
    let x = to_f64(p);
    let geo = LocalGeometry::at(mf, &x, REGULARIZATION_SHIFT);
    let jet = field.jet_at(&x, Weighting::Normalized);
    complex::narrow(laplace_beltrami_blocks_from(&jet, &geo))
}

/// Uses the block path when the local metric is block-diagonal.
pub fn laplace_beltrami_fast(jet: &Jet, geo: &LocalGeometry) -> Complex64 {
    if geo.block_diagonal {
        laplace_beltrami_blocks_from(jet, geo)
    } else {
        laplace_beltrami_from(jet, geo)
    }
}

/// T_ij = ∂_i v^j − ∂_j v^i with the raised gradient v^j = g^{jk}∂_kΦ.
///
/// ∂_i v^j = (∂_i g^{jk})∂_kΦ + g^{jk}∂_i∂_kΦ. Only the upper triangle is
/// evaluated; the lower one is its negation and the diagonal is zero.
pub fn torsion_from(jet: &Jet, geo: &LocalGeometry) -> [[Complex64; DIM]; DIM] {
    let dinv = geo.inverse_derivatives();
    let dv = |i: usize, j: usize| -> Complex64 {
        let mut acc = CZERO;
        for k in 0..DIM {
            acc += jet.grad[k] * dinv[i][j][k] + jet.hess[i][k] * geo.inverse[j][k];
        }
        acc
    };
    let mut t = [[CZERO; DIM]; DIM];
    for i in 0..DIM {
        for j in (i + 1)..DIM {
            let v = dv(i, j) - dv(j, i);
            t[i][j] = v;
            t[j][i] = -v;
        }
    }
    t
}

pub fn torsion<M: MetricField + ?Sized>(field: &Field, mf: &M, p: &Point) -> ComplexMatrix6 {
    let x = to_f64(p);
    let geo = LocalGeometry::at(mf, &x, REGULARIZATION_SHIFT);
    let jet = field.jet_at(&x, Weighting::Unit);
    torsion_from(&jet, &geo).map(|row| row.map(complex::narrow))
}

/// Frobenius magnitude ‖T‖.
pub fn torsion_norm_from(t: &[[Complex64; DIM]; DIM]) -> f64 {
    complex::frobenius_norm(t)
}

pub fn torsion_norm<M: MetricField + ?Sized>(field: &Field, mf: &M, p: &Point) -> f32 {
    let x = to_f64(p);
    let geo = LocalGeometry::at(mf, &x, REGULARIZATION_SHIFT);
    let jet = field.jet_at(&x, Weighting::Unit);
    torsion_norm_from(&torsion_from(&jet, &geo)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive_metric::AdaptiveMetric;
    use tcde_math::metric::Metric;
    use tcde_math::rbf::{laplacian_normalization, raw_laplacian};
    use tcde_types::config::{AdaptationParams, RbfKind};

    fn cluster(metric: Metric) -> Field {
        let mut field = Field::new(16, 2.5).with_metric(metric).unwrap();
        let coords = [
            [0.30, 0.32, 0.28, 1.00, 0.02, 0.40],
            [0.42, 0.25, 0.31, 0.95, -0.03, 0.45],
            [0.36, 0.40, 0.22, 1.04, 0.05, 0.38],
        ];
        let coeffs = [
            Complex32::new(1.0, 0.0),
            Complex32::new(-0.4, 0.7),
            Complex32::new(0.2, -0.3),
        ];
        for (c, z) in coords.iter().zip(coeffs) {
            field.add_center(Point::new(*c), z, 0.2).unwrap();
        }
        field
    }

    fn block_metric() -> Metric {
        Metric::block_diagonal(
            [[1.4, 0.2, 0.0], [0.2, 1.1, 0.1], [0.0, 0.1, 0.9]],
            [[1.2, -0.1], [-0.1, 0.8]],
            1.3,
        )
    }

    fn query() -> Point {
        Point::new([0.34, 0.31, 0.29, 1.0, 0.0, 0.41])
    }

    #[test]
    fn test_lb_constant_metric_closed_form() {
        // A center measured in the same constant metric as the LB operator:
        // ∇²φ = (4uφ″ + 12φ′)/ε².
        let metric = block_metric();
        let mut field = Field::new(2, 2.5).with_metric(metric.clone()).unwrap();
        let c = Point::new([0.3, 0.3, 0.3, 1.0, 0.0, 0.4]);
        field.add_center(c, Complex32::new(1.0, 0.0), 0.2).unwrap();
        let q = query();
        let d: [f64; DIM] = q.delta(&c).map(|v| v as f64);
        let u = metric.quadratic_form(&d) / (0.2f32 as f64).powi(2);
        let expected =
            raw_laplacian(RbfKind::Gaussian, u, 0.2) * laplacian_normalization(0.2);
        let got = laplace_beltrami(&field, &metric, &q);
        assert!(
            (got.re as f64 - expected).abs() < 1e-4 * expected.abs().max(1.0),
            "LB {} vs closed form {}",
            got.re,
            expected
        );
    }

    #[test]
    fn test_lb_identity_equals_flat_laplacian() {
        let field = cluster(Metric::identity());
        let q = query();
        let lb = laplace_beltrami(&field, &Metric::identity(), &q);
        let flat = field.laplacian(&q);
        assert!((lb - flat).norm() < 1e-5);
    }

    #[test]
    fn test_lb_block_path_parity() {
        let metric = block_metric();
        let field = cluster(metric.clone());
        let q = query();
        assert_eq!(
            laplace_beltrami(&field, &metric, &q),
            laplace_beltrami_blocks(&field, &metric, &q)
        );

        let adaptive = AdaptiveMetric::new(&field, AdaptationParams::default());
        let general = laplace_beltrami(&field, &adaptive, &q);
        let blocks = laplace_beltrami_blocks(&field, &adaptive, &q);
        assert!((general - blocks).norm() <= 1e-6 * general.norm().max(1.0));
    }

    #[test]
    fn test_torsion_antisymmetric_zero_diagonal() {
        let field = cluster(block_metric());
        let adaptive = AdaptiveMetric::new(&field, AdaptationParams::default());
        let t = torsion(&field, &adaptive, &query());
        for i in 0..DIM {
            assert_eq!(t[i][i], Complex32::new(0.0, 0.0));
            for j in 0..DIM {
                assert_eq!(t[i][j] + t[j][i], Complex32::new(0.0, 0.0));
            }
        }
        assert!(torsion_norm(&field, &adaptive, &query()) > 0.0);
    }

    #[test]
    fn test_torsion_vanishes_for_identity_metric() {
        let field = cluster(Metric::identity());
        let n = torsion_norm(&field, &Metric::identity(), &query());
        assert!(n < 1e-5, "‖T‖ = {n}");
    }
}
