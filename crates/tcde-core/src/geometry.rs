// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Geometry
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Pointwise Riemannian geometry on the 6D manifold.
//!
//! Index conventions:
//! - metric derivatives `dg[k][i][j] = ∂_k g_ij`
//! - Christoffel symbols `gamma[k][i][j] = Γ^k_ij`
//! - Riemann tensor `r[i][j][k][l] = R^i_jkl`
//!
//! All tensors are computed in f64 and exposed in single precision.

use tcde_math::linalg::{self, Matrix6, Matrix6d};
use tcde_math::metric::{block_range, off_block_zero, Metric};
use tcde_math::stencil::{FIRST_OFFSETS, FIRST_WEIGHTS};
use tcde_types::constants::{CURVATURE_STEP, DIM, FD_STEP, TRIANGLE_TOL};
use tcde_types::state::Point;

use crate::evaluator::to_f64;

pub type Tensor3 = [[[f32; DIM]; DIM]; DIM];
pub type Tensor4 = [[[[f32; DIM]; DIM]; DIM]; DIM];
pub type Tensor3d = [[[f64; DIM]; DIM]; DIM];
pub type Tensor4d = [[[[f64; DIM]; DIM]; DIM]; DIM];

pub const ZERO3: Tensor3d = [[[0.0; DIM]; DIM]; DIM];

/// A metric tensor field g_ij(x).
pub trait MetricField {
    /// Components at f64 coordinates.
    fn components_at(&self, x: &[f64; DIM]) -> Matrix6d;

    /// ∂_k g_ij. Defaults to the 4th-order central stencil with h = 10⁻⁵.
    fn derivatives_at(&self, x: &[f64; DIM]) -> Tensor3d {
        fd_metric_derivatives(self, x, FD_STEP as f64)
    }

    fn metric_at(&self, p: &Point) -> Metric {
        Metric::from_components(&self.components_at(&to_f64(p)))
    }
}

/// A single metric is a constant field: every derivative vanishes.
impl MetricField for Metric {
    fn components_at(&self, _x: &[f64; DIM]) -> Matrix6d {
        self.components()
    }

    fn derivatives_at(&self, _x: &[f64; DIM]) -> Tensor3d {
        ZERO3
    }

    fn metric_at(&self, _p: &Point) -> Metric {
        self.clone()
    }
}

/// ∂_k g_ij by the five-point stencil along each coordinate.
pub fn fd_metric_derivatives<M: MetricField + ?Sized>(mf: &M, x: &[f64; DIM], h: f64) -> Tensor3d {
    let mut dg = ZERO3;
    for (k, dgk) in dg.iter_mut().enumerate() {
        for (o, w) in FIRST_OFFSETS.iter().zip(FIRST_WEIGHTS.iter()) {
            let mut y = *x;
            y[k] += o * h;
            let g = mf.components_at(&y);
            for i in 0..DIM {
                for j in 0..DIM {
                    dgk[i][j] += w * g[i][j];
                }
            }
        }
        for row in dgk.iter_mut() {
            for v in row.iter_mut() {
                *v /= h;
            }
        }
    }
    dg
}

pub fn metric_derivatives<M: MetricField + ?Sized>(mf: &M, p: &Point) -> Tensor3 {
    narrow3(&mf.derivatives_at(&to_f64(p)))
}

// ── Geodesic distance ────────────────────────────────────────────────

fn midpoint_and_delta(p: &Point, q: &Point) -> ([f64; DIM], [f64; DIM]) {
    let a = to_f64(p);
    let b = to_f64(q);
    let mut mid = [0.0; DIM];
    let mut d = [0.0; DIM];
    for k in 0..DIM {
        mid[k] = 0.5 * (a[k] + b[k]);
        d[k] = a[k] - b[k];
    }
    (mid, d)
}

/// d_g(p,q) = √((p−q)ᵀ g((p+q)/2) (p−q)).
///
/// For a constant metric this is the norm induced by g and obeys the
/// triangle inequality. For a field-dependent metric each pair samples g at
/// its own midpoint, so the inequality can fail.
pub fn geodesic_distance<M: MetricField + ?Sized>(mf: &M, p: &Point, q: &Point) -> f32 {
    let (mid, d) = midpoint_and_delta(p, q);
    let g = mf.components_at(&mid);
    linalg::quadratic_form(&g, &d).max(0.0).sqrt() as f32
}

/// Block-diagonal fast path: three independent block quadratic forms.
/// Matches `geodesic_distance` exactly when g is block-diagonal.
pub fn geodesic_distance_blocks<M: MetricField + ?Sized>(mf: &M, p: &Point, q: &Point) -> f32 {
    let (mid, d) = midpoint_and_delta(p, q);
    let g = mf.components_at(&mid);
    linalg::quadratic_form_blocks(&g, &d).max(0.0).sqrt() as f32
}

/// d(p,r) ≤ d(p,q) + d(q,r) within 10⁻⁶. Guaranteed for constant metrics
/// only; see [`geodesic_distance`].
pub fn verify_triangle_inequality<M: MetricField + ?Sized>(
    mf: &M,
    p: &Point,
    q: &Point,
    r: &Point,
) -> bool {
    let pr = geodesic_distance(mf, p, r);
    let pq = geodesic_distance(mf, p, q);
    let qr = geodesic_distance(mf, q, r);
    pr <= pq + qr + TRIANGLE_TOL
}

// ── Inverse and local snapshot ───────────────────────────────────────

/// g⁻¹ and det g, shifting the diagonal by `shift` (growing tenfold) until
/// g is invertible and positive-definite. The flag reports a shift; the
/// identity stands in when no shift succeeds.
pub fn inverse_regularized(g: &Matrix6d, shift: f64) -> (Matrix6d, f64, bool) {
    match linalg::regularized_inverse(g, shift) {
        Some((inv, det, s)) if s == 0.0 => (inv, det, false),
        Some((inv, det, s)) => {
            log::debug!("singular metric regularised with diagonal shift {s:e}");
            (inv, det, true)
        }
        None => (linalg::identity(), 1.0, true),
    }
}

/// Metric, inverse, derivatives and connection at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalGeometry {
    pub metric: Matrix6d,
    pub inverse: Matrix6d,
    pub det: f64,
    pub derivatives: Tensor3d,
    pub christoffel: Tensor3d,
    /// The metric was singular and a diagonal shift was substituted
    pub regularized: bool,
    pub block_diagonal: bool,
}

impl LocalGeometry {
    pub fn at<M: MetricField + ?Sized>(mf: &M, x: &[f64; DIM], shift: f32) -> Self {
        let metric = mf.components_at(x);
        let (inverse, det, regularized) = inverse_regularized(&metric, shift as f64);
        let derivatives = mf.derivatives_at(x);
        let christoffel = christoffel_from(&inverse, &derivatives);
        LocalGeometry {
            metric,
            inverse,
            det,
            derivatives,
            christoffel,
            regularized,
            block_diagonal: off_block_zero(&metric),
        }
    }

    pub fn at_point<M: MetricField + ?Sized>(mf: &M, p: &Point, shift: f32) -> Self {
        Self::at(mf, &to_f64(p), shift)
    }

    /// ∂_i g^{jk} = −(g⁻¹ ∂_i g g⁻¹)^{jk}.
    pub fn inverse_derivatives(&self) -> Tensor3d {
        let mut out = ZERO3;
        for (i, out_i) in out.iter_mut().enumerate() {
            let tmp = linalg::mat_mul(&self.derivatives[i], &self.inverse);
            let prod = linalg::mat_mul(&self.inverse, &tmp);
            for j in 0..DIM {
                for k in 0..DIM {
                    out_i[j][k] = -prod[j][k];
                }
            }
        }
        out
    }
}

// ── Christoffel symbols ──────────────────────────────────────────────

#[inline]
fn christoffel_term(dg: &Tensor3d, i: usize, j: usize, l: usize) -> f64 {
    dg[i][j][l] + dg[j][i][l] - dg[l][i][j]
}

/// Γ^k_ij = ½ g^{kl}(∂_i g_jl + ∂_j g_il − ∂_l g_ij), symmetric in (i,j).
pub fn christoffel_from(ginv: &Matrix6d, dg: &Tensor3d) -> Tensor3d {
    let mut gamma = ZERO3;
    for k in 0..DIM {
        for i in 0..DIM {
            for j in i..DIM {
                let mut acc = 0.0f64;
                for l in 0..DIM {
                    acc += ginv[k][l] * christoffel_term(dg, i, j, l);
                }
                gamma[k][i][j] = 0.5 * acc;
                gamma[k][j][i] = 0.5 * acc;
            }
        }
    }
    gamma
}

/// Block fast path: the l-sum runs over k's block only, where g^{kl} lives
/// for a block-diagonal metric.
pub fn christoffel_from_blocks(ginv: &Matrix6d, dg: &Tensor3d) -> Tensor3d {
    let mut gamma = ZERO3;
    for k in 0..DIM {
        let block = block_range(k);
        for i in 0..DIM {
            for j in i..DIM {
                let mut acc = 0.0f64;
                for l in block.clone() {
                    acc += ginv[k][l] * christoffel_term(dg, i, j, l);
                }
                gamma[k][i][j] = 0.5 * acc;
                gamma[k][j][i] = 0.5 * acc;
            }
        }
    }
    gamma
}

fn christoffel_at<M: MetricField + ?Sized>(mf: &M, x: &[f64; DIM], shift: f64) -> Tensor3d {
    let g = mf.components_at(x);
    let (ginv, _, _) = inverse_regularized(&g, shift);
    christoffel_from(&ginv, &mf.derivatives_at(x))
}

pub fn christoffel<M: MetricField + ?Sized>(mf: &M, p: &Point) -> Tensor3 {
    let x = to_f64(p);
    narrow3(&christoffel_at(mf, &x, default_shift()))
}

pub fn christoffel_blocks<M: MetricField + ?Sized>(mf: &M, p: &Point) -> Tensor3 {
    let x = to_f64(p);
    let g = mf.components_at(&x);
    let (ginv, _, _) = inverse_regularized(&g, default_shift());
    narrow3(&christoffel_from_blocks(&ginv, &mf.derivatives_at(&x)))
}

// ── Curvature ────────────────────────────────────────────────────────

/// Riemann, Ricci and scalar curvature at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct Curvature {
    pub riemann: Tensor4,
    pub ricci: Matrix6,
    pub scalar: f32,
}

/// R^i_jkl = ∂_kΓ^i_jl − ∂_lΓ^i_jk + Γ^i_mk Γ^m_jl − Γ^i_ml Γ^m_jk, with ∂Γ
/// from the 4th-order stencil at step `CURVATURE_STEP`.
///
/// Each pair (k,l) and (l,k) is built from the same two differences, so
/// antisymmetry in (k,l) holds exactly.
pub fn riemann_at<M: MetricField + ?Sized>(mf: &M, x: &[f64; DIM]) -> Tensor4d {
    let shift = default_shift();
    let h = CURVATURE_STEP as f64;
    let gamma = christoffel_at(mf, x, shift);

    // dgamma[a][i][j][l] = ∂_a Γ^i_jl
    let mut dgamma = [ZERO3; DIM];
    for (a, dga) in dgamma.iter_mut().enumerate() {
        for (o, w) in FIRST_OFFSETS.iter().zip(FIRST_WEIGHTS.iter()) {
            let mut y = *x;
            y[a] += o * h;
            let gs = christoffel_at(mf, &y, shift);
            for i in 0..DIM {
                for j in 0..DIM {
                    for l in 0..DIM {
                        dga[i][j][l] += w * gs[i][j][l];
                    }
                }
            }
        }
        for plane in dga.iter_mut() {
            for row in plane.iter_mut() {
                for v in row.iter_mut() {
                    *v /= h;
                }
            }
        }
    }

    let mut r: Tensor4d = [[[[0.0; DIM]; DIM]; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            for k in 0..DIM {
                for l in (k + 1)..DIM {
                    let deriv = dgamma[k][i][j][l] - dgamma[l][i][j][k];
                    let mut q1 = 0.0f64;
                    let mut q2 = 0.0f64;
                    for m in 0..DIM {
                        q1 += gamma[i][m][k] * gamma[m][j][l];
                        q2 += gamma[i][m][l] * gamma[m][j][k];
                    }
                    let v = deriv + (q1 - q2);
                    r[i][j][k][l] = v;
                    r[i][j][l][k] = -v;
                }
            }
        }
    }
    r
}

/// R_ij = R^k_ikj, symmetrised.
pub fn ricci_from(r: &Tensor4d) -> Matrix6d {
    let mut raw = [[0.0f64; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            let mut acc = 0.0;
            for k in 0..DIM {
                acc += r[k][i][k][j];
            }
            raw[i][j] = acc;
        }
    }
    let mut ric = raw;
    for i in 0..DIM {
        for j in (i + 1)..DIM {
            let v = 0.5 * (raw[i][j] + raw[j][i]);
            ric[i][j] = v;
            ric[j][i] = v;
        }
    }
    ric
}

/// R = g^{ij} R_ij.
pub fn scalar_from(ginv: &Matrix6d, ric: &Matrix6d) -> f64 {
    let mut acc = 0.0;
    for i in 0..DIM {
        for j in 0..DIM {
            acc += ginv[i][j] * ric[i][j];
        }
    }
    acc
}

pub fn curvature<M: MetricField + ?Sized>(mf: &M, p: &Point) -> Curvature {
    let x = to_f64(p);
    let r = riemann_at(mf, &x);
    let ric = ricci_from(&r);
    let (ginv, _, _) = inverse_regularized(&mf.components_at(&x), default_shift());
    let scalar = scalar_from(&ginv, &ric) as f32;

    let mut riemann: Tensor4 = [[[[0.0; DIM]; DIM]; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            for k in 0..DIM {
                for l in 0..DIM {
                    riemann[i][j][k][l] = r[i][j][k][l] as f32;
                }
            }
        }
    }
    Curvature {
        riemann,
        ricci: linalg::narrow(&ric),
        scalar,
    }
}

pub fn riemann<M: MetricField + ?Sized>(mf: &M, p: &Point) -> Tensor4 {
    curvature(mf, p).riemann
}

pub fn ricci<M: MetricField + ?Sized>(mf: &M, p: &Point) -> Matrix6 {
    curvature(mf, p).ricci
}

pub fn scalar_curvature<M: MetricField + ?Sized>(mf: &M, p: &Point) -> f32 {
    curvature(mf, p).scalar
}

#[inline]
fn default_shift() -> f64 {
    tcde_types::constants::REGULARIZATION_SHIFT as f64
}

pub(crate) fn narrow3(t: &Tensor3d) -> Tensor3 {
    let mut out = [[[0.0f32; DIM]; DIM]; DIM];
    for k in 0..DIM {
        for i in 0..DIM {
            for j in 0..DIM {
                out[k][i][j] = t[k][i][j] as f32;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// g = e^{2f}·δ with f = 0.1·x₀², a conformally flat test metric.
    struct Conformal;

    impl MetricField for Conformal {
        fn components_at(&self, x: &[f64; DIM]) -> Matrix6d {
            let s = (0.2 * x[0] * x[0]).exp();
            let mut g = linalg::identity();
            for (i, row) in g.iter_mut().enumerate() {
                row[i] = s;
            }
            g
        }
    }

    fn sample_point() -> Point {
        Point::new([0.5, 0.2, -0.1, 1.0, 0.0, 0.4])
    }

    fn max_abs4(t: &Tensor4) -> f32 {
        t.iter()
            .flatten()
            .flatten()
            .flatten()
            .fold(0.0f32, |m, v| m.max(v.abs()))
    }

    fn max_abs3(t: &Tensor3) -> f32 {
        t.iter().flatten().flatten().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    #[test]
    fn test_triangle_distances_identity() {
        let m = Metric::identity();
        let p = Point::new([0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let q = Point::new([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let r = Point::new([0.5, 0.5, 0.0, 1.0, 0.0, 0.0]);
        assert!((geodesic_distance(&m, &p, &q) - 1.0).abs() < 1e-5);
        assert!((geodesic_distance(&m, &p, &r) - 0.5f32.sqrt()).abs() < 1e-5);
        assert!((geodesic_distance(&m, &q, &r) - 0.5f32.sqrt()).abs() < 1e-5);
        assert!(verify_triangle_inequality(&m, &p, &q, &r));
        assert!(verify_triangle_inequality(&m, &p, &r, &q));
    }

    #[test]
    fn test_constant_metric_derivatives_vanish() {
        let m = Metric::diagonal([2.0, 1.5, 1.2, 1.0, 1.0, 1.0]);
        let fd = fd_metric_derivatives(&m, &to_f64(&sample_point()), FD_STEP as f64);
        let max = fd.iter().flatten().flatten().fold(0.0f64, |a, v| a.max(v.abs()));
        assert!(max < 1e-5, "max |∂g| = {max}");
        assert!(max_abs3(&christoffel(&m, &sample_point())) < 1e-5);
    }

    #[test]
    fn test_flat_space_curvature_zero() {
        let c = curvature(&Metric::identity(), &sample_point());
        assert!(max_abs4(&c.riemann) < 1e-5);
        assert!(c.ricci.iter().flatten().all(|v| v.abs() < 1e-5));
        assert!(c.scalar.abs() < 1e-5);
    }

    #[test]
    fn test_conformal_christoffel_matches_closed_form() {
        // Γ^k_ij = δ_ki ∂_j f + δ_kj ∂_i f − δ_ij ∂_k f with ∂_0 f = 0.2·x₀.
        let p = sample_point();
        let gamma = christoffel(&Conformal, &p);
        let df0 = 0.2 * p[0];
        for k in 0..DIM {
            for i in 0..DIM {
                for j in 0..DIM {
                    let dk = |a: usize, b: usize| if a == b { 1.0f32 } else { 0.0 };
                    let d = |a: usize| if a == 0 { df0 } else { 0.0 };
                    let expected = dk(k, i) * d(j) + dk(k, j) * d(i) - dk(i, j) * d(k);
                    assert!(
                        (gamma[k][i][j] - expected).abs() < 1e-5,
                        "Γ^{k}_{i}{j} = {} expected {}",
                        gamma[k][i][j],
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn test_conformal_scalar_curvature() {
        // R = −e^{−2f}[2(n−1)Δf + (n−2)(n−1)|∇f|²], n = 6.
        let p = sample_point();
        let x0 = p[0] as f64;
        let f = 0.1 * x0 * x0;
        let grad_sq = (0.2 * x0).powi(2);
        let expected = -(-2.0 * f).exp() * (10.0 * 0.2 + 20.0 * grad_sq);
        let c = curvature(&Conformal, &p);
        assert!(
            (c.scalar as f64 - expected).abs() < 1e-3,
            "R = {} expected {}",
            c.scalar,
            expected
        );
    }

    #[test]
    fn test_riemann_antisymmetric_and_ricci_symmetric() {
        let c = curvature(&Conformal, &sample_point());
        for i in 0..DIM {
            for j in 0..DIM {
                assert_eq!(c.ricci[i][j], c.ricci[j][i]);
                for k in 0..DIM {
                    for l in 0..DIM {
                        assert_eq!(c.riemann[i][j][k][l], -c.riemann[i][j][l][k]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_block_christoffel_parity() {
        let p = sample_point();
        let general = christoffel(&Conformal, &p);
        let blocks = christoffel_blocks(&Conformal, &p);
        for k in 0..DIM {
            for i in 0..DIM {
                for j in 0..DIM {
                    assert_eq!(general[k][i][j], blocks[k][i][j]);
                }
            }
        }
    }

    #[test]
    fn test_block_distance_parity() {
        let m = Metric::block_diagonal(
            [[2.0, 0.3, -0.2], [0.3, 1.5, 0.1], [-0.2, 0.1, 1.2]],
            [[1.0, 0.4], [0.4, 0.8]],
            0.5,
        );
        assert!(m.is_block_diagonal());
        let pairs = [
            (sample_point(), Point::new([0.1, 0.9, 0.3, 0.2, 0.7, 0.0])),
            (Point::origin(), Point::new([1.0, 1.0, 1.0, 1.0, 1.0, 1.0])),
            (Point::new([0.3, -0.4, 0.8, 0.5, 0.1, 0.9]), sample_point()),
        ];
        for (p, q) in pairs {
            let general = geodesic_distance(&m, &p, &q);
            let blocks = geodesic_distance_blocks(&m, &p, &q);
            assert_eq!(general.to_bits(), blocks.to_bits());
        }
        // General path still sees off-block coupling that the block path drops.
        let mut g = *m.matrix();
        g[0][3] = 0.2;
        g[3][0] = 0.2;
        let coupled = Metric::from_matrix(g).unwrap();
        let q = Point::new([0.1, 0.9, 0.3, 0.2, 0.7, 0.0]);
        assert_ne!(
            geodesic_distance(&coupled, &sample_point(), &q),
            geodesic_distance_blocks(&coupled, &sample_point(), &q)
        );
    }

    #[test]
    fn test_regularization_of_singular_metric() {
        let mut g = linalg::identity();
        g[5][5] = 0.0;
        let (inv, det, regularized) = inverse_regularized(&g, 1e-6);
        assert!(regularized);
        assert!(det > 0.0);
        assert!(inv[5][5].is_finite());

        let (_, _, clean) = inverse_regularized(&linalg::identity(), 1e-6);
        assert!(!clean);
    }
}
