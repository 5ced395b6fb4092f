//! Dense 6×6 linear algebra.
//!
//! LU with partial pivoting, determinants, inversion, Cholesky and leading
//! principal minors. Elimination runs in f64 regardless of the storage type.

use tcde_types::constants::{BLOCKS, DIM, SINGULAR_DET};
use tcde_types::error::{TcdeError, TcdeResult};

/// Single-precision 6×6 storage.
pub type Matrix6 = [[f32; DIM]; DIM];

/// Double-precision 6×6 working matrix.
pub type Matrix6d = [[f64; DIM]; DIM];

pub fn identity() -> Matrix6d {
    let mut m = [[0.0; DIM]; DIM];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

pub fn widen(a: &Matrix6) -> Matrix6d {
    let mut m = [[0.0; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            m[i][j] = a[i][j] as f64;
        }
    }
    m
}

pub fn narrow(a: &Matrix6d) -> Matrix6 {
    let mut m = [[0.0; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            m[i][j] = a[i][j] as f32;
        }
    }
    m
}

pub fn mat_mul(a: &Matrix6d, b: &Matrix6d) -> Matrix6d {
    let mut c = [[0.0; DIM]; DIM];
    for i in 0..DIM {
        for k in 0..DIM {
            let aik = a[i][k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..DIM {
                c[i][j] += aik * b[k][j];
            }
        }
    }
    c
}

pub fn mat_vec(a: &Matrix6d, x: &[f64; DIM]) -> [f64; DIM] {
    let mut y = [0.0; DIM];
    for i in 0..DIM {
        let mut s = 0.0;
        for j in 0..DIM {
            s += a[i][j] * x[j];
        }
        y[i] = s;
    }
    y
}

pub fn max_asymmetry(a: &Matrix6) -> f32 {
    let mut worst = 0.0f32;
    for i in 0..DIM {
        for j in (i + 1)..DIM {
            worst = worst.max((a[i][j] - a[j][i]).abs());
        }
    }
    worst
}

/// Packed LU factors of P·A = L·U, L with unit diagonal.
#[derive(Debug, Clone, Copy)]
pub struct Lu6 {
    lu: Matrix6d,
    perm: [usize; DIM],
    parity: f64,
}

impl Lu6 {
    /// Factorise with partial pivoting. Zero pivots are kept, so the
    /// factorisation always exists; `determinant` then reports zero.
    pub fn decompose(a: &Matrix6d) -> Self {
        let mut lu = *a;
        let mut perm = [0usize; DIM];
        for (i, p) in perm.iter_mut().enumerate() {
            *p = i;
        }
        let mut parity = 1.0;

        for col in 0..DIM {
            let mut pivot_row = col;
            let mut pivot_abs = lu[col][col].abs();
            for row in (col + 1)..DIM {
                let v = lu[row][col].abs();
                if v > pivot_abs {
                    pivot_abs = v;
                    pivot_row = row;
                }
            }
            if pivot_row != col {
                lu.swap(pivot_row, col);
                perm.swap(pivot_row, col);
                parity = -parity;
            }

            let pivot = lu[col][col];
            if pivot == 0.0 {
                continue;
            }
            for row in (col + 1)..DIM {
                let factor = lu[row][col] / pivot;
                lu[row][col] = factor;
                if factor == 0.0 {
                    continue;
                }
                for k in (col + 1)..DIM {
                    lu[row][k] -= factor * lu[col][k];
                }
            }
        }

        Lu6 { lu, perm, parity }
    }

    /// Product of U's diagonal with the sign of the row permutation.
    pub fn determinant(&self) -> f64 {
        let mut det = self.parity;
        for i in 0..DIM {
            det *= self.lu[i][i];
        }
        det
    }

    /// Solve A·x = b. Caller guarantees a non-singular factorisation.
    pub fn solve(&self, b: &[f64; DIM]) -> [f64; DIM] {
        let mut y = [0.0; DIM];
        for i in 0..DIM {
            let mut s = b[self.perm[i]];
            for k in 0..i {
                s -= self.lu[i][k] * y[k];
            }
            y[i] = s;
        }
        let mut x = [0.0; DIM];
        for i in (0..DIM).rev() {
            let mut s = y[i];
            for k in (i + 1)..DIM {
                s -= self.lu[i][k] * x[k];
            }
            x[i] = s / self.lu[i][i];
        }
        x
    }
}

pub fn determinant(a: &Matrix6d) -> f64 {
    Lu6::decompose(a).determinant()
}

/// Invert through LU. Fails with `SingularMetric` when det ≤ 10⁻¹⁰.
pub fn invert(a: &Matrix6d) -> TcdeResult<(Matrix6d, f64)> {
    let lu = Lu6::decompose(a);
    let det = lu.determinant();
    if !(det > SINGULAR_DET) {
        return Err(TcdeError::SingularMetric { det });
    }
    let mut inv = [[0.0; DIM]; DIM];
    for j in 0..DIM {
        let mut e = [0.0; DIM];
        e[j] = 1.0;
        let col = lu.solve(&e);
        for i in 0..DIM {
            inv[i][j] = col[i];
        }
    }
    Ok((inv, det))
}

/// Lower-triangular L with A = L·Lᵀ, or `None` if A is not positive-definite.
pub fn cholesky(a: &Matrix6d) -> Option<Matrix6d> {
    let mut l = [[0.0; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..=i {
            let mut s = a[i][j];
            for k in 0..j {
                s -= l[i][k] * l[j][k];
            }
            if i == j {
                if !(s > 0.0) {
                    return None;
                }
                l[i][i] = s.sqrt();
            } else {
                l[i][j] = s / l[j][j];
            }
        }
    }
    Some(l)
}

/// Determinants of the leading k×k submatrices, k = 1..=6.
pub fn leading_minors(a: &Matrix6d) -> [f64; DIM] {
    let mut minors = [0.0; DIM];
    // Without pivoting, the running product of pivots is the k-th leading minor.
    let mut m = *a;
    let mut running = 1.0;
    for k in 0..DIM {
        let pivot = m[k][k];
        running *= pivot;
        minors[k] = running;
        if pivot == 0.0 {
            // Remaining minors need a pivoted factorisation of each submatrix.
            for (kk, minor) in minors.iter_mut().enumerate().skip(k + 1) {
                *minor = leading_minor_pivoted(a, kk + 1);
            }
            break;
        }
        for row in (k + 1)..DIM {
            let factor = m[row][k] / pivot;
            for col in k..DIM {
                m[row][col] -= factor * m[k][col];
            }
        }
    }
    minors
}

fn leading_minor_pivoted(a: &Matrix6d, n: usize) -> f64 {
    let mut sub = identity();
    for i in 0..n {
        sub[i][..n].copy_from_slice(&a[i][..n]);
    }
    determinant(&sub)
}

/// Δᵀ g Δ accumulated in f64, summed row-major over all 36 entries.
pub fn quadratic_form<T: Copy + Into<f64>>(g: &[[T; DIM]; DIM], delta: &[f64; DIM]) -> f64 {
    let mut acc = 0.0f64;
    for i in 0..DIM {
        for j in 0..DIM {
            acc += delta[i] * g[i][j].into() * delta[j];
        }
    }
    acc
}

/// Δᵀ g Δ over the diagonal blocks only. Visits the retained entries in
/// the same order as `quadratic_form`, so for a block-diagonal g both agree
/// bit for bit.
pub fn quadratic_form_blocks<T: Copy + Into<f64>>(
    g: &[[T; DIM]; DIM],
    delta: &[f64; DIM],
) -> f64 {
    let mut acc = 0.0f64;
    for &(lo, hi) in &BLOCKS {
        for i in lo..hi {
            for j in lo..hi {
                acc += delta[i] * g[i][j].into() * delta[j];
            }
        }
    }
    acc
}

/// Diagonal shifts attempted before regularisation gives up.
pub const MAX_REGULARIZATION_ROUNDS: usize = 24;

/// Inverse and determinant of `a`, or of `a + sI` for the first shift
/// s = shift, 10·shift, 100·shift, ... under which it is positive-definite
/// and invertible. The third element is the shift applied, 0 when `a` was
/// usable as is. `None` once every round has failed.
pub fn regularized_inverse(a: &Matrix6d, shift: f64) -> Option<(Matrix6d, f64, f64)> {
    if cholesky(a).is_some() {
        if let Ok((inv, det)) = invert(a) {
            return Some((inv, det, 0.0));
        }
    }
    let mut s = shift.max(f64::MIN_POSITIVE);
    for _ in 0..MAX_REGULARIZATION_ROUNDS {
        let mut shifted = *a;
        for (i, row) in shifted.iter_mut().enumerate() {
            row[i] += s;
        }
        if cholesky(&shifted).is_some() {
            if let Ok((inv, det)) = invert(&shifted) {
                return Some((inv, det, s));
            }
        }
        s *= 10.0;
        if !s.is_finite() {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spd() -> Matrix6d {
        let mut a = identity();
        for i in 0..DIM {
            a[i][i] = 2.0 + i as f64 * 0.5;
            if i + 1 < DIM {
                a[i][i + 1] = 0.3;
                a[i + 1][i] = 0.3;
            }
        }
        a
    }

    #[test]
    fn test_invert_identity() {
        let (inv, det) = invert(&identity()).unwrap();
        assert!((det - 1.0).abs() < 1e-14);
        for i in 0..DIM {
            for j in 0..DIM {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((inv[i][j] - expected).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn test_inverse_times_matrix_is_identity() {
        let a = sample_spd();
        let (inv, _) = invert(&a).unwrap();
        let p = mat_mul(&a, &inv);
        for i in 0..DIM {
            for j in 0..DIM {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((p[i][j] - expected).abs() < 1e-12, "A·A⁻¹[{i}][{j}] = {}", p[i][j]);
            }
        }
    }

    #[test]
    fn test_determinant_sign_follows_pivot_parity() {
        let mut a = identity();
        a.swap(0, 1);
        assert!((determinant(&a) + 1.0).abs() < 1e-14);
        let mut d = identity();
        d[2][2] = 3.0;
        d[4][4] = 0.5;
        assert!((determinant(&d) - 1.5).abs() < 1e-14);
    }

    #[test]
    fn test_singular_rejected() {
        let mut a = identity();
        a[3][3] = 0.0;
        match invert(&a) {
            Err(TcdeError::SingularMetric { det }) => assert_eq!(det, 0.0),
            other => panic!("expected SingularMetric, got {other:?}"),
        }
        let mut tiny = identity();
        for (i, row) in tiny.iter_mut().enumerate() {
            row[i] = 1e-2;
        }
        // det = 1e-12 falls below the singularity threshold.
        assert!(invert(&tiny).is_err());
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let a = sample_spd();
        let l = cholesky(&a).unwrap();
        for i in 0..DIM {
            for j in 0..DIM {
                let s: f64 = (0..DIM).map(|k| l[i][k] * l[j][k]).sum();
                assert!((s - a[i][j]).abs() < 1e-12);
            }
        }
        let mut indefinite = identity();
        indefinite[5][5] = -1.0;
        assert!(cholesky(&indefinite).is_none());
    }

    #[test]
    fn test_leading_minors_of_diagonal() {
        let mut d = identity();
        for (i, row) in d.iter_mut().enumerate() {
            row[i] = (i + 1) as f64;
        }
        let minors = leading_minors(&d);
        let expected = [1.0, 2.0, 6.0, 24.0, 120.0, 720.0];
        for k in 0..DIM {
            assert!((minors[k] - expected[k]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_leading_minors_with_zero_pivot() {
        let mut a = identity();
        a[0][0] = 0.0;
        a[0][1] = 1.0;
        a[1][0] = 1.0;
        a[1][1] = 0.0;
        let minors = leading_minors(&a);
        assert_eq!(minors[0], 0.0);
        assert!((minors[1] + 1.0).abs() < 1e-12);
        assert!((minors[5] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_regularized_inverse_shifts_only_when_needed() {
        let (_, det, shift) = regularized_inverse(&sample_spd(), 1e-6).unwrap();
        assert_eq!(shift, 0.0);
        assert!((det - determinant(&sample_spd())).abs() < 1e-12);

        let mut indefinite = identity();
        indefinite[5][5] = -0.5;
        let (inv, det, shift) = regularized_inverse(&indefinite, 1e-6).unwrap();
        // 1e-6 · 10⁶ is the first shift that clears −0.5
        assert!((shift - 1.0).abs() < 1e-9);
        assert!((det - 16.0).abs() < 1e-8);
        assert!((inv[5][5] - 2.0).abs() < 1e-9);

        let mut broken = identity();
        broken[0][0] = f64::NAN;
        assert!(regularized_inverse(&broken, 1e-6).is_none());
    }

    #[test]
    fn test_quadratic_form_storage_precision() {
        // Single-precision storage widens exactly, so both entry types agree.
        let g = narrow(&sample_spd());
        let delta = [0.2, -0.1, 0.4, 0.0, 0.3, -0.5];
        assert_eq!(
            quadratic_form(&g, &delta).to_bits(),
            quadratic_form(&widen(&g), &delta).to_bits()
        );
        // sample_spd couples (2,3) and (4,5) across blocks: 2·(0.4·0.0 + 0.3·(−0.5))·0.3
        let dropped = quadratic_form(&widen(&g), &delta) - quadratic_form_blocks(&widen(&g), &delta);
        assert!((dropped - 2.0 * 0.3f32 as f64 * (0.4 * 0.0 + 0.3 * -0.5)).abs() < 1e-12);
    }
}
