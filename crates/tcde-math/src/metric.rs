// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Metric
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Symmetric positive-definite 6×6 metric with cached determinant and inverse.
//!
//! The block hint marks a metric whose entries outside the spatial 3×3,
//! temporal 2×2 and modal 1×1 blocks are exactly zero. It only ever selects a
//! faster code path; the general path stays correct for every metric.

use tcde_types::constants::{BLOCKS, DIM};
use tcde_types::error::{TcdeError, TcdeResult};

use crate::linalg::{self, Matrix6, Matrix6d};

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    g: Matrix6,
    det: f64,
    inverse: Option<Matrix6>,
    valid: bool,
    block_hint: bool,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::identity()
    }
}

impl Metric {
    pub fn identity() -> Self {
        Metric::diagonal([1.0; DIM])
    }

    pub fn diagonal(diag: [f32; DIM]) -> Self {
        let mut g = [[0.0; DIM]; DIM];
        for (i, row) in g.iter_mut().enumerate() {
            row[i] = diag[i];
        }
        Metric::from_symmetric(g)
    }

    /// Assemble from the three diagonal blocks. Off-block entries are zero.
    pub fn block_diagonal(spatial: [[f32; 3]; 3], temporal: [[f32; 2]; 2], modal: f32) -> Self {
        let mut g = [[0.0; DIM]; DIM];
        for i in 0..3 {
            for j in 0..3 {
                g[i][j] = spatial[i][j];
            }
        }
        for i in 0..2 {
            for j in 0..2 {
                g[3 + i][3 + j] = temporal[i][j];
            }
        }
        g[5][5] = modal;
        Metric::from_symmetric(g)
    }

    /// Build from a full matrix. Rejects non-finite entries and asymmetry
    /// beyond `1e-6` relative to the largest entry, then symmetrises exactly.
    pub fn from_matrix(g: Matrix6) -> TcdeResult<Self> {
        let mut scale = 0.0f32;
        for row in &g {
            for &v in row {
                if !v.is_finite() {
                    return Err(TcdeError::InvalidArgument(
                        "metric entries must be finite".to_string(),
                    ));
                }
                scale = scale.max(v.abs());
            }
        }
        let asym = linalg::max_asymmetry(&g);
        if asym > 1e-6 * scale.max(1.0) {
            return Err(TcdeError::InvalidArgument(format!(
                "metric is not symmetric (max |g_ij - g_ji| = {asym:e})"
            )));
        }
        let mut sym = g;
        for i in 0..DIM {
            for j in (i + 1)..DIM {
                let v = 0.5 * (g[i][j] + g[j][i]);
                sym[i][j] = v;
                sym[j][i] = v;
            }
        }
        Ok(Metric::from_symmetric(sym))
    }

    /// Build from f64 components, as produced by field-dependent metrics.
    pub fn from_components(g: &Matrix6d) -> Self {
        let mut m = linalg::narrow(g);
        for i in 0..DIM {
            for j in (i + 1)..DIM {
                m[j][i] = m[i][j];
            }
        }
        Metric::from_symmetric(m)
    }

    fn from_symmetric(g: Matrix6) -> Self {
        let wide = linalg::widen(&g);
        let (inverse, det) = match linalg::invert(&wide) {
            Ok((inv, det)) => (Some(linalg::narrow(&inv)), det),
            Err(_) => (None, linalg::determinant(&wide)),
        };
        let valid = inverse.is_some() && linalg::cholesky(&wide).is_some();
        Metric {
            g,
            det,
            inverse,
            valid,
            block_hint: off_block_zero(&g),
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.g[i][j]
    }

    pub fn matrix(&self) -> &Matrix6 {
        &self.g
    }

    pub fn components(&self) -> Matrix6d {
        linalg::widen(&self.g)
    }

    pub fn det(&self) -> f64 {
        self.det
    }

    pub fn inverse(&self) -> Option<&Matrix6> {
        self.inverse.as_ref()
    }

    /// Symmetric, invertible and positive-definite.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_block_diagonal(&self) -> bool {
        self.block_hint
    }

    pub fn is_symmetric(&self) -> bool {
        linalg::max_asymmetry(&self.g) == 0.0
    }

    pub fn leading_minors(&self) -> [f64; DIM] {
        linalg::leading_minors(&self.components())
    }

    pub fn is_positive_definite(&self) -> bool {
        self.leading_minors().iter().all(|&m| m > 0.0)
    }

    /// Multiply every component by `factor`.
    pub fn scaled(&self, factor: f32) -> Metric {
        let mut g = self.g;
        for row in &mut g {
            for v in row.iter_mut() {
                *v *= factor;
            }
        }
        Metric::from_symmetric(g)
    }

    /// Add `shift` to the diagonal.
    pub fn shifted(&self, shift: f32) -> Metric {
        let mut g = self.g;
        for (i, row) in g.iter_mut().enumerate() {
            row[i] += shift;
        }
        Metric::from_symmetric(g)
    }

    /// Diagonal shift by `shift`, growing tenfold per round until the metric
    /// is valid. Falls back to the identity if no shift succeeds.
    pub fn regularized(&self, shift: f32) -> Metric {
        if self.valid {
            return self.clone();
        }
        let mut g = self.components();
        match linalg::regularized_inverse(&g, shift as f64) {
            Some((_, _, s)) => {
                for (i, row) in g.iter_mut().enumerate() {
                    row[i] += s;
                }
                let candidate = Metric::from_components(&g);
                if candidate.valid {
                    candidate
                } else {
                    Metric::identity()
                }
            }
            None => Metric::identity(),
        }
    }

    /// g·Δ in f64.
    pub fn apply(&self, delta: &[f64; DIM]) -> [f64; DIM] {
        let mut s = [0.0; DIM];
        for i in 0..DIM {
            let mut acc = 0.0f64;
            for j in 0..DIM {
                acc += self.g[i][j] as f64 * delta[j];
            }
            s[i] = acc;
        }
        s
    }

    /// Δᵀ g Δ accumulated in f64 over all 36 entries.
    pub fn quadratic_form(&self, delta: &[f64; DIM]) -> f64 {
        linalg::quadratic_form(&self.g, delta)
    }

    /// Δᵀ g Δ over the diagonal blocks only, bit-identical to
    /// `quadratic_form` when the hint is set.
    pub fn quadratic_form_blocks(&self, delta: &[f64; DIM]) -> f64 {
        linalg::quadratic_form_blocks(&self.g, delta)
    }

    /// Block path when the hint is set, general path otherwise.
    #[inline]
    pub fn quadratic_form_fast(&self, delta: &[f64; DIM]) -> f64 {
        if self.block_hint {
            self.quadratic_form_blocks(delta)
        } else {
            self.quadratic_form(delta)
        }
    }
}

/// Every entry outside the three diagonal blocks is exactly zero.
pub fn off_block_zero<T: Copy + Into<f64>>(g: &[[T; DIM]; DIM]) -> bool {
    for i in 0..DIM {
        for j in 0..DIM {
            if block_of(i) != block_of(j) && g[i][j].into() != 0.0 {
                return false;
            }
        }
    }
    true
}

/// Index of the block containing coordinate `k`.
#[inline]
pub fn block_of(k: usize) -> usize {
    BLOCKS
        .iter()
        .position(|&(lo, hi)| k >= lo && k < hi)
        .unwrap_or(BLOCKS.len() - 1)
}

/// Coordinate range of the block containing `k`.
#[inline]
pub fn block_range(k: usize) -> std::ops::Range<usize> {
    let (lo, hi) = BLOCKS[block_of(k)];
    lo..hi
}
