// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Radial Basis Profiles
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Radial profiles in the scaled squared radius u = d²/ε².
//!
//! With ε read as the kernel width, φ_gauss = exp(−d²/ε²) falls to e⁻¹ one
//! width away from its center and below 10⁻³ beyond 3·ε·√ln10.

use tcde_types::config::RbfKind;
use tcde_types::constants::{DIM, LN_10};

/// Value and first two derivatives of a profile with respect to u.
pub trait RadialProfile {
    fn value(&self, u: f64) -> f64;
    fn first(&self, u: f64) -> f64;
    fn second(&self, u: f64) -> f64;
}

impl RadialProfile for RbfKind {
    #[inline]
    fn value(&self, u: f64) -> f64 {
        match self {
            RbfKind::Gaussian => (-u).exp(),
            RbfKind::Multiquadric => (1.0 + u).sqrt(),
            RbfKind::InverseMultiquadric => 1.0 / (1.0 + u).sqrt(),
        }
    }

    #[inline]
    fn first(&self, u: f64) -> f64 {
        match self {
            RbfKind::Gaussian => -(-u).exp(),
            RbfKind::Multiquadric => 0.5 / (1.0 + u).sqrt(),
            RbfKind::InverseMultiquadric => -0.5 * (1.0 + u).powf(-1.5),
        }
    }

    #[inline]
    fn second(&self, u: f64) -> f64 {
        match self {
            RbfKind::Gaussian => (-u).exp(),
            RbfKind::Multiquadric => -0.25 * (1.0 + u).powf(-1.5),
            RbfKind::InverseMultiquadric => 0.75 * (1.0 + u).powf(-2.5),
        }
    }
}

/// φ(r; ε) at distance `r`. Equals 1 exactly at r = 0 for every kind.
#[inline]
pub fn phi(kind: RbfKind, r: f32, epsilon: f32) -> f32 {
    let s = r as f64 / epsilon as f64;
    kind.value(s * s) as f32
}

/// Bounded factor ε²/(1+ε²) applied to every second derivative of φ.
#[inline]
pub fn laplacian_normalization(epsilon: f32) -> f64 {
    let e2 = epsilon as f64 * epsilon as f64;
    e2 / (1.0 + e2)
}

/// Raw Laplacian of φ in a metric equal to the center's own:
/// (4u·φ″ + 2·d·φ′)/ε² with d = 6.
#[inline]
pub fn raw_laplacian(kind: RbfKind, u: f64, epsilon: f32) -> f64 {
    let e2 = epsilon as f64 * epsilon as f64;
    (4.0 * u * kind.second(u) + 2.0 * DIM as f64 * kind.first(u)) / e2
}

/// Distance beyond which the Gaussian kernel is below 10⁻³.
/// `None` for kernels that do not decay.
#[inline]
pub fn cutoff_radius(kind: RbfKind, epsilon: f32) -> Option<f32> {
    match kind {
        RbfKind::Gaussian => Some(3.0 * epsilon * LN_10.sqrt()),
        RbfKind::Multiquadric | RbfKind::InverseMultiquadric => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [RbfKind; 3] = [
        RbfKind::Gaussian,
        RbfKind::Multiquadric,
        RbfKind::InverseMultiquadric,
    ];

    #[test]
    fn test_unit_at_center() {
        for kind in KINDS {
            assert_eq!(phi(kind, 0.0, 0.1), 1.0);
            assert_eq!(phi(kind, 0.0, 7.5), 1.0);
        }
    }

    #[test]
    fn test_gaussian_one_width_away() {
        let v = phi(RbfKind::Gaussian, 0.1, 0.1);
        assert!((v - (-1.0f32).exp()).abs() < 1e-6, "φ = {v}");
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-5;
        for kind in KINDS {
            for &u in &[0.0, 0.3, 1.0, 2.7] {
                let u0 = u + 0.5;
                let d1 = (kind.value(u0 + h) - kind.value(u0 - h)) / (2.0 * h);
                let d2 = (kind.first(u0 + h) - kind.first(u0 - h)) / (2.0 * h);
                assert!((d1 - kind.first(u0)).abs() < 1e-8, "{kind:?} f' at {u0}");
                assert!((d2 - kind.second(u0)).abs() < 1e-8, "{kind:?} f'' at {u0}");
            }
        }
    }

    #[test]
    fn test_normalization_bounded() {
        assert!(laplacian_normalization(0.1) < 0.01);
        assert!(laplacian_normalization(1.0) == 0.5);
        assert!(laplacian_normalization(1e3) < 1.0);
        let raw = raw_laplacian(RbfKind::Gaussian, 0.0, 0.1);
        assert!((raw + 1200.0).abs() < 1e-2);
        assert!((raw * laplacian_normalization(0.1)).abs() < 12.0);
    }

    #[test]
    fn test_cutoff_below_threshold() {
        let eps = 0.25;
        let r = cutoff_radius(RbfKind::Gaussian, eps).unwrap();
        let v = phi(RbfKind::Gaussian, r, eps);
        assert!(v < 1e-3, "φ at cutoff = {v}");
        assert!(cutoff_radius(RbfKind::Multiquadric, eps).is_none());
    }
}
