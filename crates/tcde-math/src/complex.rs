//! Complex scalar helpers.
//!
//! Field values are single-precision `Complex32`; sums over centers run in
//! `Complex64` and are rounded once at the end.

pub use num_complex::{Complex32, Complex64};

/// Imaginary unit.
pub const I: Complex32 = Complex32::new(0.0, 1.0);

pub const ZERO: Complex32 = Complex32::new(0.0, 0.0);

pub const ONE: Complex32 = Complex32::new(1.0, 0.0);

#[inline]
pub fn is_finite(z: Complex32) -> bool {
    z.re.is_finite() && z.im.is_finite()
}

#[inline]
pub fn widen(z: Complex32) -> Complex64 {
    Complex64::new(z.re as f64, z.im as f64)
}

#[inline]
pub fn narrow(z: Complex64) -> Complex32 {
    Complex32::new(z.re as f32, z.im as f32)
}

/// r·e^{iθ}.
#[inline]
pub fn polar(r: f32, theta: f32) -> Complex32 {
    Complex32::from_polar(r, theta)
}

/// Scale `z` down to magnitude `max` keeping its argument. Values already
/// within the bound are returned unchanged.
pub fn clamp_magnitude(z: Complex32, max: f32) -> Complex32 {
    let r = z.norm();
    if r <= max {
        return z;
    }
    z * (max / r)
}

/// Frobenius norm of a square complex array.
pub fn frobenius_norm<const N: usize>(m: &[[Complex64; N]; N]) -> f64 {
    m.iter().flatten().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}
