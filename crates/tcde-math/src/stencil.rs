//! Fourth-order central difference stencils.

/// Offsets of the first-derivative stencil in units of h.
pub const FIRST_OFFSETS: [f64; 4] = [-2.0, -1.0, 1.0, 2.0];

/// Weights matching `FIRST_OFFSETS`, to be divided by h.
pub const FIRST_WEIGHTS: [f64; 4] = [1.0 / 12.0, -8.0 / 12.0, 8.0 / 12.0, -1.0 / 12.0];

/// f′(0) ≈ [f(−2h) − 8f(−h) + 8f(h) − f(2h)] / 12h.
pub fn first_derivative<F: Fn(f64) -> f64>(f: F, h: f64) -> f64 {
    let mut acc = 0.0;
    for (o, w) in FIRST_OFFSETS.iter().zip(FIRST_WEIGHTS.iter()) {
        acc += w * f(o * h);
    }
    acc / h
}

/// Apply the first-derivative stencil to a vector-valued sample.
/// `sample(offset)` returns the components at that offset.
pub fn first_derivative_into<const N: usize, F>(mut sample: F, h: f64) -> [f64; N]
where
    F: FnMut(f64) -> [f64; N],
{
    let mut acc = [0.0; N];
    for (o, w) in FIRST_OFFSETS.iter().zip(FIRST_WEIGHTS.iter()) {
        let v = sample(o * h);
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += w * x;
        }
    }
    for a in &mut acc {
        *a /= h;
    }
    acc
}
