//! Gradient-driven refinement and coarsening, and the fractal initialiser.

use std::f32::consts::PI;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tcde_math::complex::{self, Complex32};
use tcde_types::constants::{
    COARSEN_ISOLATION, COARSEN_MIN_CENTERS, DIM, FRACTAL_BRANCHING, FRACTAL_DECAY,
    REFINE_OFFSET,
};
use tcde_types::error::{TcdeError, TcdeResult};
use tcde_types::state::Point;

use crate::field::Field;
use crate::geometry::geodesic_distance;

/// Width of a refined child relative to its parent.
const CHILD_EPSILON_RATIO: f32 = 0.8;
/// Coefficient of a refined child relative to its parent.
const CHILD_COEFF_RATIO: f32 = 0.5;

/// Base width of fractal offspring, multiplied by the level scale.
const FRACTAL_EPSILON: f32 = 0.1;
/// Phase advance per fractal level.
const FRACTAL_PHASE_STEP: f32 = 0.3;
const MAX_FRACTAL_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeshAdaptation {
    pub refined: usize,
    pub coarsened: usize,
}

/// Refine next to centers with ‖∇Φ‖ > `theta_refine`, then drop isolated
/// centers with ‖∇Φ‖ < `theta_coarsen`.
///
/// Gradients are taken once, before any change. A child sits within
/// ±0.005 per axis of its parent (offsets from the field PRNG) with half the
/// coefficient and 0.8× the width; refinement stops at capacity. A center is
/// isolated when no other center lies within geodesic distance 0.1 under the
/// global metric, and coarsening never takes the field to 10 centers or fewer.
pub fn adapt_mesh(field: &mut Field, theta_refine: f32, theta_coarsen: f32) -> MeshAdaptation {
    let mut out = MeshAdaptation::default();
    if field.is_empty() {
        return out;
    }
    let initial = field.len();
    let gradients: Vec<f32> = field
        .centers()
        .iter()
        .map(|c| field.gradient_norm(&c.point))
        .collect();

    for (i, &g) in gradients.iter().enumerate() {
        if g <= theta_refine || field.len() >= field.capacity() {
            continue;
        }
        let parent = field.centers()[i].clone();
        let mut coords = parent.point.coords;
        for c in coords.iter_mut() {
            let u: f32 = field.rng_mut().gen_range(-1.0..1.0);
            *c += REFINE_OFFSET * u;
        }
        let added = field.add_center(
            Point::new(coords),
            parent.coeff * CHILD_COEFF_RATIO,
            parent.epsilon * CHILD_EPSILON_RATIO,
        );
        if added.is_ok() {
            out.refined += 1;
        }
    }

    // Descending order: swap_remove only moves an already-visited center
    // into the freed slot.
    for i in (0..initial).rev() {
        if gradients[i] >= theta_coarsen || field.len() <= COARSEN_MIN_CENTERS {
            continue;
        }
        if is_isolated(field, i) && field.remove_center(i) {
            out.coarsened += 1;
        }
    }

    if out.refined + out.coarsened > 0 {
        log::debug!(
            "mesh adapted: +{} / -{} centers, {} total",
            out.refined,
            out.coarsened,
            field.len()
        );
    }
    out
}

fn is_isolated(field: &Field, index: usize) -> bool {
    let p = field.centers()[index].point;
    field
        .centers()
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != index)
        .all(|(_, c)| geodesic_distance(field.metric(), &p, &c.point) >= COARSEN_ISOLATION)
}

/// Self-similar initial condition. Returns the number of centers added.
///
/// A seed of coefficient `amplitude` and width 0.1 goes at
/// (0.5, 0.5, 0.5, 0, 0, 0.5). On each of `depth` levels (1 to 10) every
/// center present at the start of the level gets four offspring at angles
/// θ_j = jπ/2, offset by s = scale^(level+1) along a spiral
/// (s·cos θ, s·sin θ, s·sin 2θ, ½s·cos θ, ½s·sin θ, 0.1·s·sin 3θ) and clamped
/// to [0, 1]. Offspring carry amplitude·0.7^(level+1) at phase θ_j + 0.3·level
/// and width 0.1·s. A level stops early once fewer than four slots remain.
pub fn initialize_fractal(
    field: &mut Field,
    amplitude: f32,
    scale: f32,
    depth: usize,
) -> TcdeResult<usize> {
    if !(1..=MAX_FRACTAL_DEPTH).contains(&depth) {
        return Err(TcdeError::InvalidArgument(format!(
            "fractal depth must lie in 1..={MAX_FRACTAL_DEPTH}, got {depth}"
        )));
    }
    if !(scale.is_finite() && scale > 0.0) {
        return Err(TcdeError::InvalidArgument(format!(
            "fractal scale must be positive, got {scale}"
        )));
    }
    if !amplitude.is_finite() {
        return Err(TcdeError::InvalidArgument(
            "fractal amplitude must be finite".to_string(),
        ));
    }

    let start = field.len();
    let seed = Point::new([0.5, 0.5, 0.5, 0.0, 0.0, 0.5]);
    field.add_center(seed, Complex32::new(amplitude, 0.0), FRACTAL_EPSILON)?;

    for level in 0..depth {
        let parents = field.len();
        let s = scale.powi(level as i32 + 1);
        let level_amplitude = amplitude * FRACTAL_DECAY.powi(level as i32 + 1);
        for i in 0..parents {
            if field.len() + FRACTAL_BRANCHING > field.capacity() {
                break;
            }
            let parent = field.centers()[i].point;
            for j in 0..FRACTAL_BRANCHING {
                let angle = 2.0 * PI * j as f32 / FRACTAL_BRANCHING as f32;
                let offset: [f32; DIM] = [
                    s * angle.cos(),
                    s * angle.sin(),
                    s * (2.0 * angle).sin(),
                    0.5 * s * angle.cos(),
                    0.5 * s * angle.sin(),
                    0.1 * s * (3.0 * angle).sin(),
                ];
                let mut coords = parent.coords;
                for (c, o) in coords.iter_mut().zip(offset) {
                    *c += o;
                }
                let phase = angle + FRACTAL_PHASE_STEP * level as f32;
                field.add_center(
                    Point::new(coords).clamped(0.0, 1.0),
                    complex::polar(level_amplitude, phase),
                    FRACTAL_EPSILON * s,
                )?;
            }
        }
    }
    Ok(field.len() - start)
}
