// ─────────────────────────────────────────────────────────────────────
// TCDE Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::constants::DIM;
use crate::error::{TcdeError, TcdeResult};

/// Coordinates (x, y, z, τ₁, τ₂, m) on the 6D manifold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub coords: [f32; DIM],
}

impl Point {
    pub const fn new(coords: [f32; DIM]) -> Self {
        Point { coords }
    }

    pub const fn origin() -> Self {
        Point { coords: [0.0; DIM] }
    }

    /// Copy from a slice, rejecting any length other than six.
    pub fn from_slice(values: &[f32]) -> TcdeResult<Self> {
        if values.len() != DIM {
            return Err(TcdeError::DimensionMismatch {
                expected: DIM,
                got: values.len(),
            });
        }
        let mut coords = [0.0; DIM];
        coords.copy_from_slice(values);
        Ok(Point { coords })
    }

    pub fn is_finite(&self) -> bool {
        self.coords.iter().all(|c| c.is_finite())
    }

    /// Coordinate difference self − other.
    pub fn delta(&self, other: &Point) -> [f32; DIM] {
        let mut d = [0.0; DIM];
        for (k, dk) in d.iter_mut().enumerate() {
            *dk = self.coords[k] - other.coords[k];
        }
        d
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        let mut coords = [0.0; DIM];
        for (k, c) in coords.iter_mut().enumerate() {
            *c = 0.5 * (self.coords[k] + other.coords[k]);
        }
        Point { coords }
    }

    /// Copy with coordinate `axis` shifted by `h`.
    pub fn shifted(&self, axis: usize, h: f32) -> Point {
        let mut p = *self;
        p.coords[axis] += h;
        p
    }

    pub fn euclidean_distance_sq(&self, other: &Point) -> f32 {
        self.delta(other).iter().map(|d| d * d).sum()
    }

    pub fn euclidean_distance(&self, other: &Point) -> f32 {
        self.euclidean_distance_sq(other).sqrt()
    }

    /// Clamp every coordinate into [lo, hi].
    pub fn clamped(&self, lo: f32, hi: f32) -> Point {
        let mut p = *self;
        for c in &mut p.coords {
            *c = c.clamp(lo, hi);
        }
        p
    }
}

impl From<[f32; DIM]> for Point {
    fn from(coords: [f32; DIM]) -> Self {
        Point { coords }
    }
}

impl Index<usize> for Point {
    type Output = f32;
    fn index(&self, k: usize) -> &f32 {
        &self.coords[k]
    }
}

impl IndexMut<usize> for Point {
    fn index_mut(&mut self, k: usize) -> &mut f32 {
        &mut self.coords[k]
    }
}

/// Clip counters, one per limiter. Cumulative until reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStats {
    pub epsilon_clips: usize,
    pub metric_clips: usize,
    pub amplitude_clips: usize,
    pub energy_clips: usize,
    pub gradient_clips: usize,
    /// Passes of the full stack
    pub passes: usize,
}

impl LimiterStats {
    pub fn total_clips(&self) -> usize {
        self.epsilon_clips
            + self.metric_clips
            + self.amplitude_clips
            + self.energy_clips
            + self.gradient_clips
    }
}

/// Clips performed by a single limiter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LimiterReport {
    pub epsilon_clips: usize,
    pub metric_clips: usize,
    pub amplitude_clips: usize,
    /// Global rescale factor applied by the energy limiter, 1.0 when idle
    pub energy_scale: f32,
    pub gradient_clips: usize,
}

impl LimiterReport {
    pub fn any_active(&self) -> bool {
        self.epsilon_clips > 0
            || self.metric_clips > 0
            || self.amplitude_clips > 0
            || self.energy_scale < 1.0
            || self.gradient_clips > 0
    }
}

/// Outcome of one explicit TDE step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Field time after the step
    pub time: f32,
    pub dt: f32,
    pub energy_before: f32,
    pub energy_after: f32,
    /// Largest |Δc_i| before limiting
    pub max_delta: f32,
    /// Centers whose update was non-finite and fell back to the previous coefficient
    pub recovered: usize,
    pub limiter: LimiterReport,
}

/// Outcome of one step-doubling adaptive step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveStepReport {
    /// Step size actually taken
    pub dt_taken: f32,
    /// Step size proposed for the next call
    pub dt_next: f32,
    /// Relative error estimate of the accepted step
    pub error: f32,
    pub rejections: usize,
    /// False when tolerance was unreachable and `dt_min` was forced
    pub converged: bool,
    pub step: StepReport,
}
