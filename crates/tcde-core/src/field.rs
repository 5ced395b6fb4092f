// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Field
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Field and Center containers.
//!
//! A `Field` exclusively owns its centers, its global metric and the PRNG
//! stream consumed by Monte-Carlo coupling. Every structural mutation bumps
//! `generation`, which spatial indices use to detect staleness.

use std::cell::Cell;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tcde_math::complex::{self, Complex32};
use tcde_math::metric::Metric;
use tcde_types::config::{RbfKind, SimulationConfig};
use tcde_types::error::{TcdeError, TcdeResult};
use tcde_types::state::Point;

/// Seed used when the caller does not supply one.
pub const DEFAULT_SEED: u64 = 42;

/// One term of the RBF expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct Center {
    pub point: Point,
    pub coeff: Complex32,
    /// Kernel width ε > 0
    pub epsilon: f32,
    /// Anisotropic distance metric; the field's global metric when absent
    pub metric: Option<Box<Metric>>,
}

impl Center {
    pub fn new(point: Point, coeff: Complex32, epsilon: f32) -> TcdeResult<Self> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(TcdeError::InvalidArgument(format!(
                "epsilon must be positive and finite, got {epsilon}"
            )));
        }
        if !point.is_finite() {
            return Err(TcdeError::InvalidArgument(
                "center coordinates must be finite".to_string(),
            ));
        }
        if !complex::is_finite(coeff) {
            return Err(TcdeError::InvalidArgument(
                "center coefficient must be finite".to_string(),
            ));
        }
        Ok(Center {
            point,
            coeff,
            epsilon,
            metric: None,
        })
    }

    /// Attach a per-center metric. It must be valid.
    pub fn with_metric(mut self, metric: Metric) -> TcdeResult<Self> {
        if !metric.is_valid() {
            return Err(TcdeError::SingularMetric { det: metric.det() });
        }
        self.metric = Some(Box::new(metric));
        Ok(self)
    }

    /// The metric this center measures distance with.
    #[inline]
    pub fn metric_or<'a>(&'a self, global: &'a Metric) -> &'a Metric {
        self.metric.as_deref().unwrap_or(global)
    }
}

/// The 6D complex RBF field.
#[derive(Debug, Clone)]
pub struct Field {
    centers: Vec<Center>,
    capacity: usize,
    metric: Metric,
    kind: RbfKind,
    fractal_dimension: f32,
    time: f32,
    energy_cache: Cell<Option<f32>>,
    rng: StdRng,
    seed: u64,
    generation: u64,
}

impl Field {
    /// Empty field with the identity metric, Gaussian kernel and seed 42.
    pub fn new(capacity: usize, fractal_dimension: f32) -> Self {
        Field {
            centers: Vec::with_capacity(capacity.min(4096)),
            capacity,
            metric: Metric::identity(),
            kind: RbfKind::Gaussian,
            fractal_dimension,
            time: 0.0,
            energy_cache: Cell::new(None),
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            seed: DEFAULT_SEED,
            generation: 0,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> TcdeResult<Self> {
        config.validate()?;
        let metric = Metric::diagonal(config.base_metric);
        Field::new(config.capacity, config.fractal_dimension)
            .with_kernel(config.kernel)
            .with_seed(config.seed)
            .with_metric(metric)
    }

    pub fn with_kernel(mut self, kind: RbfKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.reseed(seed);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> TcdeResult<Self> {
        self.set_metric(metric)?;
        Ok(self)
    }

    /// Restart the PRNG stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Add a center; returns its index. The field is unchanged on error.
    pub fn add_center(&mut self, point: Point, coeff: Complex32, epsilon: f32) -> TcdeResult<usize> {
        self.push_center(Center::new(point, coeff, epsilon)?)
    }

    pub fn add_center_with_metric(
        &mut self,
        point: Point,
        coeff: Complex32,
        epsilon: f32,
        metric: Metric,
    ) -> TcdeResult<usize> {
        self.push_center(Center::new(point, coeff, epsilon)?.with_metric(metric)?)
    }

    pub fn push_center(&mut self, center: Center) -> TcdeResult<usize> {
        if self.centers.len() >= self.capacity {
            return Err(TcdeError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        if !(center.epsilon.is_finite() && center.epsilon > 0.0) {
            return Err(TcdeError::InvalidArgument(format!(
                "epsilon must be positive and finite, got {}",
                center.epsilon
            )));
        }
        self.centers.push(center);
        self.touch();
        Ok(self.centers.len() - 1)
    }

    /// Swap-remove the center at `index`. Out of range is a no-op.
    pub fn remove_center(&mut self, index: usize) -> bool {
        if index >= self.centers.len() {
            return false;
        }
        self.centers.swap_remove(index);
        self.touch();
        true
    }

    /// Σ|c_i|², accumulated in f64 and cached until the next mutation.
    pub fn energy(&self) -> f32 {
        if let Some(e) = self.energy_cache.get() {
            return e;
        }
        let e = self
            .centers
            .iter()
            .map(|c| complex::widen(c.coeff).norm_sqr())
            .sum::<f64>() as f32;
        self.energy_cache.set(Some(e));
        e
    }

    pub fn energy_cached(&self) -> bool {
        self.energy_cache.get().is_some()
    }

    pub fn set_coefficient(&mut self, index: usize, coeff: Complex32) -> TcdeResult<()> {
        let len = self.centers.len();
        let center = self
            .centers
            .get_mut(index)
            .ok_or(TcdeError::IndexOutOfRange { index, len })?;
        center.coeff = coeff;
        self.energy_cache.set(None);
        Ok(())
    }

    /// Replace the global metric. Per-center metrics are untouched.
    pub fn set_metric(&mut self, metric: Metric) -> TcdeResult<()> {
        if !metric.is_valid() {
            return Err(TcdeError::SingularMetric { det: metric.det() });
        }
        self.metric = metric;
        self.generation += 1;
        Ok(())
    }

    /// Mutable access to the centers. Invalidates the energy cache and
    /// bumps the generation.
    pub fn centers_mut(&mut self) -> &mut [Center] {
        self.touch();
        &mut self.centers
    }

    /// Coefficient-only mutation: invalidates the energy cache but keeps
    /// spatial indices current.
    pub(crate) fn coefficients_mut(&mut self) -> impl Iterator<Item = &mut Complex32> + '_ {
        self.energy_cache.set(None);
        self.centers.iter_mut().map(|c| &mut c.coeff)
    }

    pub(crate) fn metric_mut(&mut self) -> &mut Metric {
        self.generation += 1;
        &mut self.metric
    }

    pub(crate) fn advance_time(&mut self, dt: f32) {
        self.time += dt;
        self.energy_cache.set(None);
    }

    fn touch(&mut self) {
        self.energy_cache.set(None);
        self.generation += 1;
    }

    pub fn centers(&self) -> &[Center] {
        &self.centers
    }

    pub fn center(&self, index: usize) -> Option<&Center> {
        self.centers.get(index)
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    pub fn kernel(&self) -> RbfKind {
        self.kind
    }

    pub fn fractal_dimension(&self) -> f32 {
        self.fractal_dimension
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn has_local_metrics(&self) -> bool {
        self.centers.iter().any(|c| c.metric.is_some())
    }

    /// Bitwise equality of positions, coefficients and widths.
    pub fn same_state(&self, other: &Field) -> bool {
        self.centers.len() == other.centers.len()
            && self.time.to_bits() == other.time.to_bits()
            && self.centers.iter().zip(&other.centers).all(|(a, b)| {
                a.coeff.re.to_bits() == b.coeff.re.to_bits()
                    && a.coeff.im.to_bits() == b.coeff.im.to_bits()
                    && a.epsilon.to_bits() == b.epsilon.to_bits()
                    && a.point == b.point
            })
    }
}
