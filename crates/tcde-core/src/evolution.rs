// ─────────────────────────────────────────────────────────────────────
// TCDE Core — TDE Stepper
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! One explicit Euler step of ∂_t Φ = D·∇²_g Φ − α|Φ|²Φ + β·T(Φ) + γ·C(Φ).
//!
//! Every term is evaluated against a snapshot of the field taken at step
//! start, so the update of one center never sees another center's new
//! coefficient. The snapshot doubles as the rollback target when the step
//! cannot be completed.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tcde_math::complex::{self, Complex32};
use tcde_math::metric::Metric;
use tcde_types::config::{
    AdaptationParams, EvolutionParams, LimiterConfig, SimulationConfig, SAFE_DIFFUSION,
};
use tcde_types::error::{TcdeError, TcdeResult};
use tcde_types::state::{Point, StepReport};

use crate::adaptive_metric::AdaptiveMetric;
use crate::coupling::contextual_coupling;
use crate::differential::{laplace_beltrami_fast, torsion_from, torsion_norm_from};
use crate::evaluator::{to_f64, Weighting};
use crate::field::Field;
use crate::geometry::LocalGeometry;
use crate::limiters::Limiters;

/// Imaginary weight of the torsion contribution ‖T‖·(1 + iw).
const TORSION_PHASE: f32 = 0.1;

/// Fractal dimension above which `configure_parameters` boosts diffusion.
const HIGH_FRACTAL_DIMENSION: f32 = 2.5;
const HIGH_DIMENSION_DIFFUSION_BOOST: f32 = 1.2;

/// Reference energy E₀ and width σ_E of the temporal-dimension map.
const TEMPORAL_E0: f32 = 1.0;
const TEMPORAL_SIGMA: f32 = 0.5;
const TEMPORAL_MAX: f32 = 1.999;

/// The four right-hand-side terms at one center, before weighting.
/// Terms whose coefficient is zero are not evaluated and stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TdeTerms {
    /// ∇²_g Φ with normalized kernel derivatives
    pub diffusion: Complex32,
    /// |Φ|²Φ
    pub nonlinear: Complex32,
    /// ‖T‖·(1 + 0.1i)
    pub torsion: Complex32,
    /// Monte-Carlo C(Φ)
    pub coupling: Complex32,
}

impl TdeTerms {
    /// D·L − α·N + β·T + γ·C.
    pub fn rhs(&self, params: &EvolutionParams) -> Complex32 {
        self.diffusion * params.diffusion - self.nonlinear * params.alpha
            + self.torsion * params.beta
            + self.coupling * params.gamma
    }
}

/// The TDE stepper. Holds parameters and the limiter stack; all evolving
/// state lives in the [`Field`].
#[derive(Debug, Clone)]
pub struct TdeStepper {
    params: EvolutionParams,
    adaptation: AdaptationParams,
    limiters: Limiters,
}

impl TdeStepper {
    pub fn new(
        params: EvolutionParams,
        adaptation: AdaptationParams,
        limiter_config: LimiterConfig,
    ) -> TcdeResult<Self> {
        params.validate()?;
        adaptation.validate()?;
        limiter_config.validate()?;
        warn_out_of_range(&params);
        Ok(TdeStepper {
            params,
            adaptation,
            limiters: Limiters::new(limiter_config),
        })
    }

    pub fn from_config(config: &SimulationConfig) -> TcdeResult<Self> {
        Self::new(config.evolution, config.adaptation, config.limiters)
    }

    pub fn params(&self) -> &EvolutionParams {
        &self.params
    }

    pub fn set_params(&mut self, params: EvolutionParams) -> TcdeResult<()> {
        params.validate()?;
        warn_out_of_range(&params);
        self.params = params;
        Ok(())
    }

    pub fn adaptation(&self) -> &AdaptationParams {
        &self.adaptation
    }

    pub fn limiters(&self) -> &Limiters {
        &self.limiters
    }

    pub fn limiters_mut(&mut self) -> &mut Limiters {
        &mut self.limiters
    }

    /// The four terms at center `index`, drawing coupling samples from `rng`.
    pub fn terms_at(&self, field: &Field, index: usize, rng: &mut StdRng) -> TcdeResult<TdeTerms> {
        let center = field.center(index).ok_or(TcdeError::IndexOutOfRange {
            index,
            len: field.len(),
        })?;
        let mf = AdaptiveMetric::new(field, self.adaptation);
        Ok(self.center_terms(field, &mf, &center.point, rng))
    }

    fn center_terms(
        &self,
        field: &Field,
        mf: &AdaptiveMetric<'_>,
        point: &Point,
        rng: &mut StdRng,
    ) -> TdeTerms {
        let p = &self.params;
        let x = to_f64(point);
        let geo = LocalGeometry::at(mf, &x, self.limiters.config().metric_det_min);

        let jet = field.jet_at(&x, Weighting::Normalized);
        let diffusion = complex::narrow(laplace_beltrami_fast(&jet, &geo));
        let phi = jet.value;
        let nonlinear = complex::narrow(phi * phi.norm_sqr());

        let torsion = if p.beta != 0.0 {
            let unit = field.jet_at(&x, Weighting::Unit);
            let norm = torsion_norm_from(&torsion_from(&unit, &geo)) as f32;
            Complex32::new(norm, TORSION_PHASE * norm)
        } else {
            complex::ZERO
        };

        let coupling = if p.gamma != 0.0 {
            let frozen = Metric::from_components(&geo.metric);
            contextual_coupling(field, &frozen, point, p.sigma, p.mc_samples, p.coupling, rng)
        } else {
            complex::ZERO
        };

        TdeTerms {
            diffusion,
            nonlinear,
            torsion,
            coupling,
        }
    }

    /// One step with the configured Δt.
    pub fn step(&mut self, field: &mut Field) -> TcdeResult<StepReport> {
        self.step_with_dt(field, self.params.dt)
    }

    /// One step of size `dt`. On failure the field is restored to its state
    /// at step start.
    pub fn step_with_dt(&mut self, field: &mut Field, dt: f32) -> TcdeResult<StepReport> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(TcdeError::InvalidArgument(format!(
                "time step must be positive and finite, got {dt}"
            )));
        }
        let energy_before = field.energy();
        if field.is_empty() {
            field.advance_time(dt);
            return Ok(StepReport {
                time: field.time(),
                dt,
                energy_before,
                energy_after: energy_before,
                max_delta: 0.0,
                recovered: 0,
                limiter: self.limiters.apply_all(field),
            });
        }

        let snapshot = field.clone();
        let mf = AdaptiveMetric::new(&snapshot, self.adaptation);
        let mut updated = Vec::with_capacity(snapshot.len());
        for center in snapshot.centers() {
            let terms = self.center_terms(&snapshot, &mf, &center.point, field.rng_mut());
            updated.push(center.coeff + terms.rhs(&self.params) * dt);
        }

        let mut max_delta = 0.0f32;
        let mut recovered = 0usize;
        for (new, center) in updated.iter_mut().zip(snapshot.centers()) {
            if complex::is_finite(*new) {
                max_delta = max_delta.max((*new - center.coeff).norm());
            } else {
                *new = center.coeff;
                recovered += 1;
            }
        }
        if recovered == snapshot.len() {
            let time = snapshot.time();
            *field = snapshot;
            log::warn!("step at t={time} rolled back: every center update was non-finite");
            return Err(TcdeError::StepFailed {
                time,
                message: "all center updates non-finite".to_string(),
            });
        }
        if recovered > 0 {
            log::warn!(
                "t={}: {recovered} non-finite center update(s) replaced by previous coefficients",
                snapshot.time()
            );
        }

        for (c, new) in field.coefficients_mut().zip(updated) {
            *c = new;
        }
        field.advance_time(dt);
        let limiter = self.limiters.apply_all(field);

        if field.centers().iter().any(|c| !complex::is_finite(c.coeff)) {
            let time = snapshot.time();
            *field = snapshot;
            log::warn!("step at t={time} rolled back: limiters left non-finite coefficients");
            return Err(TcdeError::StepFailed {
                time,
                message: "non-finite coefficients after limiting".to_string(),
            });
        }

        Ok(StepReport {
            time: field.time(),
            dt,
            energy_before,
            energy_after: field.energy(),
            max_delta,
            recovered,
            limiter,
        })
    }

    /// `steps` consecutive steps; stops at the first failure.
    pub fn evolve(&mut self, field: &mut Field, steps: usize) -> TcdeResult<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(steps);
        for _ in 0..steps {
            reports.push(self.step(field)?);
        }
        Ok(reports)
    }
}

fn warn_out_of_range(params: &EvolutionParams) {
    let names = params.out_of_safe_range();
    if !names.is_empty() {
        log::warn!("evolution parameters outside recommended range: {names:?}");
    }
}

/// Defaults adjusted to the field: diffusion ×1.2 above fractal dimension 2.5,
/// and ×√Ē when the mean energy per center Ē exceeds 1, capped at the top of
/// the recommended diffusion window.
pub fn configure_parameters(field: &Field) -> EvolutionParams {
    let mut params = EvolutionParams::default();
    if field.fractal_dimension() > HIGH_FRACTAL_DIMENSION {
        params.diffusion *= HIGH_DIMENSION_DIFFUSION_BOOST;
    }
    if !field.is_empty() {
        let mean = field.energy() / field.len() as f32;
        if mean > 1.0 {
            params.diffusion *= mean.sqrt();
        }
    }
    params.diffusion = params.diffusion.min(SAFE_DIFFUSION.1);
    params
}

/// Diffusion-dominated estimate dE/dt ≈ −D·E.
pub fn energy_dissipation_rate(field: &Field, params: &EvolutionParams) -> f32 {
    -params.diffusion * field.energy()
}

/// |E − E₀|/E₀ < tolerance. A zero reference only matches a zero field.
pub fn check_energy_conservation(field: &Field, initial_energy: f32, tolerance: f32) -> bool {
    let energy = field.energy();
    if initial_energy == 0.0 {
        return energy == 0.0;
    }
    ((energy - initial_energy) / initial_energy).abs() < tolerance
}

/// τ = 1 + ½(1 + tanh((E − 1)/0.5)), kept inside [1, 2).
pub fn temporal_dimension(field: &Field) -> f32 {
    let e = field.energy();
    let tau = 1.0 + 0.5 * (1.0 + ((e - TEMPORAL_E0) / TEMPORAL_SIGMA).tanh());
    tau.clamp(1.0, TEMPORAL_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tcde_math::complex::ONE;

    fn line_field(n: usize, coeff: Complex32) -> Field {
        let mut field = Field::new(32, 2.5);
        for i in 0..n {
            let x = 0.3 + 0.15 * i as f32;
            field
                .add_center(Point::new([x, 0.5, 0.5, 1.0, 0.0, 0.4]), coeff, 0.1)
                .unwrap();
        }
        field
    }

    fn stepper(params: EvolutionParams) -> TdeStepper {
        TdeStepper::new(params, AdaptationParams::default(), LimiterConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_field_only_advances_time() {
        let mut field = Field::new(10, 2.5);
        let mut s = stepper(EvolutionParams::default());
        let report = s.step(&mut field).unwrap();
        assert!(field.is_empty());
        assert!((field.time() - 0.01).abs() < 1e-9);
        assert_eq!(report.max_delta, 0.0);
        assert_eq!(report.energy_after, 0.0);
    }

    #[test]
    fn test_zero_coefficients_leave_field_fixed() {
        let mut field = line_field(3, Complex32::new(0.7, -0.2));
        let before = field.clone();
        let params = EvolutionParams {
            diffusion: 0.0,
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
            ..EvolutionParams::default()
        };
        let report = stepper(params).step(&mut field).unwrap();
        assert_eq!(report.max_delta, 0.0);
        for (a, b) in field.centers().iter().zip(before.centers()) {
            assert_eq!(a.coeff, b.coeff);
        }
    }

    #[test]
    fn test_diffusion_moves_coefficients() {
        let mut field = line_field(3, ONE);
        let params = EvolutionParams {
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
            ..EvolutionParams::default()
        };
        let report = stepper(params).step(&mut field).unwrap();
        assert!(report.max_delta > 0.0);
        assert_eq!(report.recovered, 0);
        assert!(field.centers().iter().all(|c| complex::is_finite(c.coeff)));
    }

    #[test]
    fn test_nonlinear_term_is_cubic() {
        let field = line_field(2, Complex32::new(0.8, 0.3));
        let s = stepper(EvolutionParams::default());
        let mut rng = StdRng::seed_from_u64(7);
        let terms = s.terms_at(&field, 0, &mut rng).unwrap();
        let phi = field.evaluate(&field.centers()[0].point);
        let expected = phi * phi.norm_sqr();
        assert!((terms.nonlinear - expected).norm() < 1e-5);
        assert!((terms.torsion.im - 0.1 * terms.torsion.re).abs() < 1e-6);
        assert!(s.terms_at(&field, 5, &mut rng).is_err());
    }

    #[test]
    fn test_rhs_weights_terms() {
        let terms = TdeTerms {
            diffusion: ONE,
            nonlinear: ONE,
            torsion: ONE,
            coupling: ONE,
        };
        let params = EvolutionParams::default();
        let expected = params.diffusion - params.alpha + params.beta + params.gamma;
        assert!((terms.rhs(&params).re - expected).abs() < 1e-7);
    }

    #[test]
    fn test_overflow_rolls_back() {
        let mut field = line_field(2, ONE);
        for i in 0..2 {
            field.set_coefficient(i, Complex32::new(1.0e15, 0.0)).unwrap();
        }
        let before = field.clone();
        let mut s = stepper(EvolutionParams::default());
        match s.step(&mut field) {
            Err(TcdeError::StepFailed { .. }) => {}
            other => panic!("expected StepFailed, got {other:?}"),
        }
        assert!(field.same_state(&before));
        assert_eq!(field.time(), 0.0);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = line_field(4, Complex32::new(0.9, 0.1)).with_seed(42);
        let mut b = a.clone();
        stepper(EvolutionParams::default()).evolve(&mut a, 3).unwrap();
        stepper(EvolutionParams::default()).evolve(&mut b, 3).unwrap();
        assert!(a.same_state(&b));
    }

    #[test]
    fn test_invalid_dt_rejected() {
        let mut field = line_field(1, ONE);
        let mut s = stepper(EvolutionParams::default());
        assert!(s.step_with_dt(&mut field, 0.0).is_err());
        assert!(s.step_with_dt(&mut field, f32::NAN).is_err());
        assert_eq!(field.time(), 0.0);
    }

    #[test]
    fn test_configure_parameters() {
        let low = Field::new(4, 2.0);
        assert!((configure_parameters(&low).diffusion - 0.08).abs() < 1e-7);

        let mut high = Field::new(4, 3.0);
        high.add_center(Point::origin(), ONE, 0.1).unwrap();
        assert!((configure_parameters(&high).diffusion - 0.096).abs() < 1e-6);

        let mut hot = Field::new(4, 2.0);
        hot.add_center(Point::origin(), Complex32::new(1.5, 0.0), 0.1)
            .unwrap();
        // mean energy 2.25 → ×1.5
        assert!((configure_parameters(&hot).diffusion - 0.12).abs() < 1e-6);

        let mut very_hot = Field::new(4, 3.0);
        very_hot
            .add_center(Point::origin(), Complex32::new(50.0, 0.0), 0.1)
            .unwrap();
        assert!((configure_parameters(&very_hot).diffusion - SAFE_DIFFUSION.1).abs() < 1e-7);
    }

    #[test]
    fn test_energy_diagnostics() {
        let field = line_field(2, ONE);
        let params = EvolutionParams::default();
        assert!((energy_dissipation_rate(&field, &params) + 0.16).abs() < 1e-6);
        assert!(check_energy_conservation(&field, 2.0, 1e-6));
        assert!(check_energy_conservation(&field, 2.1, 0.1));
        assert!(!check_energy_conservation(&field, 4.0, 0.1));

        let empty = Field::new(1, 2.5);
        assert!((temporal_dimension(&empty) - (1.0 + 0.5 * (1.0 + (-2.0f32).tanh()))).abs() < 1e-6);
        assert!((temporal_dimension(&line_field(1, ONE)) - 1.5).abs() < 1e-6);
        let tau = temporal_dimension(&line_field(3, Complex32::new(10.0, 0.0)));
        assert!(tau < 2.0 && tau >= 1.999);
    }

    #[test]
    fn test_diagnostics_serialize_to_json() {
        let mut field = line_field(2, ONE);
        let mut s = stepper(EvolutionParams::default());
        let mut rng = StdRng::seed_from_u64(7);
        let terms = s.terms_at(&field, 0, &mut rng).unwrap();
        let report = s.step(&mut field).unwrap();

        let json = serde_json::to_value((&terms, &report)).unwrap();
        assert!(json[0]["diffusion"].is_array());
        assert_eq!(json[1]["recovered"], 0);
        let back: StepReport = serde_json::from_value(json[1].clone()).unwrap();
        assert_eq!(back, report);
    }
}
