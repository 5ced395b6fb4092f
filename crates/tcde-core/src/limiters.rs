// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Limiters
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Post-step clamps on ε, metric determinant, amplitude, energy and gradient.
//!
//! The stack always runs in the order ε → metric → amplitude → energy →
//! gradient. Each limiter leaves state it does not need to touch alone, so a
//! field already inside every bound keeps its spatial-index generation.

use tcde_math::complex::{self, Complex32};
use tcde_math::metric::Metric;
use tcde_types::config::LimiterConfig;
use tcde_types::constants::DIM;
use tcde_types::state::{LimiterReport, LimiterStats};

use crate::field::Field;

/// Rescale rounds for an out-of-range metric determinant.
const METRIC_ROUNDS: usize = 3;

/// Relative margin kept inside the determinant bounds after rescaling.
const DET_MARGIN: f64 = 1e-4;

/// Relative margin below amplitude and energy caps, absorbing f32 rounding.
const CAP_MARGIN: f32 = 4.0 * f32::EPSILON;

#[derive(Debug, Clone, Default)]
pub struct Limiters {
    config: LimiterConfig,
    stats: LimiterStats,
}

impl Limiters {
    pub fn new(config: LimiterConfig) -> Self {
        Limiters {
            config,
            stats: LimiterStats::default(),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn stats(&self) -> &LimiterStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = LimiterStats::default();
    }

    /// Clamp every ε into [ε_min, ε_max].
    pub fn limit_epsilon(&mut self, field: &mut Field) -> usize {
        let (lo, hi) = (self.config.epsilon_min, self.config.epsilon_max);
        let outside = field
            .centers()
            .iter()
            .filter(|c| !(c.epsilon >= lo && c.epsilon <= hi))
            .count();
        if outside == 0 {
            return 0;
        }
        for c in field.centers_mut() {
            if c.epsilon.is_nan() {
                c.epsilon = lo;
            } else {
                c.epsilon = c.epsilon.clamp(lo, hi);
            }
        }
        self.stats.epsilon_clips += outside;
        outside
    }

    /// Bring the global metric and every per-center metric into
    /// [det_min, det_max], regularising singular ones first.
    pub fn limit_metric(&mut self, field: &mut Field) -> usize {
        let (lo, hi) = (self.config.metric_det_min, self.config.metric_det_max);
        let mut clips = 0;

        if let Some(bounded) = bounded_metric(field.metric(), lo, hi) {
            *field.metric_mut() = bounded;
            clips += 1;
        }

        let replacements: Vec<(usize, Metric)> = field
            .centers()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                c.metric
                    .as_deref()
                    .and_then(|m| bounded_metric(m, lo, hi))
                    .map(|m| (i, m))
            })
            .collect();
        if !replacements.is_empty() {
            let centers = field.centers_mut();
            for (i, m) in replacements {
                centers[i].metric = Some(Box::new(m));
                clips += 1;
            }
        }

        self.stats.metric_clips += clips;
        clips
    }

    /// Clip |c_i| to amplitude_max keeping the phase. Non-finite
    /// coefficients are zeroed.
    pub fn limit_amplitude(&mut self, field: &mut Field) -> usize {
        let max = self.config.amplitude_max;
        let needs_clip = |z: Complex32| !complex::is_finite(z) || z.norm() > max;
        let clips = field.centers().iter().filter(|c| needs_clip(c.coeff)).count();
        if clips == 0 {
            return 0;
        }
        let target = max * (1.0 - CAP_MARGIN);
        for c in field.coefficients_mut() {
            if !complex::is_finite(*c) {
                *c = complex::ZERO;
            } else if c.norm() > max {
                *c = complex::clamp_magnitude(*c, target);
            }
        }
        self.stats.amplitude_clips += clips;
        clips
    }

    /// Rescale every coefficient by √(E_max/E) when E exceeds E_max.
    /// Returns the factor applied, 1.0 when idle.
    pub fn limit_energy(&mut self, field: &mut Field) -> f32 {
        let max = self.config.energy_max;
        let energy = field.energy();
        if !(energy > max) {
            return 1.0;
        }
        let mut scale = (max / energy).sqrt() * (1.0 - CAP_MARGIN);
        scale_coefficients(field, scale);
        let after = field.energy();
        if after > max {
            let extra = (max / after).sqrt() * (1.0 - CAP_MARGIN);
            scale_coefficients(field, extra);
            scale *= extra;
        }
        self.stats.energy_clips += 1;
        scale
    }

    /// Scale down any center whose local ‖∇Φ‖ exceeds grad_max. All norms are
    /// taken before any coefficient changes.
    pub fn limit_gradient(&mut self, field: &mut Field) -> usize {
        let max = self.config.grad_max;
        let factors: Vec<f32> = field
            .centers()
            .iter()
            .map(|c| {
                let norm = field.gradient_norm(&c.point);
                if norm > max {
                    max / norm
                } else {
                    1.0
                }
            })
            .collect();
        let clips = factors.iter().filter(|&&f| f < 1.0).count();
        if clips == 0 {
            return 0;
        }
        for (c, f) in field.coefficients_mut().zip(factors) {
            if f < 1.0 {
                *c *= f;
            }
        }
        self.stats.gradient_clips += clips;
        clips
    }

    /// The full stack in its fixed order.
    pub fn apply_all(&mut self, field: &mut Field) -> LimiterReport {
        let report = LimiterReport {
            epsilon_clips: self.limit_epsilon(field),
            metric_clips: self.limit_metric(field),
            amplitude_clips: self.limit_amplitude(field),
            energy_scale: self.limit_energy(field),
            gradient_clips: self.limit_gradient(field),
        };
        self.stats.passes += 1;
        if report.any_active() {
            log::debug!(
                "limiters active at t={}: eps={} metric={} amp={} energy_scale={:.4} grad={}",
                field.time(),
                report.epsilon_clips,
                report.metric_clips,
                report.amplitude_clips,
                report.energy_scale,
                report.gradient_clips
            );
        }
        report
    }

    /// True when every coefficient is finite and the ε, amplitude, energy and
    /// metric-determinant bounds all hold. The gradient bound is not checked.
    pub fn check_limits(&self, field: &Field) -> bool {
        let cfg = &self.config;
        let det_ok = |m: &Metric| {
            m.is_valid()
                && m.det() >= cfg.metric_det_min as f64
                && m.det() <= cfg.metric_det_max as f64
        };
        let centers_ok = field.centers().iter().all(|c| {
            complex::is_finite(c.coeff)
                && c.coeff.norm() <= cfg.amplitude_max
                && c.epsilon >= cfg.epsilon_min
                && c.epsilon <= cfg.epsilon_max
                && c.metric.as_deref().map_or(true, det_ok)
        });
        centers_ok && field.energy() <= cfg.energy_max && det_ok(field.metric())
    }

    /// Retune the caps from the field's current statistics: energy and
    /// amplitude caps to twice the present value over the safety factor, the
    /// ε range widened to [½·min ε, 2·max ε]. No-op unless `auto_adjust` is
    /// set and the field has centers.
    pub fn auto_adjust(&mut self, field: &Field) -> bool {
        if !self.config.auto_adjust || field.is_empty() {
            return false;
        }
        let mut max_amp = 0.0f32;
        let mut eps_lo = f32::INFINITY;
        let mut eps_hi = 0.0f32;
        for c in field.centers() {
            max_amp = max_amp.max(c.coeff.norm());
            eps_lo = eps_lo.min(c.epsilon);
            eps_hi = eps_hi.max(c.epsilon);
        }
        let safety = self.config.safety_factor;
        let energy_cap = field.energy() * 2.0 / safety;
        let amp_cap = max_amp * 2.0 / safety;

        // A zero cap would freeze the field at zero.
        if energy_cap.is_finite() && energy_cap > 0.0 {
            self.config.energy_max = energy_cap;
        }
        if amp_cap.is_finite() && amp_cap > 0.0 {
            self.config.amplitude_max = amp_cap;
        }
        self.config.epsilon_min = eps_lo * 0.5;
        self.config.epsilon_max = eps_hi * 2.0;
        log::info!(
            "limiters retuned: energy_max={:.3e} amplitude_max={:.3e} epsilon=[{:.3e}, {:.3e}]",
            self.config.energy_max,
            self.config.amplitude_max,
            self.config.epsilon_min,
            self.config.epsilon_max
        );
        true
    }
}

fn scale_coefficients(field: &mut Field, scale: f32) {
    for c in field.coefficients_mut() {
        *c *= scale;
    }
}

/// A copy of `metric` moved inside [lo, hi], or `None` if it already is.
fn bounded_metric(metric: &Metric, lo: f32, hi: f32) -> Option<Metric> {
    let (lo, hi) = (lo as f64, hi as f64);
    let in_bounds = |m: &Metric| m.is_valid() && m.det() >= lo && m.det() <= hi;
    if in_bounds(metric) {
        return None;
    }
    let mut m = if metric.is_valid() {
        metric.clone()
    } else {
        metric.regularized(lo as f32)
    };
    for _ in 0..METRIC_ROUNDS {
        if in_bounds(&m) {
            break;
        }
        let det = m.det();
        if !(det.is_finite() && det > 0.0) {
            m = Metric::identity();
            continue;
        }
        let target = if det < lo {
            lo * (1.0 + DET_MARGIN)
        } else {
            hi * (1.0 - DET_MARGIN)
        };
        // det(s·g) = s⁶·det(g)
        let factor = (target / det).powf(1.0 / DIM as f64) as f32;
        m = m.scaled(factor);
    }
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcde_math::complex::ONE;
    use tcde_types::state::Point;

    fn spread_field(n: usize, coeff: Complex32, eps: f32) -> Field {
        let mut field = Field::new(64, 2.5);
        for i in 0..n {
            let x = 0.1 + 0.2 * i as f32;
            field
                .add_center(Point::new([x, 0.5, 0.5, 1.0, 0.0, 0.4]), coeff, eps)
                .unwrap();
        }
        field
    }

    #[test]
    fn test_idle_stack_changes_nothing() {
        let mut field = spread_field(4, Complex32::new(0.5, 0.2), 0.1);
        let before = field.clone();
        let generation = field.generation();
        let mut limiters = Limiters::default();
        let report = limiters.apply_all(&mut field);
        assert!(!report.any_active());
        assert!(field.same_state(&before));
        assert_eq!(field.generation(), generation);
        assert_eq!(limiters.stats().passes, 1);
        assert_eq!(limiters.stats().total_clips(), 0);
    }

    #[test]
    fn test_epsilon_clamped() {
        let mut field = spread_field(3, ONE, 0.1);
        field.centers_mut()[0].epsilon = 0.001;
        field.centers_mut()[2].epsilon = 50.0;
        let mut limiters = Limiters::default();
        assert_eq!(limiters.limit_epsilon(&mut field), 2);
        assert!((field.centers()[0].epsilon - 0.01).abs() < 1e-9);
        assert!((field.centers()[2].epsilon - 10.0).abs() < 1e-6);
        assert_eq!(limiters.stats().epsilon_clips, 2);
    }

    #[test]
    fn test_amplitude_preserves_phase() {
        let mut field = spread_field(2, ONE, 0.1);
        let big = complex::polar(500.0, 0.7);
        field.set_coefficient(1, big).unwrap();
        let mut limiters = Limiters::default();
        assert_eq!(limiters.limit_amplitude(&mut field), 1);
        let c = field.centers()[1].coeff;
        assert!(c.norm() <= 100.0);
        assert!((c.norm() - 100.0).abs() < 1e-3);
        assert!((c.arg() - 0.7).abs() < 1e-5);
        assert_eq!(field.centers()[0].coeff, ONE);
    }

    #[test]
    fn test_amplitude_zeroes_non_finite() {
        let mut field = spread_field(2, ONE, 0.1);
        field
            .set_coefficient(0, Complex32::new(f32::NAN, 0.0))
            .unwrap();
        let mut limiters = Limiters::default();
        limiters.limit_amplitude(&mut field);
        assert_eq!(field.centers()[0].coeff, complex::ZERO);
    }

    #[test]
    fn test_energy_capped() {
        let mut field = spread_field(8, Complex32::new(60.0, 60.0), 0.1);
        let mut limiters = Limiters::default();
        let scale = limiters.limit_energy(&mut field);
        assert!(scale < 1.0);
        assert!(field.energy() <= 1.0e4);
        assert!(field.energy() > 0.99e4);
        assert_eq!(limiters.stats().energy_clips, 1);
    }

    #[test]
    fn test_gradient_limiter_scales_steep_centers() {
        let mut field = spread_field(2, Complex32::new(50.0, 0.0), 0.01);
        let cfg = LimiterConfig {
            grad_max: 10.0,
            ..LimiterConfig::default()
        };
        let mut limiters = Limiters::new(cfg);
        // Gradient vanishes exactly at an isolated Gaussian's own center; probe
        // the clip through a neighbour that sits on the flank.
        field
            .add_center(
                Point::new([0.105, 0.5, 0.5, 1.0, 0.0, 0.4]),
                Complex32::new(1.0, 0.0),
                0.01,
            )
            .unwrap();
        let clips = limiters.limit_gradient(&mut field);
        assert!(clips >= 1);
        assert!(limiters.stats().gradient_clips >= 1);
    }

    #[test]
    fn test_metric_determinant_restored() {
        let mut field = spread_field(1, ONE, 0.1);
        field.set_metric(Metric::diagonal([30.0; 6])).unwrap();
        field.centers_mut()[0].metric = Some(Box::new(Metric::diagonal([0.05; 6])));
        let mut limiters = Limiters::default();
        assert_eq!(limiters.limit_metric(&mut field), 2);
        let det = field.metric().det();
        assert!(det <= 1.0e6 && det >= 0.99e6);
        let local = field.centers()[0].metric.as_deref().unwrap();
        assert!(local.det() >= 1.0e-6);
        assert!(limiters.check_limits(&field));
    }

    #[test]
    fn test_check_limits_detects_violation() {
        let mut field = spread_field(3, ONE, 0.1);
        let limiters = Limiters::default();
        assert!(limiters.check_limits(&field));
        field.set_coefficient(0, Complex32::new(200.0, 0.0)).unwrap();
        assert!(!limiters.check_limits(&field));
    }

    #[test]
    fn test_apply_all_restores_invariants() {
        let mut field = spread_field(6, Complex32::new(80.0, 70.0), 0.1);
        field.centers_mut()[1].epsilon = 20.0;
        let mut limiters = Limiters::default();
        let report = limiters.apply_all(&mut field);
        assert!(report.any_active());
        assert!(limiters.check_limits(&field));
        limiters.reset_stats();
        assert_eq!(*limiters.stats(), LimiterStats::default());
    }

    #[test]
    fn test_auto_adjust_respects_flag() {
        let field = spread_field(4, Complex32::new(2.0, 0.0), 0.2);
        let mut off = Limiters::new(LimiterConfig {
            auto_adjust: false,
            ..LimiterConfig::default()
        });
        assert!(!off.auto_adjust(&field));
        assert_eq!(*off.config(), LimiterConfig {
            auto_adjust: false,
            ..LimiterConfig::default()
        });

        let mut on = Limiters::default();
        assert!(on.auto_adjust(&field));
        assert!((on.config().energy_max - 16.0 * 2.0 / 0.8).abs() < 1e-3);
        assert!((on.config().amplitude_max - 2.0 * 2.0 / 0.8).abs() < 1e-4);
        assert!((on.config().epsilon_min - 0.1).abs() < 1e-6);
        assert!((on.config().epsilon_max - 0.4).abs() < 1e-6);
        assert!(on.check_limits(&field));
    }
}
