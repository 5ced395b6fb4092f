//! Step-doubling Δt control around [`TdeStepper`].
//!
//! Each attempt advances two copies of the field, one by Δt and one by two
//! Δt/2 steps. Their relative difference estimates the local error. Accepted
//! steps keep the two-half-step result; Δt halves on rejection and doubles
//! when the error is well under tolerance.

use tcde_types::config::{AdaptiveStepConfig, SimulationConfig};
use tcde_types::error::{TcdeError, TcdeResult};
use tcde_types::state::{AdaptiveStepReport, LimiterReport, StepReport};

use crate::evolution::TdeStepper;
use crate::field::Field;

/// Error below tolerance/GROWTH_MARGIN lets Δt double.
const GROWTH_MARGIN: f32 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveStepper {
    dt: f32,
    last_error: f32,
    config: AdaptiveStepConfig,
}

impl AdaptiveStepper {
    /// Starts from `initial_dt` clamped into [dt_min, dt_max].
    pub fn new(config: AdaptiveStepConfig, initial_dt: f32) -> TcdeResult<Self> {
        config.validate()?;
        if !initial_dt.is_finite() {
            return Err(TcdeError::InvalidArgument(format!(
                "initial dt must be finite, got {initial_dt}"
            )));
        }
        Ok(AdaptiveStepper {
            dt: initial_dt.clamp(config.dt_min, config.dt_max),
            last_error: 0.0,
            config,
        })
    }

    pub fn from_config(config: &SimulationConfig) -> TcdeResult<Self> {
        Self::new(config.adaptive_step, config.evolution.dt)
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn last_error(&self) -> f32 {
        self.last_error
    }

    pub fn config(&self) -> &AdaptiveStepConfig {
        &self.config
    }

    /// Advance `field` by one accepted step. When no Δt in range meets the
    /// tolerance the step is taken at dt_min and reported as not converged.
    pub fn step(
        &mut self,
        stepper: &mut TdeStepper,
        field: &mut Field,
    ) -> TcdeResult<AdaptiveStepReport> {
        let cfg = self.config;
        let mut dt = self.dt;
        let mut rejections = 0usize;
        let mut error = f32::INFINITY;

        for _ in 0..cfg.max_attempts {
            let attempt = try_pair(stepper, field, dt);
            match attempt {
                Some(trial) if trial.error <= cfg.tolerance => {
                    let dt_next = if trial.error < cfg.tolerance / GROWTH_MARGIN {
                        (dt * 2.0).min(cfg.dt_max)
                    } else {
                        dt
                    };
                    if dt_next != dt {
                        log::debug!("adaptive dt {dt:e} -> {dt_next:e} (error {:e})", trial.error);
                    }
                    *field = trial.field;
                    *stepper = trial.stepper;
                    self.dt = dt_next;
                    self.last_error = trial.error;
                    return Ok(AdaptiveStepReport {
                        dt_taken: dt,
                        dt_next,
                        error: trial.error,
                        rejections,
                        converged: true,
                        step: trial.report,
                    });
                }
                Some(trial) => error = trial.error,
                None => error = f32::INFINITY,
            }
            rejections += 1;
            let halved = dt * 0.5;
            if halved < cfg.dt_min {
                break;
            }
            log::debug!("adaptive dt {dt:e} -> {halved:e} (error {error:e})");
            dt = halved;
        }

        log::warn!(
            "adaptive step missed tolerance {:e} (error {error:e}); forcing dt_min={:e}",
            cfg.tolerance,
            cfg.dt_min
        );
        let step = stepper
            .step_with_dt(field, cfg.dt_min)
            .map_err(|_| TcdeError::NonConvergentStep {
                dt: cfg.dt_min,
                error,
            })?;
        self.dt = cfg.dt_min;
        self.last_error = error;
        Ok(AdaptiveStepReport {
            dt_taken: cfg.dt_min,
            dt_next: cfg.dt_min,
            error,
            rejections,
            converged: false,
            step,
        })
    }
}

struct Trial {
    field: Field,
    stepper: TdeStepper,
    report: StepReport,
    error: f32,
}

/// One Δt step against two Δt/2 steps, both on copies. `None` when either
/// path fails.
fn try_pair(stepper: &TdeStepper, field: &Field, dt: f32) -> Option<Trial> {
    let mut full = field.clone();
    stepper.clone().step_with_dt(&mut full, dt).ok()?;

    let mut half = field.clone();
    let mut half_stepper = stepper.clone();
    let first = half_stepper.step_with_dt(&mut half, 0.5 * dt).ok()?;
    let second = half_stepper.step_with_dt(&mut half, 0.5 * dt).ok()?;

    let error = relative_difference(&full, &half);
    Some(Trial {
        field: half,
        stepper: half_stepper,
        report: merge(first, second, dt),
        error,
    })
}

/// max|a_i − b_i| / max|b_i|.
fn relative_difference(a: &Field, b: &Field) -> f32 {
    let mut diff = 0.0f32;
    let mut scale = 0.0f32;
    for (ca, cb) in a.centers().iter().zip(b.centers()) {
        diff = diff.max((ca.coeff - cb.coeff).norm());
        scale = scale.max(cb.coeff.norm());
    }
    if scale > f32::MIN_POSITIVE {
        diff / scale
    } else {
        diff
    }
}

fn merge(first: StepReport, second: StepReport, dt: f32) -> StepReport {
    StepReport {
        time: second.time,
        dt,
        energy_before: first.energy_before,
        energy_after: second.energy_after,
        max_delta: first.max_delta.max(second.max_delta),
        recovered: first.recovered + second.recovered,
        limiter: LimiterReport {
            epsilon_clips: first.limiter.epsilon_clips + second.limiter.epsilon_clips,
            metric_clips: first.limiter.metric_clips + second.limiter.metric_clips,
            amplitude_clips: first.limiter.amplitude_clips + second.limiter.amplitude_clips,
            energy_scale: first.limiter.energy_scale * second.limiter.energy_scale,
            gradient_clips: first.limiter.gradient_clips + second.limiter.gradient_clips,
        },
    }
}
