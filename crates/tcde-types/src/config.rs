// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{TcdeError, TcdeResult};

/// Radial profile shared by every center of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbfKind {
    #[default]
    Gaussian,
    Multiquadric,
    InverseMultiquadric,
}

/// Monte-Carlo estimator for the contextual coupling integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingStrategy {
    /// Uniform samples in the metric bounding box of the coupling radius.
    UniformBox,
    /// Samples drawn from the kernel itself, N(p, σ²g⁻¹).
    #[default]
    Importance,
}

/// Coefficients of ∂_t Φ = D·∇²_g Φ − α|Φ|²Φ + β·T(Φ) + γ·C(Φ).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvolutionParams {
    /// Time step Δt (default: 0.01)
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Diffusion coefficient D (default: 0.08)
    #[serde(default = "default_diffusion")]
    pub diffusion: f32,
    /// Cubic self-interaction α (default: 0.01)
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Torsion coupling β (default: 0.005)
    #[serde(default = "default_beta")]
    pub beta: f32,
    /// Contextual coupling γ (default: 0.02)
    #[serde(default = "default_gamma")]
    pub gamma: f32,
    /// Coupling kernel length σ (default: 0.2)
    #[serde(default = "default_sigma")]
    pub sigma: f32,
    /// Monte-Carlo samples per coupling evaluation (default: 32)
    #[serde(default = "default_mc_samples")]
    pub mc_samples: usize,
    #[serde(default)]
    pub coupling: CouplingStrategy,
}

fn default_dt() -> f32 {
    0.01
}
fn default_diffusion() -> f32 {
    0.08
}
fn default_alpha() -> f32 {
    0.01
}
fn default_beta() -> f32 {
    0.005
}
fn default_gamma() -> f32 {
    0.02
}
fn default_sigma() -> f32 {
    0.2
}
fn default_mc_samples() -> usize {
    32
}

impl Default for EvolutionParams {
    fn default() -> Self {
        EvolutionParams {
            dt: default_dt(),
            diffusion: default_diffusion(),
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            sigma: default_sigma(),
            mc_samples: default_mc_samples(),
            coupling: CouplingStrategy::default(),
        }
    }
}

/// Recommended operating window per coefficient.
pub const SAFE_DT: (f32, f32) = (0.001, 0.01);
pub const SAFE_DIFFUSION: (f32, f32) = (0.05, 0.2);
pub const SAFE_ALPHA: (f32, f32) = (0.01, 0.1);
pub const SAFE_BETA: (f32, f32) = (0.005, 0.05);
pub const SAFE_GAMMA: (f32, f32) = (0.01, 0.05);
pub const SAFE_SIGMA: (f32, f32) = (0.1, 0.3);

impl EvolutionParams {
    /// Reject values the stepper cannot run with at all.
    pub fn validate(&self) -> TcdeResult<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(TcdeError::ConfigError(format!(
                "dt must be positive and finite, got {}",
                self.dt
            )));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(TcdeError::ConfigError(format!(
                "sigma must be positive and finite, got {}",
                self.sigma
            )));
        }
        for (name, v) in [
            ("diffusion", self.diffusion),
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
        ] {
            if !v.is_finite() {
                return Err(TcdeError::ConfigError(format!("{name} must be finite")));
            }
        }
        if self.gamma != 0.0 && self.mc_samples == 0 {
            return Err(TcdeError::ConfigError(
                "mc_samples must be > 0 when gamma is non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Names of coefficients outside their recommended window.
    /// Zero disables a term and is never reported.
    pub fn out_of_safe_range(&self) -> Vec<&'static str> {
        let outside = |v: f32, (lo, hi): (f32, f32)| v != 0.0 && (v < lo || v > hi);
        let mut names = Vec::new();
        if outside(self.dt, SAFE_DT) {
            names.push("dt");
        }
        if outside(self.diffusion, SAFE_DIFFUSION) {
            names.push("diffusion");
        }
        if outside(self.alpha, SAFE_ALPHA) {
            names.push("alpha");
        }
        if outside(self.beta, SAFE_BETA) {
            names.push("beta");
        }
        if outside(self.gamma, SAFE_GAMMA) {
            names.push("gamma");
        }
        if outside(self.sigma, SAFE_SIGMA) {
            names.push("sigma");
        }
        names
    }
}

/// Metric feedback g = g⁰·(1 + α·tanh(β·|Φ|²)).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptationParams {
    /// Feedback strength α; 0 disables adaptation (default: 0.3)
    #[serde(default = "default_adapt_alpha")]
    pub alpha: f32,
    /// Saturation rate β (default: 2.0)
    #[serde(default = "default_adapt_beta")]
    pub beta: f32,
}

fn default_adapt_alpha() -> f32 {
    0.3
}
fn default_adapt_beta() -> f32 {
    2.0
}

impl Default for AdaptationParams {
    fn default() -> Self {
        AdaptationParams {
            alpha: default_adapt_alpha(),
            beta: default_adapt_beta(),
        }
    }
}

impl AdaptationParams {
    /// Adaptation with no feedback: the base metric everywhere.
    pub fn disabled() -> Self {
        AdaptationParams {
            alpha: 0.0,
            beta: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.alpha != 0.0 && self.beta != 0.0
    }

    /// The scale 1 + α·tanh(·) stays positive only for α > −1 and β ≥ 0.
    pub fn validate(&self) -> TcdeResult<()> {
        if !(self.alpha.is_finite() && self.alpha > -1.0) {
            return Err(TcdeError::ConfigError(format!(
                "adaptation alpha must be > -1, got {}",
                self.alpha
            )));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(TcdeError::ConfigError(format!(
                "adaptation beta must be >= 0, got {}",
                self.beta
            )));
        }
        Ok(())
    }
}

/// Bounds enforced after every step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_epsilon_min")]
    pub epsilon_min: f32,
    #[serde(default = "default_epsilon_max")]
    pub epsilon_max: f32,
    #[serde(default = "default_amplitude_max")]
    pub amplitude_max: f32,
    #[serde(default = "default_energy_max")]
    pub energy_max: f32,
    #[serde(default = "default_grad_max")]
    pub grad_max: f32,
    #[serde(default = "default_det_min")]
    pub metric_det_min: f32,
    #[serde(default = "default_det_max")]
    pub metric_det_max: f32,
    /// Allow `auto_adjust` to retune the caps (default: true)
    #[serde(default = "default_auto_adjust")]
    pub auto_adjust: bool,
    /// Headroom factor in (0, 1] used by `auto_adjust` (default: 0.8)
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f32,
}

fn default_epsilon_min() -> f32 {
    0.01
}
fn default_epsilon_max() -> f32 {
    10.0
}
fn default_amplitude_max() -> f32 {
    100.0
}
fn default_energy_max() -> f32 {
    1.0e4
}
fn default_grad_max() -> f32 {
    1.0e3
}
fn default_det_min() -> f32 {
    1.0e-6
}
fn default_det_max() -> f32 {
    1.0e6
}
fn default_auto_adjust() -> bool {
    true
}
fn default_safety_factor() -> f32 {
    0.8
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig {
            epsilon_min: default_epsilon_min(),
            epsilon_max: default_epsilon_max(),
            amplitude_max: default_amplitude_max(),
            energy_max: default_energy_max(),
            grad_max: default_grad_max(),
            metric_det_min: default_det_min(),
            metric_det_max: default_det_max(),
            auto_adjust: default_auto_adjust(),
            safety_factor: default_safety_factor(),
        }
    }
}

impl LimiterConfig {
    pub fn validate(&self) -> TcdeResult<()> {
        let positive = [
            ("epsilon_min", self.epsilon_min),
            ("epsilon_max", self.epsilon_max),
            ("amplitude_max", self.amplitude_max),
            ("energy_max", self.energy_max),
            ("grad_max", self.grad_max),
            ("metric_det_min", self.metric_det_min),
            ("metric_det_max", self.metric_det_max),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(TcdeError::ConfigError(format!(
                    "{name} must be positive and finite, got {v}"
                )));
            }
        }
        if self.epsilon_min > self.epsilon_max {
            return Err(TcdeError::ConfigError(format!(
                "epsilon range inverted: [{}, {}]",
                self.epsilon_min, self.epsilon_max
            )));
        }
        if self.metric_det_min > self.metric_det_max {
            return Err(TcdeError::ConfigError(format!(
                "metric determinant range inverted: [{}, {}]",
                self.metric_det_min, self.metric_det_max
            )));
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return Err(TcdeError::ConfigError(format!(
                "safety_factor must lie in (0, 1], got {}",
                self.safety_factor
            )));
        }
        Ok(())
    }
}

/// Step-doubling controller bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveStepConfig {
    #[serde(default = "default_dt_min")]
    pub dt_min: f32,
    #[serde(default = "default_dt_max")]
    pub dt_max: f32,
    /// Target relative error between one Δt step and two Δt/2 steps
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
    /// Halvings tried before falling back to `dt_min`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_dt_min() -> f32 {
    1.0e-4
}
fn default_dt_max() -> f32 {
    0.01
}
fn default_tolerance() -> f32 {
    1.0e-3
}
fn default_max_attempts() -> usize {
    10
}

impl Default for AdaptiveStepConfig {
    fn default() -> Self {
        AdaptiveStepConfig {
            dt_min: default_dt_min(),
            dt_max: default_dt_max(),
            tolerance: default_tolerance(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl AdaptiveStepConfig {
    pub fn validate(&self) -> TcdeResult<()> {
        if !(self.dt_min > 0.0 && self.dt_min <= self.dt_max && self.dt_max.is_finite()) {
            return Err(TcdeError::ConfigError(format!(
                "adaptive dt range invalid: [{}, {}]",
                self.dt_min, self.dt_max
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(TcdeError::ConfigError(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_attempts == 0 {
            return Err(TcdeError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to build and evolve one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Maximum number of centers (default: 1024)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Fractal dimension; configuration only, never evolved (default: 2.5)
    #[serde(default = "default_fractal_dimension")]
    pub fractal_dimension: f32,
    /// Seed of the field-owned PRNG (default: 42)
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub kernel: RbfKind,
    /// Diagonal of the global base metric (default: identity)
    #[serde(default = "default_base_metric")]
    pub base_metric: [f32; 6],
    #[serde(default)]
    pub evolution: EvolutionParams,
    #[serde(default)]
    pub adaptation: AdaptationParams,
    #[serde(default)]
    pub limiters: LimiterConfig,
    #[serde(default)]
    pub adaptive_step: AdaptiveStepConfig,
}

fn default_capacity() -> usize {
    1024
}
fn default_fractal_dimension() -> f32 {
    2.5
}
fn default_seed() -> u64 {
    42
}
fn default_base_metric() -> [f32; 6] {
    [1.0; 6]
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            capacity: default_capacity(),
            fractal_dimension: default_fractal_dimension(),
            seed: default_seed(),
            kernel: RbfKind::default(),
            base_metric: default_base_metric(),
            evolution: EvolutionParams::default(),
            adaptation: AdaptationParams::default(),
            limiters: LimiterConfig::default(),
            adaptive_step: AdaptiveStepConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: &str) -> TcdeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> TcdeResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TcdeResult<()> {
        if self.capacity == 0 {
            return Err(TcdeError::ConfigError("capacity must be > 0".to_string()));
        }
        if !self.fractal_dimension.is_finite() {
            return Err(TcdeError::ConfigError(
                "fractal_dimension must be finite".to_string(),
            ));
        }
        if self.base_metric.iter().any(|&g| !(g.is_finite() && g > 0.0)) {
            return Err(TcdeError::ConfigError(format!(
                "base metric diagonal must be positive, got {:?}",
                self.base_metric
            )));
        }
        self.evolution.validate()?;
        self.adaptation.validate()?;
        self.limiters.validate()?;
        self.adaptive_step.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// CARGO_MANIFEST_DIR points to crates/tcde-types/, two levels below the repo root.
    fn project_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
    }

    fn config_path(relative: &str) -> String {
        project_root().join(relative).to_string_lossy().to_string()
    }

    #[test]
    fn test_load_default_simulation_config() {
        let cfg =
            SimulationConfig::from_file(&config_path("configs/default_simulation.json")).unwrap();
        assert_eq!(cfg.capacity, 1024);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.kernel, RbfKind::Gaussian);
        assert!((cfg.evolution.diffusion - 0.08).abs() < 1e-7);
        assert_eq!(cfg.evolution.mc_samples, 32);
        assert_eq!(cfg.evolution.coupling, CouplingStrategy::Importance);
        assert!((cfg.limiters.energy_max - 1.0e4).abs() < 1e-3);
        assert!(cfg.limiters.auto_adjust);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let cfg = SimulationConfig::from_json_str(
            r#"{ "capacity": 16, "evolution": { "dt": 0.005 }, "kernel": "multiquadric" }"#,
        )
        .unwrap();
        assert_eq!(cfg.capacity, 16);
        assert_eq!(cfg.kernel, RbfKind::Multiquadric);
        assert!((cfg.evolution.dt - 0.005).abs() < 1e-9);
        assert!((cfg.evolution.alpha - 0.01).abs() < 1e-9);
        assert_eq!(cfg.limiters, LimiterConfig::default());
        assert_eq!(cfg.base_metric, [1.0; 6]);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(SimulationConfig::from_json_str(r#"{ "capacity": 0 }"#).is_err());
        assert!(SimulationConfig::from_json_str(r#"{ "evolution": { "dt": -0.1 } }"#).is_err());
        assert!(SimulationConfig::from_json_str(
            r#"{ "limiters": { "epsilon_min": 5.0, "epsilon_max": 1.0 } }"#
        )
        .is_err());
        assert!(
            SimulationConfig::from_json_str(r#"{ "base_metric": [1, 1, 0, 1, 1, 1] }"#).is_err()
        );
        assert!(SimulationConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_safe_range_flags() {
        let params = EvolutionParams::default();
        assert!(params.out_of_safe_range().is_empty());

        let hot = EvolutionParams {
            diffusion: 0.5,
            sigma: 0.05,
            ..EvolutionParams::default()
        };
        assert_eq!(hot.out_of_safe_range(), vec!["diffusion", "sigma"]);

        let pure_diffusion = EvolutionParams {
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
            ..EvolutionParams::default()
        };
        assert!(pure_diffusion.out_of_safe_range().is_empty());
    }

    #[test]
    fn test_coupling_without_samples_rejected() {
        let params = EvolutionParams {
            mc_samples: 0,
            ..EvolutionParams::default()
        };
        assert!(params.validate().is_err());
        let no_coupling = EvolutionParams {
            gamma: 0.0,
            ..params
        };
        assert!(no_coupling.validate().is_ok());
    }

    #[test]
    fn test_adaptation_bounds() {
        assert!(AdaptationParams::default().validate().is_ok());
        assert!(AdaptationParams::disabled().validate().is_ok());
        assert!(!AdaptationParams::disabled().is_active());
        let bad = AdaptationParams {
            alpha: -1.5,
            beta: 1.0,
        };
        assert!(bad.validate().is_err());
    }
}
