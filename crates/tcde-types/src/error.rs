use thiserror::Error;

#[derive(Error, Debug)]
pub enum TcdeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Center index out of range: index={index}, len={len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Field capacity exhausted ({capacity} centers)")]
    CapacityExhausted { capacity: usize },

    #[error("Singular metric: det={det:e}")]
    SingularMetric { det: f64 },

    #[error("Numerical overflow: {0}")]
    NumericalOverflow(String),

    #[error("Evolution step failed at t={time}: {message}")]
    StepFailed { time: f32, message: String },

    #[error("Adaptive step did not converge: error {error:e} at dt={dt:e}")]
    NonConvergentStep { dt: f32, error: f32 },

    #[error("Spatial index is stale: built at generation {built}, field at {current}")]
    StaleIndex { built: u64, current: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TcdeResult<T> = Result<T, TcdeError>;
