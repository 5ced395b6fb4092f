//! TCDE evolution kernel.
//!
//! 6D RBF field representation, Riemannian geometry operators, spatial
//! index and the limiter-protected TDE stepper.

pub mod adaptive_metric;
pub mod adaptive_step;
pub mod coupling;
pub mod differential;
pub mod evaluator;
pub mod evolution;
pub mod field;
pub mod geometry;
pub mod kdtree;
pub mod limiters;
pub mod mesh;
