//! Numeric primitives for the TCDE evolution kernel.

pub mod complex;
pub mod linalg;
pub mod metric;
pub mod rbf;
pub mod stencil;
