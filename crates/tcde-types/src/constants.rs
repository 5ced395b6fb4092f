// ─────────────────────────────────────────────────────────────────────
// TCDE Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Manifold dimension. Coordinates are (x, y, z, τ₁, τ₂, m).
pub const DIM: usize = 6;

/// Block layout as half-open coordinate ranges: spatial 3×3, temporal 2×2, modal 1×1.
pub const BLOCKS: [(usize, usize); 3] = [(0, 3), (3, 5), (5, 6)];

/// Inversion refuses matrices whose |det| falls at or below this.
pub const SINGULAR_DET: f64 = 1e-10;

/// Step for 4th-order central differences of the field and the metric.
pub const FD_STEP: f32 = 1e-5;

/// Step for differentiating Christoffel symbols when assembling curvature.
/// Larger than `FD_STEP` because Γ is itself a difference quotient.
pub const CURVATURE_STEP: f32 = 1e-3;

/// Tolerance of the triangle-inequality check.
pub const TRIANGLE_TOL: f32 = 1e-6;

/// ln(10), used for the 10⁻³ Gaussian cutoff radius 3·ε·√ln10.
pub const LN_10: f32 = std::f32::consts::LN_10;

/// Maximum centers a leaf of the spatial index holds.
pub const KD_LEAF_SIZE: usize = 8;

/// Kernel threshold that defines the coupling radius.
pub const COUPLING_THRESHOLD: f32 = 0.01;

/// Amplitude decay per level of the fractal initialiser.
pub const FRACTAL_DECAY: f32 = 0.7;

/// Offspring per center per level of the fractal initialiser.
pub const FRACTAL_BRANCHING: usize = 4;

/// Coordinate jitter of a refinement child relative to its parent.
pub const REFINE_OFFSET: f32 = 0.005;

/// A center with a neighbour closer than this is never coarsened away.
pub const COARSEN_ISOLATION: f32 = 0.1;

/// Initial diagonal shift used to regularise a singular metric.
pub const REGULARIZATION_SHIFT: f32 = 1e-6;

/// Coarsening stops at this many centers.
pub const COARSEN_MIN_CENTERS: usize = 10;
