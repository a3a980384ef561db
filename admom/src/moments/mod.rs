//! Weighted second moments of a single source.
//!
//! [`weights`] turns a covariance into Gaussian weights, [`bbox`] sizes the pixel box,
//! [`accumulate`] sums weighted moments over it, [`adaptive`] iterates the weight to match the
//! source, [`fisher`] propagates pixel noise into parameter errors and [`fixed`] measures flux
//! through a predetermined weight.

pub(crate) mod accumulate;
pub(crate) mod adaptive;
pub(crate) mod bbox;
pub(crate) mod fisher;
pub(crate) mod fixed;
pub(crate) mod shape;
pub(crate) mod weights;

#[cfg(feature = "bench")]
pub mod bench;

pub use adaptive::{estimate_adaptive_moments, estimate_adaptive_moments_with_config};
pub use fisher::{ShapeErrors, estimate_errors, fisher_matrix};
pub use fixed::{fixed_aperture_flux, fixed_aperture_flux_with_config};
pub use shape::ShapeEstimate;
pub use weights::{
    Axes, Quadrupole, SINGLE_PIXEL_MOMENT, WeightSolution, WeightTriple, WeightingCovariance,
    solve_weights,
};
