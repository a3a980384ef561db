//! Admom - adaptive elliptical-Gaussian moments for astronomical sources.
//!
//! Given a pixel grid containing one source and a centroid guess, the adaptive moments engine
//! iterates a Gaussian weight until it matches the source's own second moments, then reports
//! the source's shape (Ixx, Ixy, Iyy), centroid, amplitude and, when a variance plane is
//! available, a Fisher-matrix covariance of those parameters.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use admom::{Buffer2, estimate_adaptive_moments};
//! use glam::DVec2;
//!
//! let stamp: Buffer2<f32> = load_stamp();
//! let shape = estimate_adaptive_moments(&stamp, 0.0, DVec2::new(32.0, 32.0), 2.0)?;
//!
//! println!("Ixx = {} Iyy = {} flags = {}", shape.ixx(), shape.iyy(), shape.flags);
//! ```

mod batch;
mod config;
mod error;
mod flags;
pub(crate) mod moments;
mod region;
mod registry;
mod width;

#[cfg(test)]
pub mod testing;

#[cfg(test)]
mod test_utils;

#[cfg(feature = "bench")]
pub use moments::bench;

pub use common::Buffer2;

// ============================================================================
// Pixel access
// ============================================================================

pub use region::{MaskedImage, PixelRegion};

// ============================================================================
// Adaptive moments
// ============================================================================

pub use moments::{
    // Results
    ShapeEstimate,
    // Covariance algebra
    Axes,
    Quadrupole,
    SINGLE_PIXEL_MOMENT,
    WeightSolution,
    WeightTriple,
    WeightingCovariance,
    solve_weights,
    // Main API
    estimate_adaptive_moments,
    estimate_adaptive_moments_with_config,
    fixed_aperture_flux,
    fixed_aperture_flux_with_config,
    // Errors
    ShapeErrors,
    estimate_errors,
    fisher_matrix,
};
pub use flags::ShapeFlags;

// ============================================================================
// Configuration and errors
// ============================================================================

pub use config::{AdaptiveMomentsConfig, GaussianFluxConfig, ShapeMeasurementConfig};
pub use error::{ConfigError, Error, FisherError, RegistryError, Result, WidthError};

// ============================================================================
// Batch, registry and PSF width
// ============================================================================

pub use batch::measure_batch;
pub use registry::{
    FluxEstimate, GAUSSIAN_FLUX, GaussianFluxMeasurement, Measurement, MeasurementRecord,
    MeasurementRegistry, SDSS_SHAPE, SdssShapeMeasurement,
};
pub use width::{GaussianWidthMethod, effective_area, gaussian_width};
