//! Error types for adaptive moment measurement.
//!
//! Data-driven degeneracies (tiny sources, non-Gaussian profiles) are reported through
//! [`ShapeFlags`](crate::ShapeFlags) on the result. The errors here cover inputs that make a
//! measurement meaningless.

use thiserror::Error;

/// Errors returned by the measurement entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Centroid guess ({x}, {y}) is not finite")]
    NonFiniteCentroid { x: f64, y: f64 },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by the Fisher-matrix covariance estimator.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FisherError {
    #[error("Determinant is too small calculating Fisher matrix (saw {det:e})")]
    DegenerateMoments { det: f64 },

    #[error("Background variance must be positive (saw {0})")]
    NonPositiveVariance(f64),

    #[error("Fisher matrix is singular and cannot be inverted")]
    Singular,
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_iter must be positive")]
    ZeroIterations,

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("shiftmax bounds are inverted: min {min} > max {max}")]
    InvertedShiftBounds { min: f64, max: f64 },

    #[error("aperture covariance ({ixx}, {ixy}, {iyy}) is not positive definite")]
    InvalidAperture { ixx: f64, ixy: f64, iyy: f64 },
}

/// Errors from the Gaussian width estimators.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum WidthError {
    #[error("sum(I) is <= 0 (saw {0})")]
    NonPositiveFlux(f64),

    #[error("sum(I*r^{power}) is negative (saw {value})")]
    NegativeMoment { power: u32, value: f64 },
}

/// Errors raised by the measurement registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("No measurement registered under '{0}'")]
    UnknownMeasurement(String),

    #[error("A measurement named '{0}' is already registered")]
    DuplicateMeasurement(String),
}

pub type Result<T> = std::result::Result<T, Error>;
