//! Configuration for adaptive moment measurement.
//!
//! [`AdaptiveMomentsConfig`] tunes the fixed-point loop. [`ShapeMeasurementConfig`] wraps it with
//! the per-measurement inputs used by the [registry](crate::MeasurementRegistry).

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::moments::Quadrupole;

// ============================================================================
// Adaptive loop
// ============================================================================

/// Parameters of the adaptive moments iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveMomentsConfig {
    /// Maximum number of re-weighting rounds before giving up.
    pub max_iter: usize,
    /// Convergence tolerance on successive ellipticity components e1, e2.
    pub tol1: f64,
    /// Convergence tolerance on the relative change of the weighted σ11.
    pub tol2: f64,
    /// Upper bound on the radius of the pixel box, in pixels.
    pub max_radius: f64,
    /// Second moment (px²) of the circular weight used in the first round.
    pub initial_moment: f64,
    /// Weight elements larger than this are treated as numerically unusable.
    pub max_weight: f64,
    /// Derive the Fisher-matrix covariance when the region carries variance.
    pub compute_covariance: bool,
}

impl Default for AdaptiveMomentsConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol1: 1e-5,
            tol2: 1e-4,
            max_radius: 1000.0,
            initial_moment: 1.5,
            max_weight: 1e6,
            compute_covariance: true,
        }
    }
}

impl AdaptiveMomentsConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        for (name, value) in [
            ("tol1", self.tol1),
            ("tol2", self.tol2),
            ("max_radius", self.max_radius),
            ("initial_moment", self.initial_moment),
            ("max_weight", self.max_weight),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        Ok(())
    }

    /// Loads and validates a configuration from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = common::FileFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        let config: Self = common::deserialize(&text, format)
            .with_context(|| format!("Failed to parse config '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Registry-facing measurement config
// ============================================================================

/// Inputs for the `shape.sdss` measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeMeasurementConfig {
    /// Background level subtracted from every pixel.
    pub background: f64,
    /// Maximum centroid shift (px) before the SHIFT flag is raised.
    pub shiftmax: f64,
    /// `shiftmax` is clamped into `[shiftmax_min, shiftmax_max]` at measurement time.
    pub shiftmax_min: f64,
    pub shiftmax_max: f64,
    pub adaptive: AdaptiveMomentsConfig,
}

impl Default for ShapeMeasurementConfig {
    fn default() -> Self {
        Self {
            background: 0.0,
            shiftmax: 1.0,
            shiftmax_min: 2.0,
            shiftmax_max: 10.0,
            adaptive: AdaptiveMomentsConfig::default(),
        }
    }
}

impl ShapeMeasurementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("shiftmax", self.shiftmax),
            ("shiftmax_min", self.shiftmax_min),
            ("shiftmax_max", self.shiftmax_max),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.shiftmax_min > self.shiftmax_max {
            return Err(ConfigError::InvertedShiftBounds {
                min: self.shiftmax_min,
                max: self.shiftmax_max,
            });
        }
        self.adaptive.validate()
    }

    /// `shiftmax` clamped into the configured bounds.
    pub fn effective_shiftmax(&self) -> f64 {
        self.shiftmax.clamp(self.shiftmax_min, self.shiftmax_max)
    }
}

/// Inputs for the `flux.gaussian` measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianFluxConfig {
    /// Background level subtracted from every pixel.
    pub background: f64,
    /// Aperture covariance. When unset the aperture is matched to the source's adaptive moments.
    pub covariance: Option<Quadrupole>,
    /// Used when the aperture has to be measured first.
    pub shape: ShapeMeasurementConfig,
}

impl GaussianFluxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cov) = &self.covariance
            && !(cov.ixx > 0.0 && cov.iyy > 0.0 && cov.determinant() > 0.0)
        {
            return Err(ConfigError::InvalidAperture {
                ixx: cov.ixx,
                ixy: cov.ixy,
                iyy: cov.iyy,
            });
        }
        self.shape.validate()
    }
}
