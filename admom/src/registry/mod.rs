//! Named measurement plugins.
//!
//! A [`MeasurementRegistry`] maps names such as `"shape.sdss"` to [`Measurement`]
//! implementations. The defaults are listed explicitly in [`MeasurementRegistry::with_defaults`];
//! callers add their own through [`MeasurementRegistry::register`].

use glam::DVec2;
use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GaussianFluxConfig, ShapeMeasurementConfig};
use crate::error::{RegistryError, Result};
use crate::moments::{
    Quadrupole, ShapeEstimate, estimate_adaptive_moments_with_config,
    fixed_aperture_flux_with_config,
};
use crate::region::PixelRegion;

#[cfg(test)]
mod tests;

pub const SDSS_SHAPE: &str = "shape.sdss";
pub const GAUSSIAN_FLUX: &str = "flux.gaussian";

/// Flux through an elliptical Gaussian aperture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxEstimate {
    pub flux: f64,
    /// Always NaN; variance planes are not propagated.
    pub flux_err: f64,
    /// Aperture covariance the flux was measured through.
    pub aperture: Quadrupole,
}

/// Output of one [`Measurement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeasurementRecord {
    Shape(ShapeEstimate),
    Flux(FluxEstimate),
}

impl MeasurementRecord {
    pub fn as_shape(&self) -> Option<&ShapeEstimate> {
        match self {
            Self::Shape(shape) => Some(shape),
            Self::Flux(_) => None,
        }
    }

    pub fn as_flux(&self) -> Option<&FluxEstimate> {
        match self {
            Self::Flux(flux) => Some(flux),
            Self::Shape(_) => None,
        }
    }
}

/// A per-source measurement.
pub trait Measurement: Send + Sync {
    fn name(&self) -> &str;

    fn measure(&self, region: &dyn PixelRegion, center: DVec2) -> Result<MeasurementRecord>;
}

// ============================================================================
// Built-in measurements
// ============================================================================

/// Adaptive second moments with `shiftmax` clamped into its configured bounds.
#[derive(Debug, Clone, Default)]
pub struct SdssShapeMeasurement {
    config: ShapeMeasurementConfig,
}

impl SdssShapeMeasurement {
    pub fn new(config: ShapeMeasurementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Measurement for SdssShapeMeasurement {
    fn name(&self) -> &str {
        SDSS_SHAPE
    }

    fn measure(&self, region: &dyn PixelRegion, center: DVec2) -> Result<MeasurementRecord> {
        estimate_adaptive_moments_with_config(
            region,
            self.config.background,
            center,
            self.config.effective_shiftmax(),
            &self.config.adaptive,
        )
        .map(MeasurementRecord::Shape)
    }
}

/// Flux through a Gaussian aperture, either fixed or matched to the source.
#[derive(Debug, Clone, Default)]
pub struct GaussianFluxMeasurement {
    config: GaussianFluxConfig,
}

impl GaussianFluxMeasurement {
    pub fn new(config: GaussianFluxConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Measurement for GaussianFluxMeasurement {
    fn name(&self) -> &str {
        GAUSSIAN_FLUX
    }

    fn measure(&self, region: &dyn PixelRegion, center: DVec2) -> Result<MeasurementRecord> {
        let aperture = match self.config.covariance {
            Some(covariance) => covariance,
            None => {
                let shape = &self.config.shape;
                estimate_adaptive_moments_with_config(
                    region,
                    shape.background,
                    center,
                    shape.effective_shiftmax(),
                    &shape.adaptive,
                )?
                .moments
            }
        };

        let (flux, flux_err) = fixed_aperture_flux_with_config(
            region,
            self.config.background,
            center,
            &aperture,
            &self.config.shape.adaptive,
        );
        Ok(MeasurementRecord::Flux(FluxEstimate {
            flux,
            flux_err,
            aperture,
        }))
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
pub struct MeasurementRegistry {
    measurements: HashMap<String, Box<dyn Measurement>>,
}

impl MeasurementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `shape.sdss` and `flux.gaussian` with default configuration.
    pub fn with_defaults() -> Self {
        let defaults: [Box<dyn Measurement>; 2] = [
            Box::new(SdssShapeMeasurement::default()),
            Box::new(GaussianFluxMeasurement::default()),
        ];

        let mut registry = Self::new();
        for measurement in defaults {
            let name = measurement.name().to_owned();
            registry.measurements.insert(name, measurement);
        }
        registry
    }

    /// Adds `measurement` under its own name. Names are unique.
    pub fn register(
        &mut self,
        measurement: Box<dyn Measurement>,
    ) -> std::result::Result<(), RegistryError> {
        match self.measurements.entry(measurement.name().to_owned()) {
            Entry::Occupied(entry) => {
                Err(RegistryError::DuplicateMeasurement(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                debug!(name = entry.key().as_str(), "registered measurement");
                entry.insert(measurement);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> std::result::Result<&dyn Measurement, RegistryError> {
        self.measurements
            .get(name)
            .map(|measurement| measurement.as_ref())
            .ok_or_else(|| RegistryError::UnknownMeasurement(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.measurements.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.measurements.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Runs every registered measurement on one source, in name order.
    pub fn measure_all(
        &self,
        region: &dyn PixelRegion,
        center: DVec2,
    ) -> Vec<(&str, Result<MeasurementRecord>)> {
        self.names()
            .into_iter()
            .map(|name| (name, self.measurements[name].measure(region, center)))
            .collect()
    }
}
