use std::f64::consts::PI;

use super::*;
use crate::Buffer2;
use crate::error::Error;
use crate::test_utils::make_gaussian_star;

struct PeakValue;

impl Measurement for PeakValue {
    fn name(&self) -> &str {
        "flux.peak"
    }

    fn measure(&self, region: &dyn PixelRegion, center: DVec2) -> Result<MeasurementRecord> {
        let flux = region.intensity(center.x as usize, center.y as usize);
        Ok(MeasurementRecord::Flux(FluxEstimate {
            flux,
            flux_err: f64::NAN,
            aperture: Quadrupole::circular(0.0),
        }))
    }
}

fn star() -> (Buffer2<f64>, DVec2) {
    let center = DVec2::new(32.0, 32.0);
    (make_gaussian_star(64, 64, center, 3.0, 1000.0, 0.0), center)
}

#[test]
fn test_defaults_are_registered() {
    let registry = MeasurementRegistry::with_defaults();
    assert_eq!(registry.names(), vec![GAUSSIAN_FLUX, SDSS_SHAPE]);
    assert_eq!(registry.len(), 2);
    assert!(registry.contains(SDSS_SHAPE));
    assert_eq!(registry.get(SDSS_SHAPE).unwrap().name(), SDSS_SHAPE);
    assert!(MeasurementRegistry::new().is_empty());
}

#[test]
fn test_unknown_name() {
    let registry = MeasurementRegistry::with_defaults();
    assert_eq!(
        registry.get("shape.hsm").err(),
        Some(RegistryError::UnknownMeasurement("shape.hsm".to_string()))
    );
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let mut registry = MeasurementRegistry::with_defaults();

    let err = registry
        .register(Box::new(SdssShapeMeasurement::default()))
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateMeasurement(SDSS_SHAPE.to_string()));

    registry.register(Box::new(PeakValue)).unwrap();
    assert!(registry.register(Box::new(PeakValue)).is_err());
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_sdss_shape_clamps_shiftmax() {
    let (image, center) = star();
    // A half-pixel offset exceeds shiftmax = 0.1 but not the clamped floor of 2 px.
    let guess = center + DVec2::new(0.5, 0.0);
    let measurement = SdssShapeMeasurement::new(ShapeMeasurementConfig {
        shiftmax: 0.1,
        ..Default::default()
    })
    .unwrap();

    let record = measurement.measure(&image, guess).unwrap();
    let shape = record.as_shape().unwrap();

    assert!(!shape.flags.contains(crate::ShapeFlags::SHIFT), "flags: {}", shape.flags);
    assert!(record.as_flux().is_none());
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let config = ShapeMeasurementConfig {
        shiftmax_min: 3.0,
        shiftmax_max: 1.0,
        ..Default::default()
    };
    assert!(matches!(SdssShapeMeasurement::new(config), Err(Error::Config(_))));

    let config = GaussianFluxConfig {
        shape: ShapeMeasurementConfig {
            shiftmax: f64::NAN,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(GaussianFluxMeasurement::new(config), Err(Error::Config(_))));
}

#[test]
fn test_matched_gaussian_flux() {
    let (image, center) = star();
    let registry = MeasurementRegistry::with_defaults();

    let record = registry
        .get(GAUSSIAN_FLUX)
        .unwrap()
        .measure(&image, center)
        .unwrap();
    let flux = record.as_flux().unwrap();

    // Aperture matched to σ² = 9: flux = π·I0·sqrt(det).
    let expected = PI * 1000.0 * 9.0;
    assert!((flux.aperture.ixx - 9.0).abs() < 0.09, "aperture {:?}", flux.aperture);
    assert!(((flux.flux - expected) / expected).abs() < 0.01, "flux {}", flux.flux);
    assert!(flux.flux_err.is_nan());
}

#[test]
fn test_fixed_gaussian_flux() {
    let (image, center) = star();
    let aperture = Quadrupole::circular(4.0);
    let measurement = GaussianFluxMeasurement::new(GaussianFluxConfig {
        covariance: Some(aperture),
        ..Default::default()
    })
    .unwrap();

    let record = measurement.measure(&image, center).unwrap();
    let flux = record.as_flux().unwrap();

    assert_eq!(flux.aperture, aperture);
    assert_eq!(
        flux.flux,
        crate::moments::fixed_aperture_flux(&image, 0.0, center, &aperture).0
    );
}

#[test]
fn test_measure_all() {
    let (image, center) = star();
    let mut registry = MeasurementRegistry::with_defaults();
    registry.register(Box::new(PeakValue)).unwrap();

    let records = registry.measure_all(&image, center);

    let names: Vec<&str> = records.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec![GAUSSIAN_FLUX, "flux.peak", SDSS_SHAPE]);
    let peak = records[1].1.as_ref().unwrap().as_flux().unwrap();
    assert_eq!(peak.flux, 1000.0);
    assert!(records[2].1.as_ref().unwrap().as_shape().is_some());

    let bad = registry.measure_all(&image, DVec2::new(f64::NAN, 0.0));
    assert!(matches!(bad[2].1, Err(Error::NonFiniteCentroid { .. })));
}

#[test]
fn test_record_serializes() {
    let (image, center) = star();
    let record = MeasurementRegistry::with_defaults()
        .get(SDSS_SHAPE)
        .unwrap()
        .measure(&image, center)
        .unwrap();

    let json = serde_json::to_string(&record).unwrap();
    assert!(json.contains("\"Shape\""), "{json}");
    assert!(json.contains("\"flags\":0"), "{json}");
}
