//! Matched-aperture flux through a fixed elliptical Gaussian weight.

use glam::DVec2;

use super::accumulate::{AccumulationMode, MomentAccumulator};
use super::bbox::{BoundingBox, needs_interpolation};
use super::weights::{Quadrupole, solve_weights};
use crate::config::AdaptiveMomentsConfig;
use crate::region::PixelRegion;

/// Weighted flux `Σ (I - background)·w` for the weight with covariance `covariance`.
///
/// Returns `(flux, flux_err)`. The error is always NaN as variance planes are not propagated.
/// Both are NaN when the weight cannot be built or the box misses the image. For a Gaussian of
/// peak `I0` matching `covariance` the flux is `π·I0·sqrt(det)`.
pub fn fixed_aperture_flux<R: PixelRegion + ?Sized>(
    region: &R,
    background: f64,
    center: DVec2,
    covariance: &Quadrupole,
) -> (f64, f64) {
    fixed_aperture_flux_with_config(
        region,
        background,
        center,
        covariance,
        &AdaptiveMomentsConfig::default(),
    )
}

/// [`fixed_aperture_flux`] with explicit box radius and weight limits.
pub fn fixed_aperture_flux_with_config<R: PixelRegion + ?Sized>(
    region: &R,
    background: f64,
    center: DVec2,
    covariance: &Quadrupole,
    config: &AdaptiveMomentsConfig,
) -> (f64, f64) {
    let failed = (f64::NAN, f64::NAN);
    if !center.is_finite() {
        return failed;
    }
    let Some(solution) = solve_weights(*covariance) else {
        return failed;
    };

    let bbox = BoundingBox::around(
        region.width(),
        region.height(),
        center,
        covariance,
        config.max_radius,
    );
    let interpolate = needs_interpolation(covariance.ixx, covariance.iyy, solution.det);

    MomentAccumulator::new(region, center, background, config.max_weight)
        .accumulate(&bbox, &solution.weights, interpolate, AccumulationMode::FluxOnly)
        .map_or(failed, |sums| (sums.sum, f64::NAN))
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::test_utils::{make_elliptical_star, make_gaussian_star};

    #[test]
    fn test_matched_gaussian_flux() {
        let center = DVec2::new(32.0, 32.0);
        let image = make_gaussian_star(64, 64, center, 3.0, 1000.0, 0.0);

        let (flux, err) = fixed_aperture_flux(&image, 0.0, center, &Quadrupole::circular(9.0));

        let expected = PI * 1000.0 * 9.0;
        assert!(
            ((flux - expected) / expected).abs() < 1e-4,
            "flux {flux}, expected {expected}"
        );
        assert!(err.is_nan());
    }

    #[test]
    fn test_elliptical_weight() {
        let truth = Quadrupole::new(8.0, -1.5, 4.0);
        let center = DVec2::new(30.3, 29.6);
        let image = make_elliptical_star(60, 60, center, truth, 50.0, 0.0);

        let (flux, _) = fixed_aperture_flux(&image, 0.0, center, &truth);

        let expected = PI * 50.0 * truth.determinant().sqrt();
        assert!(((flux - expected) / expected).abs() < 1e-4, "flux {flux}");
    }

    #[test]
    fn test_repeated_calls_are_bit_identical() {
        let center = DVec2::new(20.4, 19.7);
        let image = make_gaussian_star(40, 40, center, 2.0, 100.0, 3.0);
        let covariance = Quadrupole::new(5.0, 0.5, 3.0);

        let a = fixed_aperture_flux(&image, 3.0, center, &covariance);
        let b = fixed_aperture_flux(&image, 3.0, center, &covariance);

        assert_eq!(a.0.to_bits(), b.0.to_bits());
        assert_eq!(a.1.to_bits(), b.1.to_bits());
    }

    #[test]
    fn test_narrow_weight_interpolates() {
        // A 0.2 px² weight is sampled on the 4×4 sub-pixel grid; the flux stays finite and positive.
        let center = DVec2::new(10.0, 10.0);
        let image = make_gaussian_star(21, 21, center, 0.5, 10.0, 0.0);
        let (flux, _) = fixed_aperture_flux(&image, 0.0, center, &Quadrupole::circular(0.2));
        assert!(flux.is_finite() && flux > 0.0, "flux {flux}");
    }

    #[test]
    fn test_failures_are_nan() {
        let image = make_gaussian_star(16, 16, DVec2::new(8.0, 8.0), 2.0, 10.0, 0.0);

        let (flux, err) = fixed_aperture_flux(&image, 0.0, DVec2::new(8.0, 8.0), &Quadrupole::NAN);
        assert!(flux.is_nan() && err.is_nan());

        let (flux, _) = fixed_aperture_flux(
            &image,
            0.0,
            DVec2::new(-50.0, 8.0),
            &Quadrupole::circular(4.0),
        );
        assert!(flux.is_nan());

        let (flux, _) = fixed_aperture_flux(
            &image,
            0.0,
            DVec2::new(f64::NAN, 8.0),
            &Quadrupole::circular(4.0),
        );
        assert!(flux.is_nan());
    }
}
