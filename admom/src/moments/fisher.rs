//! Analytic error estimate for a fitted elliptical Gaussian.
//!
//! Treats the converged adaptive moments as a least-squares Gaussian fit with amplitude `A` and
//! covariance `(Ixx, Ixy, Iyy)` on a background of uniform variance. Ignoring the second-derivative
//! terms of the likelihood, the Fisher matrix depends only on the fitted parameters and has a closed
//! form. Its inverse approximates the covariance of `(A, Ixx, Iyy, Ixy)`, in that order.

use std::f64::consts::PI;

use glam::{DMat4, DVec2};

use super::weights::Quadrupole;
use crate::error::FisherError;

/// Fisher matrix of `(A, Ixx, Iyy, Ixy)`.
pub fn fisher_matrix(
    amplitude: f64,
    moments: &Quadrupole,
    background_variance: f64,
) -> Result<DMat4, FisherError> {
    let Quadrupole { ixx, ixy, iyy } = *moments;
    let det = moments.determinant();
    // Also rejects NaN.
    if !(det > f64::EPSILON) {
        return Err(FisherError::DegenerateMoments { det });
    }
    if !(background_variance > 0.0) {
        return Err(FisherError::NonPositiveVariance(background_variance));
    }

    let f = information_scale(det, background_variance);
    let a = amplitude;

    let fac = f * a / (4.0 * det);
    let f01 = fac * iyy;
    let f02 = fac * ixx;
    let f03 = -fac * 2.0 * ixy;

    let fac = 3.0 * f * a * a / (16.0 * det * det);
    let f11 = fac * iyy * iyy;
    let f22 = fac * ixx * ixx;
    let f33 = fac * 4.0 * (ixy * ixy + det / 3.0);
    let f12 = f33 / 4.0;
    let f13 = fac * (-2.0 * iyy * ixy);
    let f23 = fac * (-2.0 * ixx * ixy);

    Ok(DMat4::from_cols_array_2d(&[
        [f, f01, f02, f03],
        [f01, f11, f12, f13],
        [f02, f12, f22, f23],
        [f03, f13, f23, f33],
    ]))
}

/// `π·sqrt(det)/variance`: the flux information of a unit-amplitude Gaussian.
#[inline]
fn information_scale(det: f64, background_variance: f64) -> f64 {
    PI * det.sqrt() / background_variance
}

/// Parameter uncertainties derived from the Fisher matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeErrors {
    /// Covariance of `(A, Ixx, Iyy, Ixy)`.
    pub covariance: DMat4,
    /// 1σ uncertainty of the centroid.
    pub centroid_err: DVec2,
}

/// Inverts the Fisher matrix and derives centroid errors.
///
/// The position information of a Gaussian decouples from the shape parameters, giving a centroid
/// covariance of `2·Q/(F·A²)`.
pub fn estimate_errors(
    amplitude: f64,
    moments: &Quadrupole,
    background_variance: f64,
) -> Result<ShapeErrors, FisherError> {
    let fisher = fisher_matrix(amplitude, moments, background_variance)?;
    let det = fisher.determinant();
    if det == 0.0 || !det.is_finite() {
        return Err(FisherError::Singular);
    }

    let position_info =
        information_scale(moments.determinant(), background_variance) * amplitude * amplitude;
    let centroid_err = DVec2::new(
        (2.0 * moments.ixx / position_info).sqrt(),
        (2.0 * moments.iyy / position_info).sqrt(),
    );

    Ok(ShapeErrors {
        covariance: fisher.inverse(),
        centroid_err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_elements() {
        let s = 4.0;
        let var = 2.0;
        let a = 10.0;
        let fisher = fisher_matrix(a, &Quadrupole::circular(s), var).unwrap();

        let f = PI * s / var;
        assert!((fisher.x_axis.x - f).abs() < 1e-12);
        // fac = F·A/(4·s²), (0,1) = fac·s
        assert!((fisher.y_axis.x - f * a / (4.0 * s)).abs() < 1e-12);
        assert!((fisher.z_axis.x - f * a / (4.0 * s)).abs() < 1e-12);
        assert_eq!(fisher.w_axis.x, 0.0);
        assert_eq!(fisher.w_axis.y, 0.0);
        assert_eq!(fisher.w_axis.z, 0.0);

        let fac2 = 3.0 * f * a * a / (16.0 * s.powi(4));
        assert!((fisher.y_axis.y - fac2 * s * s).abs() < 1e-12);
        assert!((fisher.w_axis.w - fac2 * 4.0 * s * s / 3.0).abs() < 1e-12);
        assert!((fisher.z_axis.y - fisher.w_axis.w / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_and_inverse() {
        let moments = Quadrupole::new(9.0, 1.5, 4.0);
        let fisher = fisher_matrix(250.0, &moments, 3.0).unwrap();
        assert!(
            (fisher - fisher.transpose())
                .to_cols_array()
                .iter()
                .all(|v| v.abs() < 1e-9)
        );

        let errors = estimate_errors(250.0, &moments, 3.0).unwrap();
        let product = fisher * errors.covariance;
        let identity = DMat4::IDENTITY.to_cols_array();
        for (got, want) in product.to_cols_array().iter().zip(identity.iter()) {
            assert!((got - want).abs() < 1e-6, "F·C = {product:?}");
        }

        // Diagonal variances are positive.
        let c = errors.covariance;
        for v in [c.x_axis.x, c.y_axis.y, c.z_axis.z, c.w_axis.w] {
            assert!(v > 0.0, "variance {v}");
        }
    }

    #[test]
    fn test_centroid_errors_scale_with_noise() {
        let moments = Quadrupole::circular(9.0);
        let low = estimate_errors(1000.0, &moments, 1.0).unwrap();
        let high = estimate_errors(1000.0, &moments, 4.0).unwrap();
        // sigma_x = sqrt(2·Ixx·var/(π·sqrt(det)·A²))
        let expected = (2.0 * 9.0 / (PI * 9.0 * 1e6)).sqrt();
        assert!((low.centroid_err.x - expected).abs() < 1e-12);
        assert!((high.centroid_err.x / low.centroid_err.x - 2.0).abs() < 1e-9);
        assert_eq!(low.centroid_err.x, low.centroid_err.y);
    }

    #[test]
    fn test_rejects_degenerate_moments() {
        let err = fisher_matrix(1.0, &Quadrupole::new(1.0, 1.0, 1.0), 1.0).unwrap_err();
        assert!(matches!(err, FisherError::DegenerateMoments { .. }));
        let err = fisher_matrix(1.0, &Quadrupole::NAN, 1.0).unwrap_err();
        assert!(matches!(err, FisherError::DegenerateMoments { .. }));
    }

    #[test]
    fn test_rejects_non_positive_variance() {
        let moments = Quadrupole::circular(2.0);
        assert_eq!(
            fisher_matrix(1.0, &moments, 0.0).unwrap_err(),
            FisherError::NonPositiveVariance(0.0)
        );
        assert_eq!(
            fisher_matrix(1.0, &moments, -1.0).unwrap_err(),
            FisherError::NonPositiveVariance(-1.0)
        );
        assert!(fisher_matrix(1.0, &moments, f64::NAN).is_err());
    }

    #[test]
    fn test_zero_amplitude_is_singular() {
        let err = estimate_errors(0.0, &Quadrupole::circular(2.0), 1.0).unwrap_err();
        assert_eq!(err, FisherError::Singular);
    }
}
