//! Equivalent Gaussian width of a centred, PSF-like image.
//!
//! Every estimator assumes the source sits at the integer pixel `(width / 2, height / 2)` and
//! returns the σ of the circular Gaussian that would give the same statistic.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use tracing::debug;

use crate::error::WidthError;
use crate::moments::SINGLE_PIXEL_MOMENT;
use crate::region::PixelRegion;


/// Round limit for the circular adaptive loop.
const ADAPTIVE_MAX_ITER: usize = 100;
/// Convergence tolerance on the relative change of the weighted 1-D moment.
const ADAPTIVE_TOL: f64 = 1e-4;
/// Initial weight precision (1/px²).
const ADAPTIVE_INITIAL_WEIGHT: f64 = 0.5;
/// Larger weights than this cannot be evaluated on a pixel grid.
const ADAPTIVE_MAX_WEIGHT: f64 = 1e6;
const MAX_EXPONENT: f64 = 14.0;

/// Statistic used by [`gaussian_width`].
#[derive(Debug, Display, EnumIter, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GaussianWidthMethod {
    /// Circular adaptive moments. Robust to wings and noise. This is the default.
    #[default]
    AdaptiveMoment,
    /// `sqrt(2/π)·<r>`.
    FirstMoment,
    /// `sqrt(<r²>/2)`.
    SecondMoment,
    /// `sqrt(A_eff / 4π)` with the effective area `(ΣI)² / ΣI²`.
    NoiseEquivalent,
    /// `sqrt(ΣI²r² / ΣI²)`.
    Bickerton,
}

/// σ of the Gaussian equivalent to the image in `region`.
///
/// Only the first and second moment estimators can fail, when the flux or the radial moment
/// is not positive.
pub fn gaussian_width<R: PixelRegion + ?Sized>(
    region: &R,
    method: GaussianWidthMethod,
) -> Result<f64, WidthError> {
    let image = CenteredImage::new(region);
    let sigma = match method {
        GaussianWidthMethod::AdaptiveMoment => (0.5 * image.adaptive_second_moment()).sqrt(),
        GaussianWidthMethod::FirstMoment => (2.0 / PI).sqrt() * image.radial_moment(1)?,
        GaussianWidthMethod::SecondMoment => (0.5 * image.radial_moment(2)?).sqrt(),
        GaussianWidthMethod::NoiseEquivalent => (effective_area(region) / (4.0 * PI)).sqrt(),
        GaussianWidthMethod::Bickerton => image.bickerton(),
    };
    Ok(sigma)
}

/// Effective (noise-equivalent) area `(ΣI)² / ΣI²` in px².
///
/// A Gaussian of width σ has an effective area of `4πσ²`.
pub fn effective_area<R: PixelRegion + ?Sized>(region: &R) -> f64 {
    let (sum, sum_sq) = CenteredImage::new(region).fold(|_, value| (value, value * value));
    sum * sum / sum_sq
}

/// `region` with its pixels addressed relative to the central pixel.
struct CenteredImage<'a, R: ?Sized> {
    region: &'a R,
    x_center: f64,
    y_center: f64,
}

impl<'a, R: PixelRegion + ?Sized> CenteredImage<'a, R> {
    fn new(region: &'a R) -> Self {
        Self {
            region,
            x_center: (region.width() / 2) as f64,
            y_center: (region.height() / 2) as f64,
        }
    }

    /// Sums the pair returned by `f(r², I)` over all pixels.
    fn fold(&self, f: impl Fn(f64, f64) -> (f64, f64)) -> (f64, f64) {
        let mut acc = (0.0, 0.0);
        for iy in 0..self.region.height() {
            let y = iy as f64 - self.y_center;
            for ix in 0..self.region.width() {
                let x = ix as f64 - self.x_center;
                let (a, b) = f(x * x + y * y, self.region.intensity(ix, iy));
                acc.0 += a;
                acc.1 += b;
            }
        }
        acc
    }

    /// `ΣI·r^power / ΣI`.
    fn radial_moment(&self, power: u32) -> Result<f64, WidthError> {
        let (norm, sum) = self.fold(|r2, value| {
            let r_power = if power == 2 {
                r2
            } else {
                r2.sqrt().powi(power as i32)
            };
            (value, value * r_power)
        });
        if norm <= 0.0 {
            return Err(WidthError::NonPositiveFlux(norm));
        }
        if sum < 0.0 {
            return Err(WidthError::NegativeMoment { power, value: sum });
        }
        Ok(sum / norm)
    }

    fn bickerton(&self) -> f64 {
        let (norm, sum) = self.fold(|r2, value| (value * value, value * value * r2));
        (sum / norm).sqrt()
    }

    /// Weighted 1-D second moment `½·ΣwIr² / ΣwI` for the weight `exp(-½·w·r²)`.
    fn weighted_moment(&self, w: f64) -> Option<f64> {
        if w.abs() > ADAPTIVE_MAX_WEIGHT {
            return None;
        }
        let (sum, sum_rr) = self.fold(|r2, value| {
            let expon = r2 * w;
            if expon <= MAX_EXPONENT {
                let weighted = value * (-0.5 * expon).exp();
                (weighted, r2 * weighted)
            } else {
                (0.0, 0.0)
            }
        });
        (sum > 0.0 && sum_rr >= 0.0).then(|| 0.5 * sum_rr / sum)
    }

    /// `<x²> + <y²>` of the image from circular adaptive moments.
    fn adaptive_second_moment(&self) -> f64 {
        let mut w = ADAPTIVE_INITIAL_WEIGHT;
        let mut sigma_prev = f64::INFINITY;
        let mut converged = false;

        for iter in 0..ADAPTIVE_MAX_ITER {
            let Some(sigma) = self.weighted_moment(w) else {
                break;
            };
            if iter > 0 && (sigma / sigma_prev - 1.0).abs() < ADAPTIVE_TOL {
                converged = true;
                break;
            }
            sigma_prev = sigma;

            // Inverse variances of a product of Gaussians add.
            w = 1.0 / sigma - w;
            if w <= 0.0 {
                break;
            }
        }

        let sigma_w = if converged {
            1.0 / w
        } else {
            debug!(weight = w, "circular adaptive moments fell back to unweighted");
            self.weighted_moment(0.0).unwrap_or(SINGLE_PIXEL_MOMENT)
        };
        2.0 * sigma_w
    }
}
