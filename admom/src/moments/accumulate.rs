//! Gaussian-weighted raw moments over a pixel box.

use glam::DVec2;
use thiserror::Error;

use super::bbox::BoundingBox;
use super::weights::WeightTriple;
use crate::region::PixelRegion;

/// Pixels whose weight exponent exceeds this contribute less than ~1e-3 % and are skipped.
const MAX_EXPONENT: f64 = 14.0;

/// Sub-sampled pixels are skipped when the weight exponent at every cell corner exceeds this.
const MAX_INTERP_EXPONENT: f64 = 9.0;

/// Half-width of the sub-sampled cell.
const INTERP_HALF_WIDTH: f64 = 0.375;

/// Spacing of the 4×4 sub-sample grid.
const INTERP_STEP: f64 = 0.25;

const INTERP_SAMPLES: usize = 4;

/// Which sums to accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationMode {
    /// Only the weighted flux `sum`.
    FluxOnly,
    /// All first, second and fourth-order sums.
    #[default]
    Full,
}

/// Weighted sums of `(I - background)`.
///
/// `sum_x`/`sum_y` are absolute pixel coordinates; the second-order sums are taken about the
/// weight centre.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MomentSums {
    pub sum: f64,
    pub sum_x: f64,
    pub sum_y: f64,
    pub sum_xx: f64,
    pub sum_xy: f64,
    pub sum_yy: f64,
    /// Σ weight·intensity·exponent², a kurtosis-style diagnostic.
    pub sum_s4: f64,
}

impl MomentSums {
    /// Flux-weighted centroid `(Σx/Σ, Σy/Σ)`.
    #[inline]
    pub fn centroid(&self) -> DVec2 {
        DVec2::new(self.sum_x / self.sum, self.sum_y / self.sum)
    }

    #[inline]
    fn is_usable(&self) -> bool {
        self.sum > 0.0 && self.sum_xx > 0.0 && self.sum_yy > 0.0
    }

    #[inline]
    fn add(&mut self, ymod: f64, abs: DVec2, x: f64, y: f64, expon: f64, mode: AccumulationMode) {
        self.sum += ymod;
        if mode == AccumulationMode::Full {
            self.sum_x += ymod * abs.x;
            self.sum_y += ymod * abs.y;
            self.sum_xx += x * x * ymod;
            self.sum_xy += x * y * ymod;
            self.sum_yy += y * y * ymod;
            self.sum_s4 += expon * expon * ymod;
        }
    }
}

/// Reasons a moment evaluation could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AccumulateError {
    #[error("weight element exceeds the allowed magnitude")]
    WeightsOutOfRange,

    #[error("bounding box {0:?} lies outside the image")]
    OutsideImage(BoundingBox),

    /// Full-mode sums with a non-positive flux or second moment. The sums are kept so that
    /// callers can still inspect the flux.
    #[error("non-positive moments (sum = {}, sum_xx = {}, sum_yy = {})", .0.sum, .0.sum_xx, .0.sum_yy)]
    Degenerate(MomentSums),
}

impl AccumulateError {
    /// Flux measured before the failure, zero when nothing was summed.
    pub fn partial_sum(&self) -> f64 {
        match self {
            Self::Degenerate(sums) => sums.sum,
            _ => 0.0,
        }
    }
}

/// Evaluates weighted moments of one source.
pub struct MomentAccumulator<'a, R: ?Sized> {
    region: &'a R,
    center: DVec2,
    background: f64,
    max_weight: f64,
}

impl<'a, R: PixelRegion + ?Sized> MomentAccumulator<'a, R> {
    pub fn new(region: &'a R, center: DVec2, background: f64, max_weight: f64) -> Self {
        Self {
            region,
            center,
            background,
            max_weight,
        }
    }

    /// Sums `(I - background)·w(x, y)` and its moments over `bbox`.
    ///
    /// With `interpolate`, each pixel is split into a 4×4 grid of samples spanning ±0.375 px so
    /// that weights narrower than a pixel do not alias.
    pub fn accumulate(
        &self,
        bbox: &BoundingBox,
        weights: &WeightTriple,
        interpolate: bool,
        mode: AccumulationMode,
    ) -> Result<MomentSums, AccumulateError> {
        if !weights.within(self.max_weight) {
            return Err(AccumulateError::WeightsOutOfRange);
        }
        if !bbox.fits_within(self.region.width(), self.region.height()) {
            return Err(AccumulateError::OutsideImage(*bbox));
        }

        let mut sums = MomentSums::default();
        for i in bbox.y_min..=bbox.y_max {
            let y = i as f64 - self.center.y;
            for j in bbox.x_min..=bbox.x_max {
                let x = j as f64 - self.center.x;
                let tmod = self.region.intensity(j as usize, i as usize) - self.background;
                if interpolate {
                    self.add_subsampled(&mut sums, tmod, x, y, weights, mode);
                } else {
                    let expon = weights.exponent(x, y);
                    if expon <= MAX_EXPONENT {
                        let ymod = tmod * (-0.5 * expon).exp();
                        sums.add(ymod, DVec2::new(j as f64, i as f64), x, y, expon, mode);
                    }
                }
            }
        }

        if mode == AccumulationMode::Full && !sums.is_usable() {
            return Err(AccumulateError::Degenerate(sums));
        }
        Ok(sums)
    }

    fn add_subsampled(
        &self,
        sums: &mut MomentSums,
        tmod: f64,
        x: f64,
        y: f64,
        weights: &WeightTriple,
        mode: AccumulationMode,
    ) {
        let (xl, xh) = (x - INTERP_HALF_WIDTH, x + INTERP_HALF_WIDTH);
        let (yl, yh) = (y - INTERP_HALF_WIDTH, y + INTERP_HALF_WIDTH);
        let corner_max = weights
            .exponent(xl, yl)
            .max(weights.exponent(xh, yh))
            .max(weights.exponent(xl, yh))
            .max(weights.exponent(xh, yl));
        if corner_max > MAX_INTERP_EXPONENT {
            return;
        }

        for sy in 0..INTERP_SAMPLES {
            let sub_y = yl + sy as f64 * INTERP_STEP;
            for sx in 0..INTERP_SAMPLES {
                let sub_x = xl + sx as f64 * INTERP_STEP;
                let expon = weights.exponent(sub_x, sub_y);
                let ymod = tmod * (-0.5 * expon).exp();
                let abs = DVec2::new(sub_x, sub_y) + self.center;
                sums.add(ymod, abs, sub_x, sub_y, expon, mode);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Buffer2;

    fn flat(width: usize, height: usize, value: f32) -> Buffer2<f32> {
        Buffer2::new_filled(width, height, value)
    }

    #[test]
    fn test_unweighted_flat_box() {
        let image = flat(9, 9, 3.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(4.0, 4.0), 1.0, 1e6);
        let bbox = BoundingBox::new(3, 5, 3, 5);
        let sums = acc
            .accumulate(&bbox, &WeightTriple::UNWEIGHTED, false, AccumulationMode::Full)
            .unwrap();

        // 9 pixels of (3 - 1)
        assert!((sums.sum - 18.0).abs() < 1e-12);
        assert!((sums.centroid() - DVec2::new(4.0, 4.0)).length() < 1e-12);
        // x² ∈ {1, 0, 1} over 3 rows, times 2
        assert!((sums.sum_xx - 12.0).abs() < 1e-12);
        assert!((sums.sum_yy - 12.0).abs() < 1e-12);
        assert!(sums.sum_xy.abs() < 1e-12);
        assert_eq!(sums.sum_s4, 0.0);
    }

    #[test]
    fn test_flux_only_leaves_moments_zero() {
        let image = flat(9, 9, 2.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(4.0, 4.0), 0.0, 1e6);
        let bbox = BoundingBox::new(0, 8, 0, 8);
        let weights = WeightTriple::new(1.0, 0.0, 1.0);
        let sums = acc
            .accumulate(&bbox, &weights, false, AccumulationMode::FluxOnly)
            .unwrap();
        assert!(sums.sum > 0.0);
        assert_eq!(sums.sum_x, 0.0);
        assert_eq!(sums.sum_xx, 0.0);
        assert_eq!(sums.sum_s4, 0.0);
    }

    #[test]
    fn test_exponent_cutoff() {
        // With w = 1, pixels further than sqrt(14) ≈ 3.74 px are skipped.
        let image = flat(21, 21, 1.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(10.0, 10.0), 0.0, 1e6);
        let weights = WeightTriple::new(1.0, 0.0, 1.0);
        let full = BoundingBox::new(0, 20, 0, 20);
        let inner = BoundingBox::new(6, 14, 6, 14);
        let a = acc
            .accumulate(&full, &weights, false, AccumulationMode::FluxOnly)
            .unwrap();
        let b = acc
            .accumulate(&inner, &weights, false, AccumulationMode::FluxOnly)
            .unwrap();
        assert_eq!(a.sum, b.sum);
    }

    #[test]
    fn test_interpolated_unweighted_samples_sixteen_times() {
        let image = flat(5, 5, 1.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(2.0, 2.0), 0.0, 1e6);
        let bbox = BoundingBox::new(2, 2, 2, 2);
        let sums = acc
            .accumulate(&bbox, &WeightTriple::UNWEIGHTED, true, AccumulationMode::Full)
            .unwrap();
        assert!((sums.sum - 16.0).abs() < 1e-12);
        // Sub-sample offsets ±0.125, ±0.375: mean square 0.078125.
        assert!((sums.sum_xx / sums.sum - 0.078125).abs() < 1e-12);
        assert!((sums.sum_yy / sums.sum - 0.078125).abs() < 1e-12);
        assert!((sums.centroid() - DVec2::new(2.0, 2.0)).length() < 1e-12);
    }

    #[test]
    fn test_interpolated_cell_skipped_when_all_corners_far() {
        let image = flat(11, 11, 1.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(5.0, 5.0), 0.0, 1e6);
        let weights = WeightTriple::new(4.0, 0.0, 4.0);
        // Pixel (8, 5): x = 3, corners at 2.625²·4 ≈ 27.6 > 9.
        let far = BoundingBox::new(8, 8, 5, 5);
        let err = acc
            .accumulate(&far, &weights, true, AccumulationMode::Full)
            .unwrap_err();
        assert!(matches!(err, AccumulateError::Degenerate(s) if s.sum == 0.0));
    }

    #[test]
    fn test_rejects_large_weights() {
        let image = flat(5, 5, 1.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(2.0, 2.0), 0.0, 1e6);
        let bbox = BoundingBox::new(0, 4, 0, 4);
        let err = acc
            .accumulate(
                &bbox,
                &WeightTriple::new(2e6, 0.0, 1.0),
                false,
                AccumulationMode::FluxOnly,
            )
            .unwrap_err();
        assert_eq!(err, AccumulateError::WeightsOutOfRange);
    }

    #[test]
    fn test_rejects_box_outside_image() {
        let image = flat(5, 5, 1.0);
        let acc = MomentAccumulator::new(&image, DVec2::new(2.0, 2.0), 0.0, 1e6);
        let bbox = BoundingBox::new(0, 5, 0, 4);
        assert!(matches!(
            acc.accumulate(&bbox, &WeightTriple::UNWEIGHTED, false, AccumulationMode::Full),
            Err(AccumulateError::OutsideImage(_))
        ));
    }

    #[test]
    fn test_single_pixel_is_degenerate_but_keeps_flux() {
        let mut image = flat(7, 7, 0.0);
        image[(3, 3)] = 5.0;
        let acc = MomentAccumulator::new(&image, DVec2::new(3.0, 3.0), 0.0, 1e6);
        let bbox = BoundingBox::new(0, 6, 0, 6);
        let err = acc
            .accumulate(&bbox, &WeightTriple::UNWEIGHTED, false, AccumulationMode::Full)
            .unwrap_err();
        assert_eq!(err.partial_sum(), 5.0);
    }
}
