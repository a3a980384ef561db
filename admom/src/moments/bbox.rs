//! Region of pixels visited by one moment evaluation.

use glam::DVec2;

use super::weights::Quadrupole;

/// The weight kernel is evaluated out to this many sigma along its widest axis.
const RADIUS_IN_SIGMA: f64 = 4.0;

/// Below this variance (0.5² px²) the weight is narrower than a pixel and must be
/// sub-sampled.
const INTERP_MOMENT: f64 = 0.25;

/// Inclusive pixel box `[x_min, x_max] × [y_min, y_max]`.
///
/// Bounds are signed so that a source lying entirely off the image produces a box with
/// `x_min > x_max` (or likewise for y), which [`BoundingBox::is_empty`] reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl BoundingBox {
    #[inline]
    pub const fn new(x_min: i64, x_max: i64, y_min: i64, y_max: i64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Box covering `4·sqrt(max(σ11, σ22))` pixels (capped at `max_radius`) around `center`,
    /// clipped to a `width × height` image.
    pub fn around(
        width: usize,
        height: usize,
        center: DVec2,
        cov: &Quadrupole,
        max_radius: f64,
    ) -> Self {
        let radius = (RADIUS_IN_SIGMA * cov.ixx.max(cov.iyy).max(0.0).sqrt()).min(max_radius);

        Self {
            x_min: ((center.x - radius - 0.5).floor() as i64).max(0),
            x_max: ((center.x + radius + 0.5).floor() as i64).min(width as i64 - 1),
            y_min: ((center.y - radius - 0.5).floor() as i64).max(0),
            y_max: ((center.y + radius + 0.5).floor() as i64).min(height as i64 - 1),
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max
    }

    /// Number of columns, zero for an empty box.
    #[inline]
    pub const fn width(&self) -> usize {
        if self.x_min > self.x_max {
            0
        } else {
            (self.x_max - self.x_min + 1) as usize
        }
    }

    /// Number of rows, zero for an empty box.
    #[inline]
    pub const fn height(&self) -> usize {
        if self.y_min > self.y_max {
            0
        } else {
            (self.y_max - self.y_min + 1) as usize
        }
    }

    #[inline]
    pub const fn area(&self) -> usize {
        self.width() * self.height()
    }

    #[inline]
    pub const fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// True when the box is non-empty and every pixel lies inside a `width × height` image.
    #[inline]
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        !self.is_empty()
            && self.x_min >= 0
            && self.y_min >= 0
            && self.x_max < width as i64
            && self.y_max < height as i64
    }
}

/// Whether a weight of covariance `(σ11, ·, σ22)` with determinant `det` is too narrow to be
/// sampled at pixel centres.
#[inline]
pub fn needs_interpolation(sigma11: f64, sigma22: f64, det: f64) -> bool {
    sigma11 < INTERP_MOMENT || sigma22 < INTERP_MOMENT || det < INTERP_MOMENT * INTERP_MOMENT
}
