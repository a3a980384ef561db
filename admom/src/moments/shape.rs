use glam::{DMat4, DVec2};
use serde::{Deserialize, Serialize};

use super::weights::Quadrupole;
use crate::flags::ShapeFlags;

/// Result of one adaptive moments measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeEstimate {
    /// Peak amplitude `I0` of the best-fit elliptical Gaussian. NaN when UNWEIGHTED_BAD is set.
    pub amplitude: f64,
    /// Flux-weighted centroid in pixel coordinates.
    pub centroid: DVec2,
    /// 1σ centroid uncertainty, NaN when no error estimate was made.
    pub centroid_err: DVec2,
    /// Second moments `(Ixx, Ixy, Iyy)` in px².
    pub moments: Quadrupole,
    /// Fourth-order diagnostic `Σ w·I·e² / Σ w·I`. Zero after an unweighted fallback, NaN when
    /// that also failed.
    pub ixy4: f64,
    /// Covariance of `(I0, Ixx, Iyy, Ixy)` when a variance was available.
    pub covariance: Option<DMat4>,
    pub flags: ShapeFlags,
    /// Counted re-weighting rounds.
    pub iterations: usize,
}

impl ShapeEstimate {
    #[inline]
    pub fn ixx(&self) -> f64 {
        self.moments.ixx
    }

    #[inline]
    pub fn ixy(&self) -> f64 {
        self.moments.ixy
    }

    #[inline]
    pub fn iyy(&self) -> f64 {
        self.moments.iyy
    }

    /// False when even the unweighted fallback failed.
    #[inline]
    pub fn is_success(&self) -> bool {
        !self.flags.contains(ShapeFlags::UNWEIGHTED_BAD)
    }

    pub fn amplitude_err(&self) -> f64 {
        self.std_dev(0)
    }

    pub fn ixx_err(&self) -> f64 {
        self.std_dev(1)
    }

    pub fn iyy_err(&self) -> f64 {
        self.std_dev(2)
    }

    pub fn ixy_err(&self) -> f64 {
        self.std_dev(3)
    }

    fn std_dev(&self, index: usize) -> f64 {
        self.covariance
            .map_or(f64::NAN, |c| c.col(index)[index].sqrt())
    }
}
