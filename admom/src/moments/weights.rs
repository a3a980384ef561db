//! Covariance ↔ weight conversion.
//!
//! A Gaussian weight `exp(-½ xᵀ W x)` is described by its precision matrix `W`, the inverse of the
//! covariance (quadrupole) `Q`. [`solve_weights`] performs that inversion and regularizes singular
//! or nearly singular quadrupoles by adding the second moment of a single pixel (1/12) to both
//! principal axes, so a usable weight always comes back for finite input.

use glam::DMat2;
use serde::{Deserialize, Serialize};

/// Second moment of a uniformly illuminated unit pixel.
pub const SINGLE_PIXEL_MOMENT: f64 = 1.0 / 12.0;

/// Quadrupole determinants below this are treated as singular.
const DEGENERATE_DET: f64 = f32::EPSILON as f64;

/// Symmetric 2×2 second-moment matrix `[[ixx, ixy], [ixy, iyy]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrupole {
    pub ixx: f64,
    pub ixy: f64,
    pub iyy: f64,
}

/// Covariance of the Gaussian weighting kernel.
pub type WeightingCovariance = Quadrupole;

impl Quadrupole {
    pub const NAN: Self = Self::new(f64::NAN, f64::NAN, f64::NAN);

    #[inline]
    pub const fn new(ixx: f64, ixy: f64, iyy: f64) -> Self {
        Self { ixx, ixy, iyy }
    }

    /// Isotropic quadrupole with `ixx == iyy == moment`.
    #[inline]
    pub const fn circular(moment: f64) -> Self {
        Self::new(moment, 0.0, moment)
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.ixx * self.iyy - self.ixy * self.ixy
    }

    #[inline]
    pub fn trace(&self) -> f64 {
        self.ixx + self.iyy
    }

    #[inline]
    pub fn has_nan(&self) -> bool {
        self.ixx.is_nan() || self.ixy.is_nan() || self.iyy.is_nan()
    }

    /// Strictly positive diagonal and non-negative determinant.
    #[inline]
    pub fn is_positive_semidefinite(&self) -> bool {
        self.ixx > 0.0 && self.iyy > 0.0 && self.determinant() >= 0.0
    }

    /// Ellipticity components `(e1, e2) = ((ixx - iyy) / tr, 2 ixy / tr)`.
    #[inline]
    pub fn ellipticity(&self) -> (f64, f64) {
        let trace = self.trace();
        ((self.ixx - self.iyy) / trace, 2.0 * self.ixy / trace)
    }

    #[inline]
    pub fn to_mat2(self) -> DMat2 {
        DMat2::from_cols_array(&[self.ixx, self.ixy, self.ixy, self.iyy])
    }

    #[inline]
    pub fn from_mat2(m: DMat2) -> Self {
        Self::new(m.x_axis.x, m.x_axis.y, m.y_axis.y)
    }
}

/// Ellipse described by its semi-major axis `a`, semi-minor axis `b` and the position angle
/// `theta` of the major axis (radians from +x).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axes {
    pub a: f64,
    pub b: f64,
    pub theta: f64,
}

impl From<Quadrupole> for Axes {
    fn from(q: Quadrupole) -> Self {
        let half_sum = 0.5 * q.trace();
        let half_diff = 0.5 * (q.ixx - q.iyy);
        let root = (half_diff * half_diff + q.ixy * q.ixy).sqrt();
        // A non-positive-definite input has a negative minor eigenvalue; clamp it to a line.
        let a2 = (half_sum + root).max(0.0);
        let b2 = (half_sum - root).max(0.0);
        Self {
            a: a2.sqrt(),
            b: b2.sqrt(),
            theta: 0.5 * (2.0 * q.ixy).atan2(q.ixx - q.iyy),
        }
    }
}

impl From<Axes> for Quadrupole {
    fn from(axes: Axes) -> Self {
        let (s, c) = axes.theta.sin_cos();
        let a2 = axes.a * axes.a;
        let b2 = axes.b * axes.b;
        Self::new(a2 * c * c + b2 * s * s, (a2 - b2) * s * c, a2 * s * s + b2 * c * c)
    }
}

/// Precision (inverse-covariance) elements of a Gaussian weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTriple {
    pub w11: f64,
    pub w12: f64,
    pub w22: f64,
}

impl WeightTriple {
    /// Flat weight: every pixel counts with weight 1.
    pub const UNWEIGHTED: Self = Self::new(0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(w11: f64, w12: f64, w22: f64) -> Self {
        Self { w11, w12, w22 }
    }

    /// Quadratic form `w11 x² + 2 w12 xy + w22 y²`.
    #[inline]
    pub fn exponent(&self, x: f64, y: f64) -> f64 {
        x * x * self.w11 + 2.0 * x * y * self.w12 + y * y * self.w22
    }

    /// False when any element exceeds `limit` in magnitude.
    #[inline]
    pub fn within(&self, limit: f64) -> bool {
        !(self.w11.abs() > limit || self.w12.abs() > limit || self.w22.abs() > limit)
    }

    /// Reinterprets the triple as a symmetric matrix.
    #[inline]
    pub fn as_quadrupole(&self) -> Quadrupole {
        Quadrupole::new(self.w11, self.w12, self.w22)
    }
}

impl std::ops::Sub for WeightTriple {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.w11 - rhs.w11, self.w12 - rhs.w12, self.w22 - rhs.w22)
    }
}

/// Result of a successful [`solve_weights`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSolution {
    pub weights: WeightTriple,
    /// Determinant of the covariance that was actually inverted.
    pub det: f64,
    /// `true` when the input was singular and had to be regularized.
    pub regularized: bool,
}

impl WeightSolution {
    /// Covariance corresponding to [`Self::weights`].
    pub fn covariance(&self) -> Quadrupole {
        Quadrupole::from_mat2(self.weights.as_quadrupole().to_mat2().inverse())
    }
}

/// Inverts a candidate covariance into Gaussian weights.
///
/// Returns `None` when any element is NaN. Near-singular input (`det < f32::EPSILON`) is
/// regularized by adding [`SINGLE_PIXEL_MOMENT`] in quadrature to both principal axes.
pub fn solve_weights(cov: Quadrupole) -> Option<WeightSolution> {
    if cov.has_nan() {
        return None;
    }

    let det = cov.determinant();
    if det.is_nan() || det < DEGENERATE_DET {
        let mut axes = Axes::from(cov);
        axes.a = (axes.a * axes.a + SINGLE_PIXEL_MOMENT).sqrt();
        axes.b = (axes.b * axes.b + SINGLE_PIXEL_MOMENT).sqrt();
        let regularized = Quadrupole::from(axes).to_mat2();
        let inv = Quadrupole::from_mat2(regularized.inverse());
        return Some(WeightSolution {
            weights: WeightTriple::new(inv.ixx, inv.ixy, inv.iyy),
            det: regularized.determinant(),
            regularized: true,
        });
    }

    Some(WeightSolution {
        weights: WeightTriple::new(cov.iyy / det, -cov.ixy / det, cov.ixx / det),
        det,
        regularized: false,
    })
}
