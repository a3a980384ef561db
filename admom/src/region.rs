//! Read-only pixel access for the moment engine.
//!
//! Any rectangular grid can be measured once it implements [`PixelRegion`]. Grids that carry a
//! per-pixel variance plane expose it through [`PixelRegion::variance`], which enables the
//! Fisher-matrix error estimate.

use common::Buffer2;

/// A rectangular grid of intensities with an optional variance channel.
///
/// Coordinates are `(column, row)` and always satisfy `x < width()`, `y < height()` when called
/// by the engine.
pub trait PixelRegion {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn intensity(&self, x: usize, y: usize) -> f64;

    /// Per-pixel variance, `None` when the region has no variance plane.
    fn variance(&self, _x: usize, _y: usize) -> Option<f64> {
        None
    }
}

impl<R: PixelRegion + ?Sized> PixelRegion for &R {
    #[inline]
    fn width(&self) -> usize {
        (**self).width()
    }

    #[inline]
    fn height(&self) -> usize {
        (**self).height()
    }

    #[inline]
    fn intensity(&self, x: usize, y: usize) -> f64 {
        (**self).intensity(x, y)
    }

    #[inline]
    fn variance(&self, x: usize, y: usize) -> Option<f64> {
        (**self).variance(x, y)
    }
}

impl PixelRegion for Buffer2<f32> {
    #[inline]
    fn width(&self) -> usize {
        Buffer2::width(self)
    }

    #[inline]
    fn height(&self) -> usize {
        Buffer2::height(self)
    }

    #[inline]
    fn intensity(&self, x: usize, y: usize) -> f64 {
        *self.get(x, y) as f64
    }
}

impl PixelRegion for Buffer2<f64> {
    #[inline]
    fn width(&self) -> usize {
        Buffer2::width(self)
    }

    #[inline]
    fn height(&self) -> usize {
        Buffer2::height(self)
    }

    #[inline]
    fn intensity(&self, x: usize, y: usize) -> f64 {
        *self.get(x, y)
    }
}

/// Image plane paired with a variance plane of the same size.
#[derive(Debug, Clone)]
pub struct MaskedImage {
    image: Buffer2<f32>,
    variance: Buffer2<f32>,
}

impl MaskedImage {
    pub fn new(image: Buffer2<f32>, variance: Buffer2<f32>) -> Self {
        assert!(
            image.width() == variance.width() && image.height() == variance.height(),
            "variance plane {}x{} does not match image {}x{}",
            variance.width(),
            variance.height(),
            image.width(),
            image.height()
        );
        Self { image, variance }
    }

    /// Pairs `image` with a variance plane of constant value.
    pub fn with_uniform_variance(image: Buffer2<f32>, variance: f32) -> Self {
        let variance = Buffer2::new_filled(image.width(), image.height(), variance);
        Self { image, variance }
    }

    pub fn image(&self) -> &Buffer2<f32> {
        &self.image
    }

    pub fn variance_plane(&self) -> &Buffer2<f32> {
        &self.variance
    }
}

impl PixelRegion for MaskedImage {
    #[inline]
    fn width(&self) -> usize {
        self.image.width()
    }

    #[inline]
    fn height(&self) -> usize {
        self.image.height()
    }

    #[inline]
    fn intensity(&self, x: usize, y: usize) -> f64 {
        *self.image.get(x, y) as f64
    }

    #[inline]
    fn variance(&self, x: usize, y: usize) -> Option<f64> {
        Some(*self.variance.get(x, y) as f64)
    }
}
