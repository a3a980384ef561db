//! Synthetic source stamps shared by the unit tests.

use glam::DVec2;

use crate::Buffer2;
use crate::moments::Quadrupole;

/// Generate a circular Gaussian source of standard deviation `sigma`.
pub fn make_gaussian_star(
    width: usize,
    height: usize,
    pos: DVec2,
    sigma: f64,
    amplitude: f64,
    background: f64,
) -> Buffer2<f64> {
    make_elliptical_star(
        width,
        height,
        pos,
        Quadrupole::circular(sigma * sigma),
        amplitude,
        background,
    )
}

/// Generate an elliptical Gaussian source with covariance `moments`.
pub fn make_elliptical_star(
    width: usize,
    height: usize,
    pos: DVec2,
    moments: Quadrupole,
    amplitude: f64,
    background: f64,
) -> Buffer2<f64> {
    let inv = moments.to_mat2().inverse();
    Buffer2::from_fn(width, height, |x, y| {
        let d = DVec2::new(x as f64, y as f64) - pos;
        background + amplitude * (-0.5 * d.dot(inv * d)).exp()
    })
}

/// Add deterministic pseudo-Gaussian noise (sum of uniform LCG draws).
pub fn add_noise(image: &mut Buffer2<f64>, noise_sigma: f64, seed: u64) {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    let mut uniform = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    for p in image.pixels_mut() {
        // Irwin-Hall with 12 draws has unit variance.
        let n: f64 = (0..12).map(|_| uniform()).sum::<f64>() - 6.0;
        *p += noise_sigma * n;
    }
}

/// Single bright pixel on a zero background.
pub fn make_point_source(width: usize, height: usize, x: usize, y: usize, value: f64) -> Buffer2<f64> {
    let mut image = Buffer2::new_filled(width, height, 0.0);
    image[(x, y)] = value;
    image
}
