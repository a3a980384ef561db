//! Benchmark module for adaptive moments and fixed-aperture flux.
//! Run with: cargo bench -p admom --features bench --bench adaptive_moments

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput};
use glam::DVec2;

use super::{Quadrupole, estimate_adaptive_moments, fixed_aperture_flux};
use crate::Buffer2;
use crate::batch::measure_batch;
use crate::config::ShapeMeasurementConfig;

/// Generate an elliptical Gaussian stamp with a constant pedestal.
fn generate_stamp(size: usize, center: DVec2, moments: Quadrupole, amplitude: f32) -> Buffer2<f32> {
    let inv = moments.to_mat2().inverse();
    Buffer2::from_fn(size, size, |x, y| {
        let d = DVec2::new(x as f64, y as f64) - center;
        0.1 + amplitude * (-0.5 * d.dot(inv * d)).exp() as f32
    })
}

/// Generate a field of identical stars on a regular grid.
fn generate_star_field(size: usize, spacing: usize) -> (Buffer2<f32>, Vec<DVec2>) {
    let centers: Vec<DVec2> = (spacing / 2..size - spacing / 2)
        .step_by(spacing)
        .flat_map(|y| {
            (spacing / 2..size - spacing / 2)
                .step_by(spacing)
                .map(move |x| DVec2::new(x as f64 + 0.3, y as f64 + 0.7))
        })
        .collect();

    let inv = Quadrupole::new(4.0, 0.5, 3.0).to_mat2().inverse();
    let mut image = Buffer2::new_filled(size, size, 0.1f32);
    let half = (spacing / 2) as i64;
    for center in &centers {
        let (cx, cy) = (center.x as i64, center.y as i64);
        for y in (cy - half).max(0)..(cy + half).min(size as i64) {
            for x in (cx - half).max(0)..(cx + half).min(size as i64) {
                let d = DVec2::new(x as f64, y as f64) - *center;
                image[(x as usize, y as usize)] += (-0.5 * d.dot(inv * d)).exp() as f32;
            }
        }
    }
    (image, centers)
}

/// Register adaptive moments benchmarks with Criterion.
pub fn benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_moments");
    group.sample_size(50);

    for sigma in [1.0, 3.0, 8.0] {
        let size = (sigma * 12.0) as usize + 1;
        let center = DVec2::splat(size as f64 / 2.0 + 0.3);
        let stamp = generate_stamp(size, center, Quadrupole::new(sigma * sigma, 0.0, sigma * sigma), 100.0);

        group.bench_function(BenchmarkId::new("estimate", format!("sigma_{sigma}")), |b| {
            b.iter(|| {
                black_box(estimate_adaptive_moments(
                    black_box(&stamp),
                    0.1,
                    black_box(center),
                    1.0,
                ))
            })
        });
    }

    {
        let center = DVec2::new(32.0, 32.0);
        let covariance = Quadrupole::new(9.0, 1.0, 6.0);
        let stamp = generate_stamp(64, center, covariance, 100.0);
        group.bench_function("fixed_aperture_flux_64x64", |b| {
            b.iter(|| black_box(fixed_aperture_flux(black_box(&stamp), 0.1, center, &covariance)))
        });
    }

    group.finish();

    let mut group = c.benchmark_group("measure_batch");
    group.sample_size(20);
    for size in [256, 1024] {
        let (image, centers) = generate_star_field(size, 32);
        let config = ShapeMeasurementConfig {
            background: 0.1,
            ..Default::default()
        };
        group.throughput(Throughput::Elements(centers.len() as u64));
        group.bench_function(BenchmarkId::new("stars", centers.len()), |b| {
            b.iter(|| black_box(measure_batch(black_box(&image), &centers, &config)))
        });
    }
    group.finish();
}
