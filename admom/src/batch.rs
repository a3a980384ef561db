//! Shape measurement of many sources on one image.

use glam::DVec2;
use rayon::prelude::*;
use tracing::debug;

use crate::config::ShapeMeasurementConfig;
use crate::error::Result;
use crate::moments::{ShapeEstimate, estimate_adaptive_moments_with_config};
use crate::region::PixelRegion;

/// Sources in flight per rayon worker thread.
const SOURCES_PER_THREAD: usize = 16;

/// Measures adaptive moments for every centroid guess in `centers`, in parallel.
///
/// Each source is independent and the output order matches `centers`. The outer error reports an
/// invalid `config`; per-source errors (non-finite guesses) are returned in place.
pub fn measure_batch<R>(
    region: &R,
    centers: &[DVec2],
    config: &ShapeMeasurementConfig,
) -> Result<Vec<Result<ShapeEstimate>>>
where
    R: PixelRegion + Sync + ?Sized,
{
    config.validate()?;
    let shiftmax = config.effective_shiftmax();
    let max_in_flight = rayon::current_num_threads().max(1) * SOURCES_PER_THREAD;

    let mut results = Vec::with_capacity(centers.len());
    for chunk in centers.chunks(max_in_flight) {
        results.par_extend(chunk.par_iter().map(|&center| {
            estimate_adaptive_moments_with_config(
                region,
                config.background,
                center,
                shiftmax,
                &config.adaptive,
            )
        }));
    }

    let failed = results
        .iter()
        .filter(|r| !r.as_ref().is_ok_and(ShapeEstimate::is_success))
        .count();
    debug!(sources = centers.len(), failed, "batch shape measurement finished");
    Ok(results)
}
