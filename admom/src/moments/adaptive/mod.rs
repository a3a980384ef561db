//! Adaptive elliptical-Gaussian moments.
//!
//! The weight `W` is iterated towards the object's own covariance. Each round measures the
//! moments `S` of weight × object. For Gaussians the inverse covariances of a product add, so
//! `S⁻¹ - W⁻¹` estimates the object's inverse covariance, which becomes the next weight. At the
//! fixed point `W` equals the object covariance, and `W` is what gets reported.
//!
//! Rounds stop when the ellipticity `(e1, e2)` of `S` and its `xx` component settle. When the
//! Gaussian assumption breaks down (non-positive moments, a non-positive-definite proposal,
//! exhausted iterations) the loop falls back to flat-top unweighted moments over the last box.

use std::f64::consts::PI;

use glam::DVec2;
use tracing::{debug, trace, warn};

use super::accumulate::{AccumulationMode, MomentAccumulator, MomentSums};
use super::bbox::{BoundingBox, needs_interpolation};
use super::fisher::{ShapeErrors, estimate_errors};
use super::shape::ShapeEstimate;
use super::weights::{Quadrupole, SINGLE_PIXEL_MOMENT, WeightSolution, WeightTriple, solve_weights};
use crate::config::AdaptiveMomentsConfig;
use crate::error::{Error, Result};
use crate::flags::ShapeFlags;
use crate::region::PixelRegion;


/// Starting value for the "previous" e1, e2 and σ11 so round 0 never converges.
const UNSET: f64 = 1e6;

/// State of one completed round, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RoundSummary {
    pub iteration: usize,
    pub e1: f64,
    pub e2: f64,
    /// `xx` moment of weight × object.
    pub sigma11_ow: f64,
    /// Weight covariance used this round.
    pub weight: Quadrupole,
    pub interpolate: bool,
}

/// Measures adaptive moments with the default configuration.
///
/// `center` is the initial centroid guess; the weight stays centred on it. `shiftmax` bounds the
/// distance (per axis) between the guess and the measured centroid before [`ShapeFlags::SHIFT`]
/// is raised.
pub fn estimate_adaptive_moments<R: PixelRegion + ?Sized>(
    region: &R,
    background: f64,
    center: DVec2,
    shiftmax: f64,
) -> Result<ShapeEstimate> {
    estimate_adaptive_moments_with_config(
        region,
        background,
        center,
        shiftmax,
        &AdaptiveMomentsConfig::default(),
    )
}

/// Measures adaptive moments.
///
/// Returns an error only for a non-finite centroid guess or an invalid `config`. Every
/// data-driven failure yields a best-effort estimate with flags set.
pub fn estimate_adaptive_moments_with_config<R: PixelRegion + ?Sized>(
    region: &R,
    background: f64,
    center: DVec2,
    shiftmax: f64,
    config: &AdaptiveMomentsConfig,
) -> Result<ShapeEstimate> {
    config.validate()?;
    estimate_observed(region, background, center, shiftmax, config, |round| {
        trace!(
            iteration = round.iteration,
            e1 = round.e1,
            e2 = round.e2,
            sigma11_ow = round.sigma11_ow,
            interpolate = round.interpolate,
            "adaptive moments round"
        );
    })
}

pub(crate) fn estimate_observed<R, F>(
    region: &R,
    background: f64,
    center: DVec2,
    shiftmax: f64,
    config: &AdaptiveMomentsConfig,
    on_round: F,
) -> Result<ShapeEstimate>
where
    R: PixelRegion + ?Sized,
    F: FnMut(&RoundSummary),
{
    if !center.is_finite() {
        return Err(Error::NonFiniteCentroid {
            x: center.x,
            y: center.y,
        });
    }

    let accumulator = MomentAccumulator::new(region, center, background, config.max_weight);
    let outcome = AdaptiveIterator::new(region.width(), region.height(), center, shiftmax, config)
        .run(&accumulator, on_round);
    Ok(outcome.finish(region, &accumulator, center, config))
}

// ============================================================================
// Fixed-point loop
// ============================================================================

struct AdaptiveIterator<'c> {
    width: usize,
    height: usize,
    center: DVec2,
    shiftmax: f64,
    config: &'c AdaptiveMomentsConfig,
}

/// Where the loop stopped and what it measured last.
struct LoopOutcome {
    flags: ShapeFlags,
    weight: Quadrupole,
    bbox: BoundingBox,
    interpolate: bool,
    sums: Option<MomentSums>,
    amplitude: f64,
    centroid: DVec2,
    iterations: usize,
}

impl<'c> AdaptiveIterator<'c> {
    fn new(
        width: usize,
        height: usize,
        center: DVec2,
        shiftmax: f64,
        config: &'c AdaptiveMomentsConfig,
    ) -> Self {
        Self {
            width,
            height,
            center,
            shiftmax,
            config,
        }
    }

    fn run<R, F>(&self, accumulator: &MomentAccumulator<'_, R>, mut on_round: F) -> LoopOutcome
    where
        R: PixelRegion + ?Sized,
        F: FnMut(&RoundSummary),
    {
        let mut out = LoopOutcome {
            flags: ShapeFlags::empty(),
            weight: Quadrupole::circular(self.config.initial_moment),
            bbox: BoundingBox::default(),
            interpolate: false,
            sums: None,
            amplitude: f64::NAN,
            centroid: DVec2::NAN,
            iterations: 0,
        };

        let mut e1_prev = UNSET;
        let mut e2_prev = UNSET;
        let mut sigma11_ow_prev = UNSET;
        let mut previous: Option<WeightSolution> = None;

        let mut iter = 0;
        while iter < self.config.max_iter {
            out.iterations = iter;
            out.bbox = BoundingBox::around(
                self.width,
                self.height,
                self.center,
                &out.weight,
                self.config.max_radius,
            );

            let Some(mut current) = solve_weights(out.weight) else {
                debug!(iteration = iter, weight = ?out.weight, "weight covariance is NaN");
                out.flags.insert(ShapeFlags::UNWEIGHTED);
                break;
            };

            // Switching to sub-pixel sampling changes the moments discontinuously, so the round
            // that first needs it is redone with the previous weights and not counted.
            let mut counted = true;
            if !out.interpolate && needs_interpolation(out.weight.ixx, out.weight.iyy, current.det)
            {
                out.interpolate = true;
                if iter > 0
                    && let Some(prev) = previous
                {
                    current = prev;
                    sigma11_ow_prev = UNSET;
                    counted = false;
                }
            }
            previous = Some(current);

            let sums = match accumulator.accumulate(
                &out.bbox,
                &current.weights,
                out.interpolate,
                AccumulationMode::Full,
            ) {
                Ok(sums) => sums,
                Err(err) => {
                    debug!(iteration = iter, %err, "weighted moments failed");
                    out.flags.insert(ShapeFlags::UNWEIGHTED);
                    break;
                }
            };
            out.sums = Some(sums);
            out.amplitude = sums.sum / (PI * current.det.sqrt());
            out.centroid = sums.centroid();
            if (out.centroid - self.center).abs().max_element() > self.shiftmax {
                out.flags.insert(ShapeFlags::SHIFT);
            }

            let object = Quadrupole::new(
                sums.sum_xx / sums.sum,
                sums.sum_xy / sums.sum,
                sums.sum_yy / sums.sum,
            );
            if object.ixx <= 0.0 || object.iyy <= 0.0 {
                out.flags.insert(ShapeFlags::UNWEIGHTED);
                break;
            }

            let (e1, e2) = object.ellipticity();
            on_round(&RoundSummary {
                iteration: iter,
                e1,
                e2,
                sigma11_ow: object.ixx,
                weight: out.weight,
                interpolate: out.interpolate,
            });

            if iter > 0
                && (e1 - e1_prev).abs() < self.config.tol1
                && (e2 - e2_prev).abs() < self.config.tol1
                && (object.ixx / sigma11_ow_prev - 1.0).abs() < self.config.tol2
            {
                break;
            }
            e1_prev = e1;
            e2_prev = e2;
            sigma11_ow_prev = object.ixx;

            match next_weight(&object, &current.weights) {
                Some(weight) => out.weight = weight,
                None => {
                    debug!(iteration = iter, ?object, "re-weighting left the Gaussian regime");
                    out.flags.insert(ShapeFlags::UNWEIGHTED);
                    break;
                }
            }

            if counted {
                iter += 1;
            }
        }

        if iter >= self.config.max_iter {
            out.iterations = iter;
            out.flags.insert(ShapeFlags::MAXITER | ShapeFlags::UNWEIGHTED);
        }
        if out.sums.is_some_and(|s| s.sum_xx + s.sum_yy == 0.0) {
            out.flags.insert(ShapeFlags::UNWEIGHTED);
        }
        out
    }
}

/// Next weight covariance from the moments `object` of weight × object measured with `weights`.
///
/// Returns `None` when the implied object precision is not positive definite (the source is
/// not Gaussian enough for the update rule) or the result is unusable.
fn next_weight(object: &Quadrupole, weights: &WeightTriple) -> Option<Quadrupole> {
    let object_precision = solve_weights(*object)?.weights;
    let precision = object_precision - *weights;
    if !precision.as_quadrupole().is_positive_semidefinite() {
        return None;
    }
    let next = solve_weights(precision.as_quadrupole())?.weights.as_quadrupole();
    (next.ixx > 0.0 && next.iyy > 0.0).then_some(next)
}

// ============================================================================
// Final estimate
// ============================================================================

impl LoopOutcome {
    fn finish<R: PixelRegion + ?Sized>(
        self,
        region: &R,
        accumulator: &MomentAccumulator<'_, R>,
        center: DVec2,
        config: &AdaptiveMomentsConfig,
    ) -> ShapeEstimate {
        let mut flags = self.flags;
        let mut centroid = self.centroid;
        let moments;
        let ixy4;

        if flags.contains(ShapeFlags::UNWEIGHTED) {
            match accumulator.accumulate(
                &self.bbox,
                &WeightTriple::UNWEIGHTED,
                self.interpolate,
                AccumulationMode::Full,
            ) {
                Ok(sums) => {
                    moments = Quadrupole::new(
                        sums.sum_xx / sums.sum,
                        sums.sum_xy / sums.sum,
                        sums.sum_yy / sums.sum,
                    );
                    ixy4 = sums.sum_s4 / sums.sum;
                    if !centroid.is_finite() {
                        centroid = sums.centroid();
                    }
                }
                Err(err) => {
                    flags.remove(ShapeFlags::UNWEIGHTED);
                    flags.insert(ShapeFlags::UNWEIGHTED_BAD);
                    if !centroid.is_finite() {
                        flags.insert(ShapeFlags::BAD_CENTROID);
                    }
                    debug!(%err, %flags, "unweighted moments failed");

                    // Something was there, so call it a single pixel.
                    let moments = if err.partial_sum() > 0.0 {
                        Quadrupole::circular(SINGLE_PIXEL_MOMENT)
                    } else {
                        Quadrupole::NAN
                    };
                    return ShapeEstimate {
                        amplitude: f64::NAN,
                        centroid,
                        centroid_err: DVec2::NAN,
                        moments,
                        ixy4: f64::NAN,
                        covariance: None,
                        flags,
                        iterations: self.iterations,
                    };
                }
            }
        } else {
            moments = self.weight;
            ixy4 = self.sums.map_or(f64::NAN, |s| s.sum_s4 / s.sum);
        }

        if !centroid.is_finite() {
            flags.insert(ShapeFlags::BAD_CENTROID);
        }

        let errors = if config.compute_covariance
            && !flags.contains(ShapeFlags::UNWEIGHTED)
            && moments.trace() != 0.0
        {
            shape_errors(region, center, self.amplitude, &moments)
        } else {
            None
        };

        debug!(
            iterations = self.iterations,
            %flags,
            ixx = moments.ixx,
            ixy = moments.ixy,
            iyy = moments.iyy,
            "adaptive moments finished"
        );

        ShapeEstimate {
            amplitude: self.amplitude,
            centroid,
            centroid_err: errors.map_or(DVec2::NAN, |e| e.centroid_err),
            moments,
            ixy4,
            covariance: errors.map(|e| e.covariance),
            flags,
            iterations: self.iterations,
        }
    }
}

/// Fisher-matrix errors using the variance at the pixel containing `center`.
///
/// The variance there includes the object itself, so the errors are somewhat overestimated.
fn shape_errors<R: PixelRegion + ?Sized>(
    region: &R,
    center: DVec2,
    amplitude: f64,
    moments: &Quadrupole,
) -> Option<ShapeErrors> {
    let ix = (center.x + 0.5).floor();
    let iy = (center.y + 0.5).floor();
    if ix < 0.0 || iy < 0.0 || ix >= region.width() as f64 || iy >= region.height() as f64 {
        return None;
    }
    let variance = region.variance(ix as usize, iy as usize)?;
    // NaN is not > 0.
    if !(variance > 0.0) {
        return None;
    }

    match estimate_errors(amplitude, moments, variance) {
        Ok(errors) => Some(errors),
        Err(err) => {
            warn!(%err, ?moments, variance, "skipping shape covariance");
            None
        }
    }
}
