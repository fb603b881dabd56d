//! Centerline extraction: threshold, thin, order, then fit a smoothing parametric spline.

mod smoothing;

use image::{GrayImage, RgbImage};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    binarize::{auto_threshold, to_gray, ThresholdRange},
    definitions::{DEFAULT_SEGMENTS, MIN_SKELETON_POINTS},
    progress::{ProgressObserver, ProgressTracker},
    skeleton::{set_pixel_coords, thin},
    video::VideoSource,
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplinePoint {
    /// Column.
    pub x: f64,
    /// Row.
    pub y: f64,
}

/// A smoothed centerline sampled at evenly spaced parameter values. Always holds
/// `segments + 1` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spline {
    points: Vec<SplinePoint>,
}

impl Spline {
    pub fn points(&self) -> &[SplinePoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<SplinePoint> {
        self.points
    }

    pub fn segments(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplineParams {
    pub range: ThresholdRange,

    /// Upper bound on the summed squared distance between the skeleton points and the
    /// fitted curve. `Some(0.0)` interpolates every point. `None` uses
    /// `m - sqrt(2m)` for a skeleton of `m` points.
    pub smoothing: Option<f64>,

    pub segments: u32,
}

impl Default for SplineParams {
    fn default() -> Self {
        Self {
            range: ThresholdRange::default(),
            smoothing: None,
            segments: DEFAULT_SEGMENTS,
        }
    }
}

/// Skeleton pixel coordinates of `frame`, as `(x, y)` sorted by row.
///
/// The order is used as the curve's parametrization. It follows the body of a roughly
/// vertical or horizontal larva, but a curled or branched skeleton will be visited out of
/// order along its length.
pub fn skeleton_points(frame: &GrayImage, range: ThresholdRange) -> Vec<(f64, f64)> {
    let skeleton = thin(&auto_threshold(frame, range));

    set_pixel_coords(&skeleton)
        .into_iter()
        .sorted_by_key(|&(_x, y)| y)
        .map(|(x, y)| (f64::from(x), f64::from(y)))
        .collect()
}

/// Fit a smoothing cubic through `points` in order and sample it at `segments + 1`
/// evenly spaced parameter values.
///
/// The curve is parametrized by cumulative distance along the points, normalized to
/// `0.0..=1.0`. Points must be distinct.
///
/// # errors
/// * [`Error::InvalidSegmentCount`] if `segments` is 0.
/// * [`Error::InsufficientSkeletonPoints`] if fewer than four points are given.
/// * [`Error::InvalidConfig`] if `smoothing` is negative or not finite.
pub fn fit_spline(
    points: &[(f64, f64)],
    smoothing: Option<f64>,
    segments: u32,
) -> Result<Spline, Error> {
    if segments < 1 {
        return Err(Error::InvalidSegmentCount(segments));
    }
    if points.len() < MIN_SKELETON_POINTS {
        return Err(Error::InsufficientSkeletonPoints {
            found: points.len(),
        });
    }

    let m = points.len() as f64;
    let smoothing = smoothing.unwrap_or_else(|| m - (2.0 * m).sqrt());
    if !smoothing.is_finite() || smoothing < 0.0 {
        return Err(Error::InvalidConfig(format!(
            "smoothing must be a non-negative number, got {smoothing}"
        )));
    }

    let knots = chord_parameters(points)?;
    let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();

    let (fx, fy) = smoothing::fit_parametric(&knots, &xs, &ys, smoothing);

    let points = (0..=segments)
        .map(|i| {
            let u = f64::from(i) / f64::from(segments);
            SplinePoint {
                x: fx.eval(u),
                y: fy.eval(u),
            }
        })
        .collect();

    Ok(Spline { points })
}

/// Extract the centerline of the single foreground shape in `frame`.
pub fn extract_spline(frame: &GrayImage, params: &SplineParams) -> Result<Spline, Error> {
    if params.segments < 1 {
        return Err(Error::InvalidSegmentCount(params.segments));
    }
    let points = skeleton_points(frame, params.range);
    fit_spline(&points, params.smoothing, params.segments)
}

/// [`extract_spline`] for a colour frame.
pub fn extract_spline_rgb(frame: &RgbImage, params: &SplineParams) -> Result<Spline, Error> {
    extract_spline(&to_gray(frame), params)
}

/// Extract one spline per frame of `source`, in frame order.
///
/// A frame whose spline cannot be fitted yields an `Err` in its slot (tagged with the
/// frame index) and extraction continues. Failing to read a frame aborts the whole
/// extraction. If the video ends before its declared frame count, the result is shorter.
pub fn extract_video_splines(
    source: &dyn VideoSource,
    params: &SplineParams,
    progress: Option<&mut dyn ProgressObserver>,
) -> Result<Vec<Result<Spline, Error>>, Error> {
    if params.segments < 1 {
        return Err(Error::InvalidSegmentCount(params.segments));
    }

    let meta = source.meta();
    let limit = if meta.frame_count == 0 {
        u64::MAX
    } else {
        meta.frame_count
    };

    let mut tracker = ProgressTracker::new(progress, meta.frame_count);
    let mut ret = vec![];
    let mut chunk = Vec::with_capacity(CHUNK_FRAMES);

    for (frame_idx, frame) in (0..limit).zip(source.frames()?) {
        chunk.push(frame.map_err(|e| e.at_frame(frame_idx))?);

        if chunk.len() == CHUNK_FRAMES {
            extract_chunk(&chunk, params, &mut ret);
            chunk.clear();
            tracker.frame_done(ret.len() as u64);
        }
    }
    if !chunk.is_empty() {
        extract_chunk(&chunk, params, &mut ret);
        tracker.frame_done(ret.len() as u64);
    }

    debug!(
        "extracted {} splines, {} frames failed",
        ret.len(),
        ret.iter().filter(|r| r.is_err()).count()
    );

    Ok(ret)
}

#[cfg(feature = "parallel_splines")]
const CHUNK_FRAMES: usize = crate::definitions::SPLINE_CHUNK_FRAMES;
#[cfg(not(feature = "parallel_splines"))]
const CHUNK_FRAMES: usize = 1;

#[cfg(feature = "parallel_splines")]
fn extract_chunk(
    chunk: &[RgbImage],
    params: &SplineParams,
    out: &mut Vec<Result<Spline, Error>>,
) {
    use rayon::prelude::*;

    let first_idx = out.len() as u64;
    let results = chunk
        .par_iter()
        .enumerate()
        .map(|(i, frame)| {
            extract_spline_rgb(frame, params).map_err(|e| e.at_frame(first_idx + i as u64))
        })
        .collect::<Vec<_>>();
    out.extend(results);
}

#[cfg(not(feature = "parallel_splines"))]
fn extract_chunk(
    chunk: &[RgbImage],
    params: &SplineParams,
    out: &mut Vec<Result<Spline, Error>>,
) {
    for frame in chunk {
        let frame_idx = out.len() as u64;
        out.push(extract_spline_rgb(frame, params).map_err(|e| e.at_frame(frame_idx)));
    }
}

// Cumulative distance along `points`, scaled to end at 1.0.
fn chord_parameters(points: &[(f64, f64)]) -> Result<Vec<f64>, Error> {
    let mut knots = Vec::with_capacity(points.len());
    knots.push(0.0);
    for ((x0, y0), (x1, y1)) in points.iter().tuple_windows() {
        let last = knots[knots.len() - 1];
        knots.push(last + (x1 - x0).hypot(y1 - y0));
    }

    let total = knots[knots.len() - 1];
    if knots.iter().tuple_windows().any(|(a, b)| b <= a) {
        return Err(Error::InvalidConfig(
            "spline points must not repeat consecutively".to_string(),
        ));
    }
    for knot in knots.iter_mut() {
        *knot /= total;
    }

    Ok(knots)
}
