//! Background estimation.
//!
//! A background model is the per-pixel, per-channel mean or median of the first few frames
//! of a video. Larvae move, so after enough frames the static scene dominates each pixel's
//! distribution and the reduction recovers it.

use std::{fmt, str::FromStr};

use image::RgbImage;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    video::{check_dimensions, VideoSource},
    Error,
};

/// How the sampled frames are reduced to a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Mean,
    #[default]
    Median,
}

impl FromStr for AggregationMethod {
    type Err = Error;

    /// Case-insensitive: "mean" or "median".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Median => write!(f, "median"),
        }
    }
}

/// A reference frame representing the static scene of one video.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundModel(RgbImage);

impl BackgroundModel {
    pub fn from_image(img: RgbImage) -> Self {
        Self(img)
    }

    pub fn image(&self) -> &RgbImage {
        &self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    #[must_use]
    pub fn into_inner(self) -> RgbImage {
        self.0
    }
}

/// Read up to `sample_frames` frames from `frames` and reduce them to a background model.
///
/// Exactly the sampled frames are consumed, so afterwards `frames` is positioned at frame
/// `sample_frames` (or at the end of the stream if it was shorter). Values are reduced in
/// integer arithmetic and rounded down: the mean of 1 and 2 is 1, as is the median of
/// 1, 1, 2, 2.
///
/// # errors
/// * [`Error::InsufficientFrames`] if no frame could be read.
/// * [`Error::DimensionMismatch`] if a sampled frame differs in size from the first.
/// * Any error produced while reading a frame, tagged with the frame index.
pub fn estimate_background<I>(
    frames: &mut I,
    sample_frames: u32,
    method: AggregationMethod,
) -> Result<BackgroundModel, Error>
where
    I: Iterator<Item = Result<RgbImage, Error>> + ?Sized,
{
    let mut dims = None;
    let mut num_samples = 0usize;
    let mut raw_samples: Vec<u8> = vec![];

    for (frame_idx, frame) in frames.take(sample_frames as usize).enumerate() {
        let frame = frame.map_err(|e| e.at_frame(frame_idx as u64))?;
        match dims {
            None => dims = Some(frame.dimensions()),
            Some(expected) => {
                check_dimensions(expected, &frame).map_err(|e| e.at_frame(frame_idx as u64))?
            }
        }
        raw_samples.extend_from_slice(frame.as_raw());
        num_samples += 1;
    }

    let Some((width, height)) = dims else {
        return Err(Error::InsufficientFrames);
    };

    if num_samples < sample_frames as usize {
        log::warn!(
            "video ended after {num_samples} frames, fewer than the {sample_frames} requested \
             for the background model"
        );
    }

    let samples_per_frame = raw_samples.len() / num_samples;
    let stack = Array2::from_shape_vec((num_samples, samples_per_frame), raw_samples)
        .map_err(|e| Error::Video(e.to_string()))?;

    let reduced = match method {
        AggregationMethod::Mean => stack.map_axis(Axis(0), mean_u8),
        AggregationMethod::Median => {
            let mut scratch = Vec::with_capacity(num_samples);
            stack.map_axis(Axis(0), |lane| median_u8(lane, &mut scratch))
        }
    };

    let img = RgbImage::from_raw(width, height, reduced.into_iter().collect())
        .ok_or_else(|| Error::Video("background buffer has the wrong size".to_string()))?;

    Ok(BackgroundModel(img))
}

/// Open a fresh cursor on `source` and estimate its background from the leading frames.
pub fn estimate_background_from_source(
    source: &dyn VideoSource,
    sample_frames: u32,
    method: AggregationMethod,
) -> Result<BackgroundModel, Error> {
    let mut frames = source.frames()?;
    estimate_background(&mut frames, sample_frames, method)
}

fn mean_u8(lane: ArrayView1<u8>) -> u8 {
    let sum: u64 = lane.iter().map(|&v| u64::from(v)).sum();
    let mean = sum / lane.len() as u64;
    mean as u8
}

fn median_u8(lane: ArrayView1<u8>, scratch: &mut Vec<u8>) -> u8 {
    scratch.clear();
    scratch.extend(lane.iter().copied());

    let len = scratch.len();
    let (lower, &mut upper_mid, _) = scratch.select_nth_unstable(len / 2);

    if len % 2 == 1 {
        upper_mid
    } else {
        //even number of samples: average the two middle values.
        let lower_mid = lower.iter().copied().max().unwrap_or(upper_mid);
        ((u16::from(lower_mid) + u16::from(upper_mid)) / 2) as u8
    }
}

#[cfg(test)]
mod test {
    use image::Rgb;

    use super::*;

    fn frames_from_values(vals: &[u8]) -> Vec<Result<RgbImage, Error>> {
        vals.iter()
            .map(|&v| Ok(RgbImage::from_pixel(3, 2, Rgb([v, v, v]))))
            .collect()
    }

    fn model_value(vals: &[u8], method: AggregationMethod) -> u8 {
        let mut it = frames_from_values(vals).into_iter();
        let model = estimate_background(&mut it, vals.len() as u32, method).unwrap();
        model.image().get_pixel(0, 0).0[0]
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("Median".parse::<AggregationMethod>(), Ok(AggregationMethod::Median));
        assert_eq!("MEAN".parse::<AggregationMethod>(), Ok(AggregationMethod::Mean));
        assert_eq!(
            "mode".parse::<AggregationMethod>(),
            Err(Error::InvalidMethod("mode".to_string()))
        );
    }

    #[test]
    fn test_mean_rounds_down() {
        assert_eq!(model_value(&[1, 2], AggregationMethod::Mean), 1);
        assert_eq!(model_value(&[10, 20, 40], AggregationMethod::Mean), 23);
        assert_eq!(model_value(&[255, 255, 255], AggregationMethod::Mean), 255);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(model_value(&[200, 3, 7], AggregationMethod::Median), 7);
        assert_eq!(model_value(&[1, 10, 2, 3], AggregationMethod::Median), 2);
        assert_eq!(model_value(&[255, 254], AggregationMethod::Median), 254);
    }

    #[test]
    fn test_median_of_identical_frames_is_exact() {
        #[rustfmt::skip]
        let pixs = vec![
            0,   1,   2,    50,  60,  70,
            255, 128, 3,    9,   8,   7,
        ];
        let frame = RgbImage::from_raw(2, 2, pixs).unwrap();
        let mut it = std::iter::repeat(Ok(frame.clone())).take(4);

        let model = estimate_background(&mut it, 4, AggregationMethod::Median).unwrap();
        assert_eq!(model.image(), &frame);
    }

    #[test]
    fn test_channels_reduced_independently() {
        let frames = vec![
            Ok(RgbImage::from_pixel(1, 1, Rgb([0, 100, 255]))),
            Ok(RgbImage::from_pixel(1, 1, Rgb([10, 50, 0]))),
            Ok(RgbImage::from_pixel(1, 1, Rgb([20, 0, 128]))),
        ];
        let model =
            estimate_background(&mut frames.into_iter(), 3, AggregationMethod::Median).unwrap();
        assert_eq!(model.image().get_pixel(0, 0), &Rgb([10, 50, 128]));
    }

    #[test]
    fn test_cursor_left_after_sample() {
        let mut it = frames_from_values(&[0, 1, 2, 3, 4]).into_iter();
        let model = estimate_background(&mut it, 2, AggregationMethod::Mean).unwrap();
        assert_eq!(model.dimensions(), (3, 2));

        let next = it.next().unwrap().unwrap();
        assert_eq!(next.get_pixel(0, 0), &Rgb([2, 2, 2]));
    }

    #[test]
    fn test_short_stream_uses_available_frames() {
        let mut it = frames_from_values(&[4, 8]).into_iter();
        let model = estimate_background(&mut it, 10, AggregationMethod::Mean).unwrap();
        assert_eq!(model.image().get_pixel(0, 0), &Rgb([6, 6, 6]));
    }

    #[test]
    fn test_no_frames() {
        let mut it = frames_from_values(&[]).into_iter();
        assert_eq!(
            estimate_background(&mut it, 10, AggregationMethod::Median),
            Err(Error::InsufficientFrames)
        );

        let mut it = frames_from_values(&[1, 2]).into_iter();
        assert_eq!(
            estimate_background(&mut it, 0, AggregationMethod::Median),
            Err(Error::InsufficientFrames)
        );
    }

    #[test]
    fn test_mixed_dimensions() {
        let frames = vec![Ok(RgbImage::new(2, 2)), Ok(RgbImage::new(3, 2))];
        let err =
            estimate_background(&mut frames.into_iter(), 2, AggregationMethod::Mean).unwrap_err();
        assert_eq!(err.frame(), Some(1));
        assert!(matches!(err.kind_root(), Error::DimensionMismatch { .. }));
    }
}
