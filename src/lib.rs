#![allow(clippy::let_and_return)]
#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]
#![allow(clippy::doc_markdown)]

//! # Overview
//! `larva_track_lib` removes the static background from short recordings of larvae, so
//! that the moving animals stand out, and extracts a smooth centerline (a spline) from
//! the single largest moving shape in each frame.
//!
//! # High Level API
//! Open a video, choose a [`PipelineConfig`] and run it into a sink. Each repetition
//! estimates a background from the previous repetition's output and subtracts it; an
//! optional final pass replaces every frame with a filled mask of its largest region.
//! ```rust
//! use image::{Rgb, RgbImage};
//! use larva_track_lib::{run_pipeline, MemorySink, MemoryVideo, PipelineConfig, VideoSource};
//!
//! // A bright square sliding across a gray background.
//! let frames = (0..20)
//!     .map(|i| {
//!         let mut frame = RgbImage::from_pixel(64, 32, Rgb([80, 80, 80]));
//!         for y in 10..16 {
//!             for x in (2 * i)..(2 * i + 6) {
//!                 frame.put_pixel(x, y, Rgb([230, 230, 230]));
//!             }
//!         }
//!         frame
//!     })
//!     .collect();
//! let video = MemoryVideo::from_frames(frames, 25.0).unwrap();
//!
//! let cfg = PipelineConfig {
//!     repetitions: 1,
//!     ..PipelineConfig::default()
//! };
//! let mut sink = MemorySink::new(video.meta());
//! let report = run_pipeline(&video, &cfg, &mut sink, None).unwrap();
//!
//! assert_eq!(report.frames_written, 20);
//! ```
//!
//! For video files, [`process_video_file`] does the same between two paths, and
//! [`extract_splines_from_file`] produces one [`Spline`] per frame.
//!
//! # Prerequisites
//! File based entry points call Ffmpeg from the command line. You must make Ffmpeg and
//! Ffprobe available on the command line, for example:
//!
//! * Debian-based systems: ```# apt-get install ffmpeg```
//! * Yum-based systems: ```# yum install ffmpeg```
//!
//! # How it works
//! * The background is the per-pixel mean or median of the first N frames.
//! * Each frame is differenced against the background and reduced to the brightness of
//!   the difference (the HSV value channel), replicated across three channels.
//! * Masks use an automatic (Otsu) threshold confined to a configurable intensity range.
//!   Only the region with the largest outer contour is kept, with its holes filled.
//! * Splines come from thinning that same thresholded frame to a one pixel wide skeleton,
//!   ordering the skeleton by row, and fitting a cubic smoothing spline through it.
//!
//! # Limitations
//! Every frame is assumed to contain one larva. Overlapping larvae merge into one region,
//! and nothing is tracked from one frame to the next. Skeletons are ordered by row, so
//! curled or branched shapes can produce a centerline that doubles back on itself.

mod background;
mod binarize;
mod definitions;
mod error;
mod file_ops;
mod foreground;
mod mask;
mod pipeline;
mod progress;
mod skeleton;
mod spline;
mod video;

pub use background::{
    estimate_background, estimate_background_from_source, AggregationMethod, BackgroundModel,
};
pub use binarize::{auto_threshold, otsu_level_in_range, ThresholdRange};
pub use definitions::{
    DEFAULT_REPETITIONS, DEFAULT_SAMPLE_FRAMES, DEFAULT_SEGMENTS, DEFAULT_THRESHOLD_LOWER,
    DEFAULT_THRESHOLD_UPPER, MIN_SKELETON_POINTS,
};
pub use error::Error;
pub use file_ops::{extract_splines_from_file, process_video_file};
pub use foreground::{render_frame, render_video};
pub use mask::{extract_mask, extract_mask_rgb, mask_video, Mask, MaskStats};
pub use pipeline::{
    run_pipeline, Pipeline, PipelineConfig, PipelineReport, PipelineState, RepetitionReport,
};
pub use progress::{LogProgress, ProgressObserver};
pub use skeleton::thin;
pub use spline::{
    extract_spline, extract_spline_rgb, extract_video_splines, fit_spline, skeleton_points,
    Spline, SplineParams, SplinePoint,
};
pub use video::{
    FfmpegSink, FfmpegVideo, FrameIter, IntermediateSink, IntermediateStore, MemorySink,
    MemoryStore, MemoryVideo, TempFileStore, VideoMeta, VideoSink, VideoSource,
};

pub use ffmpeg_cmdline_utils::{ffmpeg_and_ffprobe_are_callable, is_video_file};
