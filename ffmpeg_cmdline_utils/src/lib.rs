#![allow(clippy::let_and_return)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]

//! Thin wrappers around the `ffmpeg` and `ffprobe` command line tools.
//!
//! Frames are exchanged with ffmpeg as raw `rgb24` buffers over stdin/stdout, so
//! no linking against the ffmpeg libraries is required. `ffmpeg` and `ffprobe`
//! must be visible on the command line.

mod ffmpeg_error_kind;
mod ffmpeg_ops;
mod ffmpeg_stats;
mod ffmpeg_transcode;
mod ffmpeg_writer;

pub use ffmpeg_error_kind::FfmpegError;
pub use ffmpeg_ops::{
    ffmpeg_and_ffprobe_are_callable, get_video_stats, is_video_file, FfmpegFrameIterRgb,
    FfmpegFrameReaderBuilder,
};
pub use ffmpeg_stats::{VideoInfo, VideoInfoError};
pub use ffmpeg_transcode::{transcode_h264, DEFAULT_TRANSCODE_TIMEOUT_SECS};
pub use ffmpeg_writer::FfmpegFrameWriter;
