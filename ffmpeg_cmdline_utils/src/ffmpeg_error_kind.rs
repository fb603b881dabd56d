use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::*;

/// Various causes of failure for ffmpeg/ffprobe functions.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FfmpegError {
    /// Ffmpeg/Ffprobe command was not found. Make sure Ffmpeg is installed and can be found on the command line.
    #[error("ffmpeg/ffprobe file not found. Make sure ffmpeg/ffprobe are installed and visible on the command line")]
    FfmpegNotFound,

    /// Io error occurred while executing Ffmpeg/Ffprobe command
    #[error("Ffmpeg IO error: {0}")]
    Io(String),

    /// Ffmpeg/Ffprobe returned a nonzero exit code. Because ffmpeg sometimes prints long error strings
    /// to stderr, The resulting string contains the first few hundred characters of the error message.
    #[error("Internal Ffmpeg Failure: {0}")]
    FfmpegInternal(String),

    /// Failed to interpret Ffmpeg/Ffprobe output as a utf8-string.
    #[error("utf8 parsing/conversion failure")]
    Utf8Conversion,

    /// Either the X or Y dimension reported by ffprobe was zero.
    /// Note: This sometimes occur when attempting to decode frames from an audio file.
    #[error("Video has an invalid resolution")]
    InvalidResolution,

    /// The frame rate reported by ffprobe (or requested for writing) was zero or not finite.
    #[error("Video has an invalid frame rate")]
    InvalidFrameRate,

    /// A frame handed to a writer did not have the dimensions the writer was opened with.
    #[error("Frame size mismatch: writer expects {expected:?}, got {actual:?}")]
    FrameSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The ffmpeg process did not finish within the allowed time.
    #[error("Ffmpeg timed out")]
    Timeout,

    /// Failed to obtain video information.
    #[error("Failed to get video properties")]
    Info(#[from] VideoInfoError),
}
