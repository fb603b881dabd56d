use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error that stopped a pipeline stage.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// No frames could be read to build a background model from.
    #[error("Could not read any frames to estimate the background from")]
    InsufficientFrames,

    /// The aggregation method name was not "mean" or "median".
    #[error("Invalid aggregation method: {0:?} (expected \"mean\" or \"median\")")]
    InvalidMethod(String),

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Thresholding left no foreground region in the frame.
    #[error("No foreground region found")]
    NoForegroundRegion,

    /// A cubic parametric fit needs at least four points.
    #[error("Skeleton has {found} pixels, at least 4 are required")]
    InsufficientSkeletonPoints { found: usize },

    #[error("Invalid segment count: {0} (must be at least 1)")]
    InvalidSegmentCount(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing a video failed.
    #[error("Video processing error: {0}")]
    Video(String),

    /// A failure while processing a specific frame.
    #[error("Frame {frame}: {source}")]
    AtFrame {
        frame: u64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn at_frame(self, frame: u64) -> Self {
        match self {
            already @ Error::AtFrame { .. } => already,
            other => Error::AtFrame {
                frame,
                source: Box::new(other),
            },
        }
    }

    /// The originating error, with any frame index wrapping removed.
    pub fn kind_root(&self) -> &Error {
        match self {
            Error::AtFrame { source, .. } => source.kind_root(),
            other => other,
        }
    }

    /// The index of the frame that failed, if known.
    pub fn frame(&self) -> Option<u64> {
        match self {
            Error::AtFrame { frame, .. } => Some(*frame),
            _ => None,
        }
    }
}

impl From<ffmpeg_cmdline_utils::FfmpegError> for Error {
    fn from(e: ffmpeg_cmdline_utils::FfmpegError) -> Self {
        Error::Video(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_at_frame_keeps_root_kind() {
        let e = Error::NoForegroundRegion.at_frame(7);
        assert_eq!(e.frame(), Some(7));
        assert_eq!(e.kind_root(), &Error::NoForegroundRegion);

        //wrapping twice keeps the innermost frame index.
        let e = e.at_frame(9);
        assert_eq!(e.frame(), Some(7));
    }
}
