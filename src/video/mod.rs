mod ffmpeg_video;
mod intermediate;
mod memory_video;

pub use ffmpeg_video::{FfmpegSink, FfmpegVideo};
pub(crate) use intermediate::remove_if_exists;
pub use intermediate::{IntermediateSink, IntermediateStore, MemoryStore, TempFileStore};
pub use memory_video::{MemorySink, MemoryVideo};

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A boxed, sequential frame reader. Each item is one decoded frame.
pub type FrameIter<'a> = Box<dyn Iterator<Item = Result<RgbImage, Error>> + 'a>;

/// Metadata shared by every frame of a video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Declared frame count. Advisory: a stream may end before reaching it.
    pub frame_count: u64,
}

impl VideoMeta {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A video that can be read from the start any number of times.
pub trait VideoSource {
    fn meta(&self) -> VideoMeta;

    /// Open a new read cursor positioned at frame 0. Cursors are independent: reading from
    /// one never moves another.
    fn frames(&self) -> Result<FrameIter<'_>, Error>;
}

/// A destination for frames of fixed dimensions.
pub trait VideoSink {
    fn meta(&self) -> VideoMeta;

    /// Append a frame. Fails with [`Error::DimensionMismatch`] if the frame's dimensions
    /// differ from the sink's.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), Error>;

    /// Flush and close the sink. Returns the number of frames written.
    fn finish(&mut self) -> Result<u64, Error>;
}

pub(crate) fn check_dimensions(expected: (u32, u32), frame: &RgbImage) -> Result<(), Error> {
    if frame.dimensions() == expected {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            expected,
            actual: frame.dimensions(),
        })
    }
}
