use image::RgbImage;

use super::{check_dimensions, FrameIter, VideoMeta, VideoSink, VideoSource};
use crate::Error;

/// A video held entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryVideo {
    meta: VideoMeta,
    frames: Vec<RgbImage>,
}

impl MemoryVideo {
    /// Build a video from frames. The declared frame count is the number of frames given.
    ///
    /// Returns `None` if there are no frames or they do not all share the same dimensions.
    pub fn from_frames(frames: Vec<RgbImage>, frame_rate: f64) -> Option<Self> {
        let (width, height) = frames.first()?.dimensions();
        if frames.iter().any(|f| f.dimensions() != (width, height)) {
            return None;
        }

        let meta = VideoMeta {
            width,
            height,
            frame_rate,
            frame_count: frames.len() as u64,
        };

        Some(Self { meta, frames })
    }

    /// Use when the declared frame count should differ from the number of frames held,
    /// e.g to model a container that overstates its length.
    pub fn with_declared_frame_count(mut self, frame_count: u64) -> Self {
        self.meta.frame_count = frame_count;
        self
    }

    pub fn frames_slice(&self) -> &[RgbImage] {
        &self.frames
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<RgbImage> {
        self.frames
    }
}

impl VideoSource for MemoryVideo {
    fn meta(&self) -> VideoMeta {
        self.meta
    }

    fn frames(&self) -> Result<FrameIter<'_>, Error> {
        Ok(Box::new(self.frames.iter().cloned().map(Ok)))
    }
}

/// Collects written frames in memory.
#[derive(Debug, Clone)]
pub struct MemorySink {
    meta: VideoMeta,
    frames: Vec<RgbImage>,
}

impl MemorySink {
    pub fn new(meta: VideoMeta) -> Self {
        Self {
            meta,
            frames: Vec::with_capacity(usize::try_from(meta.frame_count).unwrap_or(0).min(4096)),
        }
    }

    /// Turn the written frames into a readable video. The declared frame count becomes the
    /// number of frames actually written.
    #[must_use]
    pub fn into_video(self) -> MemoryVideo {
        let mut meta = self.meta;
        meta.frame_count = self.frames.len() as u64;
        MemoryVideo {
            meta,
            frames: self.frames,
        }
    }
}

impl VideoSink for MemorySink {
    fn meta(&self) -> VideoMeta {
        self.meta
    }

    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), Error> {
        check_dimensions(self.meta.dimensions(), frame)?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<u64, Error> {
        Ok(self.frames.len() as u64)
    }
}

#[cfg(test)]
mod test {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_each_cursor_starts_at_frame_zero() {
        let frames = (0..3)
            .map(|i| RgbImage::from_pixel(2, 2, Rgb([i, i, i])))
            .collect::<Vec<_>>();
        let vid = MemoryVideo::from_frames(frames, 10.0).unwrap();

        let mut first = vid.frames().unwrap();
        first.next();
        first.next();

        let mut second = vid.frames().unwrap();
        assert_eq!(second.next().unwrap().unwrap().get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(first.next().unwrap().unwrap().get_pixel(0, 0), &Rgb([2, 2, 2]));
    }

    #[test]
    fn test_mixed_sizes_rejected() {
        let frames = vec![RgbImage::new(2, 2), RgbImage::new(3, 2)];
        assert!(MemoryVideo::from_frames(frames, 10.0).is_none());
        assert!(MemoryVideo::from_frames(vec![], 10.0).is_none());
    }

    #[test]
    fn test_sink_rejects_wrong_size() {
        let meta = VideoMeta {
            width: 2,
            height: 2,
            frame_rate: 10.0,
            frame_count: 1,
        };
        let mut sink = MemorySink::new(meta);
        assert!(sink.write_frame(&RgbImage::new(2, 2)).is_ok());
        assert_eq!(
            sink.write_frame(&RgbImage::new(4, 2)),
            Err(Error::DimensionMismatch {
                expected: (2, 2),
                actual: (4, 2)
            })
        );
        assert_eq!(sink.finish(), Ok(1));
    }
}
