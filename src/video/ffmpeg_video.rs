use std::path::{Path, PathBuf};

use ffmpeg_cmdline_utils::{FfmpegFrameReaderBuilder, FfmpegFrameWriter, VideoInfo};
use image::RgbImage;

use super::{check_dimensions, FrameIter, VideoMeta, VideoSink, VideoSource};
use crate::Error;

/// A video file decoded by ffmpeg. Every call to [`VideoSource::frames`] spawns a new
/// decoder, so each cursor starts at the first frame.
#[derive(Debug, Clone)]
pub struct FfmpegVideo {
    src_path: PathBuf,
    info: VideoInfo,
    frame_limit: Option<u64>,
    timeout_secs: Option<u64>,
}

impl FfmpegVideo {
    pub fn open(src_path: impl AsRef<Path>) -> Result<Self, Error> {
        let src_path = src_path.as_ref().to_path_buf();
        let info = VideoInfo::new(&src_path)?;

        let (width, height) = info.resolution();
        if width == 0 || height == 0 {
            return Err(Error::Video(format!(
                "no video stream with a valid resolution in {}",
                src_path.display()
            )));
        }

        Ok(Self {
            src_path,
            info,
            frame_limit: None,
            timeout_secs: None,
        })
    }

    /// Read at most `frame_limit` frames. The declared frame count is capped to match.
    #[must_use]
    pub fn limit_frames(mut self, frame_limit: u64) -> Self {
        self.frame_limit = Some(frame_limit);
        self
    }

    /// End each read cursor once it has been decoding for `timeout_secs` seconds.
    #[must_use]
    pub fn decode_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }
}

impl VideoSource for FfmpegVideo {
    fn meta(&self) -> VideoMeta {
        let (width, height) = self.info.resolution();
        VideoMeta {
            width,
            height,
            frame_rate: self.info.frame_rate(),
            frame_count: match self.frame_limit {
                Some(limit) => self.info.frame_count().min(limit),
                None => self.info.frame_count(),
            },
        }
    }

    fn frames(&self) -> Result<FrameIter<'_>, Error> {
        let mut builder = FfmpegFrameReaderBuilder::new(&self.src_path);
        if let Some(limit) = self.frame_limit {
            builder.num_frames(limit);
        }
        if let Some(timeout_secs) = self.timeout_secs {
            builder.timeout_secs(timeout_secs);
        }

        let iter = builder.spawn_rgb_with_info(&self.info)?;
        Ok(Box::new(iter.map(Ok)))
    }
}

/// Writes frames to a losslessly encoded video file through ffmpeg.
#[derive(Debug)]
pub struct FfmpegSink {
    meta: VideoMeta,
    writer: Option<FfmpegFrameWriter>,
    frames_written: u64,
}

impl FfmpegSink {
    pub fn create(dst_path: impl AsRef<Path>, meta: VideoMeta) -> Result<Self, Error> {
        let writer = FfmpegFrameWriter::new(dst_path, meta.dimensions(), meta.frame_rate)?;
        Ok(Self {
            meta,
            writer: Some(writer),
            frames_written: 0,
        })
    }
}

impl VideoSink for FfmpegSink {
    fn meta(&self) -> VideoMeta {
        self.meta
    }

    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), Error> {
        check_dimensions(self.meta.dimensions(), frame)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Video("sink already finished".to_string()))?;
        writer.write_frame(frame)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<u64, Error> {
        if let Some(writer) = self.writer.take() {
            self.frames_written = writer.finish()?;
        }
        Ok(self.frames_written)
    }
}
