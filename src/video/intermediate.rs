//! Storage for the videos passed from one pipeline stage to the next.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use super::{FfmpegSink, FfmpegVideo, FrameIter, MemorySink, VideoMeta, VideoSink, VideoSource};
use crate::Error;

/// Where a pipeline keeps each stage's output until the following stage has read it.
pub trait IntermediateStore {
    /// Start a new intermediate video with the given metadata.
    fn create(&mut self, meta: VideoMeta) -> Result<Box<dyn IntermediateSink>, Error>;
}

/// A sink whose frames can be read back once writing is done.
pub trait IntermediateSink {
    fn as_sink(&mut self) -> &mut dyn VideoSink;

    /// Finish writing and open the written frames for reading. The declared frame count
    /// of the returned video is the number of frames written.
    fn into_source(self: Box<Self>) -> Result<Box<dyn VideoSource>, Error>;
}

/// Keeps intermediate videos in memory. Suited to short clips and to in-memory sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStore;

impl IntermediateStore for MemoryStore {
    fn create(&mut self, meta: VideoMeta) -> Result<Box<dyn IntermediateSink>, Error> {
        Ok(Box::new(MemorySink::new(meta)))
    }
}

impl IntermediateSink for MemorySink {
    fn as_sink(&mut self) -> &mut dyn VideoSink {
        self
    }

    fn into_source(self: Box<Self>) -> Result<Box<dyn VideoSource>, Error> {
        Ok(Box::new(self.into_video()))
    }
}

/// Writes intermediate videos losslessly to files in a private temporary directory, so
/// only one frame at a time is held in memory.
///
/// Each file is deleted as soon as the stage reading it is done with it. Anything left
/// over (for example after a failed run) is deleted with the store.
#[derive(Debug)]
pub struct TempFileStore {
    dir: TempDir,
    created: u32,
}

impl TempFileStore {
    /// Create the store's directory inside `parent`.
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = tempfile::Builder::new()
            .prefix(".larva_track")
            .tempdir_in(parent.as_ref())
            .map_err(|e| {
                Error::Video(format!(
                    "failed to create a temporary directory in {}: {e}",
                    parent.as_ref().display()
                ))
            })?;

        Ok(Self { dir, created: 0 })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl IntermediateStore for TempFileStore {
    fn create(&mut self, meta: VideoMeta) -> Result<Box<dyn IntermediateSink>, Error> {
        self.created += 1;
        let path = self.dir.path().join(format!("stage_{}.mkv", self.created));
        debug!("writing intermediate video to {}", path.display());

        let sink = FfmpegSink::create(&path, meta)?;
        Ok(Box::new(TempFileSink { sink, meta, path }))
    }
}

struct TempFileSink {
    sink: FfmpegSink,
    meta: VideoMeta,
    path: PathBuf,
}

impl IntermediateSink for TempFileSink {
    fn as_sink(&mut self) -> &mut dyn VideoSink {
        &mut self.sink
    }

    fn into_source(self: Box<Self>) -> Result<Box<dyn VideoSource>, Error> {
        let TempFileSink {
            mut sink,
            mut meta,
            path,
        } = *self;

        let frames_written = sink.finish()?;
        meta.frame_count = frames_written;

        let video = TempFileVideo {
            video: FfmpegVideo::open(&path)?.limit_frames(frames_written),
            meta,
            path,
        };
        Ok(Box::new(video))
    }
}

// A written intermediate file, removed when dropped.
struct TempFileVideo {
    video: FfmpegVideo,
    meta: VideoMeta,
    path: PathBuf,
}

impl VideoSource for TempFileVideo {
    fn meta(&self) -> VideoMeta {
        self.meta
    }

    fn frames(&self) -> Result<FrameIter<'_>, Error> {
        self.video.frames()
    }
}

impl Drop for TempFileVideo {
    fn drop(&mut self) {
        remove_if_exists(&self.path);
    }
}

pub(crate) fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => (),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
        Err(e) => warn!("failed to remove {}: {e}", path.display()),
    }
}
