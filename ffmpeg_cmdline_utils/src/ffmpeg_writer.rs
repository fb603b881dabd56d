use std::{
    ffi::OsStr,
    io::prelude::*,
    path::Path,
    process::{Child, ChildStdin},
    thread::JoinHandle,
    time::Duration,
};

use image::RgbImage;
use wait_timeout::ChildExt;

use crate::ffmpeg_ops::{spawn_ffmpeg_command, truncate_ffmpeg_err_msg, FfmpegCommandName, StdinCfg};
use crate::*;

// Once all frames are written ffmpeg only has to flush its encoder.
const WRITER_FINISH_TIMEOUT_SECS: u64 = 600;

/// Writes fixed-size RGB24 frames at a fixed frame rate to a video file.
///
/// Frames are encoded losslessly (FFV1 in a Matroska container), so pixel values read back
/// from the file are exactly the values that were written. Use [`crate::transcode_h264`]
/// to produce a portable copy afterwards.
#[derive(Debug)]
pub struct FfmpegFrameWriter {
    resolution: (u32, u32),
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    frames_written: u64,
    finished: bool,
}

impl FfmpegFrameWriter {
    pub fn new(
        dst_path: impl AsRef<Path>,
        resolution: (u32, u32),
        frame_rate: f64,
    ) -> Result<Self, FfmpegError> {
        let (x, y) = resolution;
        if x == 0 || y == 0 {
            return Err(FfmpegError::InvalidResolution);
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(FfmpegError::InvalidFrameRate);
        }

        let dst_path = dst_path.as_ref();
        let size_string = format!("{x}x{y}");
        let rate_string = format!("{frame_rate}");

        #[rustfmt::skip]
        let args = [
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"), OsStr::new("warning"),
            OsStr::new("-nostats"),
            OsStr::new("-y"),
            OsStr::new("-f"),        OsStr::new("rawvideo"),
            OsStr::new("-pix_fmt"),  OsStr::new("rgb24"),
            OsStr::new("-s"),        OsStr::new(&size_string),
            OsStr::new("-r"),        OsStr::new(&rate_string),
            OsStr::new("-i"),        OsStr::new("-"),
            OsStr::new("-c:v"),      OsStr::new("ffv1"),
            OsStr::new("-pix_fmt"),  OsStr::new("gbrp"),
            OsStr::new("-f"),        OsStr::new("matroska"),
            dst_path.as_os_str(),
        ];

        let mut child = spawn_ffmpeg_command(FfmpegCommandName::Ffmpeg, &args, StdinCfg::Piped, false)?;
        let stdin = child.stdin.take();

        //drain stderr so that ffmpeg never blocks on it.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut acc = vec![];
                let _ = stderr.read_to_end(&mut acc);
                acc
            })
        });

        Ok(Self {
            resolution,
            child,
            stdin,
            stderr_reader,
            frames_written: 0,
            finished: false,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<(), FfmpegError> {
        if frame.dimensions() != self.resolution {
            return Err(FfmpegError::FrameSize {
                expected: self.resolution,
                actual: frame.dimensions(),
            });
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FfmpegError::Io("writer already finished".to_string()));
        };

        if let Err(e) = stdin.write_all(frame.as_raw()) {
            // ffmpeg has most likely exited. Its stderr says why.
            self.stdin = None;
            let _wait_error = self.child.wait();
            let stderr = self.take_stderr();
            return Err(if stderr.is_empty() {
                FfmpegError::Io(format!("{:?}", e.kind()))
            } else {
                truncate_ffmpeg_err_msg(&stderr)
            });
        }

        self.frames_written += 1;
        Ok(())
    }

    /// Close the input pipe and wait for ffmpeg to finish writing the file.
    pub fn finish(mut self) -> Result<u64, FfmpegError> {
        self.finished = true;
        std::mem::drop(self.stdin.take());

        let status = match self
            .child
            .wait_timeout(Duration::from_secs(WRITER_FINISH_TIMEOUT_SECS))
        {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _kill_error = self.child.kill();
                let _wait_error = self.child.wait();
                return Err(FfmpegError::Timeout);
            }
            Err(e) => return Err(FfmpegError::Io(format!("{:?}", e.kind()))),
        };

        let stderr = self.take_stderr();
        if status.success() {
            Ok(self.frames_written)
        } else {
            Err(truncate_ffmpeg_err_msg(&stderr))
        }
    }

    fn take_stderr(&mut self) -> Vec<u8> {
        self.stderr_reader
            .take()
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default()
    }
}

// An unfinished writer is abandoned output: stop ffmpeg rather than leaving it waiting on stdin.
impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        if !self.finished {
            std::mem::drop(self.stdin.take());
            let _kill_error = self.child.kill();
            let _wait_error = self.child.wait();
        }
    }
}
