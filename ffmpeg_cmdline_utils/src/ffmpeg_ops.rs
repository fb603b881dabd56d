use std::{
    ffi::OsStr,
    io::prelude::*,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    time::{Duration, SystemTime},
};

#[cfg(target_family = "windows")]
use std::os::windows::process::CommandExt;

use image::RgbImage;
use wait_timeout::ChildExt;
use FfmpegCommandName::*;
use FfmpegError::*;

use crate::*;

const FFPROBE_TIMEOUT_SECS: u64 = 60;

/// Sequential reader of RGB24 frames from a running ffmpeg process.
///
/// Iteration stops at end of stream, after the configured number of frames,
/// or when the timeout expires, whichever comes first. A stream that ends
/// before the declared frame count simply yields fewer frames.
#[derive(Debug)]
pub struct FfmpegFrameIterRgb {
    x: u32,
    y: u32,
    child: Child,
    stdout: Option<ChildStdout>,
    num_frames: u64,
    frames_read: u64,
    timeout_time: SystemTime,
    finished: bool,
}

impl FfmpegFrameIterRgb {
    fn finish(&mut self) {
        self.finished = true;
        self.stdout = None;
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
    }
}

impl Iterator for FfmpegFrameIterRgb {
    type Item = RgbImage;

    fn next(&mut self) -> Option<Self::Item> {
        //Check exit conditions
        let read_enough_frames = self.frames_read >= self.num_frames;
        let exceeded_timeout = SystemTime::now() > self.timeout_time;

        if self.finished || read_enough_frames || exceeded_timeout {
            self.finish();
            return None;
        }

        let raw_buf_size = usize::try_from(self.x)
            .ok()?
            .checked_mul(usize::try_from(self.y).ok()?)?
            .checked_mul(3)?;

        // Attempt to prevent OOM on very implausible sizes
        let five_gigabytes = 5368709120usize;
        if raw_buf_size > five_gigabytes {
            self.finish();
            return None;
        }
        let mut raw_buf = vec![0u8; raw_buf_size];

        let Some(stdout) = self.stdout.as_mut() else {
            self.finish();
            return None;
        };

        // read_exact blocks until a whole frame has arrived. A short read means ffmpeg
        // reached the end of the stream (or died), so the partial frame is dropped.
        if stdout.read_exact(&mut raw_buf).is_err() {
            self.finish();
            return None;
        }

        self.frames_read += 1;

        RgbImage::from_raw(self.x, self.y, raw_buf)
    }
}

// to prevent accumulation of zombie processes, reap the return code of
// ffmpeg subcommands (if nothing else has done so already) here
impl Drop for FfmpegFrameIterRgb {
    fn drop(&mut self) {
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
    }
}

#[derive(Clone, Debug)]
pub struct FfmpegFrameReaderBuilder {
    src_path: PathBuf,
    num_frames: Option<u64>,
    timeout_secs: Option<u64>,
}

impl FfmpegFrameReaderBuilder {
    pub fn new(src_path: impl AsRef<Path>) -> Self {
        Self {
            src_path: src_path.as_ref().to_path_buf(),
            num_frames: None,
            timeout_secs: None,
        }
    }

    /// Stop after this many frames have been decoded.
    pub fn num_frames(&mut self, num_frames: u64) -> &mut Self {
        self.num_frames = Some(num_frames);
        self
    }

    /// Stop yielding frames once this many seconds have passed since the decoder started.
    pub fn timeout_secs(&mut self, timeout_secs: u64) -> &mut Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Start decoding using already-probed metadata. Every call spawns a fresh ffmpeg
    /// process, so each returned iterator starts at the first frame.
    pub fn spawn_rgb_with_info(
        &self,
        stats: &VideoInfo,
    ) -> Result<FfmpegFrameIterRgb, FfmpegError> {
        //bail out if we get invalid dimensions.
        let (x, y) = stats.resolution();
        if x == 0 || y == 0 {
            return Err(FfmpegError::InvalidResolution);
        }

        let num_frames_string: String;
        let num_frames_arg = match self.num_frames {
            Some(ref num_frames) => {
                num_frames_string = num_frames.to_string();
                vec![OsStr::new("-frames:v"), OsStr::new(&num_frames_string)]
            }
            None => vec![],
        };

        #[rustfmt::skip]
        let mut args = vec![
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"), OsStr::new("warning"),
            OsStr::new("-nostats"),
            OsStr::new("-i"),        OsStr::new(&self.src_path),
        ];

        args.extend(num_frames_arg);

        // passthrough frame timing stops ffmpeg from duplicating or dropping frames to match the
        // container rate, so the frame index seen here is the frame index in the file.
        #[rustfmt::skip]
        args.extend([
            OsStr::new("-fps_mode"), OsStr::new("passthrough"),
            OsStr::new("-pix_fmt"),  OsStr::new("rgb24"),
            OsStr::new("-c:v"),      OsStr::new("rawvideo"),
            OsStr::new("-f"),        OsStr::new("image2pipe"),
            OsStr::new("-")
        ]);

        let mut child = spawn_ffmpeg_command(Ffmpeg, &args, StdinCfg::Null, true)?;

        //Prevent possible lockup if stderr gets full by dropping the
        //handle from our side
        std::mem::drop(child.stderr.take());
        let stdout = child.stdout.take();

        let timeout_secs = self.timeout_secs.unwrap_or(u32::MAX as u64); // (just in case u64::MAX has wraparound issues)

        Ok(FfmpegFrameIterRgb {
            x,
            y,
            child,
            stdout,
            num_frames: self.num_frames.unwrap_or(u64::MAX),
            frames_read: 0,
            timeout_time: SystemTime::now() + Duration::from_secs(timeout_secs),
            finished: false,
        })
    }
}

pub fn get_video_stats<P: AsRef<Path>>(src_path: P) -> Result<String, FfmpegError> {
    let args = &[
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-show_format"),
        OsStr::new("-show_streams"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        OsStr::new(src_path.as_ref()),
    ];

    let stdout = run_ffmpeg_command(Ffprobe, args, FFPROBE_TIMEOUT_SECS)?.stdout;

    String::from_utf8(stdout).map_err(|_| Utf8Conversion)
}

pub fn is_video_file<P: AsRef<Path>>(src_path: P) -> Result<bool, FfmpegError> {
    //"ffprobe -v error -select_streams v -show_entries stream=codec_type -of compact=p=0:nk=1 {}"
    #[rustfmt::skip]
    let args = &[
        OsStr::new("-v"),              OsStr::new("error"),
        OsStr::new("-select_streams"), OsStr::new("v"),
        OsStr::new("-show_entries"),   OsStr::new("stream=codec_type"),
        OsStr::new("-of"),             OsStr::new("compact=p=0:nk=1"),
        OsStr::new(src_path.as_ref())
    ];

    let output = run_ffmpeg_command(Ffprobe, args, FFPROBE_TIMEOUT_SECS)?;
    let streams_string = String::from_utf8(output.stdout).map_err(|_| Utf8Conversion)?;

    Ok(streams_string.lines().any(|line| line.trim() == "video"))
}

pub fn ffmpeg_and_ffprobe_are_callable() -> bool {
    //check ffprobe is callable.
    if run_ffmpeg_command(Ffprobe, &[OsStr::new("-version")], FFPROBE_TIMEOUT_SECS).is_err() {
        return false;
    }

    //now ffmpeg.
    if run_ffmpeg_command(Ffmpeg, &[OsStr::new("-version")], FFPROBE_TIMEOUT_SECS).is_err() {
        return false;
    }

    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FfmpegCommandName {
    Ffprobe,
    Ffmpeg,
}

impl FfmpegCommandName {
    pub fn as_os_str(&self) -> &'static OsStr {
        match self {
            Self::Ffprobe => OsStr::new("ffprobe"),
            Self::Ffmpeg => OsStr::new("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StdinCfg {
    Null,
    Piped,
}

pub(crate) fn spawn_ffmpeg_command(
    name: FfmpegCommandName,
    args: &[&OsStr],
    stdin: StdinCfg,
    stderr_null: bool,
) -> Result<Child, FfmpegError> {
    let stderr_cfg = if stderr_null {
        Stdio::null()
    } else {
        Stdio::piped()
    };

    let stdin_cfg = match stdin {
        StdinCfg::Null => Stdio::null(),
        StdinCfg::Piped => Stdio::piped(),
    };

    let mut command = Command::new(name.as_os_str());
    command
        .args(args)
        .stdin(stdin_cfg)
        .stdout(Stdio::piped())
        .stderr(stderr_cfg);

    //do not spawn a command window on windows when when in a gui application
    #[cfg(target_family = "windows")]
    command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);

    command.spawn().map_err(|e| match e.kind() {
        //shell failed to execute the command. Separate out FileNotFound from all other errors
        //as by far the most likely cause is ffmpeg is not installed.
        std::io::ErrorKind::NotFound => FfmpegNotFound,
        _ => Io(format!("{:?}", e.kind())),
    })
}

pub(crate) struct FfmpegOutput {
    pub stdout: Vec<u8>,
}

//sometimes ffmpeg creates very long error messages. Limit them to the first 500 characters
pub(crate) fn truncate_ffmpeg_err_msg(stderr: &[u8]) -> FfmpegError {
    match std::str::from_utf8(stderr) {
        Ok(error_text) => FfmpegInternal(error_text.chars().take(500).collect::<String>()),
        Err(_) => Utf8Conversion,
    }
}

/// Run an ffmpeg/ffprobe command to completion, collecting stdout and stderr.
/// The process is killed if it runs for longer than `timeout_secs`.
pub(crate) fn run_ffmpeg_command(
    name: FfmpegCommandName,
    args: &[&OsStr],
    timeout_secs: u64,
) -> Result<FfmpegOutput, FfmpegError> {
    let mut child = spawn_ffmpeg_command(name, args, StdinCfg::Null, false)?;

    // Drain both pipes on their own threads so that a chatty process can never block on
    // a full pipe while we wait for it to exit.
    let stdout_reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut acc = vec![];
            let _ = stdout.read_to_end(&mut acc);
            acc
        })
    });
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut acc = vec![];
            let _ = stderr.read_to_end(&mut acc);
            acc
        })
    });

    let status = match child.wait_timeout(Duration::from_secs(timeout_secs)) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _kill_error = child.kill();
            let _wait_error = child.wait();
            return Err(Timeout);
        }
        Err(e) => return Err(Io(format!("{:?}", e.kind()))),
    };

    let join = |handle: Option<std::thread::JoinHandle<Vec<u8>>>| {
        handle
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default()
    };
    let stdout = join(stdout_reader);
    let stderr = join(stderr_reader);

    //The shell successfully executed it, but maybe it returned an error code
    if status.success() {
        Ok(FfmpegOutput { stdout })
    } else {
        Err(truncate_ffmpeg_err_msg(&stderr))
    }
}
