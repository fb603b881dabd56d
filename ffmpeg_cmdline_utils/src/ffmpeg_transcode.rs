use std::{ffi::OsStr, path::Path};

use crate::ffmpeg_ops::{run_ffmpeg_command, FfmpegCommandName};
use crate::*;

/// Upper bound on how long a single transcode may take.
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 3600;

/// Re-encode `src_path` as H.264 into `dst_path` (overwriting it), copying any audio.
/// `src_path` is only read. The caller decides when to delete it.
pub fn transcode_h264(
    src_path: impl AsRef<Path>,
    dst_path: impl AsRef<Path>,
    timeout_secs: u64,
) -> Result<(), FfmpegError> {
    #[rustfmt::skip]
    let args = [
        OsStr::new("-hide_banner"),
        OsStr::new("-loglevel"), OsStr::new("error"),
        OsStr::new("-nostats"),
        OsStr::new("-y"),
        OsStr::new("-i"),        src_path.as_ref().as_os_str(),
        OsStr::new("-c:v"),      OsStr::new("libx264"),
        OsStr::new("-crf"),      OsStr::new("23"),
        OsStr::new("-preset"),   OsStr::new("veryfast"),
        OsStr::new("-pix_fmt"),  OsStr::new("yuv420p"),
        OsStr::new("-c:a"),      OsStr::new("copy"),
        dst_path.as_ref().as_os_str(),
    ];

    log::debug!(
        "transcoding {} -> {}",
        src_path.as_ref().display(),
        dst_path.as_ref().display()
    );

    run_ffmpeg_command(FfmpegCommandName::Ffmpeg, &args, timeout_secs)?;
    Ok(())
}
