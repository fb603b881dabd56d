//! Whole-file entry points over ffmpeg-backed videos.

use std::path::Path;

use ffmpeg_cmdline_utils::{transcode_h264, DEFAULT_TRANSCODE_TIMEOUT_SECS};
use log::debug;

use crate::{
    pipeline::{Pipeline, PipelineConfig, PipelineReport},
    progress::ProgressObserver,
    spline::{extract_video_splines, Spline, SplineParams},
    video::{remove_if_exists, FfmpegSink, FfmpegVideo, TempFileStore, VideoSource},
    Error,
};

/// Remove the background from the video at `src_path` and write the result, H.264
/// encoded, to `dst_path`.
///
/// Every intermediate video, including the final lossless one that is transcoded, is
/// written to a temporary directory beside `dst_path` and deleted once read. On failure
/// nothing is left at `dst_path`.
pub fn process_video_file(
    src_path: impl AsRef<Path>,
    dst_path: impl AsRef<Path>,
    cfg: &PipelineConfig,
    progress: Option<&mut dyn ProgressObserver>,
) -> Result<PipelineReport, Error> {
    let src_path = src_path.as_ref();
    let dst_path = dst_path.as_ref();

    let mut pipeline = Pipeline::new(*cfg)?;
    let source = FfmpegVideo::open(src_path)?;

    let mut store = TempFileStore::new_in(output_dir(dst_path))?;
    let lossless_path = store.path().join("output.mkv");
    debug!("writing lossless output to {}", lossless_path.display());

    let report = {
        let mut sink = FfmpegSink::create(&lossless_path, source.meta())?;
        pipeline.run_with_store(&source, &mut sink, &mut store, progress)?
    };

    if let Err(e) = transcode_h264(&lossless_path, dst_path, DEFAULT_TRANSCODE_TIMEOUT_SECS) {
        remove_if_exists(dst_path);
        return Err(e.into());
    }

    Ok(report)
}

/// Extract one spline per frame of the video at `src_path`.
pub fn extract_splines_from_file(
    src_path: impl AsRef<Path>,
    params: &SplineParams,
    progress: Option<&mut dyn ProgressObserver>,
) -> Result<Vec<Result<Spline, Error>>, Error> {
    let source = FfmpegVideo::open(src_path)?;
    extract_video_splines(&source, params, progress)
}

fn output_dir(dst_path: &Path) -> &Path {
    match dst_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
