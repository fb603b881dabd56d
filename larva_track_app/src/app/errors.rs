use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("ffmpeg and ffprobe must be installed and on the PATH")]
    FfmpegNotFound,

    #[error("Input video not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Not a video file: {}", .0.display())]
    NotAVideo(PathBuf),

    #[error("Output path is the same as the input: {}", .0.display())]
    OutputIsInput(PathBuf),

    #[error("Processing error: {0}")]
    Processing(#[from] larva_track_lib::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}
