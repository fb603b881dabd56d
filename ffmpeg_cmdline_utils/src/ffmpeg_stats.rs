use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::*;

#[derive(Debug, Deserialize, Serialize, Clone, Error)]
pub enum VideoInfoError {
    #[error("Error parsing stats: {0}")]
    JsonError(String),
    #[error("Error parsing stats: {0}")]
    ParseIntError(String),
    #[error("Error parsing stats: {0}")]
    ParseFloatError(String),
    #[error("Unsupported video rotation: {0}")]
    Rotation(String),
}

impl From<serde_json::Error> for VideoInfoError {
    fn from(e: serde_json::Error) -> Self {
        //limit maximum number of characters
        let error_string = format!("{e}").chars().take(500).collect::<String>();
        VideoInfoError::JsonError(error_string)
    }
}

impl From<std::num::ParseIntError> for VideoInfoError {
    fn from(e: std::num::ParseIntError) -> Self {
        VideoInfoError::ParseIntError(format!("{e}"))
    }
}

impl From<std::num::ParseFloatError> for VideoInfoError {
    fn from(e: std::num::ParseFloatError) -> Self {
        VideoInfoError::ParseFloatError(format!("{e}"))
    }
}

// If the video metadata declares a rotation, the raw (x, y) resolution refers to the
// "unrotated" resolution. ffmpeg autorotates decoded frames, so x and y must be swapped
// for 90 and 270.
#[derive(PartialEq, Eq, Clone, Debug, Copy, Default)]
enum FfmpegVideoRotation {
    #[default]
    Rot0,
    Rot90,
    Rot180,
    Rot270,
}
use FfmpegVideoRotation::*;

/// Video metadata obtained from ffprobe.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize, Default)]
pub struct VideoInfo {
    duration: std::time::Duration,
    file_size: u64,
    resolution: (u32, u32),
    frame_rate: f64,
    frame_count: u64,
}

impl VideoInfo {
    /// Use ffprobe to get the duration, resolution, frame rate and frame count of a video.
    /// Only the first video stream is inspected.
    ///
    /// # errors
    /// * The file cannot be read or is not recognized as a video by ffprobe
    /// * The output from ffprobe could not be parsed as JSON
    /// * A field was present but could not be parsed
    pub fn new<P>(src_path: P) -> Result<Self, FfmpegError>
    where
        P: AsRef<Path>,
    {
        let stats_string = get_video_stats(&src_path)?;
        let info = Self::from_ffprobe_json(&stats_string)?;
        Ok(info)
    }

    /// Parse the output of `ffprobe -show_format -show_streams -print_format json`.
    pub fn from_ffprobe_json(stats_string: &str) -> Result<Self, VideoInfoError> {
        let stats_parsed: Value = serde_json::from_str(stats_string)?;

        let duration = if let Value::String(d) = &stats_parsed["format"]["duration"] {
            std::time::Duration::from_secs_f64(d.parse::<f64>()?.max(0.0))
        } else {
            std::time::Duration::from_secs_f64(0.0)
        };

        let file_size = if let Value::String(s) = &stats_parsed["format"]["size"] {
            s.parse()?
        } else {
            0
        };

        let first_video = Self::first_video(&stats_parsed);

        let rotation = {
            let rotation = first_video.and_then(|video_stream| {
                video_stream
                    .get("side_data_list")
                    .and_then(|y| y.get(0).and_then(|x| x.get("rotation").cloned()))
            });

            //the rotation may either be a JSON String or JSON number
            let rotation = match rotation {
                None => None,
                Some(Value::Number(val)) => val.as_i64(),
                Some(Value::String(val)) => Some(val.parse::<i64>()?),
                Some(other) => return Err(VideoInfoError::Rotation(other.to_string())),
            };

            match rotation {
                None | Some(0) => Rot0,
                Some(90) | Some(-270) => Rot90,
                Some(180) | Some(-180) => Rot180,
                Some(-90) | Some(270) => Rot270,
                Some(other) => return Err(VideoInfoError::Rotation(other.to_string())),
            }
        };

        let resolution = {
            let width = first_video.and_then(|v| Self::u32_field(v, "width")).unwrap_or(0);
            let height = first_video.and_then(|v| Self::u32_field(v, "height")).unwrap_or(0);

            if matches!(rotation, Rot0 | Rot180) {
                (width, height)
            } else {
                (height, width)
            }
        };

        // r_frame_rate is the container's base rate and is usually what the stream was
        // recorded at. avg_frame_rate is the fallback for streams that leave it as 0/0.
        let frame_rate = first_video
            .and_then(|v| {
                ["r_frame_rate", "avg_frame_rate"]
                    .iter()
                    .filter_map(|field| v[*field].as_str())
                    .filter_map(parse_rational)
                    .find(|fps| *fps > 0.0)
            })
            .unwrap_or(0.0);

        let frame_count = match first_video.map(|v| &v["nb_frames"]) {
            Some(Value::String(n)) => n.parse()?,
            _ => (duration.as_secs_f64() * frame_rate).round() as u64,
        };

        Ok(VideoInfo {
            duration,
            file_size,
            resolution,
            frame_rate,
            frame_count,
        })
    }

    /// The duration of the video
    pub fn duration(&self) -> std::time::Duration {
        self.duration
    }

    /// The size of the video in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The resolution of the video in pixels.
    /// Note the returned value is correct for the orientation that the video is intended
    /// to be viewed. (Ffprobe returns a surprising value by default if the video is stored rotated)
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Frames per second, or 0.0 if ffprobe did not report one.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// The number of frames the container declares. This is advisory: decoding may yield fewer.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn first_video(stats_parsed: &Value) -> Option<&Value> {
        match &stats_parsed["streams"] {
            Value::Array(streams) => streams
                .iter()
                .find(|s| matches!(&s["codec_type"], Value::String(t) if t == "video")),
            _ => None,
        }
    }

    fn u32_field(stream: &Value, field_name: &str) -> Option<u32> {
        stream[field_name]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
    }
}

// ffprobe reports rates as "num/den", e.g "30000/1001"
fn parse_rational(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    let num = num.trim().parse::<f64>().ok()?;
    let den = den.trim().parse::<f64>().ok()?;
    if den == 0.0 {
        return None;
    }
    let ret = num / den;
    ret.is_finite().then_some(ret)
}
