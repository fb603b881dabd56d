use image::{Rgb, RgbImage};

use crate::{
    background::BackgroundModel,
    progress::{ProgressObserver, ProgressTracker},
    video::{check_dimensions, VideoSink, VideoSource},
    Error,
};

/// Render the foreground of one frame: the absolute difference from the background,
/// reduced to its HSV value channel (the per-pixel maximum over the three channels) and
/// replicated across all three output channels.
pub fn render_frame(frame: &RgbImage, model: &BackgroundModel) -> Result<RgbImage, Error> {
    check_dimensions(model.dimensions(), frame)?;

    let mut ret = RgbImage::new(frame.width(), frame.height());

    for ((&Rgb(src), &Rgb(bg)), &mut Rgb(ref mut dst)) in frame
        .pixels()
        .zip(model.image().pixels())
        .zip(ret.pixels_mut())
    {
        let value = src
            .iter()
            .zip(bg.iter())
            .map(|(s, b)| s.abs_diff(*b))
            .max()
            .unwrap_or(0);
        *dst = [value; 3];
    }

    Ok(ret)
}

/// Render every frame of `source` against `model` into `sink`, in order.
///
/// Reads from a fresh cursor, so rendering always starts at frame 0 regardless of how
/// many frames were consumed to build the model. At most the declared number of frames is
/// rendered; a stream that ends early produces fewer. Returns the number of frames written.
///
/// The sink is not finished; that is left to the caller.
pub fn render_video(
    source: &dyn VideoSource,
    model: &BackgroundModel,
    sink: &mut dyn VideoSink,
    progress: Option<&mut dyn ProgressObserver>,
) -> Result<u64, Error> {
    let meta = source.meta();
    if model.dimensions() != meta.dimensions() {
        return Err(Error::DimensionMismatch {
            expected: meta.dimensions(),
            actual: model.dimensions(),
        });
    }

    // 0 means the container did not say.
    let limit = if meta.frame_count == 0 {
        u64::MAX
    } else {
        meta.frame_count
    };

    let mut tracker = ProgressTracker::new(progress, meta.frame_count);
    let mut frames_written = 0u64;

    for (frame_idx, frame) in (0..limit).zip(source.frames()?) {
        let rendered = frame
            .and_then(|frame| render_frame(&frame, model))
            .map_err(|e| e.at_frame(frame_idx))?;
        sink.write_frame(&rendered)
            .map_err(|e| e.at_frame(frame_idx))?;

        frames_written += 1;
        tracker.frame_done(frames_written);
    }

    if frames_written < meta.frame_count {
        log::warn!(
            "video ended after {frames_written} of {} declared frames",
            meta.frame_count
        );
    }

    Ok(frames_written)
}
