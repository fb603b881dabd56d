use std::path::Path;

use ffmpeg_cmdline_utils::{transcode_h264, DEFAULT_TRANSCODE_TIMEOUT_SECS};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};
use rand::prelude::*;

use larva_track_lib::*;

// Everything here runs real ffmpeg processes. Without ffmpeg on the PATH there is nothing
// to test, so each test returns early.
fn ffmpeg_available() -> bool {
    let ret = ffmpeg_and_ffprobe_are_callable();
    if !ret {
        eprintln!("ffmpeg and ffprobe are not callable, skipping");
    }
    ret
}

fn noise_frames(num_frames: u32, seed: u64) -> Vec<RgbImage> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_frames)
        .map(|_| RgbImage::from_fn(32, 24, |_, _| Rgb(rng.gen())))
        .collect()
}

// An 8x8 bright square moving 2 pixels per frame over a flat gray background.
fn moving_square_frames(num_frames: u32) -> Vec<RgbImage> {
    (0..num_frames)
        .map(|i| {
            let mut frame = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
            draw_filled_rect_mut(
                &mut frame,
                Rect::at(4 + 2 * i as i32, 20).of_size(8, 8),
                Rgb([230, 230, 230]),
            );
            frame
        })
        .collect()
}

fn write_video(path: &Path, frames: &[RgbImage], frame_rate: f64) {
    let (width, height) = frames[0].dimensions();
    let meta = VideoMeta {
        width,
        height,
        frame_rate,
        frame_count: frames.len() as u64,
    };

    let mut sink = FfmpegSink::create(path, meta).unwrap();
    for frame in frames {
        sink.write_frame(frame).unwrap();
    }
    assert_eq!(sink.finish().unwrap(), frames.len() as u64);
}

fn read_all(video: &dyn VideoSource) -> Vec<RgbImage> {
    video.frames().unwrap().collect::<Result<Vec<_>, _>>().unwrap()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn test_written_video_reads_back_exactly() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.mkv");
    let frames = noise_frames(6, 7);
    write_video(&path, &frames, 10.0);

    assert!(is_video_file(&path).unwrap());

    let video = FfmpegVideo::open(&path).unwrap();
    assert_eq!(video.meta().dimensions(), (32, 24));
    assert!((video.meta().frame_rate - 10.0).abs() < 0.5);
    assert_eq!(read_all(&video), frames);

    //a second cursor starts from the first frame again.
    assert_eq!(read_all(&video), frames);
}

#[test]
fn test_sink_rejects_wrong_size() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let meta = VideoMeta {
        width: 32,
        height: 24,
        frame_rate: 10.0,
        frame_count: 1,
    };

    let mut sink = FfmpegSink::create(dir.path().join("out.mkv"), meta).unwrap();
    assert!(matches!(
        sink.write_frame(&RgbImage::new(24, 32)),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn test_frame_limit_and_decode_timeout() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.mkv");
    let frames = noise_frames(6, 11);
    write_video(&path, &frames, 10.0);

    let limited = FfmpegVideo::open(&path).unwrap().limit_frames(3);
    assert!(limited.meta().frame_count <= 3);
    assert_eq!(read_all(&limited), frames[..3].to_vec());

    let timed_out = FfmpegVideo::open(&path).unwrap().decode_timeout(0);
    assert!(read_all(&timed_out).is_empty());
}

#[test]
fn test_transcode_keeps_frames_and_source() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("square.mkv");
    let dst = dir.path().join("square.mp4");
    write_video(&src, &moving_square_frames(10), 25.0);

    transcode_h264(&src, &dst, DEFAULT_TRANSCODE_TIMEOUT_SECS).unwrap();

    assert_eq!(read_all(&FfmpegVideo::open(&src).unwrap()), moving_square_frames(10));
    let transcoded = FfmpegVideo::open(&dst).unwrap();
    assert_eq!(transcoded.meta().dimensions(), (64, 48));
    assert_eq!(read_all(&transcoded).len(), 10);
}

#[test]
fn test_file_store_matches_memory_store() {
    if !ffmpeg_available() {
        return;
    }
    let video = MemoryVideo::from_frames(moving_square_frames(16), 25.0).unwrap();
    let cfg = PipelineConfig {
        sample_frames: 8,
        repetitions: 2,
        ..Default::default()
    };

    let mut in_memory = MemorySink::new(video.meta());
    Pipeline::new(cfg)
        .unwrap()
        .run(&video, &mut in_memory, None)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut store = TempFileStore::new_in(dir.path()).unwrap();
    let mut on_disk = MemorySink::new(video.meta());
    Pipeline::new(cfg)
        .unwrap()
        .run_with_store(&video, &mut on_disk, &mut store, None)
        .unwrap();

    assert_eq!(
        on_disk.into_video().frames_slice(),
        in_memory.into_video().frames_slice()
    );

    //each intermediate file is gone once the next stage has read it.
    assert!(dir_entries(store.path()).is_empty());
    drop(store);
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_process_video_file() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("input.mkv");
    let dst = dir.path().join("processed.mp4");
    write_video(&src, &moving_square_frames(24), 25.0);

    let cfg = PipelineConfig {
        sample_frames: 10,
        repetitions: 2,
        ..Default::default()
    };
    let report = process_video_file(&src, &dst, &cfg, None).unwrap();
    assert_eq!(report.frames_written, 24);
    assert_eq!(report.mask_stats.map(|s| s.empty_frames), Some(0));

    let out = read_all(&FfmpegVideo::open(&dst).unwrap());
    assert_eq!(out.len(), 24);

    //H.264 is lossy, but a filled mask survives it: frame 12's square spans x 28..36.
    assert!(out[12].get_pixel(32, 24).0.iter().all(|&c| c > 200));
    assert!(out[12].get_pixel(2, 2).0.iter().all(|&c| c < 50));

    assert_eq!(dir_entries(dir.path()), vec!["input.mkv", "processed.mp4"]);
}

#[test]
fn test_failed_transcode_leaves_no_output() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("input.mkv");
    write_video(&src, &moving_square_frames(12), 25.0);

    //ffmpeg cannot pick a container for this extension. A stale file already at the
    //destination must not survive looking like a result.
    let dst = dir.path().join("processed.not_a_container");
    std::fs::write(&dst, b"stale").unwrap();

    let cfg = PipelineConfig {
        repetitions: 1,
        ..Default::default()
    };
    let ret = process_video_file(&src, &dst, &cfg, None);

    assert!(matches!(ret, Err(Error::Video(_))));
    assert_eq!(dir_entries(dir.path()), vec!["input.mkv"]);
}
