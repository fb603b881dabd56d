use std::{io::BufWriter, path::Path, time::Instant};

use eyre::WrapErr;
use larva_track_lib::*;

use crate::app::*;

pub fn run_app() -> i32 {
    let cfg = arg_parse::parse_args();
    configure_logs(cfg.verbosity);

    let ret = match run_app_inner(&cfg) {
        Ok(()) => 0,
        Err(fatal_error) => {
            print_fatal_err(fatal_error, cfg.verbosity);
            1
        }
    };

    ret
}

fn run_app_inner(cfg: &AppCfg) -> eyre::Result<()> {
    cfg.pipeline
        .validate()
        .map_err(AppError::from)
        .wrap_err("Invalid arguments")?;

    if !ffmpeg_and_ffprobe_are_callable() {
        return Err(AppError::FfmpegNotFound.into());
    }

    match &cfg.command {
        AppCommand::RemoveBackground { src_path, dst_path } => {
            remove_background(cfg, src_path, dst_path)
        }
        AppCommand::ExtractSplines { src_path } => extract_splines(cfg, src_path),
    }
}

fn check_input(src_path: &Path) -> Result<(), AppError> {
    if !src_path.is_file() {
        return Err(AppError::InputNotFound(src_path.to_path_buf()));
    }

    match is_video_file(src_path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::NotAVideo(src_path.to_path_buf())),
        Err(e) => Err(AppError::Processing(e.into())),
    }
}

fn remove_background(cfg: &AppCfg, src_path: &Path, dst_path: &Path) -> eyre::Result<()> {
    check_input(src_path)?;
    if src_path == dst_path {
        return Err(AppError::OutputIsInput(dst_path.to_path_buf()).into());
    }

    let video = FfmpegVideo::open(src_path)
        .map_err(AppError::from)
        .wrap_err_with(|| format!("Failed to open {}", src_path.display()))?;

    let meta = video.meta();
    info!(
        "{}: {}x{}, {} frames at {:.2} fps ({:.1}s, {} bytes)",
        src_path.display(),
        meta.width,
        meta.height,
        meta.frame_count,
        meta.frame_rate,
        video.info().duration().as_secs_f64(),
        video.info().file_size()
    );
    if meta.frame_count > 0 && u64::from(cfg.pipeline.sample_frames) > meta.frame_count {
        warn!(
            "{} frames requested for the background, but the video only has {}",
            cfg.pipeline.sample_frames, meta.frame_count
        );
    }

    let start = Instant::now();
    let mut progress = LogProgress::new("remove-background");
    let progress = (cfg.verbosity != ReportVerbosity::Quiet)
        .then_some(&mut progress as &mut dyn ProgressObserver);

    let report = process_video_file(src_path, dst_path, &cfg.pipeline, progress)
        .map_err(AppError::from)
        .wrap_err_with(|| format!("Failed to process {}", src_path.display()))?;

    if let Some(stats) = report.mask_stats {
        if stats.empty_frames > 0 {
            warn!(
                "{} of {} frames had no foreground and were written blank",
                stats.empty_frames, stats.frames_written
            );
        }
    }

    info!(
        "wrote {} frames to {} in {:.2}s",
        report.frames_written,
        dst_path.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn extract_splines(cfg: &AppCfg, src_path: &Path) -> eyre::Result<()> {
    check_input(src_path)?;

    let params = cfg.pipeline.spline_params().map_err(AppError::from)?;

    let mut progress = LogProgress::new("extract-splines");
    let progress = (cfg.verbosity != ReportVerbosity::Quiet)
        .then_some(&mut progress as &mut dyn ProgressObserver);

    let splines = extract_splines_from_file(src_path, &params, progress)
        .map_err(AppError::from)
        .wrap_err_with(|| format!("Failed to extract splines from {}", src_path.display()))?;

    for e in splines.iter().filter_map(|s| s.as_ref().err()) {
        debug!("{e}");
    }
    let num_failed = splines.iter().filter(|s| s.is_err()).count();
    if num_failed > 0 {
        warn!("no spline for {num_failed} of {} frames", splines.len());
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    spline_output::write_splines(&mut out, &splines, cfg.output_format)?;

    Ok(())
}

fn print_fatal_err(fatal_err: eyre::Report, verbosity: ReportVerbosity) {
    error!(target: "app-errorlog", "{}", fatal_err);

    if verbosity == ReportVerbosity::Verbose {
        for cause in fatal_err.chain().skip(1) {
            error!(target: "app-errorlog", "    caused by: {}", cause);
        }
    }
}

pub fn configure_logs(verbosity: ReportVerbosity) {
    use simplelog::*;

    let mut cfg = simplelog::ConfigBuilder::new();

    let min_loglevel = match verbosity {
        ReportVerbosity::Quiet => LevelFilter::Warn,
        ReportVerbosity::Default => LevelFilter::Info,
        ReportVerbosity::Verbose => LevelFilter::Trace,
    };

    //only fails if a logger is already installed, in which case that one is kept.
    let _ = TermLogger::init(
        min_loglevel,
        cfg.build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}
