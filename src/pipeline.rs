//! Repeated background removal, optionally followed by a masking pass.

use std::{
    fmt,
    time::{Duration, Instant},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    background::{estimate_background_from_source, AggregationMethod},
    binarize::ThresholdRange,
    definitions::*,
    foreground::render_video,
    mask::{mask_video, MaskStats},
    progress::ProgressObserver,
    spline::SplineParams,
    video::{IntermediateStore, MemoryStore, VideoSink, VideoSource},
    Error,
};

/// Every parameter of a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Leading frames sampled for each background model.
    pub sample_frames: u32,
    pub method: AggregationMethod,
    pub repetitions: u32,
    pub threshold_lower: u8,
    pub threshold_upper: u8,
    /// See [`SplineParams::smoothing`].
    pub smoothing: Option<f64>,
    pub segments: u32,
    /// Replace each frame of the final repetition's output with its largest-region mask.
    pub apply_mask: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_frames: DEFAULT_SAMPLE_FRAMES,
            method: AggregationMethod::default(),
            repetitions: DEFAULT_REPETITIONS,
            threshold_lower: DEFAULT_THRESHOLD_LOWER,
            threshold_upper: DEFAULT_THRESHOLD_UPPER,
            smoothing: None,
            segments: DEFAULT_SEGMENTS,
            apply_mask: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_frames < 1 {
            return Err(Error::InvalidConfig(
                "at least one frame must be sampled for the background".to_string(),
            ));
        }
        if self.repetitions < 1 {
            return Err(Error::InvalidConfig(
                "at least one repetition is required".to_string(),
            ));
        }
        if self.segments < 1 {
            return Err(Error::InvalidSegmentCount(self.segments));
        }
        if let Some(smoothing) = self.smoothing {
            if !smoothing.is_finite() || smoothing < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "smoothing must be a non-negative number, got {smoothing}"
                )));
            }
        }
        self.threshold_range()?;

        Ok(())
    }

    pub fn threshold_range(&self) -> Result<ThresholdRange, Error> {
        ThresholdRange::new(self.threshold_lower, self.threshold_upper)
    }

    pub fn spline_params(&self) -> Result<SplineParams, Error> {
        Ok(SplineParams {
            range: self.threshold_range()?,
            smoothing: self.smoothing,
            segments: self.segments,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    EstimatingBackground { repetition: u32 },
    Rendering { repetition: u32 },
    Masking,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::EstimatingBackground { repetition } => {
                write!(f, "estimating background (repetition {repetition})")
            }
            Self::Rendering { repetition } => write!(f, "rendering (repetition {repetition})"),
            Self::Masking => write!(f, "masking"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepetitionReport {
    pub frames_rendered: u64,
    pub elapsed: Duration,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub repetitions: Vec<RepetitionReport>,
    pub mask_stats: Option<MaskStats>,
    /// Frames the sink reported when finished.
    pub frames_written: u64,
}

/// Runs background removal passes over a video.
///
/// The pipeline keeps no data between runs: every call to [`Pipeline::run`] starts from
/// the source it is given. Only [`Pipeline::state`] persists, for inspection.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cfg: PipelineConfig,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self, Error> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            state: PipelineState::Idle,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Process `source` into `sink`, finishing the sink.
    ///
    /// Each repetition estimates a background from the previous repetition's output (the
    /// source, for the first) and renders that output against it. Intermediate outputs are
    /// held in memory and dropped once consumed. The first error aborts the run.
    pub fn run(
        &mut self,
        source: &dyn VideoSource,
        sink: &mut dyn VideoSink,
        progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<PipelineReport, Error> {
        self.run_with_store(source, sink, &mut MemoryStore, progress)
    }

    /// As [`Pipeline::run`], keeping intermediate outputs in `store`.
    pub fn run_with_store(
        &mut self,
        source: &dyn VideoSource,
        sink: &mut dyn VideoSink,
        store: &mut dyn IntermediateStore,
        progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<PipelineReport, Error> {
        self.state = PipelineState::Idle;
        let ret = self.run_inner(source, sink, store, progress);
        match &ret {
            Ok(_) => self.set_state(PipelineState::Done),
            Err(e) => {
                debug!("pipeline failed: {e}");
                self.set_state(PipelineState::Failed);
            }
        }
        ret
    }

    fn run_inner(
        &mut self,
        source: &dyn VideoSource,
        sink: &mut dyn VideoSink,
        store: &mut dyn IntermediateStore,
        mut progress: Option<&mut dyn ProgressObserver>,
    ) -> Result<PipelineReport, Error> {
        let cfg = self.cfg;
        let src_meta = source.meta();
        if sink.meta().dimensions() != src_meta.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: src_meta.dimensions(),
                actual: sink.meta().dimensions(),
            });
        }

        let stages = cfg.repetitions + u32::from(cfg.apply_mask);
        let run_start = Instant::now();

        let mut rendered: Option<Box<dyn VideoSource>> = None;
        let mut repetitions = vec![];

        for repetition in 1..=cfg.repetitions {
            let rep_start = Instant::now();
            let input: &dyn VideoSource = match &rendered {
                Some(video) => &**video,
                None => source,
            };

            self.set_state(PipelineState::EstimatingBackground { repetition });
            let model = estimate_background_from_source(input, cfg.sample_frames, cfg.method)?;

            self.set_state(PipelineState::Rendering { repetition });
            let mut stage = StageProgress::of(&mut progress, repetition - 1, stages, run_start);
            let stage = stage.as_mut().map(|s| s as &mut dyn ProgressObserver);

            let writes_final_output = repetition == cfg.repetitions && !cfg.apply_mask;
            let (frames_rendered, next) = if writes_final_output {
                (render_video(input, &model, sink, stage)?, None)
            } else {
                let mut stored = store.create(input.meta())?;
                let frames = render_video(input, &model, stored.as_sink(), stage)?;
                (frames, Some(stored.into_source()?))
            };
            rendered = next;

            let elapsed = rep_start.elapsed();
            info!(
                "repetition {repetition}/{} rendered {frames_rendered} frames in {:.2}s",
                cfg.repetitions,
                elapsed.as_secs_f64()
            );
            repetitions.push(RepetitionReport {
                frames_rendered,
                elapsed,
            });
        }

        let mut mask_stats = None;
        if cfg.apply_mask {
            self.set_state(PipelineState::Masking);
            let input = rendered
                .as_deref()
                .ok_or_else(|| Error::InvalidConfig("nothing was rendered to mask".to_string()))?;

            let mut stage = StageProgress::of(&mut progress, cfg.repetitions, stages, run_start);
            let stage = stage.as_mut().map(|s| s as &mut dyn ProgressObserver);
            let stats = mask_video(input, cfg.threshold_range()?, sink, stage)?;
            if stats.empty_frames > 0 {
                info!(
                    "{} of {} frames had no foreground region",
                    stats.empty_frames, stats.frames_written
                );
            }
            mask_stats = Some(stats);
        }

        let frames_written = sink.finish()?;

        Ok(PipelineReport {
            repetitions,
            mask_stats,
            frames_written,
        })
    }

    fn set_state(&mut self, state: PipelineState) {
        debug!("pipeline: {} -> {}", self.state, state);
        self.state = state;
    }
}

/// Run a [`Pipeline`] once.
pub fn run_pipeline(
    source: &dyn VideoSource,
    cfg: &PipelineConfig,
    sink: &mut dyn VideoSink,
    progress: Option<&mut dyn ProgressObserver>,
) -> Result<PipelineReport, Error> {
    Pipeline::new(*cfg)?.run(source, sink, progress)
}

// Maps one stage's progress onto its share of the whole run.
struct StageProgress<'a> {
    inner: &'a mut dyn ProgressObserver,
    offset: f64,
    share: f64,
    run_start: Instant,
}

impl<'a> StageProgress<'a> {
    fn of(
        progress: &'a mut Option<&mut dyn ProgressObserver>,
        stage: u32,
        stages: u32,
        run_start: Instant,
    ) -> Option<Self> {
        progress.as_mut().map(|inner| Self {
            inner: &mut **inner,
            offset: f64::from(stage) / f64::from(stages),
            share: 1.0 / f64::from(stages),
            run_start,
        })
    }
}

impl ProgressObserver for StageProgress<'_> {
    fn report(&mut self, fraction: f64, _elapsed_secs: f64) {
        self.inner.report(
            self.offset + fraction * self.share,
            self.run_start.elapsed().as_secs_f64(),
        );
    }
}
