/// The default number of leading frames sampled to build the background model.
///
/// More frames make the model more robust to larvae that sit still at the start of a
/// recording, at the cost of reading (and, for the median, holding) more frames.
pub const DEFAULT_SAMPLE_FRAMES: u32 = 10;

/// The default number of background removal passes.
///
/// Each pass estimates a new background from the previous pass's output, which
/// progressively flattens residual static structure.
///
/// reccomended range: 1-10.
pub const DEFAULT_REPETITIONS: u32 = 5;

/// The default intensity range handed to the automatic threshold.
pub const DEFAULT_THRESHOLD_LOWER: u8 = 30;
pub const DEFAULT_THRESHOLD_UPPER: u8 = 180;

/// The default number of segments a spline is divided into. A spline always has one more
/// point than it has segments.
pub const DEFAULT_SEGMENTS: u32 = 5;

//A cubic parametric fit needs this many points.
pub const MIN_SKELETON_POINTS: usize = 4;

//Frames handed to the parallel spline extractor at once. Bounds memory use on long videos.
#[cfg(feature = "parallel_splines")]
pub const SPLINE_CHUNK_FRAMES: usize = 64;
