use std::path::{Path, PathBuf};

use clap::{value_parser, ArgAction::*};
use larva_track_lib::*;

use crate::app::*;

// subcommands
const REMOVE_BACKGROUND: &str = "remove-background";
const EXTRACT_SPLINES: &str = "extract-splines";

// file specification
const INPUT_PATH: &str = "Input video";
const OUTPUT_PATH: &str = "Output video";

// background removal
const SAMPLE_FRAMES: &str = "Sample frames";
const METHOD: &str = "Aggregation method";
const REPETITIONS: &str = "Repetitions";
const NO_MASK: &str = "No mask";

// thresholding and splines
const THRESHOLD_LOWER: &str = "Threshold lower bound";
const THRESHOLD_UPPER: &str = "Threshold upper bound";
const SMOOTHING: &str = "Smoothing";
const SEGMENTS: &str = "Segments";

// outputs
const OUTPUT_FORMAT: &str = "Format";

//Verbosity
const VERBOSITY_QUIET: &str = "Quiet";
const VERBOSITY_VERBOSE: &str = "Verbose";

const DISPLAY_ORDERING: [&str; 13] = [
    //
    // file specification
    INPUT_PATH,
    OUTPUT_PATH,
    //
    //background removal
    SAMPLE_FRAMES,
    METHOD,
    REPETITIONS,
    NO_MASK,
    //
    //thresholding
    THRESHOLD_LOWER,
    THRESHOLD_UPPER,
    //
    //splines
    SMOOTHING,
    SEGMENTS,
    //
    //outputs
    OUTPUT_FORMAT,
    //
    //verbosity
    VERBOSITY_QUIET,
    VERBOSITY_VERBOSE,
];

fn get_ordering(arg_name: &str) -> usize {
    DISPLAY_ORDERING
        .iter()
        .position(|x| *x == arg_name)
        .unwrap_or(DISPLAY_ORDERING.len())
}

fn parse_method(s: &str) -> Result<AggregationMethod, Error> {
    s.parse()
}

fn input_arg() -> clap::Arg {
    clap::Arg::new(INPUT_PATH)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the video to process")
        .display_order(get_ordering(INPUT_PATH))
}

fn threshold_args() -> [clap::Arg; 2] {
    [
        clap::Arg::new(THRESHOLD_LOWER)
            .long("threshold-lower")
            .value_parser(value_parser!(u8))
            .help(format!("Intensities at or below this value are always background. The automatic threshold is chosen between the two bounds. [default: {DEFAULT_THRESHOLD_LOWER}]"))
            .display_order(get_ordering(THRESHOLD_LOWER)),
        clap::Arg::new(THRESHOLD_UPPER)
            .long("threshold-upper")
            .value_parser(value_parser!(u8))
            .help(format!("Intensities above this value are always foreground. [default: {DEFAULT_THRESHOLD_UPPER}]"))
            .display_order(get_ordering(THRESHOLD_UPPER)),
    ]
}

pub(super) fn build_app() -> clap::Command {
    //args are not added through method chaining because rustfmt struggles with very long expressions.
    let mut remove_background = clap::Command::new(REMOVE_BACKGROUND)
        .about("Subtract the static background from a video, optionally keeping only a mask of the largest moving region");

    remove_background = remove_background.arg(input_arg());

    remove_background = remove_background.arg(
        clap::Arg::new(OUTPUT_PATH)
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Where to write the processed video. The file is H.264 encoded and overwritten if it exists")
            .display_order(get_ordering(OUTPUT_PATH)),
    );

    remove_background = remove_background.arg(
        clap::Arg::new(SAMPLE_FRAMES)
            .long("sample-frames")
            .short('n')
            .value_parser(value_parser!(u32).range(1..))
            .help(format!("Number of leading frames used to estimate each background. [default: {DEFAULT_SAMPLE_FRAMES}]"))
            .display_order(get_ordering(SAMPLE_FRAMES)),
    );

    remove_background = remove_background.arg(
        clap::Arg::new(METHOD)
            .long("method")
            .value_parser(parse_method)
            .help("How the sampled frames are combined: 'mean' or 'median'. [default: median]")
            .display_order(get_ordering(METHOD)),
    );

    remove_background = remove_background.arg(
        clap::Arg::new(REPETITIONS)
            .long("repetitions")
            .short('r')
            .value_parser(value_parser!(u32).range(1..))
            .help(format!("Number of background removal passes. Each pass works on the previous pass's output. [default: {DEFAULT_REPETITIONS}]"))
            .display_order(get_ordering(REPETITIONS)),
    );

    remove_background = remove_background.arg(
        clap::Arg::new(NO_MASK)
            .long("no-mask")
            .action(SetTrue)
            .num_args(0)
            .help("Write the background-subtracted video instead of a mask of the largest foreground region")
            .display_order(get_ordering(NO_MASK)),
    );

    remove_background = remove_background.args(threshold_args());

    let mut extract_splines = clap::Command::new(EXTRACT_SPLINES)
        .about("Print a smoothed centerline for the largest shape in every frame of a (usually masked) video");

    extract_splines = extract_splines.arg(input_arg());
    extract_splines = extract_splines.args(threshold_args());

    extract_splines = extract_splines.arg(
        clap::Arg::new(SMOOTHING)
            .long("smoothing")
            .value_parser(value_parser!(f64))
            .help("Upper bound on the summed squared distance between skeleton pixels and the fitted curve. 0 passes through every pixel. [default: m - sqrt(2m) for m skeleton pixels]")
            .display_order(get_ordering(SMOOTHING)),
    );

    extract_splines = extract_splines.arg(
        clap::Arg::new(SEGMENTS)
            .long("segments")
            .value_parser(value_parser!(u32).range(1..))
            .help(format!("Number of segments in each spline. Each spline has one more point than segments. [default: {DEFAULT_SEGMENTS}]"))
            .display_order(get_ordering(SEGMENTS)),
    );

    extract_splines = extract_splines.arg(
        clap::Arg::new(OUTPUT_FORMAT)
            .long("output-format")
            .value_parser(value_parser!(OutputFormat))
            .default_value("normal")
            .help("Print splines as 'frame x y' rows or as json")
            .display_order(get_ordering(OUTPUT_FORMAT)),
    );

    let mut clap_app = clap::Command::new("Larva track")
        .version(clap::crate_version!())
        .about("Remove static backgrounds from larva videos and extract their centerlines")
        .subcommand_required(true)
        .subcommand(remove_background)
        .subcommand(extract_splines);

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_QUIET)
            .long("quiet")
            .short('q')
            .global(true)
            .conflicts_with(VERBOSITY_VERBOSE)
            .action(SetTrue)
            .num_args(0)
            .help("Only print warnings and errors")
            .display_order(get_ordering(VERBOSITY_QUIET)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_VERBOSE)
            .long("verbose")
            .short('v')
            .global(true)
            .action(SetTrue)
            .num_args(0)
            .help("Print debug information, and the full cause of any error")
            .display_order(get_ordering(VERBOSITY_VERBOSE)),
    );

    clap_app
}

pub fn parse_args() -> AppCfg {
    //capture the cwd once, to minimize the risk of working with two values if it is changed by the OS at runtime.
    let cwd = std::env::current_dir().unwrap_or_default();

    let args = build_app().get_matches();
    cfg_from_matches(&args, &cwd)
}

pub(super) fn cfg_from_matches(args: &clap::ArgMatches, cwd: &Path) -> AppCfg {
    let defaults = PipelineConfig::default();

    let (command, sub_args) = match args.subcommand() {
        Some((REMOVE_BACKGROUND, sub_args)) => {
            let command = AppCommand::RemoveBackground {
                src_path: path_arg(sub_args, INPUT_PATH, cwd),
                dst_path: path_arg(sub_args, OUTPUT_PATH, cwd),
            };
            (command, sub_args)
        }
        Some((_, sub_args)) => {
            let command = AppCommand::ExtractSplines {
                src_path: path_arg(sub_args, INPUT_PATH, cwd),
            };
            (command, sub_args)
        }
        //subcommand_required means clap has already rejected this.
        None => {
            let command = AppCommand::ExtractSplines {
                src_path: PathBuf::new(),
            };
            (command, args)
        }
    };

    // Each subcommand only defines some of these, so look them up leniently.
    fn opt<T: Clone + Send + Sync + 'static>(args: &clap::ArgMatches, id: &str) -> Option<T> {
        args.try_get_one::<T>(id).ok().flatten().cloned()
    }

    let pipeline = PipelineConfig {
        sample_frames: opt(sub_args, SAMPLE_FRAMES).unwrap_or(defaults.sample_frames),
        method: opt(sub_args, METHOD).unwrap_or(defaults.method),
        repetitions: opt(sub_args, REPETITIONS).unwrap_or(defaults.repetitions),
        threshold_lower: opt(sub_args, THRESHOLD_LOWER).unwrap_or(defaults.threshold_lower),
        threshold_upper: opt(sub_args, THRESHOLD_UPPER).unwrap_or(defaults.threshold_upper),
        smoothing: opt(sub_args, SMOOTHING).or(defaults.smoothing),
        segments: opt(sub_args, SEGMENTS).unwrap_or(defaults.segments),
        apply_mask: !opt::<bool>(sub_args, NO_MASK).unwrap_or(false),
    };

    let output_format = opt(sub_args, OUTPUT_FORMAT).unwrap_or(OutputFormat::Normal);

    let verbosity = if opt::<bool>(sub_args, VERBOSITY_QUIET).unwrap_or(false) {
        ReportVerbosity::Quiet
    } else if opt::<bool>(sub_args, VERBOSITY_VERBOSE).unwrap_or(false) {
        ReportVerbosity::Verbose
    } else {
        ReportVerbosity::Default
    };

    AppCfg {
        command,
        pipeline,
        output_format,
        verbosity,
    }
}

fn path_arg(args: &clap::ArgMatches, id: &str, cwd: &Path) -> PathBuf {
    match args.get_one::<PathBuf>(id) {
        Some(path) => absolutify_path(cwd, path),
        None => PathBuf::new(),
    }
}

fn absolutify_path(cwd: &Path, path: &Path) -> PathBuf {
    //get the absolute path if it is not absolute, by prepending the cwd.
    if path.is_relative() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> AppCfg {
        let matches = build_app()
            .try_get_matches_from(std::iter::once("larva_track").chain(args.iter().copied()))
            .unwrap();
        cfg_from_matches(&matches, Path::new("/work"))
    }

    #[test]
    fn test_remove_background_defaults() {
        let cfg = parse(&["remove-background", "in.mp4", "/tmp/out.mp4"]);
        assert_eq!(
            cfg.command,
            AppCommand::RemoveBackground {
                src_path: PathBuf::from("/work/in.mp4"),
                dst_path: PathBuf::from("/tmp/out.mp4"),
            }
        );
        assert_eq!(cfg.pipeline, PipelineConfig::default());
        assert_eq!(cfg.verbosity, ReportVerbosity::Default);
    }

    #[test]
    fn test_remove_background_options() {
        let cfg = parse(&[
            "--verbose",
            "remove-background",
            "in.mp4",
            "out.mp4",
            "--method",
            "MEAN",
            "-n",
            "4",
            "--repetitions",
            "1",
            "--no-mask",
            "--threshold-lower",
            "50",
            "--threshold-upper",
            "255",
        ]);
        assert_eq!(cfg.pipeline.method, AggregationMethod::Mean);
        assert_eq!(cfg.pipeline.sample_frames, 4);
        assert_eq!(cfg.pipeline.repetitions, 1);
        assert!(!cfg.pipeline.apply_mask);
        assert_eq!(cfg.pipeline.threshold_lower, 50);
        assert_eq!(cfg.pipeline.threshold_upper, 255);
        assert_eq!(cfg.verbosity, ReportVerbosity::Verbose);
    }

    #[test]
    fn test_extract_splines_options() {
        let cfg = parse(&[
            "extract-splines",
            "masked.mkv",
            "--smoothing",
            "0",
            "--segments",
            "9",
            "--output-format",
            "json",
            "--quiet",
        ]);
        assert_eq!(
            cfg.command,
            AppCommand::ExtractSplines {
                src_path: PathBuf::from("/work/masked.mkv")
            }
        );
        assert_eq!(cfg.pipeline.smoothing, Some(0.0));
        assert_eq!(cfg.pipeline.segments, 9);
        assert_eq!(cfg.output_format, OutputFormat::Json);
        assert_eq!(cfg.verbosity, ReportVerbosity::Quiet);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let try_parse = |args: &[&str]| {
            build_app().try_get_matches_from(std::iter::once("larva_track").chain(args.iter().copied()))
        };

        assert!(try_parse(&["remove-background", "a", "b", "--method", "mode"]).is_err());
        assert!(try_parse(&["remove-background", "a", "b", "-r", "0"]).is_err());
        assert!(try_parse(&["extract-splines", "a", "--segments", "0"]).is_err());
        assert!(try_parse(&["extract-splines", "a", "--threshold-upper", "256"]).is_err());
        assert!(try_parse(&[]).is_err());
    }

    #[test]
    fn test_output_format_values() {
        let cfg = parse(&["extract-splines", "masked.mkv"]);
        assert_eq!(cfg.output_format, OutputFormat::Normal);

        let cfg = parse(&["extract-splines", "masked.mkv", "--output-format", "normal"]);
        assert_eq!(cfg.output_format, OutputFormat::Normal);

        let res = build_app().try_get_matches_from([
            "larva_track",
            "extract-splines",
            "masked.mkv",
            "--output-format",
            "csv",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_display_ordering_is_complete() {
        let app = build_app();
        for sub in app.get_subcommands() {
            for arg in sub.get_arguments() {
                let id = arg.get_id().as_str();
                if id != "help" && id != "version" {
                    assert!(DISPLAY_ORDERING.contains(&id), "{id} has no display order");
                }
            }
        }
    }
}
