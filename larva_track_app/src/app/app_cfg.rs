use std::path::PathBuf;

use larva_track_lib::PipelineConfig;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportVerbosity {
    Quiet,
    Default,
    Verbose,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Normal,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    RemoveBackground { src_path: PathBuf, dst_path: PathBuf },
    ExtractSplines { src_path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub command: AppCommand,
    pub pipeline: PipelineConfig,
    pub output_format: OutputFormat,
    pub verbosity: ReportVerbosity,
}
