use std::io::Write;

use larva_track_lib::{Error, Spline, SplinePoint};
use serde::Serialize;

use crate::app::*;

#[derive(Debug, Serialize)]
struct FrameSplineJson<'a> {
    frame: usize,
    points: Option<&'a [SplinePoint]>,
    error: Option<String>,
}

/// Write one entry per frame. In normal format, frames without a spline are left out.
pub(super) fn write_splines<W: Write>(
    out: &mut W,
    splines: &[Result<Spline, Error>],
    format: OutputFormat,
) -> Result<(), AppError> {
    match format {
        OutputFormat::Normal => {
            for (frame, spline) in splines.iter().enumerate() {
                let Ok(spline) = spline else {
                    continue;
                };
                for p in spline.points() {
                    writeln!(out, "{frame} {:.3} {:.3}", p.x, p.y)?;
                }
            }
        }
        OutputFormat::Json => {
            let entries = splines
                .iter()
                .enumerate()
                .map(|(frame, spline)| match spline {
                    Ok(spline) => FrameSplineJson {
                        frame,
                        points: Some(spline.points()),
                        error: None,
                    },
                    Err(e) => FrameSplineJson {
                        frame,
                        points: None,
                        error: Some(e.kind_root().to_string()),
                    },
                })
                .collect::<Vec<_>>();
            serde_json::to_writer_pretty(&mut *out, &entries)?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}
