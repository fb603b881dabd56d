use std::time::Instant;

/// Receives progress notifications from long-running stages.
///
/// Reporting is purely observational: nothing a stage computes depends on whether an
/// observer is attached.
pub trait ProgressObserver {
    /// `fraction` is in `0.0..=1.0`; `elapsed_secs` is measured from the start of the stage.
    fn report(&mut self, fraction: f64, elapsed_secs: f64);
}

impl<F> ProgressObserver for F
where
    F: FnMut(f64, f64),
{
    fn report(&mut self, fraction: f64, elapsed_secs: f64) {
        self(fraction, elapsed_secs)
    }
}

/// Logs progress at `info` level, at most once per whole percent.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
    last_percent: Option<u32>,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_percent: None,
        }
    }
}

impl ProgressObserver for LogProgress {
    fn report(&mut self, fraction: f64, elapsed_secs: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).floor() as u32;
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        log::info!(
            target: "progress",
            "{}: {percent}% (elapsed {elapsed_secs:.2}s)",
            self.label
        );
    }
}

// Tracks frames processed against a (possibly absent) observer.
pub(crate) struct ProgressTracker<'a> {
    observer: Option<&'a mut dyn ProgressObserver>,
    total: u64,
    start: Instant,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: Option<&'a mut dyn ProgressObserver>, total: u64) -> Self {
        Self {
            observer,
            total,
            start: Instant::now(),
        }
    }

    pub fn frame_done(&mut self, frames_done: u64) {
        if let Some(observer) = self.observer.as_mut() {
            //declared frame counts are advisory, so never report more than 100%.
            let fraction = if self.total == 0 {
                1.0
            } else {
                (frames_done as f64 / self.total as f64).min(1.0)
            };
            observer.report(fraction, self.start.elapsed().as_secs_f64());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tracker_reports_capped_fractions() {
        let mut reports = vec![];
        let mut observer = |fraction: f64, elapsed: f64| reports.push((fraction, elapsed));

        let mut tracker = ProgressTracker::new(Some(&mut observer), 4);
        for done in 1..=6 {
            tracker.frame_done(done);
        }
        drop(tracker);

        let fractions = reports.iter().map(|(f, _)| *f).collect::<Vec<_>>();
        assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);
        assert!(reports.iter().all(|(_, elapsed)| *elapsed >= 0.0));
    }

    #[test]
    fn test_tracker_without_declared_count() {
        let mut reports = vec![];
        let mut observer = |fraction: f64, _elapsed: f64| reports.push(fraction);

        let mut tracker = ProgressTracker::new(Some(&mut observer), 0);
        tracker.frame_done(3);
        drop(tracker);

        assert_eq!(reports, vec![1.0]);
    }
}
