use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::experiment::{SolarExperiment, SweepResult};
use crate::plot::{render_png, PlotKind};
use crate::util::Engineering;
use crate::Result;

/// Follows a running sweep: polls the shared result, logs progress and
/// keeps an optional plot file up to date.
#[derive(Clone, Debug)]
pub struct Monitor {
    pub interval: Duration,
    pub kind: PlotKind,
    pub plot_path: Option<PathBuf>,
    pub width: i32,
    pub height: i32,
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor {
            interval: Duration::from_millis(100),
            kind: PlotKind::UI,
            plot_path: None,
            width: 800,
            height: 600,
        }
    }
}

impl Monitor {
    /// Watches `experiment` until the sweep behind `handle` ends and returns its result.
    pub fn watch(
        &self,
        experiment: &SolarExperiment,
        handle: JoinHandle<Result<()>>,
    ) -> Result<()> {
        let mut seen = 0;
        while experiment.is_scanning() {
            thread::sleep(self.interval);
            let snapshot = experiment.snapshot();
            if snapshot.len() != seen {
                seen = snapshot.len();
                self.report(&snapshot);
                if let Err(e) = self.redraw(&snapshot) {
                    warn!("Can't update the plot: {}", e);
                }
            }
        }

        let outcome = handle
            .join()
            .map_err(|_| failure::err_msg("The sweep thread panicked"))?;
        self.redraw(&experiment.snapshot())?;
        outcome
    }

    fn report(&self, result: &SweepResult) {
        match result.p_max() {
            Some(p_max) => info!(
                "{} point(s), max power {}W",
                result.len(),
                Engineering(p_max)
            ),
            None => info!("{} point(s)", result.len()),
        }
    }

    fn redraw(&self, result: &SweepResult) -> Result<()> {
        if let Some(path) = &self.plot_path {
            render_png(result, self.kind, path, self.width, self.height)?;
        }
        Ok(())
    }
}
