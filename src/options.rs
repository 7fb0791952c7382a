use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;
use simplelog::{Config, SimpleLogger, TermLogger, TerminalMode};
use structopt::StructOpt;

use crate::backend::{Resource, SerialSettings};
use crate::experiment::{SweepConfig, SweepResult};
use crate::plot::{Monitor, PlotKind};
use crate::trace::file::{ExportColumns, ExportableTrace};
use crate::util::Engineering;
use crate::Result;

pub trait Opt {
    fn initialize_logging(&self) -> Result<()>;
}

#[derive(StructOpt, Debug)]
pub struct ScanOpt {
    /// Instrument, e.g. `ASRL/dev/ttyACM0::INSTR` or `ASRL::SIMPV::INSTR`
    pub resource: Resource,
    /// First output voltage of the sweep
    #[structopt(long = "start", default_value = "0")]
    pub start: f64,
    /// Last output voltage of the sweep
    #[structopt(long = "stop", default_value = "3.3")]
    pub stop: f64,
    /// Readings averaged per step
    #[structopt(short = "n", long = "samples", default_value = "1")]
    pub samples: usize,
    /// Export the trace; `.csv` is comma separated, anything else tab separated
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    pub output: Option<PathBuf>,
    /// Export FET voltage, power and resistance as well
    #[structopt(long = "full")]
    pub full: bool,
    /// Keep a PNG plot updated while scanning
    #[structopt(long = "plot", parse(from_os_str))]
    pub plot: Option<PathBuf>,
    /// Characteristic to plot: `ui` or `pr`
    #[structopt(long = "graph", default_value = "ui")]
    pub graph: PlotKind,
    #[structopt(long = "baud", default_value = "9600")]
    pub baud: u32,
    #[structopt(long = "timeout-ms", default_value = "2000")]
    pub timeout_ms: u64,
    /// Plot refresh period
    #[structopt(long = "interval-ms", default_value = "100")]
    pub interval_ms: u64,
}

impl ScanOpt {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            start: self.start,
            stop: self.stop,
            sample_size: self.samples,
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn monitor(&self) -> Monitor {
        Monitor {
            interval: Duration::from_millis(self.interval_ms),
            kind: self.graph,
            plot_path: self.plot.clone(),
            ..Monitor::default()
        }
    }

    pub fn export_columns(&self) -> ExportColumns {
        if self.full {
            ExportColumns::Full
        } else {
            ExportColumns::Basic
        }
    }

    /// Reports and exports whatever the sweep measured, then returns its outcome.
    pub fn finish(&self, result: &SweepResult, outcome: Result<()>) -> Result<()> {
        if outcome.is_err() {
            warn!("Sweep stopped after {} point(s)", result.len());
        }
        match result.max_power_point() {
            Some(point) => info!(
                "Maximum power {}W at {}V, {}A",
                Engineering(point.power.value),
                Engineering(point.pv_voltage.value),
                Engineering(point.current.value)
            ),
            None => warn!("No power measured"),
        }

        let saved = match &self.output {
            Some(output) => result.save_as_csv(output, self.export_columns()),
            None => Ok(()),
        };
        if let (Err(_), Err(e)) = (&outcome, &saved) {
            error!("Can't save the trace: {}", e);
        }
        outcome.and(saved)
    }
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// List available instruments
    #[structopt(name = "list")]
    List,
    /// Print the identification string of an instrument
    #[structopt(name = "identify")]
    Identify {
        resource: Resource,
        #[structopt(long = "baud", default_value = "9600")]
        baud: u32,
        #[structopt(long = "timeout-ms", default_value = "2000")]
        timeout_ms: u64,
    },
    /// Sweep the load and record the cell's characteristic
    #[structopt(name = "scan")]
    Scan(ScanOpt),
    /// Plot a previously exported trace
    #[structopt(name = "plot")]
    Plot {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
        #[structopt(long = "graph", default_value = "ui")]
        graph: PlotKind,
        #[structopt(long = "width", default_value = "800")]
        width: i32,
        #[structopt(long = "height", default_value = "600")]
        height: i32,
    },
}

#[derive(StructOpt, Debug)]
#[structopt(name = "pv-curve-tracer")]
pub struct CliOpt {
    /// More output per occurrence
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    pub verbose: u8,
    #[structopt(subcommand)]
    pub command: Command,
}

impl CliOpt {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl Opt for CliOpt {
    fn initialize_logging(&self) -> Result<()> {
        let level = self.log_level();
        if TermLogger::init(level, Config::default(), TerminalMode::Mixed).is_err() {
            // no terminal attached
            SimpleLogger::init(level, Config::default())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Circuit, SweepPoint};
    use crate::model::Measurement;

    fn parse(args: &[&str]) -> CliOpt {
        CliOpt::from_iter_safe(args).unwrap()
    }

    #[test]
    fn scan_defaults() {
        let opt = parse(&["pv-curve-tracer", "scan", "ASRL::SIMPV::INSTR"]);
        assert_eq!(opt.log_level(), LevelFilter::Info);
        match opt.command {
            Command::Scan(scan) => {
                assert_eq!(scan.resource, Resource::Simulated);
                assert_eq!(scan.sweep_config(), SweepConfig::default());
                assert_eq!(scan.serial_settings().baud_rate, 9600);
                assert_eq!(scan.monitor().interval, Duration::from_millis(100));
                assert_eq!(scan.export_columns(), ExportColumns::Basic);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn scan_with_options() {
        let opt = parse(&[
            "pv-curve-tracer",
            "-vv",
            "scan",
            "sim",
            "--start",
            "1.5",
            "--stop",
            "2.5",
            "-n",
            "10",
            "-o",
            "out.csv",
            "--full",
            "--graph",
            "pr",
        ]);
        assert_eq!(opt.log_level(), LevelFilter::Trace);
        match opt.command {
            Command::Scan(scan) => {
                let config = scan.sweep_config();
                assert_eq!(config.start, 1.5);
                assert_eq!(config.stop, 2.5);
                assert_eq!(config.sample_size, 10);
                assert_eq!(scan.output, Some(PathBuf::from("out.csv")));
                assert_eq!(scan.export_columns(), ExportColumns::Full);
                assert_eq!(scan.monitor().kind, PlotKind::PR);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn scan_opt(args: &[&str]) -> ScanOpt {
        match parse(args).command {
            Command::Scan(scan) => scan,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn partial_trace() -> SweepResult {
        let mut trace = SweepResult::new(1);
        for code in 0..3u16 {
            trace.push(SweepPoint::from_channels(
                code,
                Measurement::exact(0.7),
                Measurement::exact(f64::from(code) * 0.1),
                &Circuit::default(),
            ));
        }
        trace
    }

    #[test]
    fn failed_sweep_still_exports_measured_points() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("partial.csv");
        let scan = scan_opt(&[
            "pv-curve-tracer",
            "scan",
            "sim",
            "-o",
            output.to_str().unwrap(),
        ]);

        let outcome = scan.finish(&partial_trace(), Err(failure::err_msg("link lost")));
        assert_eq!(outcome.unwrap_err().to_string(), "link lost");

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn finished_sweep_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("trace.tsv");
        let scan = scan_opt(&[
            "pv-curve-tracer",
            "scan",
            "sim",
            "--full",
            "-o",
            output.to_str().unwrap(),
        ]);
        scan.finish(&partial_trace(), Ok(())).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("Code\t"));
    }

    #[test]
    fn identify_takes_serial_settings() {
        let opt = parse(&[
            "pv-curve-tracer",
            "identify",
            "COM3",
            "--baud",
            "115200",
            "--timeout-ms",
            "500",
        ]);
        match opt.command {
            Command::Identify {
                resource,
                baud,
                timeout_ms,
            } => {
                assert_eq!(resource, Resource::Serial("COM3".to_string()));
                assert_eq!(baud, 115_200);
                assert_eq!(timeout_ms, 500);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_graph() {
        assert!(CliOpt::from_iter_safe(&["pv-curve-tracer", "scan", "sim", "--graph", "xy"])
            .is_err());
    }
}
