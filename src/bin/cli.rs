#[macro_use]
extern crate log;

use std::time::Duration;

use failure::Error;
use pv_curve_tracer::backend::{list_resources, SerialSettings};
use pv_curve_tracer::options::{CliOpt, Command, Opt, ScanOpt};
use pv_curve_tracer::plot::render_png;
use pv_curve_tracer::{ArduinoDevice, ImportableTrace, SolarExperiment, SweepResult};
use structopt::StructOpt;

fn scan(opt: &ScanOpt) -> Result<(), Error> {
    let experiment = SolarExperiment::default();
    let handle = experiment
        .start_scan(&opt.resource, &opt.serial_settings(), &opt.sweep_config())
        .map_err(|e| {
            error!("The selected device is not functional: {}", e);
            e
        })?;

    let outcome = opt.monitor().watch(&experiment, handle);
    opt.finish(&experiment.snapshot(), outcome)
}

fn main() -> Result<(), Error> {
    let opt = CliOpt::from_args();
    opt.initialize_logging()?;

    match &opt.command {
        Command::List => {
            for resource in list_resources()? {
                println!("{}", resource);
            }
        }
        Command::Identify {
            resource,
            baud,
            timeout_ms,
        } => {
            let settings = SerialSettings {
                baud_rate: *baud,
                timeout: Duration::from_millis(*timeout_ms),
            };
            let mut device = ArduinoDevice::open(resource, &settings)?;
            println!("{}", device.identify()?);
            device.close()?;
        }
        Command::Scan(scan_opt) => scan(scan_opt)?,
        Command::Plot {
            input,
            output,
            graph,
            width,
            height,
        } => {
            let trace = SweepResult::from_csv(input)?;
            info!("Loaded {} point(s) from {}", trace.len(), input.display());
            render_png(&trace, *graph, output, *width, *height)?;
        }
    }
    Ok(())
}
