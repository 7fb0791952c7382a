#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate measure_time;
#[macro_use]
extern crate serde_derive;

pub mod backend;
pub mod experiment;
pub mod model;
pub mod options;
pub mod plot;
pub mod trace;
pub mod util;

pub type Result<T> = std::result::Result<T, failure::Error>;

pub use crate::backend::{analog_to_digital, digital_to_analog, ArduinoDevice, DeviceError};
pub use crate::experiment::{Circuit, SolarExperiment, SweepConfig, SweepPoint, SweepResult};
pub use crate::model::Measurement;
pub use crate::plot::{Monitor, PlotKind};
pub use crate::trace::file::{ExportColumns, ExportableTrace, ImportableTrace};
