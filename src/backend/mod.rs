mod arduino;
#[cfg(feature = "serial")]
mod serial;
mod sim;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use failure::Fail;

use crate::Result;

pub use self::arduino::{analog_to_digital, digital_to_analog, ArduinoDevice};
pub use self::arduino::{FULL_SCALE_VOLTS, MAX_CODE};
#[cfg(feature = "serial")]
pub use self::serial::SerialTransport;
pub use self::sim::{PvCellParams, SimulatedPvCell};

pub const SIMULATED_RESOURCE: &str = "ASRL::SIMPV::INSTR";

/// A line-oriented query/response channel to an instrument.
///
/// Every command is answered with exactly one reply line, setters included.
pub trait Transport: Send {
    fn query(&mut self, command: &str) -> Result<String>;
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Fail)]
pub enum DeviceError {
    #[fail(display = "no reply to {:?} within {:?}", command, timeout)]
    Timeout { command: String, timeout: Duration },
    #[fail(display = "unexpected reply to {:?}: {:?}", command, response)]
    InvalidResponse { command: String, response: String },
    #[fail(display = "instrument rejected {:?}: {}", command, message)]
    Rejected { command: String, message: String },
    #[fail(display = "output code {} is outside 0..=1023", _0)]
    CodeOutOfRange(u16),
    #[fail(display = "device is closed")]
    Closed,
}

#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            baud_rate: 9600,
            timeout: Duration::from_millis(2000),
        }
    }
}

/// VISA-style resource name of an instrument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Simulated,
    Serial(String),
}

impl Resource {
    pub fn open(&self, settings: &SerialSettings) -> Result<Box<dyn Transport>> {
        match self {
            Resource::Simulated => Ok(Box::new(SimulatedPvCell::new())),
            Resource::Serial(port) => open_serial(port, settings),
        }
    }
}

#[cfg(feature = "serial")]
fn open_serial(port: &str, settings: &SerialSettings) -> Result<Box<dyn Transport>> {
    Ok(Box::new(SerialTransport::open(port, settings)?))
}

#[cfg(not(feature = "serial"))]
fn open_serial(port: &str, _: &SerialSettings) -> Result<Box<dyn Transport>> {
    Err(failure::err_msg(format!(
        "Can't open {}: serial support is not compiled in",
        port
    )))
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Simulated => f.write_str(SIMULATED_RESOURCE),
            Resource::Serial(port) => write!(f, "ASRL{}::INSTR", port),
        }
    }
}

impl FromStr for Resource {
    type Err = failure::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(failure::err_msg("Empty resource name"));
        }
        if s.eq_ignore_ascii_case(SIMULATED_RESOURCE) || s.eq_ignore_ascii_case("sim") {
            return Ok(Resource::Simulated);
        }

        let upper = s.to_ascii_uppercase();
        if upper.starts_with("ASRL") && upper.ends_with("::INSTR") {
            let port = &s[4..s.len() - "::INSTR".len()];
            if port.is_empty() || port.contains("::") {
                return Err(failure::err_msg(format!("Unknown resource {}", s)));
            }
            return Ok(Resource::Serial(port.to_string()));
        }

        Ok(Resource::Serial(s.to_string()))
    }
}

pub fn list_resources() -> Result<Vec<Resource>> {
    let mut resources = vec![Resource::Simulated];
    resources.extend(serial_ports()?.into_iter().map(Resource::Serial));
    Ok(resources)
}

#[cfg(feature = "serial")]
fn serial_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

#[cfg(not(feature = "serial"))]
fn serial_ports() -> Result<Vec<String>> {
    Ok(Vec::new())
}
