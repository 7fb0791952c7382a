use std::str::FromStr;

use crate::backend::{DeviceError, Resource, SerialSettings, Transport};
use crate::Result;

pub const MAX_CODE: u16 = 1023;
pub const FULL_SCALE_VOLTS: f64 = 3.3;

/// Converts an analog voltage to the 10-bit code, rounding half up and
/// saturating at both ends of the range.
pub fn analog_to_digital(voltage: f64) -> u16 {
    let code = (voltage / FULL_SCALE_VOLTS * f64::from(MAX_CODE) + 0.5).floor();
    if code.is_nan() || code <= 0.0 {
        0
    } else if code >= f64::from(MAX_CODE) {
        MAX_CODE
    } else {
        code as u16
    }
}

pub fn digital_to_analog(code: u16) -> f64 {
    f64::from(code) / f64::from(MAX_CODE) * FULL_SCALE_VOLTS
}

/// Arduino running the VISA-like firmware: one 10-bit output on channel 0
/// and 10-bit analog inputs on the remaining channels.
pub struct ArduinoDevice {
    transport: Option<Box<dyn Transport>>,
}

impl ArduinoDevice {
    pub fn open(resource: &Resource, settings: &SerialSettings) -> Result<Self> {
        debug!("Opening {}", resource);
        Ok(Self::from_transport(resource.open(settings)?))
    }

    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        ArduinoDevice {
            transport: Some(transport),
        }
    }

    fn query(&mut self, command: &str) -> Result<String> {
        let transport = self.transport.as_mut().ok_or(DeviceError::Closed)?;
        let response = transport.query(command)?;
        trace!("{} -> {}", command, response);
        if response.starts_with("ERROR") {
            let message = response.trim_start_matches("ERROR").trim_start_matches(':');
            return Err(DeviceError::Rejected {
                command: command.to_string(),
                message: message.trim().to_string(),
            }
            .into());
        }
        Ok(response)
    }

    fn query_number<T: FromStr>(&mut self, command: &str) -> Result<T> {
        let response = self.query(command)?;
        let parsed = response.trim().parse::<T>();
        parsed.map_err(|_| {
            DeviceError::InvalidResponse {
                command: command.to_string(),
                response,
            }
            .into()
        })
    }

    pub fn identify(&mut self) -> Result<String> {
        Ok(self.query("*IDN?")?.trim().to_string())
    }

    pub fn set_output_value(&mut self, code: u16) -> Result<()> {
        if code > MAX_CODE {
            return Err(DeviceError::CodeOutOfRange(code).into());
        }
        self.query(&format!("OUT:CH0 {}", code))?;
        Ok(())
    }

    pub fn output_value(&mut self) -> Result<u16> {
        self.query_number("OUT:CH0?")
    }

    pub fn input_value(&mut self, channel: u8) -> Result<u16> {
        self.query_number(&format!("MEAS:CH{}?", channel))
    }

    pub fn input_voltage(&mut self, channel: u8) -> Result<f64> {
        Ok(digital_to_analog(self.input_value(channel)?))
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close()?;
            debug!("Device closed");
        }
        Ok(())
    }
}

impl Drop for ArduinoDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing the device: {}", e);
        }
    }
}
