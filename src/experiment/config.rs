use std::ops::RangeInclusive;

use failure::Fail;

use crate::backend::{analog_to_digital, FULL_SCALE_VOLTS};
use crate::Result;

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "{} voltage {}V is outside 0..{}V", name, value, max)]
    VoltageOutOfRange {
        name: &'static str,
        value: f64,
        max: f64,
    },
    #[fail(display = "start voltage {}V is above stop voltage {}V", start, stop)]
    ReversedRange { start: f64, stop: f64 },
    #[fail(display = "sample size must be at least 1")]
    NoSamples,
}

/// Requested sweep: analog output range and readings per step.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepConfig {
    pub start: f64,
    pub stop: f64,
    pub sample_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            start: 0.0,
            stop: FULL_SCALE_VOLTS,
            sample_size: 1,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        for &(name, value) in &[("start", self.start), ("stop", self.stop)] {
            if !(0.0..=FULL_SCALE_VOLTS).contains(&value) {
                return Err(ConfigError::VoltageOutOfRange {
                    name,
                    value,
                    max: FULL_SCALE_VOLTS,
                }
                .into());
            }
        }
        if self.start > self.stop {
            return Err(ConfigError::ReversedRange {
                start: self.start,
                stop: self.stop,
            }
            .into());
        }
        if self.sample_size == 0 {
            return Err(ConfigError::NoSamples.into());
        }
        Ok(())
    }

    /// Output codes visited by the sweep, ascending, both ends included.
    pub fn codes(&self) -> RangeInclusive<u16> {
        analog_to_digital(self.start)..=analog_to_digital(self.stop)
    }

    pub fn steps(&self) -> usize {
        let codes = self.codes();
        (*codes.end() as usize + 1).saturating_sub(*codes.start() as usize)
    }
}

/// Wiring of the experiment board.
#[derive(Clone, Debug, PartialEq)]
pub struct Circuit {
    /// Input measuring the PV voltage through the divider.
    pub pv_channel: u8,
    /// Input measuring the voltage across the current shunt.
    pub shunt_channel: u8,
    pub divider_ratio: f64,
    pub shunt_ohms: f64,
}

impl Default for Circuit {
    fn default() -> Self {
        Circuit {
            pv_channel: 1,
            shunt_channel: 2,
            divider_ratio: 3.0,
            shunt_ohms: 4.7,
        }
    }
}
