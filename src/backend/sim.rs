use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{analog_to_digital, digital_to_analog, DeviceError, Transport, MAX_CODE};
use crate::Result;

const IDENTIFICATION: &str = "Arduino VISA firmware v1.0.0 (simulated PV cell)";
const BISECTION_STEPS: usize = 60;

/// Electrical model behind the simulated instrument: a single-diode PV cell
/// loaded by a MOSFET in series with the current shunt.
#[derive(Clone, Debug)]
pub struct PvCellParams {
    pub short_circuit_current: f64,
    pub saturation_current: f64,
    pub thermal_voltage: f64,
    pub shunt_ohms: f64,
    pub divider_ratio: f64,
    pub fet_threshold: f64,
    pub fet_gain: f64,
    pub fet_off_conductance: f64,
    pub fet_on_resistance: f64,
    pub noise_lsb: i32,
}

impl Default for PvCellParams {
    fn default() -> Self {
        PvCellParams {
            short_circuit_current: 0.1,
            saturation_current: 1e-9,
            thermal_voltage: 0.12,
            shunt_ohms: 4.7,
            divider_ratio: 3.0,
            fet_threshold: 1.0,
            fet_gain: 2.0,
            fet_off_conductance: 1e-6,
            fet_on_resistance: 0.05,
            noise_lsb: 2,
        }
    }
}

impl PvCellParams {
    pub fn open_circuit_voltage(&self) -> f64 {
        self.thermal_voltage * (self.short_circuit_current / self.saturation_current).ln_1p()
    }

    fn cell_current(&self, v: f64) -> f64 {
        self.short_circuit_current - self.saturation_current * (v / self.thermal_voltage).exp_m1()
    }

    pub fn fet_resistance(&self, gate: f64) -> f64 {
        let overdrive = (gate - self.fet_threshold).max(0.0);
        self.fet_on_resistance
            + 1.0 / (self.fet_off_conductance + self.fet_gain * overdrive * overdrive)
    }

    /// Operating point `(voltage, current)` of the cell for the given gate voltage.
    pub fn operating_point(&self, gate: f64) -> (f64, f64) {
        let load = self.fet_resistance(gate) + self.shunt_ohms;
        let mut lo = 0.0;
        let mut hi = self.open_circuit_voltage();
        for _ in 0..BISECTION_STEPS {
            let mid = (lo + hi) / 2.0;
            if self.cell_current(mid) > mid / load {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let v = (lo + hi) / 2.0;
        (v, v / load)
    }
}

/// In-process stand-in for the Arduino wired to a PV cell.
pub struct SimulatedPvCell {
    params: PvCellParams,
    output: u16,
    rng: StdRng,
    open: bool,
}

impl SimulatedPvCell {
    pub fn new() -> Self {
        Self::with_rng(PvCellParams::default(), StdRng::from_entropy())
    }

    pub fn with_seed(params: PvCellParams, seed: u64) -> Self {
        Self::with_rng(params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(params: PvCellParams, rng: StdRng) -> Self {
        SimulatedPvCell {
            params,
            output: 0,
            rng,
            open: true,
        }
    }

    fn measure(&mut self, channel: u8) -> u16 {
        let (v, i) = self
            .params
            .operating_point(digital_to_analog(self.output));
        let analog = match channel {
            0 => digital_to_analog(self.output),
            1 => v / self.params.divider_ratio,
            2 => i * self.params.shunt_ohms,
            _ => 0.0,
        };
        let noise = if self.params.noise_lsb > 0 {
            self.rng
                .gen_range(-self.params.noise_lsb..=self.params.noise_lsb)
        } else {
            0
        };
        let code = i32::from(analog_to_digital(analog)) + noise;
        code.max(0).min(i32::from(MAX_CODE)) as u16
    }

    fn respond(&mut self, command: &str) -> String {
        if command == "*IDN?" {
            IDENTIFICATION.to_string()
        } else if command == "OUT:CH0?" {
            self.output.to_string()
        } else if let Some(value) = command.strip_prefix("OUT:CH0 ") {
            match value.trim().parse::<u16>() {
                Ok(code) if code <= MAX_CODE => {
                    self.output = code;
                    code.to_string()
                }
                _ => format!("ERROR: INVALID VALUE {}", value.trim()),
            }
        } else if let Some(channel) = command
            .strip_prefix("MEAS:CH")
            .and_then(|rest| rest.strip_suffix('?'))
            .and_then(|ch| ch.parse::<u8>().ok())
        {
            self.measure(channel).to_string()
        } else {
            format!("ERROR: UNKNOWN COMMAND {}", command)
        }
    }
}

impl Default for SimulatedPvCell {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedPvCell {
    fn query(&mut self, command: &str) -> Result<String> {
        if !self.open {
            return Err(DeviceError::Closed.into());
        }
        Ok(self.respond(command.trim()))
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
