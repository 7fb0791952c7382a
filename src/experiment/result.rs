use crate::experiment::Circuit;
use crate::model::Measurement;

/// One step of a sweep with all derived quantities.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SweepPoint {
    pub code: u16,
    /// Mean reading of the divided PV voltage input.
    pub pv_channel: Measurement,
    /// Mean reading across the current shunt.
    pub shunt_channel: Measurement,
    pub pv_voltage: Measurement,
    pub current: Measurement,
    pub fet_voltage: Measurement,
    pub power: Measurement,
    pub resistance: Measurement,
}

impl SweepPoint {
    /// Derives the PV cell quantities from the averaged channel voltages.
    pub fn from_channels(
        code: u16,
        pv_channel: Measurement,
        shunt_channel: Measurement,
        circuit: &Circuit,
    ) -> Self {
        let pv_voltage = pv_channel * circuit.divider_ratio;
        let current = shunt_channel / circuit.shunt_ohms;
        let fet_voltage = pv_voltage - shunt_channel;
        SweepPoint {
            code,
            pv_channel,
            shunt_channel,
            pv_voltage,
            current,
            fet_voltage,
            power: pv_voltage * current,
            resistance: fet_voltage / current,
        }
    }

    /// Point known only by its voltage and current, e.g. loaded from a file.
    pub fn from_voltage_current(code: u16, pv_voltage: Measurement, current: Measurement) -> Self {
        let unknown = Measurement::new(std::f64::NAN, std::f64::NAN);
        SweepPoint {
            code,
            pv_channel: unknown,
            shunt_channel: unknown,
            pv_voltage,
            current,
            fet_voltage: unknown,
            power: pv_voltage * current,
            resistance: unknown,
        }
    }
}

/// Accumulated sweep, appended one point at a time.
#[derive(Clone, Debug, Default)]
pub struct SweepResult {
    points: Vec<SweepPoint>,
    p_max: Option<f64>,
    sample_size: usize,
}

impl SweepResult {
    pub fn new(sample_size: usize) -> Self {
        SweepResult {
            points: Vec::new(),
            p_max: None,
            sample_size,
        }
    }

    pub fn clear(&mut self, sample_size: usize) {
        self.points.clear();
        self.p_max = None;
        self.sample_size = sample_size;
    }

    pub fn push(&mut self, point: SweepPoint) {
        let p = point.power.value;
        if p.is_finite() && self.p_max.map_or(true, |max| p > max) {
            self.p_max = Some(p);
        }
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SweepPoint] {
        &self.points
    }

    /// Readings averaged per step; errors are meaningful only above one.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn p_max(&self) -> Option<f64> {
        self.p_max
    }

    pub fn max_power_point(&self) -> Option<&SweepPoint> {
        let p_max = self.p_max?;
        self.points.iter().find(|p| p.power.value == p_max)
    }

    fn column<F: Fn(&SweepPoint) -> f64>(&self, f: F) -> Vec<f64> {
        self.points.iter().map(f).collect()
    }

    pub fn codes(&self) -> Vec<u16> {
        self.points.iter().map(|p| p.code).collect()
    }

    pub fn pv_channels(&self) -> Vec<f64> {
        self.column(|p| p.pv_channel.value)
    }

    pub fn pv_channels_err(&self) -> Vec<f64> {
        self.column(|p| p.pv_channel.error)
    }

    pub fn shunt_channels(&self) -> Vec<f64> {
        self.column(|p| p.shunt_channel.value)
    }

    pub fn shunt_channels_err(&self) -> Vec<f64> {
        self.column(|p| p.shunt_channel.error)
    }

    pub fn pv_voltages(&self) -> Vec<f64> {
        self.column(|p| p.pv_voltage.value)
    }

    pub fn pv_voltages_err(&self) -> Vec<f64> {
        self.column(|p| p.pv_voltage.error)
    }

    pub fn currents(&self) -> Vec<f64> {
        self.column(|p| p.current.value)
    }

    pub fn currents_err(&self) -> Vec<f64> {
        self.column(|p| p.current.error)
    }

    pub fn fet_voltages(&self) -> Vec<f64> {
        self.column(|p| p.fet_voltage.value)
    }

    pub fn fet_voltages_err(&self) -> Vec<f64> {
        self.column(|p| p.fet_voltage.error)
    }

    pub fn powers(&self) -> Vec<f64> {
        self.column(|p| p.power.value)
    }

    pub fn powers_err(&self) -> Vec<f64> {
        self.column(|p| p.power.error)
    }

    pub fn resistances(&self) -> Vec<f64> {
        self.column(|p| p.resistance.value)
    }

    pub fn resistances_err(&self) -> Vec<f64> {
        self.column(|p| p.resistance.error)
    }
}
