mod config;
mod result;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;

use crate::backend::{ArduinoDevice, Resource, SerialSettings};
use crate::model::Measurement;
use crate::util::Engineering;
use crate::Result;

pub use self::config::{Circuit, ConfigError, SweepConfig};
pub use self::result::{SweepPoint, SweepResult};

/// Clears the running flag however the sweep ends.
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// PV cell experiment: sweeps the MOSFET gate and records the cell's curve.
///
/// Clones share the same result and running flag, so a clone can watch a
/// sweep driven from another thread.
#[derive(Clone, Default)]
pub struct SolarExperiment {
    circuit: Circuit,
    result: Arc<RwLock<SweepResult>>,
    scanning: Arc<AtomicBool>,
}

impl SolarExperiment {
    pub fn new(circuit: Circuit) -> Self {
        SolarExperiment {
            circuit,
            ..Default::default()
        }
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Read access to the live result; keep the guard short-lived while scanning.
    pub fn result(&self) -> RwLockReadGuard<'_, SweepResult> {
        self.result.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SweepResult {
        self.result().clone()
    }

    fn result_mut(&self) -> RwLockWriteGuard<'_, SweepResult> {
        self.result.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self) -> Result<ScanGuard> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(failure::err_msg("A scan is already running"));
        }
        Ok(ScanGuard(self.scanning.clone()))
    }

    fn prepare(
        &self,
        resource: &Resource,
        settings: &SerialSettings,
        config: &SweepConfig,
    ) -> Result<(ScanGuard, ArduinoDevice)> {
        config.validate()?;
        let guard = self.claim()?;
        let device = ArduinoDevice::open(resource, settings)?;
        self.result_mut().clear(config.sample_size);
        Ok((guard, device))
    }

    /// Runs a whole sweep on the calling thread.
    pub fn scan(
        &self,
        resource: &Resource,
        settings: &SerialSettings,
        config: &SweepConfig,
    ) -> Result<()> {
        let (_guard, mut device) = self.prepare(resource, settings, config)?;
        self.sweep(&mut device, config)
    }

    /// Opens the device and starts the sweep on a worker thread.
    ///
    /// Invalid requests and devices that fail to open are reported here;
    /// failures during the sweep come out of the returned handle.
    pub fn start_scan(
        &self,
        resource: &Resource,
        settings: &SerialSettings,
        config: &SweepConfig,
    ) -> Result<JoinHandle<Result<()>>> {
        let (guard, device) = self.prepare(resource, settings, config)?;
        self.spawn(guard, device, config.clone())
    }

    /// Starts a sweep on an already opened device.
    pub fn start_scan_with(
        &self,
        device: ArduinoDevice,
        config: &SweepConfig,
    ) -> Result<JoinHandle<Result<()>>> {
        config.validate()?;
        let guard = self.claim()?;
        self.result_mut().clear(config.sample_size);
        self.spawn(guard, device, config.clone())
    }

    fn spawn(
        &self,
        guard: ScanGuard,
        mut device: ArduinoDevice,
        config: SweepConfig,
    ) -> Result<JoinHandle<Result<()>>> {
        let experiment = self.clone();
        let handle = std::thread::Builder::new()
            .name("sweep".to_string())
            .spawn(move || {
                let _guard = guard;
                let res = experiment.sweep(&mut device, &config);
                if let Err(e) = &res {
                    error!("Sweep aborted: {}", e);
                }
                res
            })?;
        Ok(handle)
    }

    fn sweep(&self, device: &mut ArduinoDevice, config: &SweepConfig) -> Result<()> {
        info_time!("sweep");
        let circuit = &self.circuit;
        info!(
            "Sweeping {:.3}V..{:.3}V in {} step(s), {} sample(s) each",
            config.start,
            config.stop,
            config.steps(),
            config.sample_size
        );

        let mut pv = Vec::with_capacity(config.sample_size);
        let mut shunt = Vec::with_capacity(config.sample_size);

        for code in config.codes() {
            device.set_output_value(code)?;
            pv.clear();
            shunt.clear();
            for _ in 0..config.sample_size {
                pv.push(device.input_voltage(circuit.pv_channel)?);
                shunt.push(device.input_voltage(circuit.shunt_channel)?);
            }

            let point = SweepPoint::from_channels(
                code,
                Measurement::from_samples(&pv).ok_or_else(|| failure::err_msg("No samples"))?,
                Measurement::from_samples(&shunt).ok_or_else(|| failure::err_msg("No samples"))?,
                circuit,
            );
            debug!(
                "code {}: U = {}V, I = {}A, P = {}W",
                code, point.pv_voltage, point.current, point.power
            );
            self.result_mut().push(point);
        }

        device.close()?;

        let result = self.result();
        match result.p_max() {
            Some(p_max) => info!(
                "Sweep done: {} point(s), max power {}W",
                result.len(),
                Engineering(p_max)
            ),
            None => info!("Sweep done: {} point(s)", result.len()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PvCellParams, SimulatedPvCell, Transport};
    use approx::assert_relative_eq;

    fn simulated(seed: u64) -> ArduinoDevice {
        ArduinoDevice::from_transport(Box::new(SimulatedPvCell::with_seed(
            PvCellParams::default(),
            seed,
        )))
    }

    /// Serves a fixed number of queries, then stops answering.
    struct Failing {
        inner: SimulatedPvCell,
        budget: usize,
    }

    impl Transport for Failing {
        fn query(&mut self, command: &str) -> Result<String> {
            if self.budget == 0 {
                return Err(failure::err_msg("link lost"));
            }
            self.budget -= 1;
            self.inner.query(command)
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
    }

    fn sweep_config(start: f64, stop: f64, sample_size: usize) -> SweepConfig {
        SweepConfig {
            start,
            stop,
            sample_size,
        }
    }

    #[test]
    fn background_sweep_fills_result() {
        let experiment = SolarExperiment::default();
        let config = sweep_config(0.0, 3.3, 3);
        let handle = experiment
            .start_scan_with(simulated(1), &config)
            .unwrap();
        handle.join().unwrap().unwrap();

        assert!(!experiment.is_scanning());
        let result = experiment.snapshot();
        assert_eq!(result.len(), config.steps());
        assert_eq!(result.sample_size(), 3);
        assert_eq!(result.codes(), config.codes().collect::<Vec<_>>());
        assert!(result.p_max().unwrap() > 0.0);
    }

    #[test]
    fn synchronous_scan_of_simulator_resource() {
        let experiment = SolarExperiment::default();
        experiment
            .scan(
                &Resource::Simulated,
                &SerialSettings::default(),
                &sweep_config(1.0, 1.5, 2),
            )
            .unwrap();
        assert!(!experiment.is_scanning());
        assert_eq!(experiment.result().len(), sweep_config(1.0, 1.5, 2).steps());
    }

    #[test]
    fn open_gate_reads_open_circuit_voltage() {
        let experiment = SolarExperiment::default();
        experiment
            .start_scan_with(simulated(2), &sweep_config(0.0, 0.0, 25))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        let result = experiment.snapshot();
        let voc = PvCellParams::default().open_circuit_voltage();
        assert_relative_eq!(result.pv_voltages()[0], voc, max_relative = 0.02);
        assert_relative_eq!(
            result.pv_channels()[0] * experiment.circuit().divider_ratio,
            result.pv_voltages()[0],
            max_relative = 1e-12
        );
        assert!(result.pv_voltages_err()[0] > 0.0);
    }

    #[test]
    fn single_sample_has_no_error() {
        let experiment = SolarExperiment::default();
        experiment
            .start_scan_with(simulated(3), &sweep_config(2.0, 2.1, 1))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        assert!(experiment
            .snapshot()
            .currents_err()
            .iter()
            .all(|&e| e == 0.0));
    }

    #[test]
    fn refuses_concurrent_sweeps() {
        let experiment = SolarExperiment::default();
        let running = experiment.claim().unwrap();
        assert!(experiment.is_scanning());
        assert!(experiment
            .start_scan_with(simulated(5), &sweep_config(0.0, 1.0, 1))
            .is_err());
        drop(running);
        assert!(!experiment.is_scanning());
    }

    #[test]
    fn device_failure_clears_running_flag() {
        let experiment = SolarExperiment::default();
        let device = ArduinoDevice::from_transport(Box::new(Failing {
            inner: SimulatedPvCell::with_seed(PvCellParams::default(), 6),
            budget: 40,
        }));
        let handle = experiment
            .start_scan_with(device, &sweep_config(0.0, 3.3, 2))
            .unwrap();
        assert!(handle.join().unwrap().is_err());
        assert!(!experiment.is_scanning());
        // one setter plus two channels times two samples per step
        assert_eq!(experiment.result().len(), 8);
    }

    #[test]
    fn invalid_config_does_not_start() {
        let experiment = SolarExperiment::default();
        assert!(experiment
            .start_scan_with(simulated(7), &sweep_config(2.0, 1.0, 1))
            .is_err());
        assert!(!experiment.is_scanning());
    }

    #[test]
    fn restart_clears_previous_result() {
        let experiment = SolarExperiment::default();
        experiment
            .start_scan_with(simulated(8), &sweep_config(0.0, 1.0, 1))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        let handle = experiment
            .start_scan_with(simulated(9), &sweep_config(3.0, 3.3, 1))
            .unwrap();
        handle.join().unwrap().unwrap();
        assert_eq!(
            experiment.snapshot().codes().first().cloned(),
            Some(crate::backend::analog_to_digital(3.0))
        );
    }
}
