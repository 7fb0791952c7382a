use std::convert::TryFrom;
use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;

use itertools::Itertools;
use serde::de::DeserializeOwned;

use crate::experiment::{SweepPoint, SweepResult};
use crate::model::Measurement;
use crate::Result;

const CODE: &str = "Code";
const VOLTAGE: &str = "Voltage (V)";
const VOLTAGE_ERR: &str = "Voltage error (V)";
const CURRENT: &str = "Current (A)";
const CURRENT_ERR: &str = "Current error (A)";
const FET_VOLTAGE: &str = "FET voltage (V)";
const FET_VOLTAGE_ERR: &str = "FET voltage error (V)";
const POWER: &str = "Power (W)";
const POWER_ERR: &str = "Power error (W)";
const RESISTANCE: &str = "Resistance (Ohm)";
const RESISTANCE_ERR: &str = "Resistance error (Ohm)";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportColumns {
    /// PV voltage and current.
    Basic,
    /// Every derived quantity plus the output code.
    Full,
}

type Column = (&'static str, fn(&SweepPoint) -> f64);

fn columns(kind: ExportColumns, with_errors: bool) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    if kind == ExportColumns::Full {
        columns.push((CODE, |p| f64::from(p.code)));
    }
    columns.push((VOLTAGE, |p| p.pv_voltage.value));
    columns.push((CURRENT, |p| p.current.value));
    if with_errors {
        columns.push((VOLTAGE_ERR, |p| p.pv_voltage.error));
        columns.push((CURRENT_ERR, |p| p.current.error));
    }
    if kind == ExportColumns::Full {
        columns.push((FET_VOLTAGE, |p| p.fet_voltage.value));
        columns.push((POWER, |p| p.power.value));
        columns.push((RESISTANCE, |p| p.resistance.value));
        if with_errors {
            columns.push((FET_VOLTAGE_ERR, |p| p.fet_voltage.error));
            columns.push((POWER_ERR, |p| p.power.error));
            columns.push((RESISTANCE_ERR, |p| p.resistance.error));
        }
    }
    columns
}

#[derive(Deserialize)]
struct Record {
    #[serde(rename = "Code", default)]
    code: Option<u16>,
    #[serde(rename = "Voltage (V)")]
    voltage: f64,
    #[serde(rename = "Current (A)")]
    current: f64,
    #[serde(rename = "Voltage error (V)", default)]
    voltage_err: Option<f64>,
    #[serde(rename = "Current error (A)", default)]
    current_err: Option<f64>,
    #[serde(rename = "FET voltage (V)", default)]
    fet_voltage: Option<f64>,
    #[serde(rename = "FET voltage error (V)", default)]
    fet_voltage_err: Option<f64>,
    #[serde(rename = "Power (W)", default)]
    power: Option<f64>,
    #[serde(rename = "Power error (W)", default)]
    power_err: Option<f64>,
    #[serde(rename = "Resistance (Ohm)", default)]
    resistance: Option<f64>,
    #[serde(rename = "Resistance error (Ohm)", default)]
    resistance_err: Option<f64>,
}

impl Record {
    fn has_errors(&self) -> bool {
        self.voltage_err.is_some() || self.current_err.is_some()
    }

    fn into_point(self, index: usize) -> Result<SweepPoint> {
        let code = match self.code {
            Some(code) => code,
            None => u16::try_from(index)
                .map_err(|_| failure::err_msg(format!("Too many rows, {} has no code", index)))?,
        };
        let pv_voltage = Measurement::new(self.voltage, self.voltage_err.unwrap_or(0.0));
        let current = Measurement::new(self.current, self.current_err.unwrap_or(0.0));
        let mut point = SweepPoint::from_voltage_current(code, pv_voltage, current);
        if let Some(v) = self.fet_voltage {
            point.fet_voltage = Measurement::new(v, self.fet_voltage_err.unwrap_or(0.0));
        }
        if let Some(p) = self.power {
            point.power = Measurement::new(p, self.power_err.unwrap_or(0.0));
        }
        if let Some(r) = self.resistance {
            point.resistance = Measurement::new(r, self.resistance_err.unwrap_or(0.0));
        }
        Ok(point)
    }
}

pub trait ExportableTrace {
    fn save_as_csv(&self, path: &Path, columns: ExportColumns) -> Result<()>;
}

pub trait ImportableTrace: Sized {
    fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self>;
}

trait CsvWriter {
    fn write_record(&mut self, record: &[&str]) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

impl<W: std::io::Write> CsvWriter for csv::Writer<libflate::gzip::Encoder<W>> {
    fn write_record(&mut self, record: &[&str]) -> Result<()> {
        csv::Writer::write_record(self, record)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.into_inner()
            .map_err(|_| failure::err_msg("Error writing the file"))?
            .finish()
            .into_result()?;
        Ok(())
    }
}

impl CsvWriter for csv::Writer<File> {
    fn write_record(&mut self, record: &[&str]) -> Result<()> {
        csv::Writer::write_record(self, record)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.into_inner()
            .map_err(|_| failure::err_msg("Error writing the file"))?
            .sync_all()?;
        Ok(())
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().and_then(OsStr::to_str) == Some("gz")
}

/// Comma for `.csv` (also under `.gz`), tab for anything else.
fn delimiter(path: &Path) -> u8 {
    let inner = if is_gz(path) {
        path.file_stem().map(Path::new)
    } else {
        Some(path)
    };
    match inner.and_then(Path::extension).and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

fn csv_writer_from_path(path: &Path) -> Result<Box<dyn CsvWriter>> {
    let mut out_builder = csv::WriterBuilder::new();
    out_builder.delimiter(delimiter(path));
    Ok(if is_gz(&path) {
        Box::new(out_builder.from_writer(libflate::gzip::Encoder::new(File::create(path)?)?))
    } else {
        Box::new(out_builder.from_path(path)?)
    })
}

fn csv_reader_from_path<D: DeserializeOwned + 'static>(
    path: &Path,
) -> Result<Box<dyn Iterator<Item = csv::Result<D>>>> {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true);
    builder.delimiter(delimiter(path));
    Ok(if is_gz(&path) {
        Box::new(
            builder
                .from_reader(libflate::gzip::Decoder::new(File::open(path)?)?)
                .into_deserialize(),
        )
    } else {
        Box::new(builder.from_path(path)?.into_deserialize())
    })
}

/// Averaged sweeps carry errors; so do imported traces whose sample size is
/// unknown (0) when any of their errors is non-zero.
fn with_errors(trace: &SweepResult) -> bool {
    match trace.sample_size() {
        0 => trace
            .points()
            .iter()
            .any(|p| p.pv_voltage.error != 0.0 || p.current.error != 0.0),
        n => n > 1,
    }
}

impl ExportableTrace for SweepResult {
    fn save_as_csv(&self, path: &Path, kind: ExportColumns) -> Result<()> {
        debug_time!("save_as_csv");
        let columns = columns(kind, with_errors(self));
        let mut out = csv_writer_from_path(path)?;

        let header = columns.iter().map(|(name, _)| *name).collect_vec();
        out.write_record(&header)?;
        for point in self.points() {
            let values = columns
                .iter()
                .map(|(_, value)| value(point).to_string())
                .collect_vec();
            let rec = values.iter().map(String::as_str).collect_vec();
            out.write_record(&rec)?;
        }
        out.close()?;
        info!("Saved {} point(s) to {}", self.len(), path.display());
        Ok(())
    }
}

impl ImportableTrace for SweepResult {
    /// The sample size of an imported trace is 0 (unknown) when the file
    /// carries error columns and 1 otherwise.
    fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut points = Vec::new();
        let mut has_errors = false;

        for (ix, result) in csv_reader_from_path::<Record>(path.as_ref())?.enumerate() {
            let record = result?;
            has_errors |= record.has_errors();
            points.push(record.into_point(ix)?);
        }

        let mut trace = SweepResult::new(if has_errors { 0 } else { 1 });
        for point in points {
            trace.push(point);
        }
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::Circuit;
    use approx::assert_abs_diff_eq;
    use std::fs;

    fn sample_trace(sample_size: usize) -> SweepResult {
        let mut trace = SweepResult::new(sample_size);
        let err = if sample_size > 1 { 0.002 } else { 0.0 };
        for code in 0..5u16 {
            trace.push(SweepPoint::from_channels(
                code * 100,
                Measurement::new(0.7 - f64::from(code) * 0.1, err),
                Measurement::new(f64::from(code) * 0.1, err),
                &Circuit::default(),
            ));
        }
        trace
    }

    #[test]
    fn single_sample_export_has_no_error_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        sample_trace(1)
            .save_as_csv(&path, ExportColumns::Basic)
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Voltage (V),Current (A)"));
        assert_eq!(lines.count(), 5);
    }

    #[test]
    fn averaged_export_has_error_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.tsv");
        sample_trace(5)
            .save_as_csv(&path, ExportColumns::Basic)
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("Voltage (V)\tCurrent (A)\tVoltage error (V)\tCurrent error (A)")
        );
    }

    #[test]
    fn full_export_can_be_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv.gz");
        let original = sample_trace(5);
        original.save_as_csv(&path, ExportColumns::Full).unwrap();

        let loaded = SweepResult::from_csv(&path).unwrap();
        assert_eq!(loaded.len(), original.len());
        assert_eq!(loaded.codes(), original.codes());
        assert_eq!(loaded.sample_size(), 0);
        for (a, b) in loaded.points().iter().zip(original.points()) {
            assert_abs_diff_eq!(a.power.value, b.power.value, epsilon = 1e-12);
            assert_abs_diff_eq!(a.current.error, b.current.error, epsilon = 1e-12);
            assert_eq!(a.resistance.value.is_infinite(), b.resistance.value.is_infinite());
        }
        assert_eq!(loaded.p_max(), original.p_max());
    }

    #[test]
    fn basic_export_recomputes_power() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let original = sample_trace(1);
        original.save_as_csv(&path, ExportColumns::Basic).unwrap();

        let loaded = SweepResult::from_csv(&path).unwrap();
        assert_eq!(loaded.sample_size(), 1);
        assert_eq!(loaded.codes(), vec![0, 1, 2, 3, 4]);
        for (a, b) in loaded.powers().iter().zip(original.powers()) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
        }
        assert!(loaded.resistances().iter().all(|r| r.is_nan()));
    }

    #[test]
    fn imported_errors_are_exported_again() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        sample_trace(5)
            .save_as_csv(&first, ExportColumns::Basic)
            .unwrap();
        let loaded = SweepResult::from_csv(&first).unwrap();
        loaded.save_as_csv(&second, ExportColumns::Basic).unwrap();
        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn unknown_sample_size_without_errors_has_no_error_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let mut trace = SweepResult::new(0);
        for point in sample_trace(1).points() {
            trace.push(*point);
        }
        trace.save_as_csv(&path, ExportColumns::Basic).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("Voltage (V),Current (A)"));
    }

    #[test]
    fn row_index_beyond_code_range_is_an_error() {
        let record = Record {
            code: None,
            voltage: 1.0,
            current: 0.1,
            voltage_err: None,
            current_err: None,
            fet_voltage: None,
            fet_voltage_err: None,
            power: None,
            power_err: None,
            resistance: None,
            resistance_err: None,
        };
        assert!(record.into_point(usize::from(u16::max_value()) + 1).is_err());
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(delimiter(Path::new("a.csv")), b',');
        assert_eq!(delimiter(Path::new("a.CSV.gz")), b',');
        assert_eq!(delimiter(Path::new("a.tsv")), b'\t');
        assert_eq!(delimiter(Path::new("a.txt.gz")), b'\t');
        assert_eq!(delimiter(Path::new("a")), b'\t');
    }
}
