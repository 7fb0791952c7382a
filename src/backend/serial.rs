use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::backend::{DeviceError, SerialSettings, Transport};
use crate::Result;

const WRITE_TERMINATION: &[u8] = b"\n";
const READ_TERMINATION: &[u8] = b"\r\n";
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(path, settings.baud_rate)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| {
                failure::err_msg(format!(
                    "Can't open serial port {} at {} baud: {}",
                    path, settings.baud_rate, e
                ))
            })?;
        debug!("Serial port {} opened at {} baud", path, settings.baud_rate);
        Ok(SerialTransport {
            port,
            timeout: settings.timeout,
        })
    }
}

/// Reads one reply line, terminator stripped, giving up after `timeout`.
///
/// `reader` is expected to time out on its own well within `timeout`, as a
/// serial port opened with a short poll timeout does.
fn read_reply<R: Read + ?Sized>(
    reader: &mut R,
    command: &str,
    timeout: Duration,
) -> Result<String> {
    let started = Instant::now();
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];

    while !reply.ends_with(READ_TERMINATION) {
        if started.elapsed() > timeout {
            return Err(DeviceError::Timeout {
                command: command.to_string(),
                timeout,
            }
            .into());
        }
        match reader.read(&mut byte) {
            Ok(0) => return Err(DeviceError::Closed.into()),
            Ok(_) => reply.push(byte[0]),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    reply.truncate(reply.len() - READ_TERMINATION.len());
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

impl Transport for SerialTransport {
    fn query(&mut self, command: &str) -> Result<String> {
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(WRITE_TERMINATION)?;
        self.port.flush()?;
        read_reply(&mut *self.port, command, self.timeout)
    }

    fn close(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}
