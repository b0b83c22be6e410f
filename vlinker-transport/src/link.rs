use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::DeviceError;
use crate::options::TransportOptions;
use crate::utils::SpaceHex;

/// A half-duplex byte link to a diagnostic adapter.
///
/// Implementations are allowed to buffer internally but must make `open`
/// idempotent and `read_all` return promptly once the link has been idle for
/// the configured timeout. The production implementation wraps
/// [`serialport`]; tests drive an in-memory [`ScriptedLink`] instead, the
/// same dependency-injection shape the rest of the workspace uses for
/// hardware access.
pub trait SerialLink {
    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<(), DeviceError>;
    fn close(&mut self);

    /// Write `data` and block until the link falls idle, returning whatever
    /// was read back. Retries up to `options.retries` times with
    /// `options.backoff * attempt` between attempts, reopening the link if
    /// it isn't open.
    fn send_bytes(&mut self, options: &TransportOptions, data: &[u8]) -> Result<Vec<u8>, DeviceError>;
}

/// Every `/dev/ttyUSB*` path present, sorted, for the CLI's `list`
/// subcommand (distinct from [`discover_device`], which picks one).
pub fn list_devices() -> Vec<String> {
    let mut candidates: Vec<String> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("ttyUSB"))
        .map(|name| format!("/dev/{name}"))
        .collect();
    candidates.sort();
    candidates
}

/// `VLINKER_DEVICE`, else `/dev/ttyUSB0`, else the first matching
/// `/dev/ttyUSB*`.
pub fn discover_device() -> Result<String, DeviceError> {
    if let Ok(path) = std::env::var("VLINKER_DEVICE") {
        return Ok(path);
    }
    if std::path::Path::new("/dev/ttyUSB0").exists() {
        return Ok("/dev/ttyUSB0".to_string());
    }
    let mut candidates: Vec<String> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("ttyUSB"))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .map(|name| format!("/dev/{name}"))
        .ok_or(DeviceError::NotFound)
}

pub struct SerialPortLink {
    path: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialPortLink {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            port: None,
        }
    }
}

impl SerialLink for SerialPortLink {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.port.is_some() {
            return Ok(());
        }
        debug!("opening serial link");
        let port = serialport::new(&self.path, 115_200)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|source| DeviceError::Open {
                path: self.path.clone(),
                source,
            })?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    #[instrument(skip(self, data), fields(path = %self.path, len = data.len()))]
    fn send_bytes(&mut self, options: &TransportOptions, data: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let mut last_err = None;
        for attempt in 0..=options.retries {
            if attempt > 0 {
                std::thread::sleep(options.backoff * attempt);
            }
            if !self.is_open() {
                self.open()?;
            }
            match self.write_and_read(options, data) {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!(attempt, error = %e, "send_bytes attempt failed");
                    self.close();
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("at least one attempt runs"))
    }
}

impl SerialPortLink {
    fn write_and_read(
        &mut self,
        options: &TransportOptions,
        data: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        let port = self.port.as_mut().expect("checked open above");
        debug!(bytes = %SpaceHex(data), "write");
        port.write_all(data).map_err(|source| DeviceError::Io {
            path: self.path.clone(),
            source,
        })?;
        std::thread::sleep(Duration::from_millis(50));
        read_all(port.as_mut(), &self.path, options.timeout)
    }
}

fn read_all(
    port: &mut dyn Read,
    path: &str,
    timeout: Duration,
) -> Result<Vec<u8>, DeviceError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    let start = Instant::now();
    loop {
        match port.read(&mut buf) {
            Ok(0) => {
                if start.elapsed() > timeout {
                    break;
                }
            }
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if start.elapsed() > timeout {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() > timeout {
                    break;
                }
            }
            Err(source) => {
                return Err(DeviceError::Io {
                    path: path.to_string(),
                    source,
                });
            }
        }
    }
    Ok(out)
}

/// One scripted exchange: bytes the link expects to be written, and the
/// response to hand back.
pub struct ScriptedExchange {
    pub expect_write: Option<Vec<u8>>,
    pub response: Vec<u8>,
}

/// An in-memory [`SerialLink`] test double, the transport-layer analogue of
/// the backend fakes used elsewhere in this workspace for dependency
/// injection. Drives every unit test and the simulator-mode CLI surface.
#[derive(Default)]
pub struct ScriptedLink {
    open: bool,
    script: std::collections::VecDeque<ScriptedExchange>,
    pub writes: Vec<Vec<u8>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(mut self, response: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(ScriptedExchange {
            expect_write: None,
            response: response.into(),
        });
        self
    }

    pub fn expect(mut self, write: impl Into<Vec<u8>>, response: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(ScriptedExchange {
            expect_write: Some(write.into()),
            response: response.into(),
        });
        self
    }
}

impl SerialLink for ScriptedLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn send_bytes(&mut self, _options: &TransportOptions, data: &[u8]) -> Result<Vec<u8>, DeviceError> {
        if !self.open {
            self.open()?;
        }
        self.writes.push(data.to_vec());
        match self.script.pop_front() {
            Some(exchange) => {
                if let Some(expected) = exchange.expect_write {
                    assert_eq!(expected, data, "ScriptedLink received an unexpected write");
                }
                Ok(exchange.response)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// ASCII-hex and line helpers layered on top of [`SerialLink::send_bytes`],
/// matching the original tool's `send_hex`/`send_ascii_line` conveniences.
pub trait SerialLinkExt: SerialLink {
    fn send_hex(&mut self, options: &TransportOptions, hex_str: &str) -> Result<Vec<u8>, DeviceError> {
        let stripped: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(stripped).unwrap_or_default();
        self.send_bytes(options, &bytes)
    }

    fn send_ascii_line(&mut self, options: &TransportOptions, line: &str) -> Result<Vec<u8>, DeviceError> {
        let mut owned = line.to_string();
        if !owned.ends_with('\r') {
            owned.push('\r');
        }
        self.send_bytes(options, owned.as_bytes())
    }
}

impl<T: SerialLink + ?Sized> SerialLinkExt for T {}
