//! Single shared connection to a diagnostic adapter (C9).
//!
//! Exactly one [`SerialLink`] may be open at a time; `ConnectionManager`
//! guards it behind a mutex so concurrent requests serialise rather than
//! interleave writes on the wire. Callers get exclusive, ordered access via
//! [`ConnectionManager::with_link`].

use std::sync::{Arc, Mutex};

use facet::Facet;
use thiserror::Error;
use tracing::{info, instrument};

use crate::audit::{AuditEntry, AuditSink, NullAuditSink};
use crate::error::{DeviceError, TransportError};
use crate::link::{SerialLink, SerialLinkExt, SerialPortLink, discover_device};
use crate::options::TransportOptions;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no connection is open")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ManagerError {
    /// HTTP status an out-of-crate REST adapter should map this to: 400 for
    /// `NotConnected`/`Validation`/`AlreadyConnected`, 403 for `Forbidden`,
    /// 500 for an unexpected transport/device failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ManagerError::NotConnected => 400,
            ManagerError::AlreadyConnected => 400,
            ManagerError::Validation(_) => 400,
            ManagerError::Forbidden(_) => 403,
            ManagerError::Device(_) => 500,
            ManagerError::Transport(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub enum ConnectionStatus {
    Disconnected,
    Connected { path: String },
}

#[derive(Debug, Clone, Facet)]
pub struct ProbeResult {
    pub probe: String,
    pub resp_hex: String,
    pub resp_ascii: String,
}

pub struct ConnectionManager {
    link: Mutex<Option<Box<dyn SerialLink + Send>>>,
    path: Mutex<Option<String>>,
    options: TransportOptions,
    audit: Arc<dyn AuditSink>,
}

impl ConnectionManager {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            link: Mutex::new(None),
            path: Mutex::new(None),
            options,
            audit: Arc::new(NullAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    #[instrument(skip(self))]
    pub fn connect(&self, path: Option<String>) -> Result<ConnectionStatus, ManagerError> {
        if self.path.lock().expect("lock poisoned").is_some() {
            return Err(ManagerError::AlreadyConnected);
        }
        let path = match path {
            Some(p) => p,
            None => discover_device()?,
        };
        let mut link = SerialPortLink::new(path.clone());
        link.open()?;
        *self.link.lock().expect("lock poisoned") = Some(Box::new(link));
        *self.path.lock().expect("lock poisoned") = Some(path.clone());
        self.audit.record(AuditEntry {
            action: "connect".into(),
            details: path.clone(),
        });
        info!(%path, "connected");
        Ok(ConnectionStatus::Connected { path })
    }

    pub fn disconnect(&self) {
        if let Some(mut link) = self.link.lock().expect("lock poisoned").take() {
            link.close();
        }
        *self.path.lock().expect("lock poisoned") = None;
        self.audit.record(AuditEntry {
            action: "disconnect".into(),
            details: String::new(),
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.path.lock().expect("lock poisoned").clone() {
            Some(path) => ConnectionStatus::Connected { path },
            None => ConnectionStatus::Disconnected,
        }
    }

    /// Run `f` against the open link under the connection mutex. Requests
    /// queue FIFO on this lock; there is no priority or preemption. `f`'s
    /// return value is handed back untouched: a caller layered on top of
    /// this crate (e.g. the UDS service helpers, which fail with their own
    /// error type) maps it however it needs to rather than being forced
    /// through `TransportError`.
    pub fn with_link<R>(
        &self,
        f: impl FnOnce(&mut dyn SerialLink, &TransportOptions) -> R,
    ) -> Result<R, ManagerError> {
        let mut guard = self.link.lock().expect("lock poisoned");
        let link = guard.as_deref_mut().ok_or(ManagerError::NotConnected)?;
        Ok(f(link, &self.options))
    }

    /// Five best-effort adapter probes (newline, ATI, AT Z, ELM 0100, UDS
    /// TesterPresent). A single probe failing never aborts the scan.
    pub fn scan(&self) -> Result<Vec<ProbeResult>, ManagerError> {
        self.with_link(|link, options| {
            let probes: [(&str, ProbeKind); 5] = [
                ("\r", ProbeKind::Ascii),
                ("ATI\r", ProbeKind::Ascii),
                ("AT Z\r", ProbeKind::Ascii),
                ("0100\r", ProbeKind::Ascii),
                ("023E00", ProbeKind::Hex),
            ];
            let mut results = Vec::with_capacity(probes.len());
            for (probe, kind) in probes {
                let raw = match kind {
                    ProbeKind::Ascii => link.send_ascii_line(options, probe),
                    ProbeKind::Hex => link.send_hex(options, probe),
                }
                .unwrap_or_default();
                results.push(ProbeResult {
                    probe: probe.to_string(),
                    resp_hex: hex::encode_upper(&raw),
                    resp_ascii: String::from_utf8_lossy(&raw).into_owned(),
                });
            }
            results
        })
    }
}

#[derive(Clone, Copy)]
enum ProbeKind {
    Ascii,
    Hex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_connection_lifecycle() {
        let manager = ConnectionManager::new(TransportOptions::default());
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }
}
