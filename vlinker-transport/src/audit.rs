//! Best-effort audit trail for connection-manager actions.
//!
//! Writing an audit entry must never be allowed to fail a request; a sink
//! that can't keep up just drops entries. The real implementation writes
//! one JSON line per action on a dedicated thread instead of on the caller's
//! path, the generalisation of the original tool's fire-and-forget append.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::Arc;

use facet::Facet;
use tracing::warn;

#[derive(Debug, Clone, Facet)]
pub struct AuditEntry {
    pub action: String,
    pub details: String,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Drops every entry. The default for callers that don't care about an
/// audit trail.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

/// Appends one JSON line per entry via a bounded channel to a writer
/// thread, so a slow or unavailable audit file never blocks a diagnostic
/// request.
pub struct ChannelAuditSink {
    tx: SyncSender<AuditEntry>,
}

impl ChannelAuditSink {
    pub fn spawn(path: impl Into<std::path::PathBuf>) -> Arc<Self> {
        let path = path.into();
        let (tx, rx): (SyncSender<AuditEntry>, Receiver<AuditEntry>) = sync_channel(256);
        std::thread::spawn(move || writer_loop(path, rx));
        Arc::new(Self { tx })
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, entry: AuditEntry) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(entry) {
            warn!("audit channel full, dropping entry");
        }
    }
}

fn writer_loop(path: std::path::PathBuf, rx: Receiver<AuditEntry>) {
    use std::io::Write;

    while let Ok(entry) = rx.recv() {
        let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) else {
            continue;
        };
        if let Ok(line) = facet_json::to_string(&entry) {
            let _ = writeln!(file, "{line}");
        }
    }
}
