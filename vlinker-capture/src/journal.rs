//! Capture log: a plain-text journal of everything read off the wire
//! during a capture session, plus a cooperative cancellation signal for
//! stopping one in progress (the generalisation of the original tool's
//! SIGINT handler).

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use tracing::{info, instrument};
use vlinker_transport::{SerialLink, TransportOptions};

use crate::time::format_utc;

const HEADER: &str = "# vlinker capture\n";

/// The capture recorder only ever observes inbound reads off the wire; the
/// tag is kept in the journal format for forward compatibility but there is
/// currently only one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
}

impl Direction {
    fn tag(self) -> char {
        match self {
            Direction::Read => 'R',
        }
    }

    fn from_tag(c: char) -> Option<Self> {
        match c {
            'R' => Some(Direction::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub timestamp: String,
    pub direction: Direction,
    pub data: Vec<u8>,
}

pub fn write_header(out: &mut impl Write) -> std::io::Result<()> {
    out.write_all(HEADER.as_bytes())
}

fn write_record(out: &mut impl Write, record: &CaptureRecord) -> std::io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}",
        record.timestamp,
        record.direction.tag(),
        hex::encode_upper(&record.data)
    )
}

/// A flag a caller can set from another thread (or a signal handler) to
/// stop a capture loop at the next read-drain boundary.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Capture everything read off `link` until `token` is cancelled or
/// `duration` elapses (whichever first; `None` means run until cancelled).
#[instrument(skip(link, options, out, token))]
pub fn run_capture(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    out: &mut impl Write,
    token: &CancellationToken,
    duration: Option<Duration>,
) -> std::io::Result<()> {
    write_header(out)?;
    let start = Instant::now();
    while !token.is_cancelled() {
        if let Some(duration) = duration {
            if start.elapsed() > duration {
                break;
            }
        }
        let timestamp = format_utc(SystemTime::now());
        let data = link.send_bytes(options, &[]).unwrap_or_default();
        if !data.is_empty() {
            let record = CaptureRecord {
                timestamp,
                direction: Direction::Read,
                data,
            };
            write_record(out, &record)?;
            out.flush()?;
        }
    }
    info!("capture stopped");
    Ok(())
}

/// Parse a capture journal, skipping the header comment and any malformed
/// or comment line rather than failing the whole file.
pub fn parse_capture_file(text: &str) -> Vec<CaptureRecord> {
    text.lines()
        .filter_map(|line| {
            if line.starts_with('#') || line.trim().is_empty() {
                return None;
            }
            let mut parts = line.splitn(3, '\t');
            let timestamp = parts.next()?.to_string();
            let tag = parts.next()?.chars().next()?;
            let direction = Direction::from_tag(tag)?;
            let hex_str = parts.next()?;
            let data = hex::decode(hex_str).ok()?;
            Some(CaptureRecord {
                timestamp,
                direction,
                data,
            })
        })
        .collect()
}

/// Scan parsed records for SecurityAccess (0x27) seed requests, returning
/// each request paired with the next non-empty response within 5 records.
pub fn find_seed_requests(records: &[CaptureRecord]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if record.data.first() != Some(&0x27) {
            continue;
        }
        for j in (i + 1)..records.len().min(i + 6) {
            if !records[j].data.is_empty() {
                out.push((i, j));
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines_and_skips_junk() {
        let text = "# vlinker capture\n\
             2026-07-26T10:00:00\tR\t41002A\n\
             garbage line\n\
             2026-07-26T10:00:01\tR\t4302230000\n";
        let records = parse_capture_file(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data, vec![0x41, 0x00, 0x2A]);
    }

    #[test]
    fn finds_seed_request_followed_by_response() {
        let records = vec![
            CaptureRecord {
                timestamp: "t0".into(),
                direction: Direction::Read,
                data: vec![0x27, 0x01],
            },
            CaptureRecord {
                timestamp: "t1".into(),
                direction: Direction::Read,
                data: vec![0x67, 0x01, 0xDE, 0xAD],
            },
        ];
        let pairs = find_seed_requests(&records);
        assert_eq!(pairs, vec![(0, 1)]);
    }
}
