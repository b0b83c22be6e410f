use std::time::Duration;

/// How a receiver reacts to an out-of-sequence Consecutive Frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveMode {
    /// Accept the frame anyway and keep reassembling (matches the original
    /// tool's behaviour).
    #[default]
    Permissive,
    /// Abort with [`crate::TransportError::SequenceMismatch`].
    Strict,
}

/// Tunables for [`crate::link::SerialLink`] and the ISO-TP engine, mirroring
/// the original tool's `SerialComm`/`send_iso_tp` keyword arguments.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub baud: u32,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    /// ISO-TP CAN payload size per frame (classic CAN = 8).
    pub mtu: usize,
    /// Maximum number of WAIT (flow status 0x01) retries before giving up.
    pub max_wait_attempts: u32,
    pub receive_mode: ReceiveMode,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            baud: 115_200,
            timeout: Duration::from_secs(1),
            retries: 1,
            backoff: Duration::from_millis(100),
            mtu: 8,
            max_wait_attempts: 5,
            receive_mode: ReceiveMode::Permissive,
        }
    }
}
