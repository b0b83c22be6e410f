use thiserror::Error;

/// Failure opening, configuring, or talking to the underlying serial device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no device found (set VLINKER_DEVICE or connect a /dev/ttyUSB*)")]
    NotFound,
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure at the ISO-TP framing/state-machine layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("payload of {0} bytes exceeds the maximum representable by a First Frame (4095)")]
    PayloadTooLarge(usize),

    #[error("MTU {0} is too small to carry an ISO-TP PCI byte (minimum 3)")]
    MtuTooSmall(usize),

    #[error("no data received before timeout")]
    Timeout,

    #[error("first frame had an incomplete or malformed PCI header")]
    IncompleteFirstFrame,

    #[error("consecutive frame had an unexpected PCI type {0:#04x}")]
    UnexpectedPci(u8),

    #[error("consecutive frame sequence number {got} did not follow expected {expected}")]
    SequenceMismatch { expected: u8, got: u8 },

    #[error("responder never sent a Flow Control frame")]
    NoFlowControl,

    #[error("responder sent overflow flow status, aborting")]
    Overflow,

    #[error("WAIT exceeded retries ({0})")]
    WaitExhausted(u32),

    #[error("response bytes were not valid ASCII hex: {0}")]
    InvalidHex(String),
}
