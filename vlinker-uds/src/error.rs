use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] vlinker_transport::TransportError),

    #[error("negative response: SID {sid:#04x} NRC {nrc:#04x} ({name})")]
    NegativeResponse { sid: u8, nrc: u8, name: &'static str },

    #[error("response was empty")]
    EmptyResponse,

    #[error("response did not start with the expected positive-response SID {expected:#04x}, got {got:#04x}")]
    WrongSid { expected: u8, got: u8 },

    #[error("response too short: expected at least {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum CodingError {
    #[error("byte index {0} is out of range for a coding of length {1}")]
    ByteOutOfRange(usize, usize),
    #[error("bit index {0} is out of range (must be 0..8)")]
    BitOutOfRange(usize),
    #[error("bit value must be 0 or 1, got {0}")]
    InvalidBitValue(u8),
    #[error("coding string was not valid hex: {0}")]
    InvalidHex(String),
}
