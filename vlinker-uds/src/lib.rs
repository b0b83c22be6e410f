pub mod coding;
pub mod dtc;
pub mod elm;
pub mod error;
pub mod services;
pub mod transform;
pub mod uds;

pub use crate::dtc::{Dtc, DtcStatus, parse_obd_03_response, parse_uds_dtc_bytes};
pub use crate::elm::strip_elm_echo;
pub use crate::error::{CodingError, ProtocolError};
pub use crate::services::{
    SecurityAccessOutcome, clear_dtc_uds, read_dtc, read_dtc_obd03, read_dtc_uds, read_measure_uds,
    security_access_with_profile, tester_present, write_coding,
};
pub use crate::transform::Transform;
pub use crate::uds::{DidValue, decode_did, expect_positive_response, negative_response_code_name, parse_negative_response};
