//! Request/response shapes for the (out-of-scope) REST adapter. No HTTP
//! framework is wired up here — these are the plain, `Facet`-serialisable
//! types an adapter would hang routes off of.

use facet::Facet;
use vlinker_transport::ConnectionStatus;
use vlinker_uds::{Dtc, DidValue};

#[derive(Debug, Clone, Facet)]
pub struct ConnectRequest {
    pub device: Option<String>,
}

#[derive(Debug, Clone, Facet)]
pub struct StatusResponse {
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, Facet)]
pub struct ScanResponse {
    pub probes: Vec<vlinker_transport::ProbeResult>,
}

#[derive(Debug, Clone, Facet)]
pub struct DtcResponse {
    pub dtcs: Vec<Dtc>,
}

#[derive(Debug, Clone, Facet)]
pub struct ReadMeasureRequest {
    pub did: u16,
}

#[derive(Debug, Clone, Facet)]
pub struct ReadMeasureResponse {
    pub value: DidValue,
}

#[derive(Debug, Clone, Facet)]
pub struct SecurityAccessRequest {
    pub sub_function: u8,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Facet)]
pub struct WriteCodingRequest {
    pub identifier_hex: String,
    pub coding_hex: String,
}

/// An error body an adapter would serialise alongside
/// [`vlinker_transport::ManagerError::status_code`].
#[derive(Debug, Clone, Facet)]
pub struct ErrorResponse {
    pub message: String,
}
