//! UDS service helpers (C5): the six services the toolkit speaks directly,
//! each a thin, testable wrapper around [`vlinker_transport::transact`].

use facet::Facet;
use tracing::{debug, instrument};
use vlinker_transport::{SerialLink, SerialLinkExt, TransportError, TransportOptions};

use crate::coding::prepare_coding_write_payload;
use crate::dtc::{Dtc, parse_obd_03_response, parse_uds_dtc_bytes};
use crate::error::ProtocolError;
use crate::transform::Transform;
use crate::uds::{DidValue, decode_did, expect_positive_response};

const SID_CLEAR_DIAGNOSTIC_INFORMATION: u8 = 0x14;
const SID_READ_DTC_INFORMATION: u8 = 0x19;
const SID_READ_DATA_BY_IDENTIFIER: u8 = 0x22;
const SID_SECURITY_ACCESS: u8 = 0x27;
const SID_WRITE_DATA_BY_IDENTIFIER: u8 = 0x2E;
const SID_TESTER_PRESENT: u8 = 0x3E;
const OBD_MODE_03: u8 = 0x03;

/// Run an ISO-TP transaction; if the transport layer itself couldn't frame
/// the exchange (no Flow Control at all, or a malformed First Frame — the
/// adapter doesn't speak ISO-TP framing), fall back to writing the raw
/// hex payload directly. A genuine protocol abort (WAIT exhaustion,
/// Overflow, sequence mismatch) is NOT retried this way: a raw resend
/// can't fix a responder that's actively rejecting the frame sequence.
fn transact_or_raw(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    match vlinker_transport::transact(link, options, payload) {
        Ok(resp) => Ok(resp),
        Err(TransportError::NoFlowControl | TransportError::IncompleteFirstFrame) => {
            debug!("falling back to raw hex send after transport framing failure");
            Ok(link.send_hex(options, &hex::encode_upper(payload))?)
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(link, options))]
pub fn tester_present(link: &mut dyn SerialLink, options: &TransportOptions) -> Result<(), ProtocolError> {
    let resp = transact_or_raw(link, options, &[SID_TESTER_PRESENT, 0x00])?;
    expect_positive_response(&resp, SID_TESTER_PRESENT)?;
    Ok(())
}

#[instrument(skip(link, options))]
pub fn clear_dtc_uds(link: &mut dyn SerialLink, options: &TransportOptions) -> Result<(), ProtocolError> {
    let resp = transact_or_raw(link, options, &[SID_CLEAR_DIAGNOSTIC_INFORMATION, 0x00])?;
    expect_positive_response(&resp, SID_CLEAR_DIAGNOSTIC_INFORMATION)?;
    Ok(())
}

#[instrument(skip(link, options))]
pub fn read_dtc_uds(link: &mut dyn SerialLink, options: &TransportOptions) -> Result<Vec<Dtc>, ProtocolError> {
    let resp = transact_or_raw(link, options, &[SID_READ_DTC_INFORMATION, 0x02])?;
    let body = expect_positive_response(&resp, SID_READ_DTC_INFORMATION)?;
    // body[0] echoes the subfunction (reportDTCByStatusMask); entries follow.
    let entries = body.get(1..).unwrap_or_default();
    Ok(parse_uds_dtc_bytes(entries))
}

#[instrument(skip(link, options))]
pub fn read_dtc_obd03(link: &mut dyn SerialLink, options: &TransportOptions) -> Result<Vec<Dtc>, ProtocolError> {
    let resp = transact_or_raw(link, options, &[OBD_MODE_03])?;
    Ok(parse_obd_03_response(&resp))
}

/// UDS 0x19 first, OBD-II mode 03 if that doesn't parse as a positive
/// response — the same two-protocol fallback the original tool used since
/// not every ECU answers ReadDtcInformation.
pub fn read_dtc(link: &mut dyn SerialLink, options: &TransportOptions) -> Result<Vec<Dtc>, ProtocolError> {
    match read_dtc_uds(link, options) {
        Ok(dtcs) => Ok(dtcs),
        Err(_) => read_dtc_obd03(link, options),
    }
}

#[instrument(skip(link, options))]
pub fn read_measure_uds(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    did: u16,
) -> Result<DidValue, ProtocolError> {
    let resp = transact_or_raw(
        link,
        options,
        &[SID_READ_DATA_BY_IDENTIFIER, (did >> 8) as u8, did as u8],
    )?;
    let body = expect_positive_response(&resp, SID_READ_DATA_BY_IDENTIFIER)?;
    let value_bytes = body.get(2..).unwrap_or_default();
    Ok(decode_did(did, value_bytes))
}

#[derive(Debug, Clone, Facet)]
pub struct SecurityAccessOutcome {
    pub mode: String,
    pub seed: Vec<u8>,
    pub key: Option<Vec<u8>>,
}

/// Request a seed, and if `transform` is given compute and send the key
/// automatically (`mode: "auto"`); otherwise just return the seed for the
/// caller to handle out of band (`mode: "manual"`).
#[instrument(skip(link, options, transform))]
pub fn security_access_with_profile(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    sub_function: u8,
    transform: Option<&Transform>,
) -> Result<SecurityAccessOutcome, ProtocolError> {
    let resp = transact_or_raw(link, options, &[SID_SECURITY_ACCESS, sub_function])?;
    let body = expect_positive_response(&resp, SID_SECURITY_ACCESS)?;
    let seed = body.get(1..).unwrap_or_default().to_vec();

    let Some(transform) = transform else {
        return Ok(SecurityAccessOutcome {
            mode: "manual".to_string(),
            seed,
            key: None,
        });
    };

    let key = transform.apply(&seed);
    let mut request = vec![SID_SECURITY_ACCESS, sub_function + 1];
    request.extend_from_slice(&key);
    let resp = transact_or_raw(link, options, &request)?;
    expect_positive_response(&resp, SID_SECURITY_ACCESS)?;
    Ok(SecurityAccessOutcome {
        mode: "auto".to_string(),
        seed,
        key: Some(key),
    })
}

#[instrument(skip(link, options, coding))]
pub fn write_coding(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    identifier_hex: &str,
    coding: &[u8],
) -> Result<(), ProtocolError> {
    let payload_hex = prepare_coding_write_payload(identifier_hex, coding);
    let payload = hex::decode(&payload_hex).expect("prepare_coding_write_payload always emits valid hex");
    let resp = transact_or_raw(link, options, &payload)?;
    expect_positive_response(&resp, SID_WRITE_DATA_BY_IDENTIFIER)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlinker_transport::ScriptedLink;

    #[test]
    fn tester_present_accepts_positive_response() {
        let mut link = ScriptedLink::new().push_response(vec![0x02, 0x7E, 0x00, 0, 0, 0, 0, 0]);
        let options = TransportOptions::default();
        tester_present(&mut link, &options).unwrap();
    }

    #[test]
    fn read_dtc_uds_parses_entries() {
        let mut link = ScriptedLink::new().push_response(vec![
            0x06, 0x59, 0x02, 0x01, 0x23, 0x09, 0x08, 0, 0,
        ]);
        let options = TransportOptions::default();
        let dtcs = read_dtc_uds(&mut link, &options).unwrap();
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].raw, vec![0x01, 0x23, 0x09]);
        assert_eq!(dtcs[0].code, "012309");
    }

    #[test]
    fn read_dtc_falls_back_to_obd_mode_03() {
        // UDS 0x19 gets a negative response, forcing the mode-03 fallback.
        let mut link = ScriptedLink::new()
            .push_response(vec![0x03, 0x7F, 0x19, 0x11, 0, 0, 0, 0])
            .push_response(vec![0x06, 0x43, 0x01, 0x23, 0x00, 0x00, 0, 0]);
        let options = TransportOptions::default();
        let dtcs = read_dtc(&mut link, &options).unwrap();
        assert_eq!(dtcs[0].code, "P0123");
    }

    #[test]
    fn security_access_manual_mode_returns_seed_only() {
        let mut link = ScriptedLink::new().push_response(vec![0x04, 0x67, 0x01, 0xDE, 0xAD, 0, 0, 0]);
        let options = TransportOptions::default();
        let outcome = security_access_with_profile(&mut link, &options, 0x01, None).unwrap();
        assert_eq!(outcome.mode, "manual");
        assert_eq!(outcome.seed, vec![0xDE, 0xAD]);
        assert!(outcome.key.is_none());
    }

    #[test]
    fn security_access_auto_mode_sends_key() {
        let mut link = ScriptedLink::new()
            .push_response(vec![0x04, 0x67, 0x01, 0xDE, 0xAD, 0, 0, 0])
            .push_response(vec![0x02, 0x67, 0x02, 0, 0, 0, 0, 0]);
        let options = TransportOptions::default();
        let outcome =
            security_access_with_profile(&mut link, &options, 0x01, Some(&Transform::Reverse)).unwrap();
        assert_eq!(outcome.mode, "auto");
        assert_eq!(outcome.key, Some(vec![0xAD, 0xDE]));
    }
}
