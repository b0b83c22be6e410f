//! UDS (ISO 14229) response-byte decoding shared by the service helpers.

use facet::Facet;

pub const NEGATIVE_RESPONSE_SID: u8 = 0x7F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativeResponse {
    pub sid: u8,
    pub nrc: u8,
}

/// Decode a `0x7F SID NRC` negative response. Returns `None` for anything
/// that isn't shaped like one (including a too-short buffer).
pub fn parse_negative_response(resp: &[u8]) -> Option<NegativeResponse> {
    if resp.len() < 3 || resp[0] != NEGATIVE_RESPONSE_SID {
        return None;
    }
    Some(NegativeResponse {
        sid: resp[1],
        nrc: resp[2],
    })
}

/// Best-effort name for a negative response code; unrecognised codes get a
/// generic label rather than failing the lookup.
pub fn negative_response_code_name(nrc: u8) -> &'static str {
    match nrc {
        0x10 => "generalReject",
        0x11 => "serviceNotSupported",
        0x12 => "subFunctionNotSupported",
        0x13 => "incorrectMessageLengthOrInvalidFormat",
        0x22 => "conditionsNotCorrect",
        0x24 => "requestSequenceError",
        0x31 => "requestOutOfRange",
        0x33 => "securityAccessDenied",
        0x35 => "invalidKey",
        0x36 => "exceedNumberOfAttempts",
        0x37 => "requiredTimeDelayNotExpired",
        0x78 => "requestCorrectlyReceived-ResponsePending",
        _ => "unknownNegativeResponseCode",
    }
}

/// Confirm `resp` is a positive response to `sid` (`sid + 0x40`) and strip
/// the response SID, returning the body.
pub fn expect_positive_response(resp: &[u8], sid: u8) -> Result<&[u8], crate::ProtocolError> {
    if resp.is_empty() {
        return Err(crate::ProtocolError::EmptyResponse);
    }
    if let Some(neg) = parse_negative_response(resp) {
        return Err(crate::ProtocolError::NegativeResponse {
            sid: neg.sid,
            nrc: neg.nrc,
            name: negative_response_code_name(neg.nrc),
        });
    }
    let expected = sid.wrapping_add(0x40);
    if resp[0] != expected {
        return Err(crate::ProtocolError::WrongSid {
            expected,
            got: resp[0],
        });
    }
    Ok(&resp[1..])
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct DidValue {
    pub did_hex: String,
    pub length: usize,
    pub raw_hex: String,
    pub ascii: Option<String>,
}

/// Decode a Data Identifier's raw bytes, including an ASCII rendering when
/// at least 60% of the bytes are printable ASCII (and there is at least
/// one byte) — the same heuristic the original tool used to avoid
/// presenting binary DIDs as garbled text.
pub fn decode_did(did: u16, bytes: &[u8]) -> DidValue {
    let printable = bytes
        .iter()
        .filter(|&&b| (0x20..0x7F).contains(&b))
        .count();
    let ascii = if !bytes.is_empty() && printable * 10 >= bytes.len() * 6 {
        Some(String::from_utf8_lossy(bytes).into_owned())
    } else {
        None
    };
    DidValue {
        did_hex: format!("0x{did:04X}"),
        length: bytes.len(),
        raw_hex: hex::encode_upper(bytes),
        ascii,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_response_round_trip() {
        let resp = [0x7F, 0x22, 0x31];
        let neg = parse_negative_response(&resp).unwrap();
        assert_eq!(neg.sid, 0x22);
        assert_eq!(neg.nrc, 0x31);
        assert_eq!(negative_response_code_name(neg.nrc), "requestOutOfRange");
    }

    #[test]
    fn positive_response_strips_sid() {
        let resp = [0x62, 0xF1, 0x90, 0x01, 0x02];
        let body = expect_positive_response(&resp, 0x22).unwrap();
        assert_eq!(body, [0xF1, 0x90, 0x01, 0x02]);
    }

    #[test]
    fn did_value_includes_ascii_when_mostly_printable() {
        let value = decode_did(0xF190, b"VEHICLEVIN12345");
        assert_eq!(value.did_hex, "0xF190");
        assert_eq!(value.length, 15);
        assert_eq!(value.ascii.as_deref(), Some("VEHICLEVIN12345"));
    }

    #[test]
    fn did_value_omits_ascii_for_binary() {
        let value = decode_did(0x1234, &[0x00, 0x01, 0x02, 0xFF]);
        assert!(value.ascii.is_none());
    }
}
