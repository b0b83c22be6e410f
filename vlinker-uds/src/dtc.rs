//! OBD-II (mode 03) and UDS (service 0x19) Diagnostic Trouble Codes.

use bitflags::bitflags;
use facet::Facet;

bitflags! {
    /// UDS DTC status mask (ISO 14229-1 Annex D).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
    pub struct DtcStatus: u8 {
        const TEST_FAILED                     = 0b0000_0001;
        const TEST_FAILED_THIS_OPERATION_CYCLE = 0b0000_0010;
        const PENDING_DTC                     = 0b0000_0100;
        const CONFIRMED_DTC                   = 0b0000_1000;
        const TEST_NOT_COMPLETED_SINCE_CLEAR   = 0b0001_0000;
        const TEST_FAILED_SINCE_LAST_CLEAR      = 0b0010_0000;
        const TEST_NOT_COMPLETED_THIS_CYCLE    = 0b0100_0000;
        const WARNING_INDICATOR_REQUESTED      = 0b1000_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Dtc {
    pub raw: Vec<u8>,
    pub code: String,
    pub status: Option<DtcStatus>,
}

/// The first two bits of the high byte select the DTC letter; bits
/// 5:0 of the high byte plus the low byte form the four hex digits.
fn bytes_to_dtc(b1: u8, b2: u8) -> String {
    const LETTERS: [char; 4] = ['P', 'C', 'B', 'U'];
    let letter = LETTERS[(b1 >> 6) as usize];
    let code = (((b1 & 0x3F) as u16) << 8) | b2 as u16;
    format!("{letter}{code:04X}")
}

/// Parse a mode 03 ("request emission-related DTCs") positive response.
/// Stops at the first all-zero pair (no-DTC padding). If the response is
/// an ASCII adapter transcript (ELM echo/prompt noise) rather than raw
/// bytes, it's normalised to binary first; a missing `0x43` service-echo
/// byte isn't treated as "no DTCs" — parsing just starts at offset 0.
pub fn parse_obd_03_response(resp: &[u8]) -> Vec<Dtc> {
    let resp = if is_printable_ascii_transcript(resp) {
        crate::elm::strip_elm_echo(resp)
    } else {
        resp.to_vec()
    };
    let pos = resp.iter().position(|&b| b == 0x43).map(|p| p + 1).unwrap_or(0);
    let body = &resp[pos..];
    let mut out = Vec::new();
    for pair in body.chunks_exact(2) {
        if pair == [0, 0] {
            break;
        }
        out.push(Dtc {
            raw: vec![pair[0], pair[1]],
            code: bytes_to_dtc(pair[0], pair[1]),
            status: None,
        });
    }
    out
}

/// True if every byte is printable ASCII (or the CR/LF an ELM transcript
/// uses as line noise) rather than raw protocol bytes that merely happen
/// to fall under 0x80.
fn is_printable_ascii_transcript(resp: &[u8]) -> bool {
    !resp.is_empty() && resp.iter().all(|&b| b.is_ascii_graphic() || matches!(b, b' ' | b'\r' | b'\n'))
}

/// Parse the body of a UDS 0x59 (ReadDtcInformation positive response):
/// each entry is 3 code bytes, optionally followed by a status byte. The
/// status byte is consumed whenever at least one trailing byte remains
/// after a DTC, not gated on the `with_status` subfunction — mirroring
/// the original tool's always-consume-if-present behaviour.
pub fn parse_uds_dtc_bytes(body: &[u8]) -> Vec<Dtc> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 3 <= body.len() {
        let chunk = &body[i..i + 3];
        i += 3;
        let status = body.get(i).map(|&b| {
            i += 1;
            DtcStatus::from_bits_truncate(b)
        });
        out.push(Dtc {
            raw: chunk.to_vec(),
            code: format!("{:02X}{:02X}{:02X}", chunk[0], chunk[1], chunk[2]),
            status,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_dtc_letter() {
        assert_eq!(bytes_to_dtc(0x01, 0x23), "P0123");
        assert_eq!(bytes_to_dtc(0x41, 0x23), "C0123");
        assert_eq!(bytes_to_dtc(0x81, 0x23), "B0123");
        assert_eq!(bytes_to_dtc(0xC1, 0x23), "U0123");
    }

    #[test]
    fn mode_03_stops_at_padding() {
        let resp = [0x43, 0x01, 0x23, 0x00, 0x00, 0xFF, 0xFF];
        let dtcs = parse_obd_03_response(&resp);
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].code, "P0123");
    }

    #[test]
    fn mode_03_without_service_echo_parses_from_offset_zero() {
        // a negative response's raw bytes aren't a printable ASCII transcript,
        // so they're scanned as-is; with no 0x43 present, parsing starts at 0
        // rather than being treated as "no DTCs".
        let dtcs = parse_obd_03_response(&[0x01, 0x23, 0x00, 0x00]);
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].code, "P0123");
    }

    #[test]
    fn mode_03_normalises_ascii_elm_transcript_before_scanning() {
        let resp = b"43 01 23 00 00\r\r>";
        let dtcs = parse_obd_03_response(resp);
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].code, "P0123");
    }

    #[test]
    fn uds_dtc_with_status() {
        // two 3-byte DTCs, each followed by a status byte.
        let body = [0x01, 0x02, 0x03, 0x09, 0x04, 0x05, 0x06, 0x00];
        let dtcs = parse_uds_dtc_bytes(&body);
        assert_eq!(dtcs.len(), 2);
        assert_eq!(dtcs[0].raw, vec![0x01, 0x02, 0x03]);
        assert_eq!(dtcs[0].code, "010203");
        assert!(dtcs[0].status.unwrap().contains(DtcStatus::CONFIRMED_DTC));
        assert_eq!(dtcs[1].raw, vec![0x04, 0x05, 0x06]);
        assert!(dtcs[1].status.unwrap().is_empty());
    }

    #[test]
    fn uds_dtc_without_trailing_status() {
        // a single 3-byte DTC with no trailing byte has no status.
        let body = [0x01, 0x02, 0x03];
        let dtcs = parse_uds_dtc_bytes(&body);
        assert_eq!(dtcs.len(), 1);
        assert!(dtcs[0].status.is_none());
    }
}
