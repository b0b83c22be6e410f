//! VW-style "long coding" bitfield toolkit (read/set/update individual
//! bits of a byte string, then build the 0x2E WriteDataByIdentifier
//! payload to write it back).

use crate::error::CodingError;

pub fn longcoding_str_to_bytes(coding: &str) -> Result<Vec<u8>, CodingError> {
    hex::decode(coding.trim()).map_err(|_| CodingError::InvalidHex(coding.to_string()))
}

pub fn bytes_to_longcoding_str(coding: &[u8]) -> String {
    hex::encode_upper(coding)
}

pub fn get_longcoding_bit(coding: &[u8], byte_index: usize, bit_index: usize) -> Result<u8, CodingError> {
    let byte = coding
        .get(byte_index)
        .ok_or(CodingError::ByteOutOfRange(byte_index, coding.len()))?;
    if bit_index >= 8 {
        return Err(CodingError::BitOutOfRange(bit_index));
    }
    Ok((byte >> bit_index) & 1)
}

pub fn set_longcoding_bit(
    coding: &[u8],
    byte_index: usize,
    bit_index: usize,
    value: u8,
) -> Result<Vec<u8>, CodingError> {
    if byte_index >= coding.len() {
        return Err(CodingError::ByteOutOfRange(byte_index, coding.len()));
    }
    if bit_index >= 8 {
        return Err(CodingError::BitOutOfRange(bit_index));
    }
    if value > 1 {
        return Err(CodingError::InvalidBitValue(value));
    }
    let mut out = coding.to_vec();
    if value == 1 {
        out[byte_index] |= 1 << bit_index;
    } else {
        out[byte_index] &= !(1 << bit_index);
    }
    Ok(out)
}

/// Apply a batch of `(byte_index, bit_index, value)` bit writes in order.
pub fn update_longcoding_bytes(
    coding: &[u8],
    updates: &[(usize, usize, u8)],
) -> Result<Vec<u8>, CodingError> {
    let mut out = coding.to_vec();
    for &(byte_index, bit_index, value) in updates {
        out = set_longcoding_bit(&out, byte_index, bit_index, value)?;
    }
    Ok(out)
}

/// Build the 0x2E (WriteDataByIdentifier) request payload hex string for
/// writing `coding` back to `identifier_hex` (a 4-hex-digit DID).
pub fn prepare_coding_write_payload(identifier_hex: &str, coding: &[u8]) -> String {
    format!("2E{}{}", identifier_hex.to_uppercase(), bytes_to_longcoding_str(coding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_get_set_round_trips() {
        let coding = longcoding_str_to_bytes("0102FFFF").unwrap();
        assert_eq!(get_longcoding_bit(&coding, 0, 0).unwrap(), 1);
        assert_eq!(get_longcoding_bit(&coding, 0, 1).unwrap(), 0);
        let updated = set_longcoding_bit(&coding, 0, 1, 1).unwrap();
        assert_eq!(get_longcoding_bit(&updated, 0, 1).unwrap(), 1);
    }

    #[test]
    fn byte_out_of_range_errors() {
        let coding = [0u8; 2];
        assert!(get_longcoding_bit(&coding, 5, 0).is_err());
        assert!(set_longcoding_bit(&coding, 5, 0, 1).is_err());
    }

    #[test]
    fn invalid_bit_value_errors() {
        let coding = [0u8; 2];
        assert!(matches!(
            set_longcoding_bit(&coding, 0, 0, 2),
            Err(CodingError::InvalidBitValue(2))
        ));
    }

    #[test]
    fn write_payload_shape() {
        let coding = [0xDE, 0xAD];
        let payload = prepare_coding_write_payload("0600", &coding);
        assert_eq!(payload, "2E0600DEAD");
    }

    #[test]
    fn batch_update_applies_in_order() {
        let coding = [0u8];
        let updated = update_longcoding_bytes(&coding, &[(0, 0, 1), (0, 1, 1), (0, 0, 0)]).unwrap();
        assert_eq!(updated[0], 0b0000_0010);
    }
}
