//! Seed/key heuristic analyser (C8): given an observed SecurityAccess seed
//! (or a whole capture), propose the small set of transforms a toy ECU
//! profile is likely to use, for a human to eyeball against an observed
//! key rather than to brute-force a real algorithm.

use facet::Facet;
use vlinker_uds::Transform;

use crate::journal::{CaptureRecord, find_seed_requests};

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Candidate {
    pub transform: Transform,
    pub key: Vec<u8>,
}

const XOR_CONSTANTS: [u8; 5] = [0x5A, 0xA5, 0xFF, 0x01, 0x55];

/// Identity, reverse, rotate-left 1..3, XOR against five common constants,
/// and a repeating-XOR guess keyed off slices of the seed itself for
/// lengths 2..4.
pub fn propose_from_seed(seed: &[u8]) -> Vec<Candidate> {
    let mut candidates = vec![
        Candidate {
            transform: Transform::Identity,
            key: Transform::Identity.apply(seed),
        },
        Candidate {
            transform: Transform::Reverse,
            key: Transform::Reverse.apply(seed),
        },
    ];

    for n in 1..=3u8 {
        let transform = Transform::RotateLeft(n);
        candidates.push(Candidate {
            key: transform.apply(seed),
            transform,
        });
    }

    for &c in &XOR_CONSTANTS {
        let transform = Transform::XorConstant(c);
        candidates.push(Candidate {
            key: transform.apply(seed),
            transform,
        });
    }

    for len in 2..=4usize {
        if seed.len() < len {
            continue;
        }
        let transform = Transform::RepeatingXor(seed[..len].to_vec());
        candidates.push(Candidate {
            key: transform.apply(seed),
            transform,
        });
    }

    candidates
}

/// Extract the seed from a SecurityAccess response, per service 0x27's
/// positive-response layout: `67 subfn seed...` if the SID byte is present,
/// else assume the leading byte is already the subfunction echo.
fn extract_seed(response: &[u8]) -> &[u8] {
    match response.first() {
        Some(0x67) => response.get(2..).unwrap_or_default(),
        _ => response.get(1..).unwrap_or_default(),
    }
}

/// Walk a parsed capture journal for SecurityAccess seed/response pairs
/// and propose candidates for each one found.
pub fn analyze_capture(records: &[CaptureRecord]) -> Vec<Vec<Candidate>> {
    find_seed_requests(records)
        .into_iter()
        .map(|(_, resp_idx)| propose_from_seed(extract_seed(&records[resp_idx].data)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposes_expected_candidate_count() {
        let seed = [0xDE, 0xAD, 0xBE, 0xEF];
        let candidates = propose_from_seed(&seed);
        // identity + reverse + 3 rotations + 5 xor constants + 3 repeating-xor lengths
        assert_eq!(candidates.len(), 2 + 3 + 5 + 3);
    }

    #[test]
    fn extract_seed_handles_sid_prefixed_response() {
        assert_eq!(extract_seed(&[0x67, 0x01, 0xDE, 0xAD]), &[0xDE, 0xAD]);
        assert_eq!(extract_seed(&[0x01, 0xDE, 0xAD]), &[0xDE, 0xAD]);
    }
}
