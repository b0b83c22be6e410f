//! ISO 15765-2 (ISO-TP) transaction engine.
//!
//! `transact` drives a full request/response exchange over a
//! [`crate::link::SerialLink`]: it segments an outbound payload into First
//! Frame / Consecutive Frames when it doesn't fit a Single Frame, honours
//! the responder's Flow Control pacing (CTS / WAIT / Overflow, block size,
//! STmin), and reassembles a (possibly multi-frame) response the same way.

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::TransportError;
use crate::link::SerialLink;
use crate::options::{ReceiveMode, TransportOptions};

const PCI_SF: u8 = 0x0;
const PCI_FF: u8 = 0x1;
const PCI_CF: u8 = 0x2;
const PCI_FC: u8 = 0x3;

const FLOW_STATUS_CTS: u8 = 0x0;
const FLOW_STATUS_WAIT: u8 = 0x1;
const FLOW_STATUS_OVERFLOW: u8 = 0x2;

/// States the sending side of a multi-frame request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    AwaitFc,
    TxBlock,
    Wait,
    Done,
    Fail,
}

/// States the receiving side moves through while reassembling a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    ReceivingFf,
    ReceivingCf,
}

/// Decode an STmin byte into the minimum separation time it encodes.
/// `0x00..=0x7F` are milliseconds; `0xF1..=0xF9` are 100-microsecond steps.
/// Reserved values (`0x80..=0xF0`, `0xFA..=0xFF`) decode to zero, the same
/// "don't wait" permissive fallback the rest of this engine defaults to.
pub fn stmin_to_duration(byte: u8) -> Duration {
    match byte {
        0x00..=0x7F => Duration::from_millis(byte as u64),
        0xF1..=0xF9 => Duration::from_micros((byte - 0xF0) as u64 * 100),
        _ => Duration::ZERO,
    }
}

/// Locate a Flow Control frame inside `buffer`, returning
/// `(flow_status, block_size, st_min, consumed_bytes)`. Scans rather than
/// indexing `buffer[0]` directly because an ASCII adapter may interleave
/// prompt/echo bytes ahead of the real frame.
fn parse_flow_control(buffer: &[u8]) -> Option<(u8, u8, u8, usize)> {
    for (idx, window) in buffer.windows(3).enumerate() {
        if window[0] >> 4 == PCI_FC {
            let flow_status = window[0] & 0x0F;
            let block_size = window[1];
            let st_min = window[2];
            return Some((flow_status, block_size, st_min, idx + 3));
        }
    }
    None
}

/// Run a full ISO-TP request/response transaction.
pub fn transact(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    request: &[u8],
) -> Result<Vec<u8>, TransportError> {
    let frames = crate::frame::build(request, options.mtu)?;

    let buffer = if frames.len() == 1 {
        debug!("sending single frame request");
        link.send_bytes(options, &frames[0])?
    } else {
        send_multi_frame_request(link, options, &frames)?
    };

    receive_response(link, options, buffer)
}

fn send_multi_frame_request(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    frames: &[Vec<u8>],
) -> Result<Vec<u8>, TransportError> {
    let mut state = SenderState::Idle;
    let mut buffer = link.send_bytes(options, &frames[0])?;
    state = SenderState::AwaitFc;
    let mut cf_index = 1usize;
    let mut wait_attempts = 0u32;
    let mut block_size = 0u8;
    let mut st_min = Duration::ZERO;
    let mut sent_in_block = 0u32;

    loop {
        trace!(?state, "sender state transition");
        match state {
            SenderState::AwaitFc => {
                let (flow_status, bs, stmin, consumed) =
                    parse_flow_control(&buffer).ok_or(TransportError::NoFlowControl)?;
                buffer.drain(..consumed);
                match flow_status {
                    FLOW_STATUS_CTS => {
                        block_size = bs;
                        st_min = stmin_to_duration(stmin);
                        sent_in_block = 0;
                        state = SenderState::TxBlock;
                    }
                    FLOW_STATUS_WAIT => {
                        wait_attempts += 1;
                        if wait_attempts > options.max_wait_attempts {
                            state = SenderState::Fail;
                            return Err(TransportError::WaitExhausted(options.max_wait_attempts));
                        }
                        state = SenderState::Wait;
                    }
                    FLOW_STATUS_OVERFLOW => {
                        state = SenderState::Fail;
                        return Err(TransportError::Overflow);
                    }
                    _ => {
                        state = SenderState::Fail;
                        return Err(TransportError::NoFlowControl);
                    }
                }
            }
            SenderState::Wait => {
                buffer = link.send_bytes(options, &[])?;
                state = SenderState::AwaitFc;
            }
            SenderState::TxBlock => {
                if cf_index >= frames.len() {
                    state = SenderState::Done;
                    continue;
                }
                if block_size != 0 && sent_in_block >= block_size as u32 {
                    state = SenderState::AwaitFc;
                    wait_attempts = 0;
                    continue;
                }
                if st_min > Duration::ZERO {
                    std::thread::sleep(st_min);
                }
                buffer = link.send_bytes(options, &frames[cf_index])?;
                cf_index += 1;
                sent_in_block += 1;
            }
            SenderState::Done => return Ok(buffer),
            SenderState::Fail | SenderState::Idle => unreachable!("handled inline above"),
        }
    }
}

/// Poll the link for more inbound bytes, bounded by `options.max_wait_attempts`
/// consecutive empty reads so a peer that never answers can't hang forever.
fn poll_more(link: &mut dyn SerialLink, options: &TransportOptions, attempts: &mut u32) -> Result<Vec<u8>, TransportError> {
    let more = link.send_bytes(options, &[])?;
    if more.is_empty() {
        *attempts += 1;
        if *attempts > options.max_wait_attempts {
            return Err(TransportError::Timeout);
        }
    } else {
        *attempts = 0;
    }
    Ok(more)
}

fn receive_response(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    mut buffer: Vec<u8>,
) -> Result<Vec<u8>, TransportError> {
    let mut state = ReceiverState::Idle;
    let mut attempts = 0u32;
    loop {
        trace!(?state, "receiver state transition");
        match state {
            ReceiverState::Idle => {
                // Skip any number of trailing/leading 3-byte Flow Control
                // frames the peer may have echoed ahead of the real frame.
                while buffer.len() >= 3 && buffer[0] >> 4 == PCI_FC {
                    buffer.drain(..3);
                }
                if buffer.is_empty() || (buffer.len() < 3 && buffer[0] >> 4 == PCI_FC) {
                    let more = poll_more(link, options, &mut attempts)?;
                    buffer.extend_from_slice(&more);
                    continue;
                }
                let pci_type = buffer[0] >> 4;
                state = match pci_type {
                    t if t == PCI_SF => return decode_single_frame(&buffer),
                    t if t == PCI_FF => ReceiverState::ReceivingFf,
                    // "any other nibble: return the raw buffer unchanged"
                    _ => return Ok(buffer),
                };
            }
            ReceiverState::ReceivingFf => {
                state = ReceiverState::ReceivingCf;
            }
            ReceiverState::ReceivingCf => return receive_first_frame(link, options, buffer, &mut attempts),
        }
    }
}

/// Reassemble the body of a First Frame + Consecutive Frame stream. Walks
/// the buffer one frame at a time: a CF contributes `mtu-1` payload bytes,
/// a stray FC is skipped (3 bytes, no payload), and any other nibble ends
/// reassembly early with whatever was collected so far appended.
fn receive_first_frame(
    link: &mut dyn SerialLink,
    options: &TransportOptions,
    mut buffer: Vec<u8>,
    attempts: &mut u32,
) -> Result<Vec<u8>, TransportError> {
    let len = ff_payload_len(&buffer);
    let ff_capacity = options.mtu - 2;
    let mut out = buffer.get(2..(2 + ff_capacity).min(buffer.len())).unwrap_or(&[]).to_vec();
    let mut cursor = buffer.len().min(2 + ff_capacity);
    let mut expected_seq: u8 = 1;

    while out.len() < len {
        if cursor >= buffer.len() {
            let more = poll_more(link, options, attempts)?;
            buffer.extend_from_slice(&more);
            continue;
        }
        let nibble = buffer[cursor] >> 4;
        if nibble == PCI_FC {
            if buffer.len() - cursor < 3 {
                let more = poll_more(link, options, attempts)?;
                buffer.extend_from_slice(&more);
                continue;
            }
            cursor += 3;
        } else if nibble == PCI_CF {
            if buffer.len() - cursor < options.mtu {
                let more = poll_more(link, options, attempts)?;
                buffer.extend_from_slice(&more);
                continue;
            }
            let seq = buffer[cursor] & 0x0F;
            if options.receive_mode == ReceiveMode::Strict && seq != expected_seq {
                return Err(TransportError::SequenceMismatch { expected: expected_seq, got: seq });
            }
            expected_seq = expected_seq.wrapping_add(1) & 0x0F;
            out.extend_from_slice(&buffer[cursor + 1..cursor + options.mtu]);
            cursor += options.mtu;
        } else {
            out.extend_from_slice(&buffer[cursor..]);
            break;
        }
    }
    out.truncate(len);
    Ok(out)
}

fn ff_payload_len(buffer: &[u8]) -> usize {
    (((buffer[0] & 0x0F) as usize) << 8) | buffer[1] as usize
}

fn decode_single_frame(buffer: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = (buffer[0] & 0x0F) as usize;
    buffer
        .get(1..1 + len)
        .map(<[u8]>::to_vec)
        .ok_or(TransportError::IncompleteFirstFrame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ScriptedLink;

    #[test]
    fn single_frame_round_trip() {
        let mut link = ScriptedLink::new().push_response(vec![0x02, 0x50, 0x03, 0, 0, 0, 0, 0]);
        let opts = TransportOptions::default();
        let resp = transact(&mut link, &opts, &[0x10, 0x03]).unwrap();
        assert_eq!(resp, vec![0x50, 0x03]);
    }

    #[test]
    fn sends_five_byte_payload_as_single_frame_and_decodes_rsp() {
        let mut link = ScriptedLink::new().push_response(vec![0x03, b'R', b'S', b'P', 0, 0, 0, 0]);
        let opts = TransportOptions::default();
        let resp = transact(&mut link, &opts, &[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
        assert_eq!(resp, b"RSP");
    }

    #[test]
    fn twelve_byte_request_segments_into_ff_plus_one_cf_under_block_size_two() {
        let mut link = ScriptedLink::new()
            .push_response(vec![0x30, 0x02, 0x00, 0, 0, 0, 0, 0])
            .push_response(vec![0x03, b'R', b'S', b'P', 0, 0, 0, 0]);
        let opts = TransportOptions::default();
        let request: Vec<u8> = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C];
        let resp = transact(&mut link, &opts, &request).unwrap();
        assert_eq!(resp, b"RSP");
        // exactly one FF (triggering the Flow Control reply) then one CF.
        assert_eq!(link.writes.len(), 2);
        assert_eq!(link.writes[0][0] >> 4, PCI_FF);
        assert_eq!(link.writes[1][0] >> 4, PCI_CF);
    }

    #[test]
    fn multi_frame_response_reassembles_across_polls() {
        let payload: Vec<u8> = (0..20u8).collect();
        let mut frames = crate::frame::build(&payload, 8).unwrap().into_iter();
        let ff = frames.next().unwrap();
        let cfs: Vec<u8> = frames.flatten().collect();
        let mut link = ScriptedLink::new().push_response(ff).push_response(cfs);
        let opts = TransportOptions::default();
        let resp = transact(&mut link, &opts, &[0x10, 0x03]).unwrap();
        assert_eq!(resp, payload);
        // second write is a passive poll (empty), not an actively generated FC.
        assert!(link.writes[1].is_empty());
    }

    #[test]
    fn multi_frame_response_skips_embedded_flow_control_echo() {
        let payload: Vec<u8> = (0..20u8).collect();
        let mut frames = crate::frame::build(&payload, 8).unwrap().into_iter();
        let ff = frames.next().unwrap();
        let mut cfs: Vec<u8> = Vec::new();
        // an echoed FC frame can land ahead of the consecutive frames.
        cfs.extend_from_slice(&[0x30, 0x00, 0x00, 0, 0, 0, 0, 0]);
        cfs.extend(frames.flatten());
        let mut link = ScriptedLink::new().push_response(ff).push_response(cfs);
        let opts = TransportOptions::default();
        let resp = transact(&mut link, &opts, &[0x10, 0x03]).unwrap();
        assert_eq!(resp, payload);
    }

    #[test]
    fn wait_status_retries_then_succeeds() {
        let req_frames = crate::frame::build(&[0u8; 10], 8).unwrap();
        // FF -> WAIT -> CTS -> SF response.
        let mut link = ScriptedLink::new()
            .push_response(vec![0x31, 0x00, 0x00, 0, 0, 0, 0, 0])
            .push_response(vec![0x30, 0x00, 0x00, 0, 0, 0, 0, 0])
            .push_response(vec![0x02, 0x50, 0x03, 0, 0, 0, 0, 0]);
        let opts = TransportOptions::default();
        let resp = transact(&mut link, &opts, &req_frames.concat()).unwrap();
        assert_eq!(resp, vec![0x50, 0x03]);
    }

    #[test]
    fn six_consecutive_waits_exhaust_the_default_retry_budget() {
        let req_frames = crate::frame::build(&[0u8; 10], 8).unwrap();
        let mut link = ScriptedLink::new();
        for _ in 0..6 {
            link = link.push_response(vec![0x31, 0x00, 0x05, 0, 0, 0, 0, 0]);
        }
        let opts = TransportOptions::default();
        let err = transact(&mut link, &opts, &req_frames.concat()).unwrap_err();
        assert!(err.to_string().contains("WAIT exceeded retries"));
    }

    #[test]
    fn wait_exhaustion_fails() {
        let req_frames = crate::frame::build(&[0u8; 10], 8).unwrap();
        let mut opts = TransportOptions::default();
        opts.max_wait_attempts = 2;
        let mut link = ScriptedLink::new()
            .push_response(vec![0x31, 0x00, 0x00, 0, 0, 0, 0, 0])
            .push_response(vec![0x31, 0x00, 0x00, 0, 0, 0, 0, 0])
            .push_response(vec![0x31, 0x00, 0x00, 0, 0, 0, 0, 0]);
        let err = transact(&mut link, &opts, &req_frames.concat()).unwrap_err();
        assert!(matches!(err, TransportError::WaitExhausted(2)));
    }

    #[test]
    fn overflow_aborts() {
        let req_frames = crate::frame::build(&[0u8; 10], 8).unwrap();
        let opts = TransportOptions::default();
        let mut link = ScriptedLink::new().push_response(vec![0x32, 0x00, 0x00, 0, 0, 0, 0, 0]);
        let err = transact(&mut link, &opts, &req_frames.concat()).unwrap_err();
        assert!(matches!(err, TransportError::Overflow));
    }

    #[test]
    fn strict_mode_rejects_out_of_order_consecutive_frames() {
        let payload: Vec<u8> = (0..20u8).collect();
        let mut frames = crate::frame::build(&payload, 8).unwrap().into_iter();
        let ff = frames.next().unwrap();
        let mut cfs: Vec<Vec<u8>> = frames.collect();
        // swap the sequence numbers of the two CFs so they arrive out of order.
        let tmp = cfs[0][0];
        cfs[0][0] = cfs[1][0];
        cfs[1][0] = tmp;
        let mut link = ScriptedLink::new().push_response(ff).push_response(cfs.concat());
        let mut opts = TransportOptions::default();
        opts.receive_mode = crate::options::ReceiveMode::Strict;
        let err = transact(&mut link, &opts, &[0x10, 0x03]).unwrap_err();
        assert!(matches!(err, TransportError::SequenceMismatch { .. }));
    }

    #[test]
    fn permissive_mode_accepts_out_of_order_consecutive_frames() {
        let payload: Vec<u8> = (0..20u8).collect();
        let mut frames = crate::frame::build(&payload, 8).unwrap().into_iter();
        let ff = frames.next().unwrap();
        let mut cfs: Vec<Vec<u8>> = frames.collect();
        let tmp = cfs[0][0];
        cfs[0][0] = cfs[1][0];
        cfs[1][0] = tmp;
        let mut link = ScriptedLink::new().push_response(ff).push_response(cfs.concat());
        let opts = TransportOptions::default();
        assert!(transact(&mut link, &opts, &[0x10, 0x03]).is_ok());
    }

    #[test]
    fn stmin_decoding() {
        assert_eq!(stmin_to_duration(0x00), Duration::ZERO);
        assert_eq!(stmin_to_duration(0x7F), Duration::from_millis(127));
        assert_eq!(stmin_to_duration(0xF1), Duration::from_micros(100));
        assert_eq!(stmin_to_duration(0xF9), Duration::from_micros(900));
        assert_eq!(stmin_to_duration(0x80), Duration::ZERO);
    }
}
