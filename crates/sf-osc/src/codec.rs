//! OSC wire codec helpers
//!
//! Regular command/reply traffic is encoded and decoded with `rosc`. The
//! loader's delete endpoint is the one exception: it predates the OSC reply
//! path and answers with a bare text datagram, so its request is packed by
//! hand (padded address, type-tag string, big-endian arguments).

use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};

use crate::error::{OscError, OscResult};

/// Encode an OSC message for the given address and arguments.
pub fn encode_message(addr: &str, args: Vec<OscType>) -> OscResult<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    encoder::encode(&packet).map_err(|e| OscError::Encode(e.to_string()))
}

/// Decode a single OSC message from a received datagram.
///
/// Bundles are flattened to their first message; the reply path never carries
/// more than one.
pub fn decode_message(buf: &[u8]) -> OscResult<(String, Vec<OscType>)> {
    let (_rest, packet) =
        decoder::decode_udp(buf).map_err(|e| OscError::Decode(e.to_string()))?;
    match packet {
        OscPacket::Message(msg) => Ok((msg.addr, msg.args)),
        OscPacket::Bundle(bundle) => bundle
            .content
            .into_iter()
            .find_map(|p| match p {
                OscPacket::Message(msg) => Some((msg.addr, msg.args)),
                OscPacket::Bundle(_) => None,
            })
            .ok_or_else(|| OscError::Decode("empty bundle".into())),
    }
}

/// Null-terminate a byte run and pad it out to 4-byte alignment.
fn pad4(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
}

/// Build the loader delete request by hand: padded address string, `,ii`
/// type tag, then two big-endian i32 arguments.
pub fn encode_loader_delete(track: i32, device: i32) -> Vec<u8> {
    let mut out = pad4(b"/loader/device/delete".to_vec());
    out.extend(pad4(b",ii".to_vec()));
    out.extend_from_slice(&track.to_be_bytes());
    out.extend_from_slice(&device.to_be_bytes());
    out
}

/// Extract the last numeric argument of a reply as `f32`.
///
/// Replies often echo the query arguments back (`[track, device, param,
/// value]`), so the value is the final number.
pub fn last_numeric(args: &[OscType]) -> Option<f32> {
    args.iter().rev().find_map(numeric)
}

/// Extract the last numeric argument of a reply, keeping its wire type.
pub fn last_numeric_arg(args: &[OscType]) -> Option<OscType> {
    args.iter().rev().find(|a| numeric(a).is_some()).cloned()
}

/// Compare a readback against the value that was sent.
///
/// Integers and booleans must match exactly; once a float is involved the
/// comparison happens within `tolerance` (normalized space).
pub fn value_matches(actual: &OscType, expected: &OscType, tolerance: f32) -> bool {
    match (actual, expected) {
        (OscType::Int(a), OscType::Int(e)) => a == e,
        (OscType::Long(a), OscType::Long(e)) => a == e,
        (OscType::Bool(a), OscType::Bool(e)) => a == e,
        (OscType::Bool(a), OscType::Int(e)) | (OscType::Int(e), OscType::Bool(a)) => {
            (*a as i32) == *e
        }
        _ => match (numeric(actual), numeric(expected)) {
            (Some(a), Some(e)) => (a - e).abs() < tolerance,
            _ => false,
        },
    }
}

fn numeric(v: &OscType) -> Option<f32> {
    match v {
        OscType::Float(f) => Some(*f),
        OscType::Double(d) => Some(*d as f32),
        OscType::Int(i) => Some(*i as f32),
        OscType::Long(l) => Some(*l as f32),
        OscType::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
