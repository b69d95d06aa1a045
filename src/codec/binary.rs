//! Length-prefixed message (LPM) framing for binary mode. One frame:
//! `flags:u8 | length:u32be | payload`.
//!
//! The decoder is specialized to the unary case: since streaming isn't
//! supported, a request/response body is always exactly one frame, so
//! rather than driving an incremental decode state machine over a polled
//! `Body`, this collects the whole body first and parses it in one pass —
//! any bytes left over after the one message is itself an error.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::compression::{self, Compression};
use crate::status::{Code, Status};

pub(crate) const HEADER_LEN: usize = 5;

const FLAG_COMPRESSED: u8 = 1;

/// Decode exactly one LPM frame from `body`, honoring `max_bytes` (0 =
/// unbounded) and the negotiated request `compression`.
///
/// Errors:
/// - unexpected EOF (fewer than 5 header bytes, or fewer payload bytes than
///   declared) → `InvalidArgument`
/// - compressed flag set but no compression negotiated → `InvalidArgument`
/// - declared length exceeds `max_bytes` → `ResourceExhausted`, without
///   consuming the stream beyond the 5-byte header
pub(crate) fn decode_frame(
    body: &[u8],
    compression: Option<Compression>,
    max_bytes: usize,
) -> Result<Bytes, Status> {
    if body.len() < HEADER_LEN {
        return Err(Status::new(Code::InvalidArgument, "unexpected EOF decoding LPM header"));
    }

    let mut header = &body[..HEADER_LEN];
    let flags = header.get_u8();
    let len = header.get_u32() as usize;

    if max_bytes != 0 && len > max_bytes {
        return Err(Status::new(
            Code::ResourceExhausted,
            format!("message length {len} exceeds maximum of {max_bytes}"),
        ));
    }

    let is_compressed = match flags {
        0 => false,
        FLAG_COMPRESSED => true,
        other => {
            return Err(Status::new(
                Code::InvalidArgument,
                format!("invalid compression flag: {other} (valid flags are 0 and 1)"),
            ));
        }
    };

    if is_compressed && compression.is_none() {
        return Err(Status::new(
            Code::InvalidArgument,
            "compressed-flag set but no grpc-encoding was specified",
        ));
    }

    let payload = &body[HEADER_LEN..];
    if payload.len() < len {
        return Err(Status::new(Code::InvalidArgument, "unexpected EOF decoding LPM payload"));
    }
    let payload = &payload[..len];

    if is_compressed {
        let mut out = Vec::new();
        compression::decompress(compression.expect("checked above"), payload, &mut out)?;
        Ok(Bytes::from(out))
    } else {
        Ok(Bytes::copy_from_slice(payload))
    }
}

/// Encode a single LPM frame. If compression would not shrink the payload
/// (or `compression` is `Identity`), the flag is cleared and the message is
/// emitted uncompressed.
pub(crate) fn encode_frame(payload: &[u8], compression: Compression) -> Result<Bytes, Status> {
    let compressed = compression::compress(compression, payload)?;

    let (flag, body): (u8, &[u8]) = if compression != Compression::Identity && compressed.len() < payload.len() {
        (1, &compressed)
    } else {
        (0, payload)
    };

    let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
    out.put_u8(flag);
    out.put_u32(body.len() as u32);
    out.put_slice(body);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(flag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.push(flag);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn decodes_uncompressed_frame() {
        let payload = b"hello";
        let wire = frame(0, payload);
        let decoded = decode_frame(&wire, None, 0).unwrap();
        assert_eq!(&decoded[..], payload);
    }

    #[test]
    fn truncated_header_is_invalid_argument() {
        let err = decode_frame(&[0, 0, 0], None, 0).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn truncated_payload_is_invalid_argument() {
        let mut wire = frame(0, b"hello world");
        wire.truncate(HEADER_LEN + 3);
        let err = decode_frame(&wire, None, 0).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn compressed_flag_without_encoding_is_invalid_argument() {
        let wire = frame(1, b"hello");
        let err = decode_frame(&wire, None, 0).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn invalid_flag_byte_is_invalid_argument() {
        let wire = frame(7, b"hello");
        let err = decode_frame(&wire, None, 0).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn oversize_declared_length_is_resource_exhausted() {
        let wire = frame(0, &vec![0u8; 2048]);
        let err = decode_frame(&wire, None, 1024).unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let payload = b"{\"number\":42}";
        let encoded = encode_frame(payload, Compression::Identity).unwrap();
        let decoded = decode_frame(&encoded, None, 0).unwrap();
        assert_eq!(&decoded[..], payload);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn encode_then_decode_round_trips_with_gzip() {
        let payload = b"hello".repeat(50);
        let encoded = encode_frame(&payload, Compression::Gzip).unwrap();
        assert_eq!(encoded[0], 1, "compression should have shrunk a repetitive payload");
        let decoded = decode_frame(&encoded, Some(Compression::Gzip), 0).unwrap();
        assert_eq!(&decoded[..], &payload[..]);
    }

    #[test]
    fn small_payload_is_not_compressed_even_if_requested() {
        let payload = b"hi";
        let encoded = encode_frame(payload, Compression::Gzip).unwrap();
        assert_eq!(encoded[0], 0, "gzip overhead would grow a tiny payload, so flag stays clear");
    }
}
