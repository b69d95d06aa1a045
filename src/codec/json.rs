//! JSON framing: one JSON object per message, the whole body is one
//! request/response. Compression, when negotiated, applies to the entire
//! body (`Content-Encoding` semantics) rather than per-message.

#![cfg(feature = "json")]

use crate::status::{Code, Status};

/// Reject trailing non-whitespace bytes after the JSON value.
pub(crate) fn validate_single_value(bytes: &[u8]) -> Result<(), Status> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    // Advance past exactly one JSON value without building a concrete type;
    // `IgnoredAny` accepts anything so this only checks well-formedness and
    // leftover bytes.
    serde::de::Deserialize::deserialize(&mut de)
        .map(|_: serde::de::IgnoredAny| ())
        .map_err(|e| Status::new(Code::InvalidArgument, format!("invalid JSON body: {e}")))?;

    let trailing = &bytes[de.byte_offset()..];
    if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
        return Err(Status::new(Code::InvalidArgument, "trailing bytes after JSON message"));
    }
    Ok(())
}
