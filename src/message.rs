//! Polymorphic message handling: a single user message type is
//! marshalled/unmarshalled over whichever wire format the request
//! negotiated, via one uniform trait rather than a deep inheritance chain.

use bytes::{Buf, BufMut};

use crate::status::Status;

/// The closed set of wire formats this crate dispatches over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Binary,
    Json,
}

/// A request or response payload capable of marshalling itself under both
/// the binary (protobuf-shaped) and JSON wire formats.
///
/// Generated code typically implements this as a thin shim around a real
/// protobuf message type plus its `serde` derive; this crate treats the
/// payload as opaque beyond this contract.
pub trait Message: Sized + Send + 'static {
    /// Encode `self` as binary (protobuf) bytes into `buf`.
    fn encode_binary(&self, buf: &mut impl BufMut) -> Result<(), Status>;

    /// Decode a binary (protobuf) payload of exactly `buf.remaining()` bytes.
    fn decode_binary(buf: impl Buf) -> Result<Self, Status>;

    /// Encode `self` as canonical JSON (camelCase field names).
    #[cfg(feature = "json")]
    fn encode_json(&self) -> Result<Vec<u8>, Status>;

    /// Decode a canonical JSON payload. Implementations must reject unknown
    /// fields.
    #[cfg(feature = "json")]
    fn decode_json(bytes: &[u8]) -> Result<Self, Status>;
}
