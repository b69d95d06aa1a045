//! Supported compressions: `identity` and `gzip`. Unknown names surface as
//! `Unimplemented`, negotiated via `Grpc-Encoding`/`Grpc-Accept-Encoding` in
//! [`crate::header`].

use crate::status::{Code, Status};

/// The closed set of compressions the codec accepts or emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    Identity,
    Gzip,
}

impl Compression {
    /// Parse a single `Grpc-Encoding` token. Returns `None` for anything
    /// that isn't `identity`/`gzip`, letting the caller raise `Unimplemented`
    /// with the right context.
    pub(crate) fn from_token(token: &str) -> Option<Compression> {
        match token {
            "identity" => Some(Compression::Identity),
            #[cfg(feature = "gzip")]
            "gzip" => Some(Compression::Gzip),
            _ => None,
        }
    }

    pub(crate) fn header_value(self) -> &'static str {
        match self {
            Compression::Identity => "identity",
            Compression::Gzip => "gzip",
        }
    }
}

/// Decompress `input` (the declared compression's encoding of the message)
/// into `out`, clearing `out` first. Grounded on tonic's `decompress_buf`
/// scratch-buffer reuse in `Streaming::decode_chunk`.
#[cfg(feature = "gzip")]
pub(crate) fn decompress(encoding: Compression, input: &[u8], out: &mut Vec<u8>) -> Result<(), Status> {
    use std::io::Read;

    out.clear();
    match encoding {
        Compression::Identity => {
            out.extend_from_slice(input);
            Ok(())
        }
        Compression::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(input);
            decoder
                .read_to_end(out)
                .map_err(|e| Status::new(Code::Internal, format!("error decompressing: {e}")))?;
            Ok(())
        }
    }
}

#[cfg(not(feature = "gzip"))]
pub(crate) fn decompress(_encoding: Compression, input: &[u8], out: &mut Vec<u8>) -> Result<(), Status> {
    out.clear();
    out.extend_from_slice(input);
    Ok(())
}

/// Compress `input` under `encoding`. Returns the uncompressed bytes
/// unchanged for `Identity`.
#[cfg(feature = "gzip")]
pub(crate) fn compress(encoding: Compression, input: &[u8]) -> Result<Vec<u8>, Status> {
    use std::io::Write;

    match encoding {
        Compression::Identity => Ok(input.to_vec()),
        Compression::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(input)
                .map_err(|e| Status::new(Code::Internal, format!("error compressing: {e}")))?;
            encoder
                .finish()
                .map_err(|e| Status::new(Code::Internal, format!("error compressing: {e}")))
        }
    }
}

#[cfg(not(feature = "gzip"))]
pub(crate) fn compress(_encoding: Compression, input: &[u8]) -> Result<Vec<u8>, Status> {
    Ok(input.to_vec())
}

/// Parse a comma/space-separated `Grpc-Accept-Encoding` header value and
/// decide the response encoding: prefer `gzip` if present, else `identity`
/// (see DESIGN.md for why this ordering was chosen over other tie-breaks).
pub(crate) fn negotiate_response_encoding(accept_encoding: Option<&str>, gzip_allowed: bool) -> Compression {
    if !gzip_allowed {
        return Compression::Identity;
    }
    let Some(value) = accept_encoding else {
        return Compression::Identity;
    };
    let saw_gzip = value
        .split([',', ' '])
        .map(str::trim)
        .any(|tok| tok.eq_ignore_ascii_case("gzip"));
    if saw_gzip {
        Compression::Gzip
    } else {
        Compression::Identity
    }
}
