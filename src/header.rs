//! The header protocol: content-type negotiation, compression negotiation,
//! the fixed binary-mode response headers, and trailer emission.

use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::codec::compression::{self, Compression};
use crate::message::WireFormat;

pub(crate) const GRPC_ENCODING_HEADER: &str = "grpc-encoding";
pub(crate) const GRPC_ACCEPT_ENCODING_HEADER: &str = "grpc-accept-encoding";
pub(crate) const ACCEPT_POST_HEADER: &str = "accept-post";
pub(crate) const USER_AGENT_VALUE: &str = concat!("dispatchrpc/", env!("CARGO_PKG_VERSION"));

const CONTENT_TYPE_GRPC: &str = "application/grpc";
const CONTENT_TYPE_GRPC_PROTO: &str = "application/grpc+proto";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Content types this server recognises, with `allow_json` deciding whether
/// JSON is in the set at all. Returns the matched wire format *and* the
/// canonical content-type string that matched, since the response must
/// mirror the exact request content type (`application/grpc` vs.
/// `application/grpc+proto`) rather than collapsing both to one literal.
pub(crate) fn negotiate_content_type(headers: &HeaderMap, allow_json: bool) -> Option<(WireFormat, &'static str)> {
    let content_type = headers.get(http::header::CONTENT_TYPE)?.to_str().ok()?;
    // Accept a leading `application/grpc` / `application/grpc+proto` with
    // an optional `;`-delimited parameter suffix (e.g. charset), matching
    // "anything starting with application/grpc should be supported".
    let base = content_type.split(';').next().unwrap_or(content_type).trim();

    if base == CONTENT_TYPE_GRPC {
        Some((WireFormat::Binary, CONTENT_TYPE_GRPC))
    } else if base == CONTENT_TYPE_GRPC_PROTO {
        Some((WireFormat::Binary, CONTENT_TYPE_GRPC_PROTO))
    } else if allow_json && base == CONTENT_TYPE_JSON {
        Some((WireFormat::Json, CONTENT_TYPE_JSON))
    } else {
        None
    }
}

/// The `Accept-Post` value advertised on a 415 response.
pub(crate) fn accept_post_value(allow_json: bool) -> &'static str {
    if allow_json {
        "application/grpc, application/grpc+proto, application/json"
    } else {
        "application/grpc, application/grpc+proto"
    }
}

/// Only POST is accepted; anything else is a 405 with `Allow: POST`.
pub(crate) fn check_method(method: &Method) -> bool {
    method == Method::POST
}

/// Request compression negotiation (binary mode only): absent or `identity`
/// means uncompressed; unknown tokens are reported to the caller so it can
/// raise `Unimplemented` with the `Grpc-Accept-Encoding` header.
pub(crate) fn negotiate_request_encoding(headers: &HeaderMap) -> Result<Option<Compression>, ()> {
    let Some(value) = headers.get(GRPC_ENCODING_HEADER) else {
        return Ok(None);
    };
    let token = value.to_str().map_err(|_| ())?;
    match compression::Compression::from_token(token) {
        Some(Compression::Identity) => Ok(None),
        Some(other) => Ok(Some(other)),
        None => Err(()),
    }
}

/// Response compression negotiation (binary mode): mirrors the request
/// encoding by default; if the client sent `Grpc-Accept-Encoding`, prefer
/// gzip if present else identity; administratively disabling gzip always
/// wins.
pub(crate) fn negotiate_response_encoding(
    headers: &HeaderMap,
    request_encoding: Option<Compression>,
    gzip_allowed: bool,
) -> Compression {
    if let Some(accept) = headers.get(GRPC_ACCEPT_ENCODING_HEADER).and_then(|v| v.to_str().ok()) {
        compression::negotiate_response_encoding(Some(accept), gzip_allowed)
    } else {
        match request_encoding {
            Some(Compression::Gzip) if gzip_allowed => Compression::Gzip,
            _ => Compression::Identity,
        }
    }
}

/// JSON-mode response compression negotiation: standard HTTP
/// `Accept-Encoding`, applied at whole-body granularity rather than
/// per-message. Administratively disabling gzip always wins.
pub(crate) fn negotiate_json_response_encoding(headers: &HeaderMap, gzip_allowed: bool) -> Compression {
    if !gzip_allowed {
        return Compression::Identity;
    }
    let Some(accept) = headers.get(http::header::ACCEPT_ENCODING).and_then(|v| v.to_str().ok()) else {
        return Compression::Identity;
    };
    let saw_gzip = accept
        .split(',')
        .map(|tok| tok.split(';').next().unwrap_or(tok).trim())
        .any(|tok| tok.eq_ignore_ascii_case("gzip"));
    if saw_gzip {
        Compression::Gzip
    } else {
        Compression::Identity
    }
}

/// Set the fixed binary-mode response headers: content type,
/// `Grpc-Accept-Encoding`, `User-Agent`, and the trailer declaration. Must
/// be called before any body bytes are written.
pub(crate) fn set_binary_response_headers(headers: &mut HeaderMap, content_type: &'static str, response_encoding: Compression) {
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(GRPC_ACCEPT_ENCODING_HEADER, HeaderValue::from_static("gzip, identity"));
    headers.insert(http::header::USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers.insert(GRPC_ENCODING_HEADER, HeaderValue::from_static(response_encoding.header_value()));
    headers.insert(
        http::header::TRAILER,
        HeaderValue::from_static("grpc-status, grpc-message, grpc-status-details-bin"),
    );
}

/// The fixed 415 response for an unsupported content type.
pub(crate) fn unsupported_media_type_response<B: Default>(allow_json: bool) -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    *response.status_mut() = StatusCode::UNSUPPORTED_MEDIA_TYPE;
    response.headers_mut().insert(
        ACCEPT_POST_HEADER,
        HeaderValue::from_static(accept_post_value(allow_json)),
    );
    response
}

/// The fixed 405 response for a non-POST method.
pub(crate) fn method_not_allowed_response<B: Default>() -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    response
        .headers_mut()
        .insert(http::header::ALLOW, HeaderValue::from_static("POST"));
    response
}
