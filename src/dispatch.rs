//! The dispatch engine: the state machine that takes an inbound HTTP
//! request, negotiates method/content-type/compression, decodes a message,
//! invokes a [`HandlerEntry`], and re-encodes the outcome under whichever
//! wire format was chosen — binary trailers or a JSON body.
//!
//! Modeled as a plain async function rather than a `tower::Service`: request
//! routing to a particular method, and the HTTP/2 connection machinery
//! around it, happens one layer up — this function only runs once a method
//! has already been selected.

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use http_body_util::BodyExt;
use tokio::sync::oneshot;

use crate::body::DispatchBody;
use crate::codec::{binary, Compression};
#[cfg(feature = "json")]
use crate::codec::json;
use crate::error::{BoxError, TransportRejection};
use crate::handler::HandlerEntry;
use crate::header;
use crate::message::{Message, WireFormat};
use crate::status::{Code, Status};
use crate::timeout::{self, TimeoutGrant};

/// Everything a handler callable needs about the request in progress: the
/// inbound headers, the deadline/cancellation grant, and the wire-level
/// choices already negotiated before invocation.
pub struct RequestContext {
    headers: HeaderMap,
    grant: TimeoutGrant,
    cancelled: oneshot::Receiver<()>,
    wire_format: WireFormat,
    request_encoding: Option<Compression>,
    response_encoding: Compression,
}

impl RequestContext {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.grant.deadline()
    }

    pub fn is_expired(&self) -> bool {
        self.grant.is_expired()
    }

    /// Resolves once the request's cancellation trigger fires — either the
    /// [`TimeoutGrant`] was dropped (request finished or deadline lapsed) or
    /// the caller disconnected upstream of this crate.
    pub async fn cancelled(&mut self) {
        let _ = (&mut self.cancelled).await;
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    pub fn request_encoding(&self) -> Option<Compression> {
        self.request_encoding
    }

    pub fn response_encoding(&self) -> Compression {
        self.response_encoding
    }
}

/// Dispatch one unary RPC call through `handler`: method check, content
/// negotiation, the binary-or-JSON branch, timeout derivation, decode,
/// invocation, and finally response encoding with its trailers or body.
///
/// `request` must already have been routed to `handler`'s method; this
/// function does not consult the request path or perform method lookup. The
/// request body is read here — collected fully before decoding, since
/// unary semantics mean it is always exactly one message — and is
/// guaranteed to be drained on every exit path, including the transport
/// rejections that precede content negotiation.
pub async fn serve<Req, Resp, B>(handler: &HandlerEntry<Req, Resp>, request: Request<B>) -> Response<DispatchBody>
where
    Req: Message,
    Resp: Message,
    B: http_body::Body<Data = Bytes> + Send,
    B::Error: Into<BoxError>,
{
    // METHOD_CHECK
    if !header::check_method(request.method()) {
        let _ = collect_request_body(request.into_body()).await;
        return transport_rejection_response(TransportRejection::MethodNotAllowed);
    }

    let config = handler.config();

    // CONTENT_NEG
    let Some((wire_format, content_type)) = header::negotiate_content_type(request.headers(), config.allow_json) else {
        let _ = collect_request_body(request.into_body()).await;
        return transport_rejection_response(TransportRejection::UnsupportedMediaType {
            allow_json: config.allow_json,
        });
    };

    let (parts, body) = request.into_parts();
    let body = match collect_request_body(body).await {
        Ok(bytes) => bytes,
        Err(status) => {
            return match wire_format {
                WireFormat::Binary => binary_error_response(status, content_type, Compression::Identity),
                #[cfg(feature = "json")]
                WireFormat::Json => json_error_response(status, Compression::Identity),
                #[cfg(not(feature = "json"))]
                WireFormat::Json => unreachable!("negotiate_content_type never returns Json when allow_json is false"),
            };
        }
    };

    match wire_format {
        WireFormat::Binary => serve_binary(handler, &parts.headers, body, content_type).await,
        #[cfg(feature = "json")]
        WireFormat::Json => serve_json(handler, &parts.headers, body).await,
        #[cfg(not(feature = "json"))]
        WireFormat::Json => unreachable!("negotiate_content_type never returns Json when allow_json is false"),
    }
}

/// Fully drain `body` into one contiguous `Bytes` buffer, the blocking-I/O
/// suspension point spec.md §5 names as one of the three this core owns.
/// Any transport-level read failure projects to `Status` the same way an
/// application error would, via `Status::from_error`.
async fn collect_request_body<B>(body: B) -> Result<Bytes, Status>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match body.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => {
            let err: BoxError = err.into();
            Err(Status::from_error(err.as_ref()))
        }
    }
}

async fn serve_binary<Req, Resp>(
    handler: &HandlerEntry<Req, Resp>,
    headers: &HeaderMap,
    body: Bytes,
    content_type: &'static str,
) -> Response<DispatchBody>
where
    Req: Message,
    Resp: Message,
{
    let config = handler.config();

    let request_encoding = match header::negotiate_request_encoding(headers) {
        Ok(enc) => enc,
        Err(()) => {
            let status = Status::new(Code::Unimplemented, "unsupported grpc-encoding");
            return binary_error_response(status, content_type, Compression::Identity);
        }
    };

    let response_encoding = header::negotiate_response_encoding(headers, request_encoding, config.allow_gzip_response);

    // TIMEOUT
    let client_timeout = match timeout::try_parse_grpc_timeout(headers) {
        Ok(t) => t,
        Err(status) => return binary_error_response(status, content_type, response_encoding),
    };
    let effective = match timeout::clamp(client_timeout, config.timeout_policy()) {
        Ok(e) => e,
        Err(status) => return binary_error_response(status, content_type, response_encoding),
    };
    let (grant, cancelled) = TimeoutGrant::new(effective);

    // DECODE
    let decoded = match binary::decode_frame(&body, request_encoding, config.max_request_bytes) {
        Ok(bytes) => bytes,
        Err(status) => return binary_error_response(status, content_type, response_encoding),
    };
    let req = match Req::decode_binary(decoded) {
        Ok(req) => req,
        Err(status) => return binary_error_response(status, content_type, response_encoding),
    };

    let ctx = RequestContext {
        headers: headers.clone(),
        grant,
        cancelled,
        wire_format: WireFormat::Binary,
        request_encoding,
        response_encoding,
    };

    // INVOKE
    let outcome = invoke_with_deadline(handler, ctx, req).await;

    match outcome {
        Ok(resp) => {
            // RESP_ENCODE
            let mut payload = Vec::new();
            if let Err(status) = resp.encode_binary(&mut payload) {
                return binary_error_response(status, content_type, response_encoding);
            }
            let frame = match binary::encode_frame(&payload, response_encoding) {
                Ok(frame) => frame,
                Err(status) => {
                    tracing::debug!(?response_encoding, "failed to encode response frame");
                    return binary_error_response(status, content_type, response_encoding);
                }
            };
            binary_success_response(frame, content_type, response_encoding)
        }
        Err(status) => binary_error_response(status, content_type, response_encoding),
    }
}

#[cfg(feature = "json")]
async fn serve_json<Req, Resp>(handler: &HandlerEntry<Req, Resp>, headers: &HeaderMap, body: Bytes) -> Response<DispatchBody>
where
    Req: Message,
    Resp: Message,
{
    let config = handler.config();

    // RESP_COMP — whole-body Content-Encoding, negotiated once up front so
    // it applies uniformly to both the success and error response paths.
    let response_encoding = header::negotiate_json_response_encoding(headers, config.allow_gzip_response);

    // TIMEOUT — the timeout controller is shared by both wire formats;
    // deadline derivation doesn't depend on content negotiation.
    let client_timeout = match timeout::try_parse_grpc_timeout(headers) {
        Ok(t) => t,
        Err(status) => return json_error_response(status, response_encoding),
    };
    let effective = match timeout::clamp(client_timeout, config.timeout_policy()) {
        Ok(e) => e,
        Err(status) => return json_error_response(status, response_encoding),
    };
    let (grant, cancelled) = TimeoutGrant::new(effective);

    // DECODE
    if let Err(status) = json::validate_single_value(&body) {
        return json_error_response(status, response_encoding);
    }
    let req = match Req::decode_json(&body) {
        Ok(req) => req,
        Err(status) => return json_error_response(status, response_encoding),
    };

    let ctx = RequestContext {
        headers: headers.clone(),
        grant,
        cancelled,
        wire_format: WireFormat::Json,
        request_encoding: None,
        response_encoding,
    };

    // INVOKE
    match invoke_with_deadline(handler, ctx, req).await {
        Ok(resp) => match resp.encode_json() {
            Ok(bytes) => json_success_response(bytes, response_encoding),
            Err(status) => json_error_response(status, response_encoding),
        },
        Err(status) => json_error_response(status, response_encoding),
    }
}

/// Invoke the handler, racing it against the deadline if one was installed
/// — a lapsed deadline surfaces `DeadlineExceeded` rather than hanging.
/// Dropping the losing branch's `ctx`/grant here is what fires the
/// cancellation trigger the handler is expected to observe via
/// `RequestContext::cancelled`.
async fn invoke_with_deadline<Req, Resp>(handler: &HandlerEntry<Req, Resp>, ctx: RequestContext, req: Req) -> Result<Resp, Status>
where
    Req: Message,
    Resp: Message,
{
    let deadline = ctx.deadline();
    let call = handler.invoke.call(ctx, req);

    match deadline {
        Some(deadline) => {
            tokio::select! {
                result = call => result,
                _ = tokio::time::sleep_until(deadline) => {
                    Err(Status::new(Code::DeadlineExceeded, "deadline exceeded before handler completed"))
                }
            }
        }
        None => call.await,
    }
}

fn transport_rejection_response(rejection: TransportRejection) -> Response<DispatchBody> {
    let response = match rejection {
        TransportRejection::MethodNotAllowed => header::method_not_allowed_response::<()>(),
        TransportRejection::UnsupportedMediaType { allow_json } => header::unsupported_media_type_response::<()>(allow_json),
    };
    response.map(|()| DispatchBody::empty())
}

/// Binary success path: `200 OK`, the fixed binary headers, the one LPM
/// frame, then an `Ok` status in trailers. `content_type` mirrors whichever
/// of `application/grpc`/`application/grpc+proto` the request carried (§3
/// invariant: response content type always equals the request's).
fn binary_success_response(frame: Bytes, content_type: &'static str, response_encoding: Compression) -> Response<DispatchBody> {
    let mut response = Response::new(());
    header::set_binary_response_headers(response.headers_mut(), content_type, response_encoding);

    let mut trailers = HeaderMap::new();
    Status::ok().add_trailers(&mut trailers);

    response.map(|()| DispatchBody::new(frame, Some(trailers)))
}

/// Binary error path: still `200 OK` with the fixed binary headers — the
/// failure is carried entirely in trailers, per gRPC's "HTTP transport
/// succeeded, the RPC failed" distinction.
fn binary_error_response(status: Status, content_type: &'static str, response_encoding: Compression) -> Response<DispatchBody> {
    let mut response = Response::new(());
    header::set_binary_response_headers(response.headers_mut(), content_type, response_encoding);

    let mut trailers = HeaderMap::new();
    status.add_trailers(&mut trailers);

    response.map(|()| DispatchBody::with_trailers(trailers))
}

#[cfg(feature = "json")]
fn json_success_response(bytes: Vec<u8>, response_encoding: Compression) -> Response<DispatchBody> {
    let mut response = Response::new(());
    set_json_response_headers(response.headers_mut(), response_encoding);
    let body = encode_json_body(bytes, response_encoding);
    response.map(|()| DispatchBody::new(body, None))
}

/// JSON-mode error path: the gRPC code projects to an HTTP status and the
/// body carries `{"code", "message"}` — no trailers, since the whole
/// response is the error channel in this mode.
#[cfg(feature = "json")]
fn json_error_response(status: Status, response_encoding: Compression) -> Response<DispatchBody> {
    let mut response = Response::new(());
    *response.status_mut() = status.code().to_http_status();
    set_json_response_headers(response.headers_mut(), response_encoding);
    let bytes = serde_json::to_vec(&status.to_json_body()).unwrap_or_default();
    let body = encode_json_body(bytes, response_encoding);
    response.map(|()| DispatchBody::new(body, None))
}

#[cfg(feature = "json")]
fn set_json_response_headers(headers: &mut HeaderMap, response_encoding: Compression) {
    headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    if response_encoding != Compression::Identity {
        headers.insert(
            http::header::CONTENT_ENCODING,
            http::HeaderValue::from_static(response_encoding.header_value()),
        );
    }
}

/// Compress the whole JSON body per `response_encoding` (whole-body
/// `Content-Encoding` semantics, not per-message framing). Falls back to the
/// uncompressed bytes if compression unexpectedly fails, since a JSON body
/// write cannot be undone once the status line is committed (§4.5 invariant
/// 4) — better to ship an uncompressed-but-correct body than none at all.
#[cfg(feature = "json")]
fn encode_json_body(bytes: Vec<u8>, response_encoding: Compression) -> Bytes {
    match crate::codec::compression::compress(response_encoding, &bytes) {
        Ok(compressed) => Bytes::from(compressed),
        Err(_) => {
            tracing::debug!(?response_encoding, "failed to compress JSON response body");
            Bytes::from(bytes)
        }
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(RequestContext: Send);
#[cfg(test)]
static_assertions::assert_impl_all!(DispatchBody: Send);
