//! The canonical RPC status model: a numeric [`Code`] plus a message and
//! optional opaque detail envelopes, projectable to HTTP trailers (binary
//! mode) or an HTTP status + JSON body (JSON mode).

use base64::Engine;
use bytes::Bytes;
use http::header::HeaderValue;
use http::StatusCode;
use percent_encoding::{percent_decode, percent_encode, AsciiSet, CONTROLS};
use std::{error::Error as StdError, fmt};

pub(crate) const GRPC_STATUS_HEADER: &str = "grpc-status";
pub(crate) const GRPC_MESSAGE_HEADER: &str = "grpc-message";
pub(crate) const GRPC_STATUS_DETAILS_HEADER: &str = "grpc-status-details-bin";

/// Octets that must be percent-encoded in a `Grpc-Message` header value:
/// anything outside printable ASCII, plus `%` itself.
const MESSAGE_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'%').add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

/// The closed gRPC code space, mirroring the canonical set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Code {
        match bytes {
            b"0" => Code::Ok,
            b"1" => Code::Canceled,
            b"2" => Code::Unknown,
            b"3" => Code::InvalidArgument,
            b"4" => Code::DeadlineExceeded,
            b"5" => Code::NotFound,
            b"6" => Code::AlreadyExists,
            b"7" => Code::PermissionDenied,
            b"8" => Code::ResourceExhausted,
            b"9" => Code::FailedPrecondition,
            b"10" => Code::Aborted,
            b"11" => Code::OutOfRange,
            b"12" => Code::Unimplemented,
            b"13" => Code::Internal,
            b"14" => Code::Unavailable,
            b"15" => Code::DataLoss,
            b"16" => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    pub(crate) fn to_header_value(self) -> HeaderValue {
        HeaderValue::from_static(match self {
            Code::Ok => "0",
            Code::Canceled => "1",
            Code::Unknown => "2",
            Code::InvalidArgument => "3",
            Code::DeadlineExceeded => "4",
            Code::NotFound => "5",
            Code::AlreadyExists => "6",
            Code::PermissionDenied => "7",
            Code::ResourceExhausted => "8",
            Code::FailedPrecondition => "9",
            Code::Aborted => "10",
            Code::OutOfRange => "11",
            Code::Unimplemented => "12",
            Code::Internal => "13",
            Code::Unavailable => "14",
            Code::DataLoss => "15",
            Code::Unauthenticated => "16",
        })
    }

    /// The canonical HTTP status projection, used only in JSON mode.
    pub fn to_http_status(self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::Canceled => StatusCode::from_u16(499).expect("499 is a valid status code"),
            Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::FailedPrecondition => StatusCode::BAD_REQUEST,
            Code::Aborted => StatusCode::CONFLICT,
            Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// The lower-snake-case name used for the `code` field of a JSON-mode
    /// error body.
    fn to_json_code_str(self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl From<i32> for Code {
    fn from(i: i32) -> Self {
        match i {
            0 => Code::Ok,
            1 => Code::Canceled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }
}

/// A single opaque, typed error detail envelope (type URL + encoded bytes).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detail {
    pub type_url: String,
    pub value: Bytes,
}

impl Detail {
    pub fn new(type_url: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            type_url: type_url.into(),
            value: value.into(),
        }
    }
}

/// The result of an RPC call: a code, a human message, and optional details.
#[derive(Clone)]
pub struct Status {
    code: Code,
    message: String,
    details: Vec<Detail>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Status {
        Status {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn ok() -> Status {
        Status::new(Code::Ok, "")
    }

    pub fn with_details(code: Code, message: impl Into<String>, details: Vec<Detail>) -> Status {
        Status {
            code,
            message: message.into(),
            details,
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[Detail] {
        &self.details
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.code, Code::Ok)
    }

    /// Build a `Status` from an arbitrary boxed error. If the error (or one
    /// of its sources) is itself a `Status`, that status is reused verbatim;
    /// otherwise the error projects to `{Unknown, err.to_string(), []}`.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Status {
        let mut cause = Some(err);
        while let Some(err) = cause {
            if let Some(status) = err.downcast_ref::<Status>() {
                return status.clone();
            }
            cause = err.source();
        }
        Status::new(Code::Unknown, err.to_string())
    }

    /// Insert the three reserved trailer slots into `trailers`. Every
    /// binary-mode response — success or failure — carries exactly these
    /// three names.
    pub(crate) fn add_trailers(&self, trailers: &mut http::HeaderMap) {
        trailers.insert(GRPC_STATUS_HEADER, self.code.to_header_value());

        let message_value = if self.message.is_empty() {
            HeaderValue::from_static("")
        } else {
            let needs_encoding = self.message.bytes().any(|b| !b.is_ascii_graphic() && b != b' ');
            let raw = if needs_encoding {
                percent_encode(self.message.as_bytes(), MESSAGE_ENCODE_SET).to_string()
            } else {
                self.message.clone()
            };
            HeaderValue::from_str(&raw).unwrap_or_else(|_| {
                tracing::debug!("invalid header value byte building grpc-message trailer");
                HeaderValue::from_static("")
            })
        };
        trailers.insert(GRPC_MESSAGE_HEADER, message_value);

        let details_value = if self.details.is_empty() {
            HeaderValue::from_static("")
        } else {
            let encoded = base64::engine::general_purpose::STANDARD.encode(self.encode_details());
            HeaderValue::from_str(&encoded).unwrap_or_else(|_| {
                tracing::debug!("invalid header value byte building grpc-status-details-bin trailer");
                HeaderValue::from_static("")
            })
        };
        trailers.insert(GRPC_STATUS_DETAILS_HEADER, details_value);
    }

    /// A minimal, stable binary envelope for the detail list: each detail is
    /// `u32 type_url_len | type_url | u32 value_len | value`, concatenated.
    /// This is opaque to clients — the exact framing only has to round-trip
    /// within this crate.
    fn encode_details(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for d in &self.details {
            buf.extend_from_slice(&(d.type_url.len() as u32).to_be_bytes());
            buf.extend_from_slice(d.type_url.as_bytes());
            buf.extend_from_slice(&(d.value.len() as u32).to_be_bytes());
            buf.extend_from_slice(&d.value);
        }
        buf
    }

    /// Recover a `Status` from response trailers, decoding the percent- and
    /// base64-encoded slots. Returns `None` if `Grpc-Status` is absent.
    pub(crate) fn from_trailers(trailers: &http::HeaderMap) -> Option<Status> {
        let code = Code::from_bytes(trailers.get(GRPC_STATUS_HEADER)?.as_bytes());
        let message = trailers
            .get(GRPC_MESSAGE_HEADER)
            .map(|v| {
                percent_decode(v.as_bytes())
                    .decode_utf8()
                    .map(|cow| cow.into_owned())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        Some(Status::new(code, message))
    }

    /// Body used for JSON-mode error responses.
    #[cfg(feature = "json")]
    pub(crate) fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.to_json_code_str(),
            "message": self.message,
        })
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Status");
        builder.field("code", &self.code);
        if !self.message.is_empty() {
            builder.field("message", &self.message);
        }
        if !self.details.is_empty() {
            builder.field("details", &self.details);
        }
        builder.finish()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status: {:?}, message: {:?}", self.code, self.message)
    }
}

impl StdError for Status {}
