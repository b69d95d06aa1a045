//! Crate-wide error plumbing for failures that occur before a
//! [`crate::status::Status`] can even be constructed.

use std::fmt;

/// Type-erased error, used the same way across this crate's internals as a
/// catch-all for causes that don't need their own variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A pure-HTTP failure: the request never reached the point where an RPC
/// status makes sense (wrong method, unsupported content type). These map
/// directly to an HTTP response with no gRPC trailers at all.
#[derive(Debug)]
pub enum TransportRejection {
    /// Any method other than POST.
    MethodNotAllowed,
    /// Content-Type is not one of the recognised set; carries whether JSON
    /// is currently allowed, so the 415 response can list it in `Accept-Post`.
    UnsupportedMediaType { allow_json: bool },
}

impl fmt::Display for TransportRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportRejection::MethodNotAllowed => write!(f, "method not allowed, POST required"),
            TransportRejection::UnsupportedMediaType { .. } => {
                write!(f, "unsupported content type")
            }
        }
    }
}

impl std::error::Error for TransportRejection {}
