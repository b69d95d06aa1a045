//! `dispatchrpc` implements a server-side unary RPC dispatch engine: it
//! takes one HTTP request that has already been routed to a method, and
//! turns it into a decoded request message, an invocation, and a correctly
//! framed response — whether the wire format on the way in was gRPC's
//! binary length-prefixed framing or a JSON variant of the same contract.
//!
//! It deliberately stops short of being a full gRPC server: there's no
//! connection acceptance, no HTTP/2 multiplexing, and no method routing
//! here — those belong to whatever is wiring this crate's [`dispatch::serve`]
//! into an actual listener. What it does own is everything from "a request
//! arrived for this method" to "here is the response, fully encoded."

mod body;
mod codec;
pub mod dispatch;
pub mod error;
pub mod handler;
mod header;
pub mod message;
pub mod status;
pub mod timeout;

pub use body::DispatchBody;
pub use codec::Compression;
pub use dispatch::{serve, RequestContext};
pub use error::{BoxError, TransportRejection};
pub use handler::{HandlerConfig, HandlerEntry, HandlerOption, Invoke, Registrar};
pub use message::{Message, WireFormat};
pub use status::{Code, Detail, Status};
pub use timeout::TimeoutPolicy;
