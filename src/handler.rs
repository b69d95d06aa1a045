//! The handler registry entry: binds a fully-qualified method name to an
//! invocation callable and a configuration record, optionally publishing
//! its name to an external [`Registrar`].
//!
//! Options are builder-closure-over-config transformers, applied in order
//! to a zero-valued config, rather than a derive-based builder crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::status::Status;
use crate::timeout::TimeoutPolicy;

/// Immutable per-handler configuration.
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub(crate) min_timeout: Duration,
    pub(crate) max_timeout: Duration,
    pub(crate) allow_gzip_response: bool,
    pub(crate) allow_json: bool,
    pub(crate) max_request_bytes: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            min_timeout: Duration::ZERO,
            max_timeout: Duration::ZERO,
            allow_gzip_response: true,
            allow_json: true,
            max_request_bytes: 0,
        }
    }
}

impl HandlerConfig {
    pub(crate) fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            min: self.min_timeout,
            max: self.max_timeout,
        }
    }
}

/// A single configuration transformer.
pub struct HandlerOption(Box<dyn FnOnce(HandlerConfig) -> HandlerConfig + Send>);

impl HandlerOption {
    fn new(f: impl FnOnce(HandlerConfig) -> HandlerConfig + Send + 'static) -> Self {
        HandlerOption(Box::new(f))
    }

    pub fn min_timeout(d: Duration) -> Self {
        Self::new(move |mut c| {
            c.min_timeout = d;
            c
        })
    }

    pub fn max_timeout(d: Duration) -> Self {
        Self::new(move |mut c| {
            c.max_timeout = d;
            c
        })
    }

    pub fn allow_gzip_response(allow: bool) -> Self {
        Self::new(move |mut c| {
            c.allow_gzip_response = allow;
            c
        })
    }

    pub fn allow_json(allow: bool) -> Self {
        Self::new(move |mut c| {
            c.allow_json = allow;
            c
        })
    }

    pub fn max_request_bytes(max: usize) -> Self {
        Self::new(move |mut c| {
            c.max_request_bytes = max;
            c
        })
    }
}

/// External collaborator that records registered method names for
/// introspection. Opaque to the dispatch engine: this crate only ever calls
/// `register` once, synchronously, at construction time.
pub trait Registrar: Send + Sync {
    fn register(&self, fully_qualified_method: &str);
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The user-supplied per-method implementation: given the deadline-bearing
/// request context and the decoded request message, returns a response
/// message or a [`Status`]-carrying error.
///
/// `Req`/`Resp` are the method's request/response [`crate::message::Message`]
/// types; the callable is boxed because methods across a service differ in
/// their concrete message types.
pub trait Invoke<Req, Resp>: Send + Sync {
    fn call(&self, ctx: crate::dispatch::RequestContext, req: Req) -> BoxFuture<Result<Resp, Status>>;
}

impl<Req, Resp, F, Fut> Invoke<Req, Resp> for F
where
    F: Fn(crate::dispatch::RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    fn call(&self, ctx: crate::dispatch::RequestContext, req: Req) -> BoxFuture<Result<Resp, Status>> {
        Box::pin(self(ctx, req))
    }
}

/// Binds a fully-qualified method name to a typed invocation callable and a
/// configuration record.
///
/// Lives for the process lifetime once constructed, shared read-only across
/// requests — the thread-safety contract is that every call allocates its
/// own fresh request/response message values.
pub struct HandlerEntry<Req, Resp> {
    pub(crate) method: String,
    pub(crate) config: HandlerConfig,
    pub(crate) invoke: Arc<dyn Invoke<Req, Resp>>,
}

impl<Req, Resp> HandlerEntry<Req, Resp> {
    /// Construct a handler entry, applying `options` in order to a
    /// zero-valued config. If `registrar` is supplied, `method` is
    /// registered synchronously here.
    pub fn new(
        method: impl Into<String>,
        invoke: impl Invoke<Req, Resp> + 'static,
        options: Vec<HandlerOption>,
        registrar: Option<&dyn Registrar>,
    ) -> Self {
        let method = method.into();
        let config = options.into_iter().fold(HandlerConfig::default(), |c, opt| (opt.0)(c));

        if let Some(registrar) = registrar {
            registrar.register(&method);
        }

        HandlerEntry {
            method,
            config,
            invoke: Arc::new(invoke),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }
}
