//! A minimal response [`http_body::Body`] that yields at most one data
//! frame followed by an optional trailers frame — exactly the shape a
//! unary RPC response needs: headers, then body bytes, then trailers,
//! never interleaved.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body, Frame};

pub struct DispatchBody {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
}

impl DispatchBody {
    pub(crate) fn new(data: Bytes, trailers: Option<HeaderMap>) -> Self {
        DispatchBody {
            data: Some(data).filter(|d| !d.is_empty()),
            trailers,
        }
    }

    pub(crate) fn empty() -> Self {
        DispatchBody {
            data: None,
            trailers: None,
        }
    }

    pub(crate) fn with_trailers(trailers: HeaderMap) -> Self {
        DispatchBody {
            data: None,
            trailers: Some(trailers),
        }
    }
}

impl Body for DispatchBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        if let Some(data) = self.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = self.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn yields_data_then_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());
        let body = DispatchBody::new(Bytes::from_static(b"hello"), Some(trailers.clone()));

        let collected = body.collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"hello"));
        assert_eq!(collected.trailers(), Some(&trailers));
    }

    #[tokio::test]
    async fn empty_body_with_trailers_only() {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "3".parse().unwrap());
        let body = DispatchBody::with_trailers(trailers.clone());

        let collected = body.collect().await.unwrap();
        assert!(collected.to_bytes().is_empty());
        assert_eq!(collected.trailers(), Some(&trailers));
    }
}
