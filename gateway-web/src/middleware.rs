//! Request-id propagation middleware.
//!
//! Every [`gateway_core::Request`] carries a `request_id` that threads
//! through dispatch, worker state, and WebSocket delivery (spec §3, §4.8).
//! This layer lets a caller supply that id up front via `X-Request-Id`
//! instead of only getting one back in the response body — useful for a
//! client that wants to open its WebSocket subscription before the REST
//! call returns. A request with no header gets a freshly generated id,
//! which [`RequestIdExt`] and the `REST` handler both read back out of the
//! same request extension.

use axum::{extract::Request, http::HeaderValue, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the caller-supplied or generated request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Build the layer that tags every request with a [`Uuid`] (spec §3).
#[must_use]
pub fn request_id_layer() -> RequestIdLayer {
    RequestIdLayer
}

/// Tower [`Layer`] wiring [`RequestIdMiddleware`] into a router.
#[derive(Clone, Debug)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

/// Extracts or generates the request id, stores it as a request extension,
/// opens a tracing span keyed on it, and echoes it back as a response
/// header.
#[derive(Clone, Debug)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for RequestIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(request_id);

        let span = tracing::info_span!("http_request", request_id = %request_id, method = %req.method(), uri = %req.uri());

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;
            if let Ok(header_value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
            }
            Ok(response)
        })
    }
}

/// Reads the request id [`RequestIdMiddleware`] stored on a request.
pub trait RequestIdExt {
    /// The request id, or a fresh one if the middleware isn't installed.
    fn request_id(&self) -> Uuid;
}

impl RequestIdExt for Request {
    fn request_id(&self) -> Uuid {
        self.extensions().get::<Uuid>().copied().unwrap_or_else(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn generates_a_request_id_when_the_header_is_missing() {
        let app = Router::new().route("/test", get(|| async { "ok" })).layer(request_id_layer());
        let request = HttpRequest::builder().uri("/test").body(Body::empty()).expect("request");

        let response = app.oneshot(request).await.expect("response");
        let header = response.headers().get(REQUEST_ID_HEADER).expect("header present");
        assert!(Uuid::parse_str(header.to_str().expect("ascii")).is_ok());
    }

    #[tokio::test]
    async fn echoes_back_a_caller_supplied_request_id() {
        let app = Router::new().route("/test", get(|| async { "ok" })).layer(request_id_layer());
        let supplied = Uuid::new_v4();
        let request = HttpRequest::builder()
            .uri("/test")
            .header(REQUEST_ID_HEADER, supplied.to_string())
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        let header = response.headers().get(REQUEST_ID_HEADER).expect("header present");
        assert_eq!(header.to_str().expect("ascii"), supplied.to_string());
    }

    #[tokio::test]
    async fn an_invalid_header_value_falls_back_to_a_generated_id() {
        let app = Router::new().route("/test", get(|| async { "ok" })).layer(request_id_layer());
        let request = HttpRequest::builder()
            .uri("/test")
            .header(REQUEST_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        let header = response.headers().get(REQUEST_ID_HEADER).expect("header present");
        assert_ne!(header.to_str().expect("ascii"), "not-a-uuid");
    }

    #[tokio::test]
    async fn request_id_ext_reads_the_value_a_handler_would_see() {
        async fn handler(req: Request) -> impl IntoResponse {
            req.request_id().to_string()
        }

        let app = Router::new().route("/test", get(handler)).layer(request_id_layer());
        let request = HttpRequest::builder().uri("/test").body(Body::empty()).expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), 200);
    }
}
