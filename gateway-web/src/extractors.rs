//! Custom Axum extractors.
//!
//! [`RequestIdHeader`] pulls the request id [`crate::middleware::request_id_layer`]
//! already parsed or generated into a request extension, so a handler can
//! depend on it without re-deriving it from the raw header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// The request id set by [`crate::middleware::RequestIdMiddleware`].
///
/// Falls back to a freshly generated id if the middleware isn't installed
/// ahead of the route (matches [`crate::middleware::RequestIdExt`]'s
/// fallback, so the two never disagree).
#[derive(Debug, Clone, Copy)]
pub struct RequestIdHeader(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdHeader
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts.extensions.get::<Uuid>().copied().unwrap_or_else(Uuid::new_v4);
        Ok(Self(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn reads_the_id_the_middleware_already_stored() {
        let uuid = Uuid::new_v4();
        let mut req = Request::builder().body(()).expect("valid request");
        req.extensions_mut().insert(uuid);

        let (mut parts, _) = req.into_parts();
        let header = RequestIdHeader::from_request_parts(&mut parts, &()).await.expect("infallible");

        assert_eq!(header.0, uuid);
    }

    #[tokio::test]
    async fn missing_extension_generates_a_fresh_id() {
        let req = Request::builder().body(()).expect("valid request");

        let (mut parts, _) = req.into_parts();
        let header = RequestIdHeader::from_request_parts(&mut parts, &()).await.expect("infallible");

        assert_ne!(header.0, Uuid::nil());
    }
}
