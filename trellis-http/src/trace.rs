use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::HeaderValue;
use axum::response::Response;
use tower::{Layer, Service};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::REQUEST_ID_HEADER;

/// Assigns every request an id and logs the status and latency of its
/// response under a span carrying that id.
#[derive(Clone, Copy)]
pub(crate) struct RequestTraceLayer;

impl<S> Layer<S> for RequestTraceLayer {
    type Service = RequestTrace<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTrace { inner }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct RequestTrace<S> {
    inner: S,
}

/// Id sent by the client, or a fresh one when missing or not a UUID.
fn request_id(request: &Request) -> Uuid {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4)
}

async fn trace<S>(mut request: Request, mut inner: S) -> Result<Response, S::Error>
where
    S: Service<Request, Response = Response>,
{
    let request_id = request_id(&request);
    let id_value = HeaderValue::from_str(&request_id.to_string()).ok();
    if let Some(value) = &id_value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|v| v.as_str().to_owned());
    let span = tracing::info_span!(
        "http_request",
        %request_id,
        method = %request.method(),
        path = request.uri().path(),
        route = route.as_deref().unwrap_or("-"),
    );
    tracing::debug!(parent: &span, "Request received");
    let started = Instant::now();
    let mut response = inner.call(request).instrument(span.clone()).await?;
    let latency = started.elapsed().as_micros();
    let status = response.status().as_u16();
    match response.status() {
        v if v.is_server_error() => tracing::error!(parent: &span, status, latency, "Request failed"),
        v if v.is_client_error() => tracing::warn!(parent: &span, status, latency, "Request rejected"),
        _ => tracing::info!(parent: &span, status, latency, "Request handled"),
    }
    if let Some(value) = id_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

impl<S> Service<Request> for RequestTrace<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The ready service is taken; a fresh clone stays behind for the next call.
        let clone = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, clone);
        Box::pin(trace(request, ready))
    }
}
