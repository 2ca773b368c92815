use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::HttpError;

/// Status, headers and body written for a request.
#[derive(Clone, Debug)]
pub struct SentResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Write-once response handle.
///
/// The handle is passed explicitly by the route executor and never
/// registered in an injector, so code running in a sub-invocation has no
/// way to write the response.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    sent: Arc<Mutex<Option<SentResponse>>>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the response; fails if it was already written.
    pub fn send(&self, response: SentResponse) -> Result<(), HttpError> {
        let mut sent = self.lock();
        if sent.is_some() {
            return Err(HttpError::internal("Response has already been sent"));
        }
        *sent = Some(response);
        Ok(())
    }

    pub fn is_sent(&self) -> bool {
        self.lock().is_some()
    }

    pub fn sent(&self) -> Option<SentResponse> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SentResponse>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let Some(sent) = self.sent() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        let mut response = Response::new(Body::from(sent.body));
        *response.status_mut() = sent.status;
        *response.headers_mut() = sent.headers;
        response
    }
}
