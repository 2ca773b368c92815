use std::error::Error;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, header};
use serde_json::json;
use trellis::{Dependencies, INJECTOR, Injectable, Injector, Provider, Resolved, StdError};

use crate::{
    HttpError, HttpPipeline, HttpRequest, HttpRequestInfo, HttpResponse, Route, RouteInitializer,
    SentResponse,
};

/// Runs a route for one request: creates the request injector, runs the
/// pipeline and disposes the injector afterwards.
pub struct RouteExecutor {
    injector: Injector,
    initializer: Arc<RouteInitializer>,
    pipeline: Arc<HttpPipeline>,
}

impl Injectable for RouteExecutor {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            injector: deps.get(&INJECTOR)?,
            initializer: deps.get(&RouteInitializer::token())?,
            pipeline: deps.get(&HttpPipeline::token())?,
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new()
            .token(&INJECTOR)
            .token(&RouteInitializer::token())
            .token(&HttpPipeline::token())
    }

    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>().singleton()
    }
}

impl RouteExecutor {
    /// Handles `request` with `route` and writes `response`.
    ///
    /// Errors escaping the pipeline are answered with a JSON error body
    /// unless a response was already sent.
    pub async fn exec_route(&self, route: &Arc<Route>, request: HttpRequest, response: &HttpResponse) {
        let info = HttpRequestInfo::for_request(&request);
        let request_id = info.request_id;
        let performance = info.performance.clone();
        tracing::debug!(%request_id, route = ?route, "Executing route");
        let request = Arc::new(request);
        let injector = match self
            .initializer
            .init_route_request(&self.injector, route, request, info)
            .await
        {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%request_id, route = ?route, error = %err, "Cannot initialize request");
                send_error(response, &*err);
                return;
            }
        };
        if let Err(err) = self.pipeline.handle(&injector, response).await {
            tracing::warn!(%request_id, route = ?route, error = %err, "Request failed");
            send_error(response, &*err);
        }
        if let Err(err) = injector.dispose("request complete").await {
            tracing::warn!(%request_id, error = %err, "Cannot dispose request injector");
        }
        tracing::debug!(%request_id, performance = ?performance, "Route executed");
    }
}

fn send_error(response: &HttpResponse, err: &(dyn Error + 'static)) {
    if response.is_sent() {
        return;
    }
    let body = json!({
        "error": {
            "type": HttpError::type_of(err),
            "message": HttpError::message_of(err),
        }
    });
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let sent = SentResponse {
        status: HttpError::status_of(err),
        headers,
        body: Bytes::from(body.to_string()),
    };
    if let Err(err) = response.send(sent) {
        tracing::error!(error = %err, "Cannot send error response");
    }
}
