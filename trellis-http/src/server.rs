use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{
    DefaultBodyLimit, FromRequest as _, FromRequestParts as _, Path, Query, Request,
};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse as _, Response};
use axum::routing::any;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use trellis::{
    Dependencies, EntryPoint, Injectable, InjectionToken, Provider, Resolved, StdError, SymbolToken,
};
use trellis_base::{CancellationToken, ConfigSection, defer};

use crate::route::{path_params, to_axum_path};
use crate::trace::RequestTraceLayer;
use crate::{HttpError, HttpRequest, HttpResponse, Route, RouteExecutor, RouteTable};

/// Request bodies larger than this are rejected with 413.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpServerConfig {
    pub addr: SocketAddr,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

impl ConfigSection for HttpServerConfig {
    fn key() -> &'static str {
        "http_server"
    }
}

/// Cancelled to stop the server started by [`HttpServerEntryPoint`].
pub static SHUTDOWN: LazyLock<InjectionToken<CancellationToken>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "Shutdown"));

/// Serves the registered routes over axum.
pub struct HttpServer {
    executor: Arc<RouteExecutor>,
    routes: Arc<RouteTable>,
    max_body_size: usize,
}

impl Injectable for HttpServer {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            executor: deps.get(&RouteExecutor::token())?,
            routes: deps.get(&RouteTable::token())?,
            max_body_size: deps
                .get_optional(&HttpServerConfig::token())?
                .map_or(DEFAULT_MAX_BODY_SIZE, |v| v.max_body_size),
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new()
            .token(&RouteExecutor::token())
            .token(&RouteTable::token())
            .optional(&HttpServerConfig::token())
    }

    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>().singleton()
    }
}

impl HttpServer {
    /// Router answering every route path; methods are dispatched per path.
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for (template, routes) in self.routes.by_path() {
            let path = to_axum_path(&template);
            let executor = self.executor.clone();
            let template = Arc::new(template);
            let routes = Arc::new(routes);
            router = router.route(
                &path,
                any(move |request: Request| {
                    let executor = executor.clone();
                    let template = template.clone();
                    let routes = routes.clone();
                    async move { dispatch(&executor, &template, &routes, request).await }
                }),
            );
        }
        router
            .fallback(|| async { error_response(&HttpError::not_found("Route not found")) })
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(RequestTraceLayer)
    }

    pub async fn serve(&self, addr: SocketAddr, shutdown: CancellationToken) -> Result<(), StdError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` is cancelled.
    pub async fn serve_listener(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), StdError> {
        let addr = listener.local_addr()?;
        let span = tracing::info_span!("http_server", addr = ?addr);
        let router = self.router();
        tracing::info!(parent: &span, "Server starting");
        defer! {
            tracing::info!(parent: &span, "Server stopped")
        };
        tracing::info!(parent: &span, routes = self.routes.routes().len(), "Server started");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        Ok(())
    }
}

async fn dispatch(
    executor: &RouteExecutor,
    template: &str,
    routes: &[Arc<Route>],
    request: Request,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let Some(route) = routes.iter().find(|v| v.http_method() == parts.method) else {
        let allowed: Vec<_> = routes.iter().map(|v| v.http_method().as_str()).collect();
        let err = HttpError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowedError",
            format!("Method {} is not allowed", parts.method),
        );
        let mut response = error_response(&err);
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            response.headers_mut().insert(header::ALLOW, value);
        }
        return response;
    };
    let params = if path_params(template).is_empty() {
        BTreeMap::new()
    } else {
        match Path::<BTreeMap<String, String>>::from_request_parts(&mut parts, &()).await {
            Ok(Path(v)) => v,
            Err(err) => return error_response(&HttpError::bad_request(err.body_text())),
        }
    };
    let query = match Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
        Ok(Query(v)) => v,
        Err(err) => return error_response(&HttpError::bad_request(err.body_text())),
    };
    let mut request = HttpRequest::new(parts.method.clone(), parts.uri.path());
    request.params = params;
    for (name, value) in query {
        request.query.entry(name).or_default().push(value);
    }
    request.headers = parts.headers.clone();
    // Buffered through the extractor so the router's `DefaultBodyLimit` applies.
    request.body = match Bytes::from_request(Request::from_parts(parts, body), &()).await {
        Ok(v) => v,
        Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let err = HttpError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PayloadTooLargeError",
                err.body_text(),
            );
            return error_response(&err);
        }
        Err(err) => {
            return error_response(&HttpError::bad_request(format!(
                "Cannot read body: {}",
                err.body_text()
            )));
        }
    };
    let response = HttpResponse::new();
    executor.exec_route(route, request, &response).await;
    response.into_response()
}

fn error_response(err: &HttpError) -> Response {
    let body = json!({
        "error": {
            "type": err.error_type(),
            "message": err.message(),
        }
    });
    (err.status(), axum::Json(body)).into_response()
}

/// Runs the [`HttpServer`] on [`HttpServerConfig::addr`].
pub struct HttpServerEntryPoint {
    server: Arc<HttpServer>,
    config: Arc<HttpServerConfig>,
    shutdown: CancellationToken,
}

impl Injectable for HttpServerEntryPoint {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            server: deps.get(&HttpServer::token())?,
            config: deps.get(&HttpServerConfig::token())?,
            shutdown: deps.get_optional(&SHUTDOWN)?.unwrap_or_default(),
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new()
            .token(&HttpServer::token())
            .token(&HttpServerConfig::token())
            .optional(&SHUTDOWN)
    }
}

#[async_trait]
impl EntryPoint for HttpServerEntryPoint {
    async fn run(&self) -> Result<(), StdError> {
        self.server
            .serve(self.config.addr, self.shutdown.clone())
            .await
    }
}
