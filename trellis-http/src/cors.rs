use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method as HttpMethod, header};
use serde::{Deserialize, Serialize};
use trellis::{Dependencies, Injectable, Resolved, StdError};

use crate::{HTTP_REQUEST, HttpPipelineResult, HttpPipelineResultTransformer, HttpRequest, ROUTE, Route};

/// Cross-origin settings of a route.
///
/// An empty `allow_origin` list, or a list containing `*`, allows every
/// origin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_credentials: bool,
    #[serde(default)]
    pub allow_headers: Vec<String>,
    #[serde(default)]
    pub allow_origin: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl CorsConfig {
    pub fn allow_any_origin(&self) -> bool {
        self.allow_origin.is_empty() || self.allow_origin.iter().any(|v| v == "*")
    }

    /// Value of `Access-Control-Allow-Origin` for a request from `origin`.
    pub fn allowed_origin(&self, origin: Option<&str>) -> Option<String> {
        if self.allow_any_origin() {
            return match origin {
                Some(origin) if self.allow_credentials => Some(origin.to_string()),
                _ => Some("*".to_string()),
            };
        }
        let origin = origin?;
        self.allow_origin
            .iter()
            .any(|v| v == origin)
            .then(|| origin.to_string())
    }

    /// Response headers for a request from `origin`.
    ///
    /// Returns no headers when the origin is not allowed.
    pub fn headers(&self, methods: &[HttpMethod], origin: Option<&str>) -> Result<HeaderMap, StdError> {
        let mut headers = HeaderMap::new();
        let Some(allowed) = self.allowed_origin(origin) else {
            return Ok(headers);
        };
        if allowed != "*" {
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        }
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_str(&allowed)?);
        let methods: Vec<_> = methods.iter().map(HttpMethod::as_str).collect();
        if !methods.is_empty() {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_str(&methods.join(", "))?,
            );
        }
        if !self.allow_headers.is_empty() {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_str(&self.allow_headers.join(", "))?,
            );
        }
        if !self.expose_headers.is_empty() {
            headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_str(&self.expose_headers.join(", "))?,
            );
        }
        if let Some(max_age) = self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age));
        }
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        Ok(headers)
    }
}

/// Adds CORS headers to results of routes with a [`CorsConfig`].
pub struct CorsTransformer {
    route: Arc<Route>,
    request: Arc<HttpRequest>,
}

impl Injectable for CorsTransformer {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            route: deps.get(&ROUTE)?,
            request: deps.get(&HTTP_REQUEST)?,
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new().token(&ROUTE).token(&HTTP_REQUEST)
    }
}

#[async_trait]
impl HttpPipelineResultTransformer for CorsTransformer {
    async fn transform(&self, mut result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        let Some(cors) = self.route.cors() else {
            return Ok(result);
        };
        let origin = self.request.header(header::ORIGIN);
        let headers = cors.headers(self.route.sibling_methods(), origin)?;
        result.headers.extend(headers);
        Ok(result)
    }
}
