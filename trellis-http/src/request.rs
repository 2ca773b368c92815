use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method as HttpMethod, header};
use trellis::{Dependencies, InjectionScope, InjectionToken, Provider, SymbolToken};
use uuid::Uuid;

use crate::MimeType;

/// Header carrying the request id, echoed on responses.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Scope of the child injector created for every request.
pub const HTTP_REQUEST_SCOPE: InjectionScope = InjectionScope::Named("HttpRequest");

pub static HTTP_REQUEST: LazyLock<InjectionToken<Arc<HttpRequest>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "HttpRequest"));

pub static HTTP_REQUEST_INFO: LazyLock<InjectionToken<HttpRequestInfo>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "HttpRequestInfo"));

/// Media types accepted by the client, most preferred first.
pub static HTTP_REQUEST_ACCEPT_TYPES: LazyLock<InjectionToken<Arc<Vec<MimeType>>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "HttpRequestAcceptTypes"));

/// Inbound request as seen by the pipeline.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, Vec<String>>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
            query: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of the query parameter `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn query_values(&self, name: &str) -> &[String] {
        self.query.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Accepted media types; a request without `Accept` accepts anything.
    pub fn accept_types(&self) -> Vec<MimeType> {
        let types = self
            .header(header::ACCEPT)
            .map(MimeType::parse_accept)
            .unwrap_or_default();
        if types.is_empty() {
            return vec![MimeType::any()];
        }
        types
    }

    pub fn content_type(&self) -> Option<MimeType> {
        self.header(header::CONTENT_TYPE).and_then(MimeType::parse)
    }
}

/// Metadata attached to a request for its whole lifetime.
#[derive(Clone, Debug)]
pub struct HttpRequestInfo {
    pub request_id: Uuid,
    pub performance: Arc<PerfRecord>,
}

impl HttpRequestInfo {
    pub fn new() -> Self {
        Self::with_request_id(Uuid::new_v4())
    }

    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            performance: Arc::new(PerfRecord::new()),
        }
    }

    /// Info keeping the id found in [`REQUEST_ID_HEADER`], if any.
    pub fn for_request(request: &HttpRequest) -> Self {
        match request
            .header(REQUEST_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
        {
            Some(id) => Self::with_request_id(id),
            None => Self::new(),
        }
    }
}

impl Default for HttpRequestInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Named timing markers recorded while a request is handled.
pub struct PerfRecord {
    started: Instant,
    marks: Mutex<Vec<(String, Instant)>>,
}

impl PerfRecord {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            marks: Mutex::new(Vec::new()),
        }
    }

    pub fn mark(&self, name: impl Into<String>) {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), Instant::now()));
    }

    /// Markers with their offsets from the start of the request.
    pub fn marks(&self) -> Vec<(String, Duration)> {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, at)| (name.clone(), at.duration_since(self.started)))
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for PerfRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PerfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (name, offset) in self.marks() {
            list.entry(&format_args!("{name}: {}us", offset.as_micros()));
        }
        list.finish()
    }
}

/// Provider of [`HTTP_REQUEST_ACCEPT_TYPES`] for the current request.
pub fn accept_types_provider() -> Provider<Arc<Vec<MimeType>>> {
    Provider::factory(&HTTP_REQUEST_ACCEPT_TYPES, |deps| {
        Ok(Arc::new(deps.get(&HTTP_REQUEST)?.accept_types()))
    })
    .deps(Dependencies::new().token(&HTTP_REQUEST))
}
