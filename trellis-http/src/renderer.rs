use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use trellis::{InjectionToken, StdError, SymbolToken, TokenOptions};

use crate::{HttpPipelineResult, MimeType};

/// Output of a renderer, written to the response by the terminator.
#[derive(Clone, Debug)]
pub struct HttpPipelineRendererResult {
    pub content_type: MimeType,
    pub body: Bytes,
    pub status_code: Option<StatusCode>,
    pub headers: HeaderMap,
}

/// Converts a pipeline result into a response body.
#[async_trait]
pub trait HttpPipelineRenderer: Send + Sync {
    fn default_content_type(&self) -> &MimeType;

    fn renderable_types(&self) -> &[MimeType];

    async fn render(
        &self,
        accept: &[MimeType],
        result: &HttpPipelineResult,
    ) -> Result<HttpPipelineRendererResult, StdError>;
}

pub static RENDERERS: LazyLock<InjectionToken<Arc<dyn HttpPipelineRenderer>>> = LazyLock::new(|| {
    SymbolToken::opinionated("trellis-http", "HttpPipelineRenderer", TokenOptions::multi())
});

/// Picks the content type a renderer should produce for `accept`.
///
/// An explicitly accepted renderable type wins; otherwise the renderer's
/// default type is used.
pub fn negotiate_content_type(renderer: &dyn HttpPipelineRenderer, accept: &[MimeType]) -> MimeType {
    accept
        .iter()
        .filter(|v| !v.is_wildcard())
        .find_map(|v| renderer.renderable_types().iter().find(|t| t.same_essence(v)))
        .unwrap_or(renderer.default_content_type())
        .clone()
}

/// Registered renderers, in registration order.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: Vec<Arc<dyn HttpPipelineRenderer>>,
}

impl RendererRegistry {
    pub fn new(renderers: Vec<Arc<dyn HttpPipelineRenderer>>) -> Self {
        Self { renderers }
    }

    /// Selects the renderer for the accepted types.
    ///
    /// Accepted types are tried in preference order. For each one a renderer
    /// advertising exactly that type is preferred; wildcard matches are only
    /// used when no accepted type is matched explicitly. Without any match
    /// the first registered renderer is used.
    pub fn select(&self, accept: &[MimeType]) -> Option<Arc<dyn HttpPipelineRenderer>> {
        let explicit = accept.iter().filter(|v| !v.is_wildcard()).find_map(|accepted| {
            self.renderers
                .iter()
                .find(|r| r.renderable_types().iter().any(|t| t.same_essence(accepted)))
        });
        let wildcard = || {
            accept.iter().find_map(|accepted| {
                self.renderers
                    .iter()
                    .find(|r| r.renderable_types().iter().any(|t| t.matches(accepted)))
            })
        };
        explicit
            .or_else(wildcard)
            .or_else(|| self.renderers.first())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

/// Renders data as JSON.
pub struct JsonRenderer {
    types: Vec<MimeType>,
}

impl JsonRenderer {
    pub fn new() -> Self {
        Self {
            types: vec![MimeType::application_json()],
        }
    }
}

impl Default for JsonRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpPipelineRenderer for JsonRenderer {
    fn default_content_type(&self) -> &MimeType {
        &self.types[0]
    }

    fn renderable_types(&self) -> &[MimeType] {
        &self.types
    }

    async fn render(
        &self,
        accept: &[MimeType],
        result: &HttpPipelineResult,
    ) -> Result<HttpPipelineRendererResult, StdError> {
        let body = match &result.data {
            Some(data) => Bytes::from(serde_json::to_vec(&data.to_json()?)?),
            None => Bytes::new(),
        };
        Ok(HttpPipelineRendererResult {
            content_type: negotiate_content_type(self, accept),
            body,
            status_code: result.status_code,
            headers: result.headers.clone(),
        })
    }
}

/// Renders string data verbatim and any other data as compact JSON text.
pub struct PlainTextRenderer {
    types: Vec<MimeType>,
}

impl PlainTextRenderer {
    pub fn new() -> Self {
        Self {
            types: vec![MimeType::text_plain()],
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpPipelineRenderer for PlainTextRenderer {
    fn default_content_type(&self) -> &MimeType {
        &self.types[0]
    }

    fn renderable_types(&self) -> &[MimeType] {
        &self.types
    }

    async fn render(
        &self,
        accept: &[MimeType],
        result: &HttpPipelineResult,
    ) -> Result<HttpPipelineRendererResult, StdError> {
        let body = match result.data_json()? {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(v) => v,
            v => v.to_string(),
        };
        Ok(HttpPipelineRendererResult {
            content_type: negotiate_content_type(self, accept),
            body: Bytes::from(body),
            status_code: result.status_code,
            headers: result.headers.clone(),
        })
    }
}
