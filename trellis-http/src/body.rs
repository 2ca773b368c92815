use std::sync::{Arc, LazyLock};

use trellis::{Dependencies, InjectionToken, Provider, StdError, SymbolToken, TokenOptions};

use crate::{HTTP_REQUEST, HttpError, MimeType};

/// Converts a raw request body into a JSON value.
pub trait HttpBodyParser: Send + Sync {
    fn parseable_types(&self) -> &[MimeType];

    fn parse(&self, raw: &str) -> Result<serde_json::Value, StdError>;
}

pub static BODY_PARSERS: LazyLock<InjectionToken<Arc<dyn HttpBodyParser>>> = LazyLock::new(|| {
    SymbolToken::opinionated("trellis-http", "HttpBodyParser", TokenOptions::multi())
});

/// Parsed body of the current request; `null` for an empty body.
pub static HTTP_REQUEST_BODY: LazyLock<InjectionToken<Arc<serde_json::Value>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "HttpRequestBody"));

pub struct JsonBodyParser {
    types: Vec<MimeType>,
}

impl JsonBodyParser {
    pub fn new() -> Self {
        Self {
            types: vec![MimeType::application_json()],
        }
    }
}

impl Default for JsonBodyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBodyParser for JsonBodyParser {
    fn parseable_types(&self) -> &[MimeType] {
        &self.types
    }

    fn parse(&self, raw: &str) -> Result<serde_json::Value, StdError> {
        serde_json::from_str(raw).map_err(|err| HttpError::bad_request(format!("Invalid JSON body: {err}")).into())
    }
}

/// Passes the body through as a JSON string.
pub struct PlainTextBodyParser {
    types: Vec<MimeType>,
}

impl PlainTextBodyParser {
    pub fn new() -> Self {
        Self {
            types: vec![MimeType::text_plain()],
        }
    }
}

impl Default for PlainTextBodyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBodyParser for PlainTextBodyParser {
    fn parseable_types(&self) -> &[MimeType] {
        &self.types
    }

    fn parse(&self, raw: &str) -> Result<serde_json::Value, StdError> {
        Ok(serde_json::Value::String(raw.to_string()))
    }
}

/// Provider of [`HTTP_REQUEST_BODY`].
///
/// The parser is selected by the request `Content-Type`, which defaults to
/// `text/plain`.
pub fn request_body_provider() -> Provider<Arc<serde_json::Value>> {
    Provider::factory(&HTTP_REQUEST_BODY, |deps| {
        let request = deps.get(&HTTP_REQUEST)?;
        if request.body.is_empty() {
            return Ok(Arc::new(serde_json::Value::Null));
        }
        let content_type = request.content_type().unwrap_or_else(MimeType::text_plain);
        let parsers = deps.get_all(&BODY_PARSERS)?;
        let parser = parsers
            .iter()
            .find(|v| v.parseable_types().iter().any(|t| t.matches(&content_type)))
            .ok_or_else(|| HttpError::unsupported_media_type(&content_type.to_string()))?;
        let raw = std::str::from_utf8(&request.body)
            .map_err(|err| HttpError::bad_request(format!("Body is not valid UTF-8: {err}")))?;
        Ok(Arc::new(parser.parse(raw)?))
    })
    .deps(Dependencies::new().token(&HTTP_REQUEST).optional(&BODY_PARSERS))
}
