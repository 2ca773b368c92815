use std::error::Error;
use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;

/// Error shared between pipeline stages.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Request handling error carrying the status code of the response.
///
/// Errors raised anywhere in the pipeline are inspected with
/// [`HttpError::find`], so an `HttpError` wrapped by injector or
/// invocation errors still selects the response status.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    error_type: &'static str,
    message: String,
    param: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type,
            message: message.into(),
            param: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BadRequestError", message)
    }

    /// A required path, query or body parameter is absent.
    pub fn missing_param(name: &str) -> Self {
        Self {
            param: Some(name.to_string()),
            ..Self::new(
                StatusCode::BAD_REQUEST,
                "MissingParamError",
                format!("Missing required parameter '{name}'"),
            )
        }
    }

    pub fn invalid_param(name: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            param: Some(name.to_string()),
            ..Self::new(
                StatusCode::BAD_REQUEST,
                "InvalidParamError",
                format!("Invalid value for parameter '{name}': {reason}"),
            )
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UnauthorizedError", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "ForbiddenError", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFoundError", message)
    }

    pub fn unsupported_media_type(content_type: &str) -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UnsupportedMediaTypeError",
            format!("No body parser for content type {content_type}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error_type(&self) -> &'static str {
        self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Parameter the error refers to, for parameter errors.
    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }

    /// Returns the first `HttpError` in the source chain of `err`.
    pub fn find<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a HttpError> {
        let mut current = Some(err);
        while let Some(err) = current {
            if let Some(v) = err.downcast_ref::<HttpError>() {
                return Some(v);
            }
            // `Arc` forwards `source()` past the error it wraps.
            current = match err.downcast_ref::<SharedError>() {
                Some(shared) => Some(&**shared),
                None => err.source(),
            };
        }
        None
    }

    /// Status code declared by the source chain of `err`, or 500.
    pub fn status_of(err: &(dyn Error + 'static)) -> StatusCode {
        Self::find(err)
            .map(HttpError::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Error type declared by the source chain of `err`.
    pub fn type_of(err: &(dyn Error + 'static)) -> &'static str {
        Self::find(err)
            .map(HttpError::error_type)
            .unwrap_or("InternalServerError")
    }

    /// Message of the first `HttpError` in the source chain of `err`, or
    /// the message of `err` itself.
    pub fn message_of(err: &(dyn Error + 'static)) -> String {
        match Self::find(err) {
            Some(v) => v.message.clone(),
            None => err.to_string(),
        }
    }
}

/// Errors raised while ordering pipeline preparers.
#[derive(Debug, Error)]
pub enum PreparerError {
    #[error("Preparer {preparer} depends on missing preparer {dependency}")]
    MissingDependency {
        preparer: &'static str,
        dependency: &'static str,
    },
    #[error("Circular dependency between preparers at {preparer}")]
    CircularDependency { preparer: &'static str },
}

#[cfg(test)]
mod tests {
    use trellis::InjectorError;

    use super::*;

    #[test]
    fn test_find_in_source_chain() {
        let err = InjectorError::Provider {
            token: "PathParam(id)".to_string(),
            source: Box::new(HttpError::missing_param("id")),
        };
        let found = HttpError::find(&err).unwrap();
        assert_eq!(found.error_type(), "MissingParamError");
        assert_eq!(found.param(), Some("id"));
        assert_eq!(HttpError::status_of(&err), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::message_of(&err), "Missing required parameter 'id'");
        let other = InjectorError::Disposed {
            context: "Root".to_string(),
        };
        assert_eq!(HttpError::status_of(&other), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_find_through_shared_error() {
        let shared: SharedError = Arc::new(HttpError::not_found("Parent not found"));
        let err = InjectorError::Invocation {
            method: "ParentController::get".to_string(),
            source: Box::new(shared),
        };
        assert_eq!(HttpError::status_of(&err), StatusCode::NOT_FOUND);
        assert_eq!(HttpError::message_of(&err), "Parent not found");
    }
}
