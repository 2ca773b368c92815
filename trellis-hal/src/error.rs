use thiserror::Error;
use trellis::StdError;
use trellis_http::HttpError;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("Resource '{0}' is not registered")]
    UnknownResource(String),
    #[error("Resource '{resource}' inherits from itself")]
    InheritanceCycle { resource: String },
    #[error("Cannot embed 'self' relation")]
    EmbedSelf,
    #[error("Relation '{rel}' does not exist on resource {resource}")]
    UnknownRelation { rel: String, resource: String },
    #[error("Relation '{rel}' of '{resource}' does not have corresponding {kind} accessor")]
    MissingAccessor {
        rel: String,
        resource: String,
        kind: &'static str,
    },
    #[error("Accessor {controller}::{method} does not allow GET")]
    MissingRoute {
        controller: &'static str,
        method: &'static str,
    },
    #[error("Could not determine identifier property on '{resource}' for param '{param}'")]
    MissingIdentifier { resource: String, param: String },
    #[error("Relation '{rel}' returned no resource")]
    NotAResource { rel: String },
    #[error("Cannot embed relation '{rel}'")]
    Embed {
        rel: String,
        #[source]
        source: StdError,
    },
}

impl HalError {
    /// Converts into a request error; invalid embed requests become 400.
    pub fn into_request_error(self) -> StdError {
        match self {
            Self::EmbedSelf | Self::UnknownRelation { .. } => {
                HttpError::bad_request(self.to_string()).into()
            }
            err => err.into(),
        }
    }
}
