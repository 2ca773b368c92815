use std::any::Any;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use trellis::StdError;

use crate::SharedError;

/// Serializable payload of a pipeline result.
///
/// Implemented for every `Serialize + Debug` type, so handlers can return
/// plain structs while transformers can still inspect the concrete type.
pub trait ResultData: Any + fmt::Debug + Send + Sync {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> ResultData for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Value flowing from the handler through transformers to the renderer.
#[derive(Clone, Debug, Default)]
pub struct HttpPipelineResult {
    pub data: Option<Arc<dyn ResultData>>,
    pub headers: HeaderMap,
    pub status_code: Option<StatusCode>,
    pub errors: Vec<SharedError>,
}

impl HttpPipelineResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data<T: ResultData>(data: T) -> Self {
        Self::new().with_data(data)
    }

    pub fn from_error(err: StdError) -> Self {
        Self {
            errors: vec![Arc::from(err)],
            ..Self::default()
        }
    }

    pub fn with_data<T: ResultData>(mut self, data: T) -> Self {
        self.data = Some(Arc::new(data));
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the data if it is a `T`.
    pub fn data_as<T: 'static>(&self) -> Option<&T> {
        self.data.as_ref()?.as_any().downcast_ref()
    }

    /// Data as JSON; `null` when the result has no data.
    pub fn data_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.data {
            Some(data) => data.to_json(),
            None => Ok(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Serialize)]
    struct Item {
        id: u32,
    }

    #[test]
    fn test_data_access() {
        let result = HttpPipelineResult::from_data(Item { id: 7 });
        assert_eq!(result.data_as::<Item>().unwrap().id, 7);
        assert!(result.data_as::<String>().is_none());
        assert_eq!(result.data_json().unwrap(), json!({"id": 7}));
        assert_eq!(HttpPipelineResult::new().data_json().unwrap(), json!(null));
        assert!(HttpPipelineResult::from_error("boom".into()).is_error());
    }
}
