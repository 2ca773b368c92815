use std::sync::Arc;

use async_trait::async_trait;
use trellis::{Dependencies, Injectable, Resolved, StdError};
use trellis_http::{HTTP_REQUEST, HttpPipelineResult, HttpPipelineResultTransformer, HttpRequest};

use crate::{CompositionContext, RESOURCE_COMPOSER, ResourceComposer, ResourceObject, SELF_RELATION};

/// Query parameter listing the relations to embed, comma-separated or
/// repeated.
pub const EMBED_RELS_KEY: &str = "_embedded";

/// Composes [`ResourceObject`] results, single or `Vec`, into HAL
/// documents.
pub struct HalResultTransformer {
    composer: Arc<dyn ResourceComposer>,
    request: Arc<HttpRequest>,
}

impl Injectable for HalResultTransformer {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            composer: deps.get(&RESOURCE_COMPOSER)?,
            request: deps.get(&HTTP_REQUEST)?,
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new()
            .token(&RESOURCE_COMPOSER)
            .token(&HTTP_REQUEST)
    }
}

impl HalResultTransformer {
    fn context(&self) -> CompositionContext {
        let embedded_rels = self
            .request
            .query_values(EMBED_RELS_KEY)
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        CompositionContext::new(SELF_RELATION, self.request.path.clone(), embedded_rels)
    }
}

#[async_trait]
impl HttpPipelineResultTransformer for HalResultTransformer {
    async fn transform(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        let composed = if let Some(resource) = result.data_as::<ResourceObject>() {
            self.composer.compose(resource, &self.context()).await
        } else if let Some(resources) = result.data_as::<Vec<ResourceObject>>() {
            self.composer.compose_list(resources, &self.context()).await
        } else {
            return Ok(result);
        };
        let composed = composed.map_err(|err| err.into_request_error())?;
        Ok(HttpPipelineResult {
            data: Some(Arc::new(composed)),
            ..result
        })
    }
}
