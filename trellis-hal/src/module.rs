use std::sync::Arc;

use trellis::{Injectable, Module, Provider};
use trellis_http::{HTTP_REQUEST_SCOPE, HttpPipelineResultTransformer, TRANSFORMERS};

use crate::{
    DefaultResourceComposer, HalResultTransformer, RESOURCE_COMPOSER, ResourceComposer,
    ResourceRegistry,
};

/// Resource registry, composer and the HAL result transformer.
///
/// Requires [`trellis_http::http_pipeline_module`]; resource types are
/// registered with [`crate::ResourceMetadata::provider`].
pub fn hal_module() -> Module {
    Module::new("Hal")
        .with(ResourceRegistry::provider())
        .with(
            Provider::class_as::<DefaultResourceComposer, _>(&RESOURCE_COMPOSER, |v| {
                v as Arc<dyn ResourceComposer>
            })
            .restrict_scope(HTTP_REQUEST_SCOPE),
        )
        .with(
            Provider::class_as::<HalResultTransformer, _>(&TRANSFORMERS, |v| {
                v as Arc<dyn HttpPipelineResultTransformer>
            })
            .restrict_scope(HTTP_REQUEST_SCOPE),
        )
}
