use std::sync::Arc;

use trellis::{ENTRY_POINT, EntryPoint, Injectable, Module, Provider};
use trellis_base::config_provider;

use crate::{
    AUTH_PROVIDER_FACTORY, AuthProviderFactory, AuthorizationAuthProviderFactory,
    AuthorizationPreparer, BODY_PARSERS, CorsTransformer, DefaultErrorResultHandler,
    DefaultTerminator, ERROR_HANDLER, HTTP_REQUEST_SCOPE, HttpBodyParser, HttpPipeline,
    HttpPipelineErrorResultHandler, HttpPipelinePreparer, HttpPipelineRenderer,
    HttpPipelineResultTransformer, HttpPipelineTerminator, HttpServer, HttpServerConfig,
    HttpServerEntryPoint, JsonBodyParser, JsonRenderer, PREPARERS, PlainTextBodyParser,
    PlainTextRenderer, RENDERERS, RouteExecutor, RouteInitializer, RouteTable, TERMINATOR,
    TRANSFORMERS, accept_types_provider, request_body_provider,
};

/// Pipeline, routing and default stages.
///
/// Renderers, body parsers, preparers and transformers are multi tokens, so
/// applications add their own next to the defaults. The error handler and
/// the terminator may be replaced by registering another provider.
pub fn http_pipeline_module() -> Module {
    Module::new("HttpPipeline")
        .with(HttpPipeline::provider())
        .with(RouteInitializer::provider())
        .with(RouteExecutor::provider())
        .with(RouteTable::provider())
        .with(accept_types_provider())
        .with(request_body_provider())
        .with(Provider::value(
            &RENDERERS,
            Arc::new(JsonRenderer::new()) as Arc<dyn HttpPipelineRenderer>,
        ))
        .with(Provider::value(
            &RENDERERS,
            Arc::new(PlainTextRenderer::new()) as Arc<dyn HttpPipelineRenderer>,
        ))
        .with(Provider::value(
            &BODY_PARSERS,
            Arc::new(JsonBodyParser::new()) as Arc<dyn HttpBodyParser>,
        ))
        .with(Provider::value(
            &BODY_PARSERS,
            Arc::new(PlainTextBodyParser::new()) as Arc<dyn HttpBodyParser>,
        ))
        .with(Provider::value(
            &ERROR_HANDLER,
            Arc::new(DefaultErrorResultHandler) as Arc<dyn HttpPipelineErrorResultHandler>,
        ))
        .with(Provider::value(
            &TERMINATOR,
            Arc::new(DefaultTerminator) as Arc<dyn HttpPipelineTerminator>,
        ))
        .with(
            Provider::class_as::<CorsTransformer, _>(&TRANSFORMERS, |v| {
                v as Arc<dyn HttpPipelineResultTransformer>
            })
            .restrict_scope(HTTP_REQUEST_SCOPE),
        )
        .with(Provider::value(
            &AUTH_PROVIDER_FACTORY,
            Arc::new(AuthorizationAuthProviderFactory) as Arc<dyn AuthProviderFactory>,
        ))
        .with(Provider::value(
            &PREPARERS,
            Arc::new(AuthorizationPreparer) as Arc<dyn HttpPipelinePreparer>,
        ))
}

/// [`http_pipeline_module`] served by [`HttpServer`] as the entry point.
///
/// Reads [`HttpServerConfig`] from the `http_server` configuration section.
pub fn http_server_module() -> Module {
    Module::new("HttpServer")
        .with(http_pipeline_module())
        .with(HttpServer::provider())
        .with(config_provider::<HttpServerConfig>())
        .with(Provider::class_as::<HttpServerEntryPoint, _>(&ENTRY_POINT, |v| {
            v as Arc<dyn EntryPoint>
        }))
}
