use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode, header};
use serde_json::json;
use trellis::{
    Injectable, InjectionToken, Injector, Provider, Registerable, Resolved, StdError, SymbolToken,
    TokenOptions,
};

use crate::{
    HTTP_REQUEST_ACCEPT_TYPES, HTTP_REQUEST_INFO, HttpError, HttpPipelineRendererResult,
    HttpPipelineResult, HttpResponse, MimeType, PreparerError, RENDERERS, ROUTE, RendererRegistry,
    SentResponse,
};

/// Stage contributing providers before the handler is invoked.
///
/// Preparers run in dependency order; providers returned by a preparer are
/// registered into the request injector, so later preparers and the handler
/// can resolve them.
#[async_trait]
pub trait HttpPipelinePreparer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Names of the preparers that must run first.
    fn depends_on(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn prepare(&self, injector: &Injector) -> Result<Vec<Registerable>, StdError>;
}

/// Stage post-processing the handler result.
#[async_trait]
pub trait HttpPipelineResultTransformer: Send + Sync {
    async fn transform(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError>;
}

/// Converts an error result into the result that is rendered.
#[async_trait]
pub trait HttpPipelineErrorResultHandler: Send + Sync {
    async fn handle_error(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError>;
}

/// Writes the rendered result to the response.
#[async_trait]
pub trait HttpPipelineTerminator: Send + Sync {
    async fn terminate(
        &self,
        response: &HttpResponse,
        result: HttpPipelineRendererResult,
    ) -> Result<(), StdError>;
}

pub static PREPARERS: LazyLock<InjectionToken<Arc<dyn HttpPipelinePreparer>>> = LazyLock::new(|| {
    SymbolToken::opinionated("trellis-http", "HttpPipelinePreparer", TokenOptions::multi())
});

pub static TRANSFORMERS: LazyLock<InjectionToken<Arc<dyn HttpPipelineResultTransformer>>> =
    LazyLock::new(|| {
        SymbolToken::opinionated(
            "trellis-http",
            "HttpPipelineResultTransformer",
            TokenOptions::multi(),
        )
    });

pub static ERROR_HANDLER: LazyLock<InjectionToken<Arc<dyn HttpPipelineErrorResultHandler>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "HttpPipelineErrorResultHandler"));

pub static TERMINATOR: LazyLock<InjectionToken<Arc<dyn HttpPipelineTerminator>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "HttpPipelineTerminator"));

/// Renders the first error as `{"error": {"type", "message"}}` with the
/// status code it declares.
#[derive(Default)]
pub struct DefaultErrorResultHandler;

#[async_trait]
impl HttpPipelineErrorResultHandler for DefaultErrorResultHandler {
    async fn handle_error(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        Ok(error_result(result))
    }
}

fn error_result(mut result: HttpPipelineResult) -> HttpPipelineResult {
    let Some(err) = result.errors.first().cloned() else {
        return result;
    };
    result.status_code = Some(HttpError::status_of(&*err));
    result.data = Some(Arc::new(json!({
        "error": {
            "type": HttpError::type_of(&*err),
            "message": HttpError::message_of(&*err),
        }
    })));
    result
}

#[derive(Default)]
pub struct DefaultTerminator;

#[async_trait]
impl HttpPipelineTerminator for DefaultTerminator {
    async fn terminate(
        &self,
        response: &HttpResponse,
        result: HttpPipelineRendererResult,
    ) -> Result<(), StdError> {
        let mut headers = result.headers;
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&result.content_type.to_string())?,
        );
        response.send(SentResponse {
            status: result.status_code.unwrap_or(StatusCode::OK),
            headers,
            body: result.body,
        })?;
        Ok(())
    }
}

/// Request pipeline: preparers, handler, transformers, error handling,
/// rendering and termination.
///
/// Every stage is resolved from the request injector, so stages may depend
/// on request-scoped values.
#[derive(Default)]
pub struct HttpPipeline;

impl Injectable for HttpPipeline {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }

    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>().singleton()
    }
}

impl HttpPipeline {
    /// Handles the request of `injector` and writes `response`.
    ///
    /// Errors of preparers, the handler and transformers end up in the
    /// rendered result. Only failures to resolve the pipeline itself or to
    /// terminate are returned.
    pub async fn handle(&self, injector: &Injector, response: &HttpResponse) -> Result<(), StdError> {
        let route = injector.inject(&ROUTE).await?;
        let info = injector.inject_optional(&HTTP_REQUEST_INFO).await?;
        let mark = |name: &str| {
            if let Some(info) = &info {
                info.performance.mark(name);
            }
        };
        mark("pipeline:prepare");
        let result = match self.prepare(injector).await {
            Ok(()) => {
                mark("pipeline:handle");
                match route.handler().handle(injector).await {
                    Ok(result) => result,
                    Err(err) => HttpPipelineResult::from_error(err),
                }
            }
            Err(err) => HttpPipelineResult::from_error(err),
        };
        mark("pipeline:transform");
        let mut result = self.transform(injector, result).await;
        if result.is_error() {
            for err in &result.errors {
                tracing::debug!(route = ?route, error = %err, "Request error");
            }
            result = self.handle_error(injector, result).await;
        }
        mark("pipeline:render");
        let rendered = match self.render(injector, &result).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(route = ?route, error = %err, "Cannot render result");
                HttpPipelineRendererResult {
                    content_type: MimeType::text_plain(),
                    body: Bytes::from(err.to_string()),
                    status_code: Some(StatusCode::INTERNAL_SERVER_ERROR),
                    headers: result.headers.clone(),
                }
            }
        };
        mark("pipeline:terminate");
        let terminator = injector.inject(&TERMINATOR).await?;
        terminator.terminate(response, rendered).await
    }

    async fn prepare(&self, injector: &Injector) -> Result<(), StdError> {
        let preparers = order_preparers(injector.inject_all(&PREPARERS).await?)?;
        for preparer in preparers {
            let items = preparer.prepare(injector).await?;
            injector.register(items)?;
        }
        Ok(())
    }

    /// Runs every transformer in order; a failing transformer leaves the
    /// result unchanged and appends its error.
    async fn transform(&self, injector: &Injector, mut result: HttpPipelineResult) -> HttpPipelineResult {
        let transformers = match injector.inject_all(&TRANSFORMERS).await {
            Ok(v) => v,
            Err(err) => {
                result.errors.push(Arc::new(err));
                return result;
            }
        };
        for transformer in transformers {
            match transformer.transform(result.clone()).await {
                Ok(v) => result = v,
                Err(err) => result.errors.push(Arc::from(err)),
            }
        }
        result
    }

    async fn handle_error(&self, injector: &Injector, result: HttpPipelineResult) -> HttpPipelineResult {
        let handler = match injector.inject_optional(&ERROR_HANDLER).await {
            Ok(Some(v)) => v,
            Ok(None) => return error_result(result),
            Err(err) => {
                let mut result = result;
                result.errors.push(Arc::new(err));
                return error_result(result);
            }
        };
        match handler.handle_error(result.clone()).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "Error result handler failed");
                error_result(result)
            }
        }
    }

    async fn render(
        &self,
        injector: &Injector,
        result: &HttpPipelineResult,
    ) -> Result<HttpPipelineRendererResult, StdError> {
        let accept = injector.inject(&HTTP_REQUEST_ACCEPT_TYPES).await?;
        let registry = RendererRegistry::new(injector.inject_all(&RENDERERS).await?);
        let renderer = registry
            .select(&accept)
            .ok_or_else(|| HttpError::internal("No renderers are registered"))?;
        renderer.render(&accept, result).await
    }
}

enum DependencyStatus {
    Pending,
    Ready,
}

/// Orders preparers so that each one runs after its dependencies.
///
/// Preparers without dependencies between them keep their registration order.
pub fn order_preparers(
    preparers: Vec<Arc<dyn HttpPipelinePreparer>>,
) -> Result<Vec<Arc<dyn HttpPipelinePreparer>>, PreparerError> {
    let graph: HashMap<&'static str, Vec<&'static str>> = preparers
        .iter()
        .map(|v| (v.name(), v.depends_on()))
        .collect();
    let mut order = Vec::new();
    let mut used = HashMap::new();
    for preparer in &preparers {
        topological_sort(preparer.name(), &graph, &mut order, &mut used)?;
    }
    let mut by_name: HashMap<_, _> = preparers.into_iter().map(|v| (v.name(), v)).collect();
    let mut seen = HashSet::new();
    Ok(order
        .into_iter()
        .filter(|v| seen.insert(*v))
        .filter_map(|v| by_name.remove(v))
        .collect())
}

fn topological_sort(
    name: &'static str,
    graph: &HashMap<&'static str, Vec<&'static str>>,
    order: &mut Vec<&'static str>,
    used: &mut HashMap<&'static str, DependencyStatus>,
) -> Result<(), PreparerError> {
    match used.get(name) {
        Some(DependencyStatus::Pending) => {
            return Err(PreparerError::CircularDependency { preparer: name });
        }
        Some(DependencyStatus::Ready) => return Ok(()),
        None => {}
    }
    used.insert(name, DependencyStatus::Pending);
    for &dependency in &graph[name] {
        if !graph.contains_key(dependency) {
            return Err(PreparerError::MissingDependency {
                preparer: name,
                dependency,
            });
        }
        topological_sort(dependency, graph, order, used)?;
    }
    used.insert(name, DependencyStatus::Ready);
    order.push(name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, Vec<&'static str>);

    #[async_trait]
    impl HttpPipelinePreparer for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn depends_on(&self) -> Vec<&'static str> {
            self.1.clone()
        }

        async fn prepare(&self, _: &Injector) -> Result<Vec<Registerable>, StdError> {
            Ok(Vec::new())
        }
    }

    fn names(preparers: Vec<Arc<dyn HttpPipelinePreparer>>) -> Result<Vec<&'static str>, PreparerError> {
        Ok(order_preparers(preparers)?.iter().map(|v| v.name()).collect())
    }

    #[test]
    fn test_order_preparers() {
        let order = names(vec![
            Arc::new(Named("c", vec!["b"])),
            Arc::new(Named("a", vec![])),
            Arc::new(Named("b", vec!["a"])),
        ])
        .unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(matches!(
            names(vec![Arc::new(Named("a", vec!["b"])), Arc::new(Named("b", vec!["a"]))]),
            Err(PreparerError::CircularDependency { .. })
        ));
        assert!(matches!(
            names(vec![Arc::new(Named("a", vec!["x"]))]),
            Err(PreparerError::MissingDependency { dependency: "x", .. })
        ));
    }
}
