use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::http::Method as HttpMethod;
use trellis::{
    AnyProvider, Dependencies, Injectable, InjectionToken, Injector, Provider, Resolved, StdError,
    SymbolToken, TokenOptions,
};

use crate::{CorsConfig, HttpPipelineResult};

/// Route being handled by the current request injector.
pub static ROUTE: LazyLock<InjectionToken<Arc<Route>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "Route"));

/// Every route registered by controllers.
pub static ROUTES: LazyLock<InjectionToken<Arc<Route>>> =
    LazyLock::new(|| SymbolToken::opinionated("trellis-http", "Routes", TokenOptions::multi()));

/// Invokes the code behind a route within a request injector.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, injector: &Injector) -> Result<HttpPipelineResult, StdError>;
}

/// Binding of an HTTP method and path to a controller method.
#[derive(Clone)]
pub struct Route {
    pub(crate) http_method: HttpMethod,
    pub(crate) sibling_methods: Vec<HttpMethod>,
    pub(crate) path: String,
    pub(crate) controller: TypeId,
    pub(crate) controller_name: &'static str,
    pub(crate) method_name: &'static str,
    pub(crate) cors: Option<CorsConfig>,
    pub(crate) authorization: Option<Vec<AnyProvider>>,
    pub(crate) handler: Arc<dyn RouteHandler>,
}

impl Route {
    pub fn http_method(&self) -> &HttpMethod {
        &self.http_method
    }

    /// Methods of every route sharing this route's path, this one included.
    pub fn sibling_methods(&self) -> &[HttpMethod] {
        &self.sibling_methods
    }

    /// Full path template, such as `/lists/:listId/items`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn controller(&self) -> TypeId {
        self.controller
    }

    pub fn controller_name(&self) -> &'static str {
        self.controller_name
    }

    pub fn method_name(&self) -> &'static str {
        self.method_name
    }

    pub fn cors(&self) -> Option<&CorsConfig> {
        self.cors.as_ref()
    }

    /// Authorization condition providers; `Some` marks the route as
    /// requiring an authorized user.
    pub fn authorization(&self) -> Option<&[AnyProvider]> {
        self.authorization.as_deref()
    }

    pub fn requires_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("http_method", &self.http_method)
            .field("path", &self.path)
            .field("controller", &self.controller_name)
            .field("method", &self.method_name)
            .finish()
    }
}

/// Outcome of matching a request against the route table.
#[derive(Debug)]
pub enum RouteMatch {
    Found {
        route: Arc<Route>,
        params: BTreeMap<String, String>,
    },
    /// The path exists but not for the requested method.
    MethodNotAllowed { allowed: Vec<HttpMethod> },
    NotFound,
}

/// Lookup structure over [`ROUTES`].
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: Vec<Arc<Route>>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Route of `method_name` on `controller` answering `http_method`.
    pub fn find(
        &self,
        controller: TypeId,
        method_name: &str,
        http_method: &HttpMethod,
    ) -> Option<&Arc<Route>> {
        self.routes.iter().find(|v| {
            v.controller == controller && v.method_name == method_name && v.http_method == http_method
        })
    }

    pub fn match_request(&self, http_method: &HttpMethod, path: &str) -> RouteMatch {
        let mut allowed = Vec::new();
        for route in &self.routes {
            let Some(params) = match_path(&route.path, path) else {
                continue;
            };
            if route.http_method == http_method {
                return RouteMatch::Found {
                    route: route.clone(),
                    params,
                };
            }
            allowed.push(route.http_method.clone());
        }
        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allowed }
        }
    }

    /// Routes grouped by path template, in registration order.
    pub fn by_path(&self) -> Vec<(String, Vec<Arc<Route>>)> {
        let mut result: Vec<(String, Vec<Arc<Route>>)> = Vec::new();
        for route in &self.routes {
            match result.iter_mut().find(|(path, _)| *path == route.path) {
                Some((_, routes)) => routes.push(route.clone()),
                None => result.push((route.path.clone(), vec![route.clone()])),
            }
        }
        result
    }
}

impl Injectable for RouteTable {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self::new(deps.get_all(&ROUTES)?)))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new().optional(&ROUTES)
    }

    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>().singleton()
    }
}

/// Joins a path prefix and a relative path with exactly one `/` between them.
pub fn join_path(prefix: &str, path: &str) -> String {
    let mut result = String::new();
    if !prefix.starts_with('/') {
        result.push('/');
    }
    result.push_str(prefix);
    if !result.ends_with('/') {
        result.push('/');
    }
    result.push_str(path.strip_prefix('/').unwrap_or(path));
    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }
    result
}

/// Names of the `:param` segments of a path template, without duplicates.
pub fn path_params(template: &str) -> Vec<&str> {
    let mut result = Vec::new();
    for name in template.split('/').filter_map(|v| v.strip_prefix(':')) {
        if !result.contains(&name) {
            result.push(name);
        }
    }
    result
}

/// Matches `path` against a template, returning the captured parameters.
pub fn match_path(template: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let mut expected = template.split('/').filter(|v| !v.is_empty());
    let mut actual = path.split('/').filter(|v| !v.is_empty());
    let mut params = BTreeMap::new();
    loop {
        match (expected.next(), actual.next()) {
            (None, None) => return Some(params),
            (Some(pattern), Some(segment)) => match pattern.strip_prefix(':') {
                Some(name) => {
                    params.insert(name.to_string(), segment.to_string());
                }
                None if pattern == segment => {}
                None => return None,
            },
            _ => return None,
        }
    }
}

/// Replaces every `:param` segment of `template` with `value(param)`.
pub fn fill_path<F, E>(template: &str, mut value: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let mut segments = Vec::new();
    for segment in template.split('/') {
        match segment.strip_prefix(':') {
            Some(name) => segments.push(value(name)?),
            None => segments.push(segment.to_string()),
        }
    }
    Ok(segments.join("/"))
}

/// Converts a `:param` template into axum's `{param}` syntax.
pub(crate) fn to_axum_path(template: &str) -> String {
    template
        .split('/')
        .map(|v| match v.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => v.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("lists", ":listId"), "/lists/:listId");
        assert_eq!(join_path("/lists/", "/items"), "/lists/items");
        assert_eq!(join_path("/lists", ""), "/lists");
        assert_eq!(join_path("", ""), "/");
    }

    #[test]
    fn test_match_path() {
        let params = match_path("/lists/:listId/items/:itemId", "/lists/1/items/2/").unwrap();
        assert_eq!(params.get("listId").map(String::as_str), Some("1"));
        assert_eq!(params.get("itemId").map(String::as_str), Some("2"));
        assert!(match_path("/lists/:listId", "/lists").is_none());
        assert!(match_path("/lists/:listId", "/items/1").is_none());
        assert!(match_path("/", "/").unwrap().is_empty());
    }

    #[test]
    fn test_fill_path() {
        assert_eq!(path_params("/a/:id/b/:id/:other"), vec!["id", "other"]);
        let path = fill_path("/lists/:listId", |name| Ok::<_, ()>(format!("<{name}>"))).unwrap();
        assert_eq!(path, "/lists/<listId>");
        assert_eq!(to_axum_path("/lists/:listId/items"), "/lists/{listId}/items");
    }
}
