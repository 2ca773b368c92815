use std::any::{TypeId, type_name};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method as HttpMethod, StatusCode};
use trellis::{AnyProvider, Injectable, Injector, Method, Module, Provider, StdError};

use crate::route::join_path;
use crate::{CorsConfig, HttpPipelineResult, ROUTES, Route, RouteHandler};

/// Controller method answering a route.
pub type Action<C> = Method<C, HttpPipelineResult>;

struct ActionDecl<C> {
    http_method: HttpMethod,
    path: String,
    action: Action<C>,
}

/// Routes served by class `C`.
///
/// Every action is a [`Method`] invoked on the controller instance resolved
/// from the request injector, so parameters are resolved per request.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis::{Injectable, Resolved, StdError};
/// use trellis_http::{Action, Controller, HttpPipelineResult, RequestParamExt as _};
///
/// struct ItemController;
///
/// impl Injectable for ItemController {
///     type Handle = Arc<Self>;
///
///     async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
///         Ok(Arc::new(Self))
///     }
/// }
///
/// let get_item = Action::<ItemController>::new("get_item", |_, args| async move {
///     let id: u64 = args.param("id")?;
///     Ok(HttpPipelineResult::from_data(id))
/// })
/// .path_param::<u64>("id");
///
/// let controller = Controller::<ItemController>::new("/items").get(":id", get_item);
/// assert_eq!(controller.routes()[0].path(), "/items/:id");
/// ```
pub struct Controller<C> {
    path: String,
    cors: Option<CorsConfig>,
    authorization: Option<Vec<AnyProvider>>,
    actions: Vec<ActionDecl<C>>,
}

impl<C> Controller<C>
where
    C: Injectable<Handle = Arc<C>>,
{
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cors: None,
            authorization: None,
            actions: Vec::new(),
        }
    }

    pub fn route(mut self, http_method: HttpMethod, path: impl Into<String>, action: Action<C>) -> Self {
        self.actions.push(ActionDecl {
            http_method,
            path: path.into(),
            action,
        });
        self
    }

    pub fn get(self, path: impl Into<String>, action: Action<C>) -> Self {
        self.route(HttpMethod::GET, path, action)
    }

    pub fn post(self, path: impl Into<String>, action: Action<C>) -> Self {
        self.route(HttpMethod::POST, path, action)
    }

    pub fn put(self, path: impl Into<String>, action: Action<C>) -> Self {
        self.route(HttpMethod::PUT, path, action)
    }

    pub fn patch(self, path: impl Into<String>, action: Action<C>) -> Self {
        self.route(HttpMethod::PATCH, path, action)
    }

    pub fn delete(self, path: impl Into<String>, action: Action<C>) -> Self {
        self.route(HttpMethod::DELETE, path, action)
    }

    /// Enables CORS for every route; preflight `OPTIONS` routes are added
    /// for paths without an explicit one.
    pub fn cors(mut self, config: CorsConfig) -> Self {
        self.cors = Some(config);
        self
    }

    /// Requires an authorized user on every route.
    ///
    /// `conditions` are providers of [`crate::AUTHORIZATION_CONDITIONS`]
    /// registered for each request; all of them must allow access.
    pub fn authorize(mut self, conditions: Vec<AnyProvider>) -> Self {
        self.authorization
            .get_or_insert_with(Vec::new)
            .extend(conditions);
        self
    }

    pub fn routes(&self) -> Vec<Route> {
        let controller_name = short_name(type_name::<C>());
        let mut routes: Vec<Route> = self
            .actions
            .iter()
            .map(|v| Route {
                http_method: v.http_method.clone(),
                sibling_methods: Vec::new(),
                path: join_path(&self.path, &v.path),
                controller: TypeId::of::<C>(),
                controller_name,
                method_name: v.action.name(),
                cors: self.cors.clone(),
                authorization: self.authorization.clone(),
                handler: Arc::new(ActionHandler {
                    action: v.action.clone(),
                }),
            })
            .collect();
        if self.cors.is_some() {
            let mut preflight = Vec::new();
            for route in &routes {
                let exists = routes
                    .iter()
                    .chain(&preflight)
                    .any(|v| v.path == route.path && v.http_method == HttpMethod::OPTIONS);
                if !exists {
                    preflight.push(Route {
                        http_method: HttpMethod::OPTIONS,
                        method_name: "preflight",
                        handler: Arc::new(PreflightHandler),
                        ..route.clone()
                    });
                }
            }
            routes.extend(preflight);
        }
        let siblings: Vec<_> = routes
            .iter()
            .map(|v| (v.path.clone(), v.http_method.clone()))
            .collect();
        for route in &mut routes {
            route.sibling_methods = siblings
                .iter()
                .filter(|(path, _)| *path == route.path)
                .map(|(_, method)| method.clone())
                .collect();
        }
        routes
    }

    /// Module registering the controller class and its routes.
    pub fn module(self) -> Module {
        let mut module = Module::new(short_name(type_name::<C>())).with(C::provider());
        for route in self.routes() {
            module.add(Provider::value(&ROUTES, Arc::new(route)));
        }
        module
    }
}

struct ActionHandler<C> {
    action: Action<C>,
}

#[async_trait]
impl<C> RouteHandler for ActionHandler<C>
where
    C: Injectable<Handle = Arc<C>>,
{
    async fn handle(&self, injector: &Injector) -> Result<HttpPipelineResult, StdError> {
        let controller = injector.inject(&C::token()).await?;
        Ok(injector.invoke(&controller, &self.action, Vec::new()).await?)
    }
}

/// Answers CORS preflight requests; the headers are added by
/// [`crate::CorsTransformer`].
struct PreflightHandler;

#[async_trait]
impl RouteHandler for PreflightHandler {
    async fn handle(&self, _: &Injector) -> Result<HttpPipelineResult, StdError> {
        Ok(HttpPipelineResult::new().with_status(StatusCode::NO_CONTENT))
    }
}

fn short_name(name: &'static str) -> &'static str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}
