use std::sync::Arc;

use trellis::{
    AnyProvider, Dependencies, INJECTOR, Injectable, Injector, Method, Provider, Registerable,
    Resolved, StdError,
};

use crate::{
    AUTH_PROVIDER_FACTORY, AuthProviderFactory, HTTP_REQUEST, HTTP_REQUEST_INFO,
    HTTP_REQUEST_SCOPE, HttpPipelineResult, HttpRequest, HttpRequestInfo, ROUTE, Route,
    RouteHandler,
};

/// Creates the injectors requests are handled in.
pub struct RouteInitializer {
    auth_factory: Option<Arc<dyn AuthProviderFactory>>,
}

impl Injectable for RouteInitializer {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            auth_factory: deps.get_optional(&AUTH_PROVIDER_FACTORY)?,
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new().optional(&AUTH_PROVIDER_FACTORY)
    }

    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>().singleton()
    }
}

impl RouteInitializer {
    /// Creates the request injector for `route`, a child of `injector`.
    ///
    /// The child provides the route, the request, its info and the
    /// authorization providers of the request.
    pub async fn init_route_request(
        &self,
        injector: &Injector,
        route: &Arc<Route>,
        request: Arc<HttpRequest>,
        info: HttpRequestInfo,
    ) -> Result<Injector, StdError> {
        let mut items: Vec<Registerable> = vec![
            Provider::value(&ROUTE, route.clone()).into(),
            Provider::value(&HTTP_REQUEST, request.clone()).into(),
            Provider::value(&HTTP_REQUEST_INFO, info).into(),
        ];
        if let Some(factory) = &self.auth_factory {
            let providers = factory.generate_auth_providers(route, &request).await?;
            items.extend(providers.into_iter().map(Registerable::from));
        }
        Ok(injector.create_child(HTTP_REQUEST_SCOPE, items)?)
    }

    /// Prepares a call of `route` within the current request, answering
    /// `request` instead of the request being handled.
    pub fn init_sub_invocation(&self, route: Arc<Route>, request: HttpRequest) -> SubInvocation {
        let request = Arc::new(request);
        let providers = vec![
            Provider::value(&ROUTE, route.clone()).into_any(),
            Provider::value(&HTTP_REQUEST, request.clone()).into_any(),
        ];
        SubInvocation {
            route,
            request,
            providers,
        }
    }
}

/// Route call nested in another request.
///
/// The call shares the injector of the outer request but has no response of
/// its own, so it can only produce a result.
pub struct SubInvocation {
    route: Arc<Route>,
    request: Arc<HttpRequest>,
    providers: Vec<AnyProvider>,
}

impl SubInvocation {
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn request(&self) -> &Arc<HttpRequest> {
        &self.request
    }

    pub async fn invoke(&self, injector: &Injector) -> Result<HttpPipelineResult, StdError> {
        let method = Method::<dyn RouteHandler, HttpPipelineResult>::new(
            "handle",
            |handler, args| async move {
                let injector = args.param::<Injector>("injector")?;
                handler.handle(&injector).await
            },
        )
        .param("injector", &INJECTOR);
        let providers = self.providers.iter().cloned().map(Registerable::from).collect();
        tracing::debug!(route = ?self.route, path = %self.request.path, "Invoking sub-request");
        Ok(injector.invoke(self.route.handler(), &method, providers).await?)
    }
}
