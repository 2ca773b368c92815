use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::http::{Method as HttpMethod, header};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use trellis::{
    AnyProvider, Dependencies, INJECTOR, InjectionToken, Injector, Provider, Registerable,
    StdError, SymbolToken, TokenOptions,
};

use crate::{HTTP_REQUEST, HttpError, HttpPipelinePreparer, HttpRequest, ROUTE, Route};

/// User resolved from the request credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    pub uid: String,
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizedUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            claims: serde_json::Map::new(),
        }
    }
}

/// Resolves users from `Authorization` header values of one scheme.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Returns the user identified by `authorization`, the full header value.
    async fn get_authorized_user(&self, authorization: &str) -> Result<Option<AuthorizedUser>, StdError>;
}

static SERVICES: LazyLock<DashMap<String, InjectionToken<Arc<dyn AuthorizationService>>>> =
    LazyLock::new(DashMap::new);

/// Token of the [`AuthorizationService`] handling `scheme`.
///
/// Schemes are case-insensitive; every call for the same scheme returns the
/// same token.
pub fn authorization_service(scheme: &str) -> InjectionToken<Arc<dyn AuthorizationService>> {
    let scheme = scheme.to_ascii_lowercase();
    SERVICES
        .entry(scheme.clone())
        .or_insert_with(|| {
            SymbolToken::local("trellis-http", &format!("AuthorizationService({scheme})"))
        })
        .clone()
}

/// Scheme of the request `Authorization` header.
pub static AUTHORIZATION_SCHEME: LazyLock<InjectionToken<Option<String>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "AuthorizationScheme"));

/// Service registered for the request's authorization scheme.
pub static REQUEST_AUTHORIZATION_SERVICE: LazyLock<
    InjectionToken<Option<Arc<dyn AuthorizationService>>>,
> = LazyLock::new(|| SymbolToken::local("trellis-http", "RequestAuthorizationService"));

pub static AUTHORIZED_USER: LazyLock<InjectionToken<Option<AuthorizedUser>>> = LazyLock::new(|| {
    SymbolToken::opinionated("trellis-http", "AuthorizedUser", TokenOptions::singleton())
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizationCondition {
    Allowed,
    Denied { reason: String },
}

impl AuthorizationCondition {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }
}

/// Conditions checked for routes requiring authorization.
pub static AUTHORIZATION_CONDITIONS: LazyLock<InjectionToken<AuthorizationCondition>> =
    LazyLock::new(|| {
        SymbolToken::opinionated("trellis-http", "AuthorizationCondition", TokenOptions::multi())
    });

/// Condition provider checking the authorized user with `check`.
///
/// Requests without an authorized user are denied.
pub fn authorization_condition<F>(check: F) -> AnyProvider
where
    F: Fn(&AuthorizedUser) -> AuthorizationCondition + Send + Sync + 'static,
{
    Provider::factory(&AUTHORIZATION_CONDITIONS, move |deps| {
        Ok(match deps.get(&AUTHORIZED_USER)? {
            Some(user) => check(&user),
            None => AuthorizationCondition::denied("No authorized user"),
        })
    })
    .deps(Dependencies::new().token(&AUTHORIZED_USER))
    .into_any()
}

/// Generates the authorization providers of a request.
#[async_trait]
pub trait AuthProviderFactory: Send + Sync {
    async fn generate_auth_providers(
        &self,
        route: &Route,
        request: &HttpRequest,
    ) -> Result<Vec<AnyProvider>, StdError>;
}

pub static AUTH_PROVIDER_FACTORY: LazyLock<InjectionToken<Arc<dyn AuthProviderFactory>>> =
    LazyLock::new(|| SymbolToken::local("trellis-http", "AuthProviderFactory"));

/// Provides the scheme, service and user of the `Authorization` header
/// together with the route's conditions.
#[derive(Default)]
pub struct AuthorizationAuthProviderFactory;

#[async_trait]
impl AuthProviderFactory for AuthorizationAuthProviderFactory {
    async fn generate_auth_providers(
        &self,
        route: &Route,
        _: &HttpRequest,
    ) -> Result<Vec<AnyProvider>, StdError> {
        if route.http_method() == HttpMethod::OPTIONS {
            return Ok(Vec::new());
        }
        let mut providers = vec![
            scheme_provider().into_any(),
            service_provider().into_any(),
            user_provider().into_any(),
        ];
        if let Some(conditions) = route.authorization() {
            providers.extend(conditions.iter().cloned());
        }
        Ok(providers)
    }
}

fn scheme_provider() -> Provider<Option<String>> {
    Provider::factory(&AUTHORIZATION_SCHEME, |deps| {
        let request = deps.get(&HTTP_REQUEST)?;
        let route = deps.get(&ROUTE)?;
        match request.header(header::AUTHORIZATION) {
            Some(value) => Ok(value.split(' ').next().map(str::to_string)),
            None if route.requires_authorization() => {
                Err(HttpError::unauthorized("Missing Authorization header").into())
            }
            None => Ok(None),
        }
    })
    .deps(Dependencies::new().token(&HTTP_REQUEST).token(&ROUTE))
}

fn service_provider() -> Provider<Option<Arc<dyn AuthorizationService>>> {
    Provider::async_factory(&REQUEST_AUTHORIZATION_SERVICE, |deps| async move {
        let Some(scheme) = deps.get(&AUTHORIZATION_SCHEME)? else {
            return Ok(None);
        };
        let injector = deps.get(&INJECTOR)?;
        let route = deps.get(&ROUTE)?;
        let service = injector.inject_optional(&authorization_service(&scheme)).await?;
        if service.is_none() && route.requires_authorization() {
            let message = format!("Unsupported authorization scheme '{scheme}'");
            return Err(HttpError::unauthorized(message).into());
        }
        Ok(service)
    })
    .deps(
        Dependencies::new()
            .token(&AUTHORIZATION_SCHEME)
            .token(&INJECTOR)
            .token(&ROUTE),
    )
}

fn user_provider() -> Provider<Option<AuthorizedUser>> {
    Provider::async_factory(&AUTHORIZED_USER, |deps| async move {
        let Some(service) = deps.get(&REQUEST_AUTHORIZATION_SERVICE)? else {
            return Ok(None);
        };
        let request = deps.get(&HTTP_REQUEST)?;
        match request.header(header::AUTHORIZATION) {
            Some(value) => service.get_authorized_user(value).await,
            None => Ok(None),
        }
    })
    .deps(
        Dependencies::new()
            .token(&REQUEST_AUTHORIZATION_SERVICE)
            .token(&HTTP_REQUEST),
    )
}

/// Rejects requests to protected routes without an authorized user (401)
/// or with a denying condition (403).
#[derive(Default)]
pub struct AuthorizationPreparer;

#[async_trait]
impl HttpPipelinePreparer for AuthorizationPreparer {
    fn name(&self) -> &'static str {
        "AuthorizationPreparer"
    }

    async fn prepare(&self, injector: &Injector) -> Result<Vec<Registerable>, StdError> {
        let route = injector.inject(&ROUTE).await?;
        if !route.requires_authorization() || route.http_method() == HttpMethod::OPTIONS {
            return Ok(Vec::new());
        }
        if injector.inject_optional(&AUTHORIZED_USER).await?.flatten().is_none() {
            return Err(HttpError::unauthorized("Authorization required").into());
        }
        let denied: Vec<_> = injector
            .inject_all(&AUTHORIZATION_CONDITIONS)
            .await?
            .into_iter()
            .filter_map(|v| match v {
                AuthorizationCondition::Allowed => None,
                AuthorizationCondition::Denied { reason } => Some(reason),
            })
            .collect();
        if !denied.is_empty() {
            tracing::debug!(route = ?route, reasons = ?denied, "Authorization denied");
            return Err(HttpError::forbidden(denied.join("; ")).into());
        }
        Ok(Vec::new())
    }
}
