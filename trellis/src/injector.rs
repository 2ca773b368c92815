use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use futures::future::try_join_all;

use crate::context::{ContextKind, InjectorContext};
use crate::provider::{Resolution, downcast};
use crate::{
    InjectionScope, InjectionToken, InjectorError, Method, Registerable, RegistrationSource,
    Repository, Resolved, SymbolToken, resolver,
};

/// Resolves to the injector of the closest injector or invocation context.
///
/// Provider and parameter contexts are skipped, so a root singleton holding
/// the injector never captures a request scope.
pub static INJECTOR: LazyLock<InjectionToken<Injector>> =
    LazyLock::new(|| SymbolToken::local("trellis", "Injector"));

/// Resolves to the scope of the entity that requested the current target.
pub static INJECTION_SCOPE: LazyLock<InjectionToken<InjectionScope>> =
    LazyLock::new(|| SymbolToken::local("trellis", "InjectionScope"));

/// Result of [`Injector::resolve`].
pub struct ResolveResult<T> {
    values: Vec<T>,
    multi: bool,
    context: Arc<InjectorContext>,
}

impl<T> ResolveResult<T> {
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Returns the value of a single token, or `None` for a missing optional token.
    pub fn single_value(&self) -> Option<&T> {
        if self.multi {
            return None;
        }
        self.values.first()
    }

    pub fn array_value(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// Context that produced the value.
    pub fn context(&self) -> &Arc<InjectorContext> {
        &self.context
    }
}

/// Handle for resolving tokens and invoking methods within a context.
///
/// Cloning an injector is cheap; clones share the same context.
///
/// ```rust
/// use trellis::{Injector, InjectionToken, Provider, Registerable};
///
/// # async fn example() -> Result<(), trellis::InjectorError> {
/// let port = InjectionToken::<u16>::new("Port");
/// let injector = Injector::root();
/// injector.register(vec![Registerable::from(Provider::value(&port, 8080))])?;
/// assert_eq!(injector.inject(&port).await?, 8080);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Injector {
    context: Arc<InjectorContext>,
}

impl Injector {
    /// Creates a root injector with an empty repository.
    pub fn root() -> Self {
        Self::new(Arc::new(Repository::new("Root")))
    }

    pub fn new(repository: Arc<Repository>) -> Self {
        Self {
            context: InjectorContext::root(repository),
        }
    }

    pub(crate) fn from_context(context: Arc<InjectorContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<InjectorContext> {
        &self.context
    }

    pub fn scope(&self) -> &InjectionScope {
        self.context.scope()
    }

    /// Registers items into the repository of this injector's context.
    pub fn register(&self, items: Vec<Registerable>) -> Result<(), InjectorError> {
        let source = RegistrationSource::Injector(self.context.scope().to_string());
        self.context.repository().register(&source, items)?;
        Ok(())
    }

    /// Creates a child injector seeded with `items`.
    ///
    /// The child is disposed together with this injector unless it is
    /// disposed first.
    pub fn create_child(
        &self,
        scope: InjectionScope,
        items: Vec<Registerable>,
    ) -> Result<Injector, InjectorError> {
        let context = InjectorContext::child(&self.context, ContextKind::Injector, scope, items)?;
        Ok(Self { context })
    }

    pub async fn inject<T>(&self, token: &InjectionToken<T>) -> Result<T, InjectorError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let result = self.resolve(token, false).await?;
        if result.multi {
            return Err(InjectorError::InvalidToken {
                token: token.to_string(),
                reason: "multi token requested as a single value".into(),
            });
        }
        result
            .values
            .into_iter()
            .next()
            .ok_or_else(|| InjectorError::MissingProvider {
                token: token.to_string(),
                context: self.context.path(),
            })
    }

    pub async fn inject_optional<T>(&self, token: &InjectionToken<T>) -> Result<Option<T>, InjectorError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let result = self.resolve(token, true).await?;
        if result.multi {
            return Err(InjectorError::InvalidToken {
                token: token.to_string(),
                reason: "multi token requested as a single value".into(),
            });
        }
        Ok(result.values.into_iter().next())
    }

    /// Resolves every value of a multi token, in registration order.
    ///
    /// A token without providers resolves to an empty list.
    pub async fn inject_all<T>(&self, token: &InjectionToken<T>) -> Result<Vec<T>, InjectorError>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.resolve(token, true).await?.values)
    }

    pub async fn resolve<T>(
        &self,
        token: &InjectionToken<T>,
        optional: bool,
    ) -> Result<ResolveResult<T>, InjectorError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (resolution, context) =
            resolver::resolve(self.context.clone(), token.erase(), optional).await?;
        let (values, multi) = match resolution {
            Resolution::Single(value) => (vec![downcast(token.as_any(), &value)?], false),
            Resolution::Multi(values) => (
                values
                    .iter()
                    .map(|v| downcast(token.as_any(), v))
                    .collect::<Result<_, _>>()?,
                true,
            ),
            Resolution::Missing => (Vec::new(), token.options().multi),
        };
        Ok(ResolveResult {
            values,
            multi,
            context,
        })
    }

    pub fn can_resolve<T>(&self, token: &InjectionToken<T>) -> bool {
        resolver::can_resolve(&self.context, token.as_any())
    }

    /// Invokes `method` on `target`, resolving its parameters by token.
    ///
    /// `providers` are visible only to this invocation. Values created for
    /// the invocation are disposed once it completes.
    pub async fn invoke<T, R>(
        &self,
        target: &Arc<T>,
        method: &Method<T, R>,
        providers: Vec<Registerable>,
    ) -> Result<R, InjectorError>
    where
        T: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        let scope = InjectionScope::Method {
            target: method.target(),
            method: method.name(),
            param: None,
        };
        let context =
            InjectorContext::child(&self.context, ContextKind::Invocation, scope, providers)?;
        let result = invoke_in(&context, target, method).await;
        if let Err(err) = context.dispose("invocation complete").await {
            tracing::warn!(method = %method, error = %err, "Cannot dispose invocation context");
        }
        result
    }

    /// Disposes this injector's context and every live child context.
    pub async fn dispose(&self, reason: &str) -> Result<(), InjectorError> {
        self.context.dispose(reason).await
    }

    pub fn is_disposed(&self) -> bool {
        self.context.is_disposed()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Injector").field(&self.context.path()).finish()
    }
}

async fn invoke_in<T, R>(
    context: &Arc<InjectorContext>,
    target: &Arc<T>,
    method: &Method<T, R>,
) -> Result<R, InjectorError>
where
    T: ?Sized + Send + Sync + 'static,
    R: Send + 'static,
{
    let mut resolving = Vec::with_capacity(method.params().len());
    for param in method.params() {
        let token = param
            .token()
            .cloned()
            .ok_or_else(|| InjectorError::MissingToken {
                target: format!("{method}({})", param.name()),
            })?;
        let scope = InjectionScope::Method {
            target: method.target(),
            method: method.name(),
            param: Some(param.name()),
        };
        let providers = param
            .providers()
            .iter()
            .cloned()
            .map(Registerable::Provider)
            .collect();
        let param_context = InjectorContext::child(context, ContextKind::Param, scope, providers)?;
        let optional = param.is_optional();
        resolving.push(async move {
            let (resolution, _) = resolver::resolve(param_context, token.clone(), optional).await?;
            Ok::<_, InjectorError>((param.name(), token, resolution))
        });
    }
    let mut values = HashMap::new();
    let mut params = HashMap::new();
    for (name, token, resolution) in try_join_all(resolving).await? {
        params.insert(name, token.key());
        values.insert(token.key(), (token, resolution));
    }
    let args = Resolved::new(values, params, context.scope().clone());
    tracing::trace!(method = %method, context = %context.path(), "Invoking method");
    method
        .call(target.clone(), args)
        .await
        .map_err(|source| InjectorError::Invocation {
            method: method.to_string(),
            source,
        })
}
