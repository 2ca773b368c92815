use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, ready};

use crate::scope::short_type_name;
use crate::{
    AnyToken, Disposable, Injectable, InjectionScope, InjectionToken, InjectorError, StdError,
    TokenKey,
};

/// Type erased resolved value.
pub type Value = Arc<dyn Any + Send + Sync>;

pub(crate) type BuildFn =
    Arc<dyn Fn(Resolved) -> BoxFuture<'static, Result<Value, StdError>> + Send + Sync>;

pub(crate) type DisposeFn =
    Arc<dyn Fn(Value, String) -> BoxFuture<'static, Result<(), StdError>> + Send + Sync>;

static NEXT_PROVIDER: AtomicU64 = AtomicU64::new(1);

pub(crate) enum ProviderKind {
    Class {
        type_id: TypeId,
        type_name: &'static str,
        build: BuildFn,
    },
    Factory {
        build: BuildFn,
    },
    AsyncFactory {
        build: BuildFn,
    },
    Value(Value),
}

pub(crate) struct ProviderInner {
    id: u64,
    token: AnyToken,
    kind: ProviderKind,
    deps: Dependencies,
    providers: Vec<AnyProvider>,
    multi: bool,
    singleton: bool,
    per_injector: bool,
    restrict_scope: Option<InjectionScope>,
    dispose: Option<DisposeFn>,
}

/// Type erased provider, as stored by repositories.
#[derive(Clone)]
pub struct AnyProvider(Arc<ProviderInner>);

impl AnyProvider {
    /// Unique identity of the provider declaration.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn token(&self) -> &AnyToken {
        &self.0.token
    }

    /// Type of the class instantiated by a class provider.
    pub fn class_type(&self) -> Option<TypeId> {
        match &self.0.kind {
            ProviderKind::Class { type_id, .. } => Some(*type_id),
            _ => None,
        }
    }

    pub fn is_multi(&self) -> bool {
        self.0.multi || self.0.token.is_multi()
    }

    pub fn is_singleton(&self) -> bool {
        self.0.singleton || self.0.per_injector || self.0.token.options().singleton
    }

    pub fn is_per_injector(&self) -> bool {
        self.0.per_injector
    }

    pub fn restrict_scope(&self) -> Option<&InjectionScope> {
        self.0
            .restrict_scope
            .as_ref()
            .or(self.0.token.options().restrict_scope.as_ref())
    }

    pub(crate) fn kind(&self) -> &ProviderKind {
        &self.0.kind
    }

    pub(crate) fn deps(&self) -> &Dependencies {
        &self.0.deps
    }

    pub(crate) fn providers(&self) -> &[AnyProvider] {
        &self.0.providers
    }

    pub(crate) fn dispose_fn(&self) -> Option<&DisposeFn> {
        self.0.dispose.as_ref()
    }

    /// Scope of the context that instantiates this provider.
    pub(crate) fn scope(&self) -> InjectionScope {
        match &self.0.kind {
            ProviderKind::Class { type_name, .. } => InjectionScope::Class {
                type_name: *type_name,
            },
            _ => InjectionScope::Factory {
                token: self.0.token.description().to_string(),
            },
        }
    }
}

impl fmt::Debug for AnyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            ProviderKind::Class { type_name, .. } => short_type_name(type_name),
            ProviderKind::Factory { .. } => "factory",
            ProviderKind::AsyncFactory { .. } => "async factory",
            ProviderKind::Value(_) => "value",
        };
        write!(f, "Provider({} <- {kind})", self.0.token)
    }
}

/// Declaration of how to produce a value for a token.
///
/// The variant is fixed by the constructor used, so a provider can never mix
/// class, factory and value strategies.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis::{Dependencies, InjectionToken, Provider};
///
/// let name = InjectionToken::<String>::new("Name");
/// let greeting = InjectionToken::<Arc<String>>::new("Greeting");
///
/// let providers = [
///     Provider::value(&name, "world".to_string()).into_any(),
///     Provider::factory(&greeting, {
///         let name = name.clone();
///         move |deps| Ok(Arc::new(format!("hello, {}", deps.get(&name)?)))
///     })
///     .deps(Dependencies::new().token(&name))
///     .into_any(),
/// ];
/// assert_eq!(providers.len(), 2);
/// ```
pub struct Provider<T> {
    inner: ProviderInner,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Provider<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_kind(token: &InjectionToken<T>, kind: ProviderKind) -> Self {
        Self {
            inner: ProviderInner {
                id: NEXT_PROVIDER.fetch_add(1, Ordering::Relaxed),
                token: token.erase(),
                kind,
                deps: Dependencies::new(),
                providers: Vec::new(),
                multi: false,
                singleton: false,
                per_injector: false,
                restrict_scope: None,
                dispose: None,
            },
            _marker: PhantomData,
        }
    }

    /// Provides a precomputed value.
    pub fn value(token: &InjectionToken<T>, value: T) -> Self {
        Self::from_kind(token, ProviderKind::Value(Arc::new(value)))
    }

    /// Provides the result of a synchronous factory.
    ///
    /// The factory receives the resolved [`Provider::deps`].
    pub fn factory<F>(token: &InjectionToken<T>, factory: F) -> Self
    where
        F: Fn(&Resolved) -> Result<T, StdError> + Send + Sync + 'static,
    {
        let build: BuildFn = Arc::new(move |deps: Resolved| -> BoxFuture<'static, Result<Value, StdError>> {
            let result = factory(&deps).map(|value| Arc::new(value) as Value);
            Box::pin(ready(result))
        });
        Self::from_kind(token, ProviderKind::Factory { build })
    }

    /// Provides the result of an asynchronous factory.
    pub fn async_factory<F, Fut>(token: &InjectionToken<T>, factory: F) -> Self
    where
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StdError>> + Send + 'static,
    {
        let build: BuildFn = Arc::new(move |deps: Resolved| -> BoxFuture<'static, Result<Value, StdError>> {
            let future = factory(deps);
            Box::pin(async move { Ok(Arc::new(future.await?) as Value) })
        });
        Self::from_kind(token, ProviderKind::AsyncFactory { build })
    }

    /// Binds class `C` to `token`, converting its handle with `map`.
    ///
    /// Typically used to expose a concrete class behind a trait object token.
    pub fn class_as<C, F>(token: &InjectionToken<T>, map: F) -> Self
    where
        C: Injectable,
        F: Fn(C::Handle) -> T + Send + Sync + 'static,
    {
        let map = Arc::new(map);
        let build: BuildFn = Arc::new(move |deps: Resolved| -> BoxFuture<'static, Result<Value, StdError>> {
            let map = map.clone();
            Box::pin(async move { Ok(Arc::new(map(C::build(deps).await?)) as Value) })
        });
        Self::from_kind(
            token,
            ProviderKind::Class {
                type_id: TypeId::of::<C>(),
                type_name: type_name::<C>(),
                build,
            },
        )
        .deps(C::dependencies())
    }

    /// Provides class `C` under its own class token.
    pub fn class<C>() -> Self
    where
        C: Injectable<Handle = T>,
    {
        Self::class_as::<C, _>(&C::token(), |handle| handle)
    }

    /// Declares the tokens resolved before the provider is invoked.
    pub fn deps(mut self, deps: Dependencies) -> Self {
        self.inner.deps = self.inner.deps.merge(deps);
        self
    }

    /// Registers providers visible only while resolving this provider.
    pub fn providers(mut self, providers: Vec<AnyProvider>) -> Self {
        self.inner.providers.extend(providers);
        self
    }

    pub fn multi(mut self) -> Self {
        self.inner.multi = true;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.inner.singleton = true;
        self
    }

    /// One instance per injector, rather than per owning scope.
    pub fn per_injector(mut self) -> Self {
        self.inner.per_injector = true;
        self
    }

    pub fn restrict_scope(mut self, scope: InjectionScope) -> Self {
        self.inner.restrict_scope = Some(scope);
        self
    }

    /// Disposes produced values together with the context that owns them.
    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        let dispose: DisposeFn = Arc::new(|value: Value, reason: String| -> BoxFuture<'static, Result<(), StdError>> {
            Box::pin(async move {
                match value.downcast_ref::<T>().cloned() {
                    Some(value) => value.dispose(&reason).await,
                    None => Ok(()),
                }
            })
        });
        self.inner.dispose = Some(dispose);
        self
    }

    pub fn into_any(self) -> AnyProvider {
        AnyProvider(Arc::new(self.inner))
    }
}

impl<T> From<Provider<T>> for AnyProvider
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: Provider<T>) -> Self {
        value.into_any()
    }
}

#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) token: AnyToken,
    pub(crate) optional: bool,
}

/// Ordered list of tokens a provider depends on.
///
/// ```rust
/// use trellis::{Dependencies, InjectionToken};
///
/// let url = InjectionToken::<String>::new("DatabaseUrl");
/// let pool = InjectionToken::<u32>::new("PoolSize");
/// let deps = Dependencies::new().token(&url).optional(&pool);
/// assert_eq!(deps.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Dependencies {
    items: Vec<Dependency>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn token<T>(self, token: &InjectionToken<T>) -> Self {
        self.push(token.erase(), false)
    }

    /// Adds a dependency resolving to nothing when no provider exists.
    pub fn optional<T>(self, token: &InjectionToken<T>) -> Self {
        self.push(token.erase(), true)
    }

    pub fn merge(mut self, other: Dependencies) -> Self {
        for dep in other.items {
            self = self.push(dep.token, dep.optional);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.items.iter()
    }

    fn push(mut self, token: AnyToken, optional: bool) -> Self {
        if !self.items.iter().any(|v| v.token == token) {
            self.items.push(Dependency { token, optional });
        }
        self
    }
}

pub(crate) enum Resolution {
    Single(Value),
    Multi(Vec<Value>),
    Missing,
}

/// Dependencies resolved for a provider or a method invocation.
#[derive(Clone)]
pub struct Resolved {
    values: Arc<HashMap<TokenKey, (AnyToken, Resolution)>>,
    params: Arc<HashMap<&'static str, TokenKey>>,
    scope: InjectionScope,
}

impl Resolved {
    pub(crate) fn new(
        values: HashMap<TokenKey, (AnyToken, Resolution)>,
        params: HashMap<&'static str, TokenKey>,
        scope: InjectionScope,
    ) -> Self {
        Self {
            values: Arc::new(values),
            params: Arc::new(params),
            scope,
        }
    }

    /// Scope of the context the dependencies were resolved in.
    pub fn scope(&self) -> &InjectionScope {
        &self.scope
    }

    pub fn get<T>(&self, token: &InjectionToken<T>) -> Result<T, InjectorError>
    where
        T: Clone + 'static,
    {
        self.get_optional(token)?
            .ok_or_else(|| InjectorError::MissingProvider {
                token: token.to_string(),
                context: self.scope.to_string(),
            })
    }

    pub fn get_optional<T>(&self, token: &InjectionToken<T>) -> Result<Option<T>, InjectorError>
    where
        T: Clone + 'static,
    {
        self.single(token.key(), token.as_any())
    }

    /// Returns every value of a multi token, in registration order.
    pub fn get_all<T>(&self, token: &InjectionToken<T>) -> Result<Vec<T>, InjectorError>
    where
        T: Clone + 'static,
    {
        match self.lookup(token.key(), token.as_any())? {
            (_, Resolution::Multi(values)) => values.iter().map(|v| downcast(token.as_any(), v)).collect(),
            (_, Resolution::Single(value)) => Ok(vec![downcast(token.as_any(), value)?]),
            (_, Resolution::Missing) => Ok(Vec::new()),
        }
    }

    /// Returns the value of the method parameter called `name`.
    pub fn param<T>(&self, name: &str) -> Result<T, InjectorError>
    where
        T: Clone + 'static,
    {
        self.param_optional(name)?
            .ok_or_else(|| InjectorError::MissingProvider {
                token: name.to_string(),
                context: self.scope.to_string(),
            })
    }

    pub fn param_optional<T>(&self, name: &str) -> Result<Option<T>, InjectorError>
    where
        T: Clone + 'static,
    {
        let key = self
            .params
            .get(name)
            .copied()
            .ok_or_else(|| InjectorError::UndeclaredDependency {
                token: name.to_string(),
            })?;
        let (token, _) = self.lookup(key, &name)?;
        let token = token.clone();
        self.single(key, &token)
    }

    fn single<T>(&self, key: TokenKey, token: &dyn fmt::Display) -> Result<Option<T>, InjectorError>
    where
        T: Clone + 'static,
    {
        match self.lookup(key, token)? {
            (token, Resolution::Single(value)) => Ok(Some(downcast(token, value)?)),
            (token, Resolution::Multi(_)) => Err(InjectorError::InvalidToken {
                token: token.to_string(),
                reason: "multi token requested as a single value".into(),
            }),
            (_, Resolution::Missing) => Ok(None),
        }
    }

    fn lookup(
        &self,
        key: TokenKey,
        token: &dyn fmt::Display,
    ) -> Result<(&AnyToken, &Resolution), InjectorError> {
        self.values
            .get(&key)
            .map(|(token, resolution)| (token, resolution))
            .ok_or_else(|| InjectorError::UndeclaredDependency {
                token: token.to_string(),
            })
    }
}

pub(crate) fn downcast<T>(token: &AnyToken, value: &Value) -> Result<T, InjectorError>
where
    T: Clone + 'static,
{
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| InjectorError::InvalidToken {
            token: token.to_string(),
            reason: format!("resolved value is not {}", type_name::<T>()),
        })
}
