use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::scope::short_type_name;
use crate::{AnyProvider, AnyToken, InjectionToken, Resolved, StdError};

type CallFn<T, R> =
    Arc<dyn Fn(Arc<T>, Resolved) -> BoxFuture<'static, Result<R, StdError>> + Send + Sync>;

/// Parameter of an injectable method.
#[derive(Clone)]
pub struct Param {
    name: &'static str,
    token: Option<AnyToken>,
    optional: bool,
    providers: Vec<AnyProvider>,
}

impl Param {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn token(&self) -> Option<&AnyToken> {
        self.token.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Providers visible only while resolving this parameter.
    pub fn providers(&self) -> &[AnyProvider] {
        &self.providers
    }
}

/// Method descriptor for [`crate::Injector::invoke`].
///
/// A method has an ordered list of parameters, each resolved by token when
/// the method is invoked, and a body receiving the target instance together
/// with the resolved arguments.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis::{InjectionToken, Method};
///
/// struct Greeter;
///
/// let name = InjectionToken::<String>::new("Name");
/// let greet = Method::<Greeter, String>::new("greet", |_greeter, args| async move {
///     let name: String = args.param("name")?;
///     Ok(format!("hello, {name}"))
/// })
/// .param("name", &name);
/// assert_eq!(greet.params().len(), 1);
/// ```
pub struct Method<T: ?Sized, R> {
    target: &'static str,
    name: &'static str,
    params: Vec<Param>,
    call: CallFn<T, R>,
}

impl<T: ?Sized, R> Clone for Method<T, R> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            name: self.name,
            params: self.params.clone(),
            call: self.call.clone(),
        }
    }
}

impl<T, R> Method<T, R>
where
    T: ?Sized + Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, call: F) -> Self
    where
        F: Fn(Arc<T>, Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, StdError>> + Send + 'static,
    {
        Self {
            target: type_name::<T>(),
            name,
            params: Vec::new(),
            call: Arc::new(
                move |target, args| -> BoxFuture<'static, Result<R, StdError>> {
                    Box::pin(call(target, args))
                },
            ),
        }
    }

    pub fn param<V>(self, name: &'static str, token: &InjectionToken<V>) -> Self {
        self.push(name, Some(token.erase()), false, Vec::new())
    }

    /// Adds a parameter resolving to nothing when no provider exists.
    pub fn optional_param<V>(self, name: &'static str, token: &InjectionToken<V>) -> Self {
        self.push(name, Some(token.erase()), true, Vec::new())
    }

    /// Adds a parameter with providers visible only while resolving it.
    pub fn param_with_providers<V>(
        self,
        name: &'static str,
        token: &InjectionToken<V>,
        providers: Vec<AnyProvider>,
    ) -> Self {
        self.push(name, Some(token.erase()), false, providers)
    }

    /// Adds a parameter without a token; invoking the method fails.
    pub fn untyped_param(self, name: &'static str) -> Self {
        self.push(name, None, false, Vec::new())
    }

    /// Converts the method result with `map`.
    pub fn map<U, F>(self, map: F) -> Method<T, U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let call = self.call;
        let map = Arc::new(map);
        Method {
            target: self.target,
            name: self.name,
            params: self.params,
            call: Arc::new(
                move |target, args| -> BoxFuture<'static, Result<U, StdError>> {
                    let future = call(target, args);
                    let map = map.clone();
                    Box::pin(async move { Ok(map(future.await?)) })
                },
            ),
        }
    }

    fn push(
        mut self,
        name: &'static str,
        token: Option<AnyToken>,
        optional: bool,
        providers: Vec<AnyProvider>,
    ) -> Self {
        self.params.push(Param {
            name,
            token,
            optional,
            providers,
        });
        self
    }
}

impl<T: ?Sized, R> Method<T, R> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name of the target.
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn call(&self, target: Arc<T>, args: Resolved) -> BoxFuture<'static, Result<R, StdError>> {
        (self.call)(target, args)
    }
}

impl<T: ?Sized, R> fmt::Display for Method<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", short_type_name(self.target), self.name)
    }
}

impl<T: ?Sized, R> fmt::Debug for Method<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("target", &self.target)
            .field("name", &self.name)
            .field("params", &self.params.iter().map(|v| v.name).collect::<Vec<_>>())
            .finish()
    }
}
