use std::sync::Arc;

use async_trait::async_trait;

use crate::{Dependencies, InjectionToken, Provider, Resolved, StdError};

/// Trait for classes the injector can instantiate.
///
/// A class declares the tokens it depends on and builds itself from their
/// resolved values. It is registered with [`Provider::class`] or bound to an
/// interface token with [`Provider::class_as`].
///
/// ```rust
/// use std::sync::Arc;
/// use trellis::{Dependencies, Injectable, InjectionToken, Resolved, StdError};
///
/// static DATABASE_URL: std::sync::LazyLock<InjectionToken<String>> =
///     std::sync::LazyLock::new(|| InjectionToken::new("DatabaseUrl"));
///
/// struct Database {
///     url: String,
/// }
///
/// impl Injectable for Database {
///     type Handle = Arc<Self>;
///
///     async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
///         Ok(Arc::new(Self {
///             url: deps.get(&DATABASE_URL)?,
///         }))
///     }
///
///     fn dependencies() -> Dependencies {
///         Dependencies::new().token(&DATABASE_URL)
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Type of the value produced for the class token, usually `Arc<Self>`.
    type Handle: Clone + Send + Sync + 'static;

    fn build(deps: Resolved) -> impl Future<Output = Result<Self::Handle, StdError>> + Send;

    fn dependencies() -> Dependencies {
        Dependencies::new()
    }

    fn token() -> InjectionToken<Self::Handle> {
        InjectionToken::for_class::<Self>()
    }

    /// Provider registered for the class. Override to add scoping flags.
    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>()
    }
}

/// Values releasing resources when their owning context is disposed.
#[async_trait]
pub trait Disposable: Send + Sync {
    async fn dispose(&self, reason: &str) -> Result<(), StdError>;
}

#[async_trait]
impl<T> Disposable for Arc<T>
where
    T: Disposable + ?Sized,
{
    async fn dispose(&self, reason: &str) -> Result<(), StdError> {
        T::dispose(self, reason).await
    }
}
