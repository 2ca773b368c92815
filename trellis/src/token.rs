use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::InjectionScope;
use crate::scope::short_type_name;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Identity of a token.
///
/// Symbol keys are allocated from a process-wide counter, so two tokens with
/// the same description never compare equal. Type keys identify class
/// providers by the type they instantiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Type(TypeId),
    Symbol(u64),
}

/// Options carried by a token and applied to every provider registered for it.
#[derive(Clone, Debug, Default)]
pub struct TokenOptions {
    /// Many providers may share the token; it resolves to an ordered sequence.
    pub multi: bool,
    /// One instance per owning scope.
    pub singleton: bool,
    /// The token only resolves within this scope or its descendants.
    pub restrict_scope: Option<InjectionScope>,
}

impl TokenOptions {
    pub fn multi() -> Self {
        Self {
            multi: true,
            ..Default::default()
        }
    }

    pub fn singleton() -> Self {
        Self {
            singleton: true,
            ..Default::default()
        }
    }

    pub fn restrict_scope(mut self, scope: InjectionScope) -> Self {
        self.restrict_scope = Some(scope);
        self
    }
}

struct TokenInfo {
    key: TokenKey,
    description: Cow<'static, str>,
    options: TokenOptions,
}

/// Type erased injection token.
#[derive(Clone)]
pub struct AnyToken(Arc<TokenInfo>);

impl AnyToken {
    pub fn key(&self) -> TokenKey {
        self.0.key
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    pub fn options(&self) -> &TokenOptions {
        &self.0.options
    }

    pub fn is_multi(&self) -> bool {
        self.0.options.multi
    }
}

impl PartialEq for AnyToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for AnyToken {}

impl Hash for AnyToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state)
    }
}

impl fmt::Display for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.description)
    }
}

impl fmt::Debug for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InjectionToken({})", self.0.description)
    }
}

/// Typed identifier for a kind of injectable value.
///
/// `T` is the type of the resolved value. Values are cloned out of the
/// injector, so `T` is usually an `Arc` or a small `Clone` type.
pub struct InjectionToken<T> {
    inner: AnyToken,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for InjectionToken<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for InjectionToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> fmt::Display for InjectionToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> PartialEq for InjectionToken<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> InjectionToken<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a new unique token.
    pub fn new(description: impl Into<Cow<'static, str>>) -> Self {
        Self::with_options(description, TokenOptions::default())
    }

    /// Creates a new unique token carrying `options`.
    pub fn with_options(description: impl Into<Cow<'static, str>>, options: TokenOptions) -> Self {
        let key = TokenKey::Symbol(NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed));
        Self::from_parts(key, description.into(), options)
    }

    /// Returns the token identifying class `C`, resolving to values of type `T`.
    ///
    /// Every call returns a token equal to the previous ones.
    pub fn for_class<C>() -> Self
    where
        C: 'static,
    {
        Self::for_class_with::<C>(TokenOptions::default())
    }

    pub fn for_class_with<C>(options: TokenOptions) -> Self
    where
        C: 'static,
    {
        Self::from_parts(
            TokenKey::Type(TypeId::of::<C>()),
            Cow::Borrowed(short_type_name(type_name::<C>())),
            options,
        )
    }

    fn from_parts(key: TokenKey, description: Cow<'static, str>, options: TokenOptions) -> Self {
        Self {
            inner: AnyToken(Arc::new(TokenInfo {
                key,
                description,
                options,
            })),
            _marker: PhantomData,
        }
    }
}

impl<T> InjectionToken<T> {
    pub fn erase(&self) -> AnyToken {
        self.inner.clone()
    }

    pub fn as_any(&self) -> &AnyToken {
        &self.inner
    }

    pub fn key(&self) -> TokenKey {
        self.inner.key()
    }

    pub fn options(&self) -> &TokenOptions {
        self.inner.options()
    }
}

/// Helpers for creating symbol tokens scoped to a logical package namespace.
pub struct SymbolToken;

impl SymbolToken {
    pub fn new<T>(description: impl Into<Cow<'static, str>>) -> InjectionToken<T>
    where
        T: Send + Sync + 'static,
    {
        InjectionToken::new(description)
    }

    /// Creates a token described as `package#description`.
    pub fn local<T>(package: &str, description: &str) -> InjectionToken<T>
    where
        T: Send + Sync + 'static,
    {
        InjectionToken::new(format!("{package}#{description}"))
    }

    /// Creates a `package#description` token carrying `options`.
    pub fn opinionated<T>(package: &str, description: &str, options: TokenOptions) -> InjectionToken<T>
    where
        T: Send + Sync + 'static,
    {
        InjectionToken::with_options(format!("{package}#{description}"), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn test_symbol_identity() {
        let a = SymbolToken::local::<u32>("test", "Value");
        let b = SymbolToken::local::<u32>("test", "Value");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_string(), "test#Value");
    }

    #[test]
    fn test_class_identity() {
        let a = InjectionToken::<Arc<Marker>>::for_class::<Marker>();
        let b = InjectionToken::<Arc<Marker>>::for_class::<Marker>();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Marker");
    }
}
