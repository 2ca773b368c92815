use thiserror::Error;

/// Type alias for boxed errors that can be sent across threads.
///
/// Factories, scanners and invoked methods report failures with this type;
/// the injector wraps them into [`InjectorError`] with the token or method
/// that failed.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while resolving tokens or invoking methods.
///
/// Wiring errors (everything except [`InjectorError::Provider`],
/// [`InjectorError::Invocation`] and [`InjectorError::Dispose`]) are never
/// retried: the caller has to fix the registrations.
#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("Missing injection token for {target}")]
    MissingToken { target: String },
    #[error("Invalid injection token {token}: {reason}")]
    InvalidToken { token: String, reason: String },
    #[error("No provider for {token} in {context}")]
    MissingProvider { token: String, context: String },
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },
    #[error("{token} is restricted to scope {scope} and cannot be resolved from {context}")]
    ScopeRestriction {
        token: String,
        scope: String,
        context: String,
    },
    #[error("Injector context {context} is disposed")]
    Disposed { context: String },
    #[error("{token} was not declared as a dependency")]
    UndeclaredDependency { token: String },
    #[error("Provider for {token} failed: {source}")]
    Provider {
        token: String,
        #[source]
        source: StdError,
    },
    #[error("Invocation of {method} failed: {source}")]
    Invocation {
        method: String,
        #[source]
        source: StdError,
    },
    #[error("Cannot dispose {context}: {source}")]
    Dispose {
        context: String,
        #[source]
        source: StdError,
    },
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Errors raised when a provider cannot be added to a repository.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{token} is registered as a multi provider and cannot accept a single provider")]
    ExpectedMulti { token: String },
    #[error("{token} is registered as a single provider and cannot accept a multi provider")]
    ExpectedSingle { token: String },
}

/// Errors raised while starting or running a [`crate::Container`].
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Injector(#[from] InjectorError),
    #[error("Scanner failed: {0}")]
    Scan(#[source] StdError),
    #[error("Entry point failed: {0}")]
    EntryPoint(#[source] StdError),
}
