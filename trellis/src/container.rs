use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::{
    AnyToken, ContainerError, InjectionToken, Injector, Module, Registerable, RegistrationSource,
    Repository, SCANNER, Scanner, StdError, SymbolToken, resolver,
};

/// Application entry point, run by [`Container::run`].
#[async_trait]
pub trait EntryPoint: Send + Sync {
    async fn run(&self) -> Result<(), StdError>;
}

/// Optional entry point resolved when the container starts.
pub static ENTRY_POINT: LazyLock<InjectionToken<Arc<dyn EntryPoint>>> =
    LazyLock::new(|| SymbolToken::local("trellis", "EntryPoint"));

/// Builder collecting registerables and scanners for a [`Container`].
///
/// ```rust
/// use trellis::{Container, InjectionToken, Provider};
///
/// # async fn example() -> Result<(), trellis::ContainerError> {
/// let name = InjectionToken::<String>::new("Name");
/// let container = Container::builder()
///     .add(Provider::value(&name, "app".to_string()))
///     .start()
///     .await?;
/// assert_eq!(container.injector().inject(&name).await?, "app");
/// container.dispose("shutdown").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    items: Vec<Registerable>,
    scanners: Vec<Arc<dyn Scanner>>,
    eager: Vec<AnyToken>,
}

impl ContainerBuilder {
    pub fn add(mut self, item: impl Into<Registerable>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn add_module(self, module: Module) -> Self {
        self.add(module)
    }

    pub fn add_scanner<S>(mut self, scanner: S) -> Self
    where
        S: Scanner + 'static,
    {
        self.scanners.push(Arc::new(scanner));
        self
    }

    /// Resolves `token` while starting, failing the start if it cannot be resolved.
    pub fn eager<T>(mut self, token: &InjectionToken<T>) -> Self {
        self.eager.push(token.erase());
        self
    }

    /// Registers the collected items, runs every scanner and resolves the
    /// eager tokens and the entry point.
    ///
    /// Scanners registered as [`SCANNER`] providers run after the explicit
    /// ones. A failing scanner aborts the start.
    pub async fn start(self) -> Result<Container, ContainerError> {
        let span = tracing::info_span!("container");
        let repository = Arc::new(Repository::new("Root"));
        repository
            .register(&RegistrationSource::Container, self.items)
            .map_err(crate::InjectorError::from)?;
        let injector = Injector::new(repository.clone());
        let mut scanners = self.scanners;
        scanners.extend(injector.inject_all(&SCANNER).await?);
        for scanner in scanners {
            let items = scanner.scan().await.map_err(ContainerError::Scan)?;
            tracing::debug!(parent: &span, scanner = scanner.name(), items = items.len(), "Scanned");
            repository
                .register(&RegistrationSource::Scanner(scanner.name().to_string()), items)
                .map_err(crate::InjectorError::from)?;
        }
        for token in self.eager {
            resolver::resolve(injector.context().clone(), token, false).await?;
        }
        let entry_point = injector.inject_optional(&ENTRY_POINT).await?;
        tracing::info!(parent: &span, providers = repository.len(), "Container started");
        Ok(Container {
            injector,
            entry_point,
        })
    }
}

/// Started application container.
pub struct Container {
    injector: Injector,
    entry_point: Option<Arc<dyn EntryPoint>>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    /// Root injector of the container.
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Runs the entry point, if one is registered.
    pub async fn run(&self) -> Result<(), ContainerError> {
        match &self.entry_point {
            Some(entry_point) => entry_point.run().await.map_err(ContainerError::EntryPoint),
            None => Ok(()),
        }
    }

    /// Disposes the root context and every live child context.
    pub async fn dispose(&self, reason: &str) -> Result<(), ContainerError> {
        self.injector.dispose(reason).await?;
        tracing::info!(reason, "Container disposed");
        Ok(())
    }
}
