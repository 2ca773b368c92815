use std::fmt;
use std::mem::take;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::provider::{DisposeFn, Value};
use crate::{
    AnyProvider, AnyToken, InjectionScope, InjectorError, Registerable, RegistrationSource,
    Repository,
};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Role of a node in the context tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    /// Root, application or request injector.
    Injector,
    /// Short-lived node instantiating a provider.
    Provider,
    /// Node wrapping a single method invocation.
    Invocation,
    /// Node resolving one parameter of an invocation.
    Param,
}

/// Node in the injector context tree.
///
/// Contexts bound the lifetime of singletons and disposable values and are
/// used to detect circular dependencies and scope violations.
pub struct InjectorContext {
    id: u64,
    scope: InjectionScope,
    kind: ContextKind,
    parent: Option<Arc<InjectorContext>>,
    // Context that requested the provider when it differs from the parent,
    // e.g. a root singleton first requested from a request scope.
    requester: Option<Weak<InjectorContext>>,
    repository: Arc<Repository>,
    resolving: Option<AnyToken>,
    singletons: DashMap<u64, Arc<OnceCell<Value>>>,
    disposables: Mutex<Vec<(Value, DisposeFn)>>,
    children: Mutex<Vec<Weak<InjectorContext>>>,
    disposed: AtomicBool,
}

impl InjectorContext {
    pub(crate) fn root(repository: Arc<Repository>) -> Arc<Self> {
        Arc::new(Self::new(
            InjectionScope::Root,
            ContextKind::Injector,
            None,
            repository,
        ))
    }

    /// Creates a child context seeded with `items`.
    pub(crate) fn child(
        parent: &Arc<Self>,
        kind: ContextKind,
        scope: InjectionScope,
        items: Vec<Registerable>,
    ) -> Result<Arc<Self>, InjectorError> {
        if parent.is_disposed() {
            return Err(InjectorError::Disposed {
                context: parent.path(),
            });
        }
        let repository = Repository::new(scope.to_string());
        repository.register(&RegistrationSource::Injector(scope.to_string()), items)?;
        let context = Arc::new(Self::new(
            scope,
            kind,
            Some(parent.clone()),
            Arc::new(repository),
        ));
        if matches!(kind, ContextKind::Injector | ContextKind::Invocation) {
            let owner = parent.nearest_injector();
            let mut children = lock(&owner.children);
            children.retain(|v| v.strong_count() > 0);
            children.push(Arc::downgrade(&context));
        }
        Ok(context)
    }

    /// Creates the context instantiating `provider`.
    ///
    /// Provider-local providers are registered here, so they are visible to
    /// the provider's dependency subgraph only.
    pub(crate) fn for_provider(
        parent: &Arc<Self>,
        requester: Option<&Arc<Self>>,
        provider: &AnyProvider,
    ) -> Result<Arc<Self>, InjectorError> {
        let repository = Repository::new(provider.token().to_string());
        if !provider.providers().is_empty() {
            repository.register(
                &RegistrationSource::Provider(provider.token().to_string()),
                provider
                    .providers()
                    .iter()
                    .cloned()
                    .map(Registerable::Provider),
            )?;
        }
        let mut context = Self::new(
            provider.scope(),
            ContextKind::Provider,
            Some(parent.clone()),
            Arc::new(repository),
        );
        context.requester = requester.map(Arc::downgrade);
        context.resolving = Some(provider.token().clone());
        Ok(Arc::new(context))
    }

    fn new(
        scope: InjectionScope,
        kind: ContextKind,
        parent: Option<Arc<Self>>,
        repository: Arc<Repository>,
    ) -> Self {
        Self {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            scope,
            kind,
            parent,
            requester: None,
            repository,
            resolving: None,
            singletons: DashMap::new(),
            disposables: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> &InjectionScope {
        &self.scope
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&Arc<InjectorContext>> {
        self.parent.as_ref()
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Human readable chain of scopes from the root to this context.
    pub fn path(&self) -> String {
        let mut scopes = vec![self.scope.to_string()];
        let mut current = self.parent.as_ref();
        while let Some(context) = current {
            scopes.push(context.scope.to_string());
            current = context.parent.as_ref();
        }
        scopes.reverse();
        scopes.join(" > ")
    }

    pub(crate) fn resolving(&self) -> Option<&AnyToken> {
        self.resolving.as_ref()
    }

    /// Next context in the resolution chain, used for cycle detection.
    pub(crate) fn resolution_parent(&self) -> Option<Arc<Self>> {
        self.requester
            .as_ref()
            .and_then(Weak::upgrade)
            .or_else(|| self.parent.clone())
    }

    /// Scope of the entity that requested the current resolution target.
    pub(crate) fn requester_scope(&self) -> InjectionScope {
        match self.kind {
            ContextKind::Provider => self
                .resolution_parent()
                .map(|v| v.scope.clone())
                .unwrap_or(InjectionScope::Root),
            _ => self.scope.clone(),
        }
    }

    /// Closest context owning request-like lifetimes: an injector or an invocation.
    pub(crate) fn nearest_injector(self: &Arc<Self>) -> Arc<Self> {
        let mut current = self.clone();
        loop {
            if matches!(current.kind, ContextKind::Injector | ContextKind::Invocation) {
                return current;
            }
            match current.parent.clone() {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Closest context, this one included, with the given scope.
    pub(crate) fn find_scope(self: &Arc<Self>, scope: &InjectionScope) -> Option<Arc<Self>> {
        let mut current = Some(self.clone());
        while let Some(context) = current {
            if context.scope == *scope {
                return Some(context);
            }
            current = context.parent.clone();
        }
        None
    }

    pub(crate) fn singleton_cell(&self, provider_id: u64) -> Arc<OnceCell<Value>> {
        self.singletons
            .entry(provider_id)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub(crate) fn track_disposable(&self, value: Value, dispose: DisposeFn) {
        lock(&self.disposables).push((value, dispose));
    }

    /// Disposes live child contexts, then owned disposable values in reverse
    /// creation order. Every value is disposed even if an earlier one fails;
    /// the first failure is returned.
    pub(crate) fn dispose<'a>(
        self: &'a Arc<Self>,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<(), InjectorError>> {
        Box::pin(async move {
            if self.disposed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            let mut first_error = None;
            let children: Vec<_> = take(&mut *lock(&self.children))
                .into_iter()
                .filter_map(|v| v.upgrade())
                .collect();
            for child in children.iter().rev() {
                if let Err(err) = child.dispose(reason).await {
                    first_error.get_or_insert(err);
                }
            }
            let disposables = take(&mut *lock(&self.disposables));
            for (value, dispose) in disposables.into_iter().rev() {
                if let Err(source) = dispose(value, reason.to_string()).await {
                    tracing::warn!(context = %self.path(), error = %source, "Cannot dispose value");
                    first_error.get_or_insert(InjectorError::Dispose {
                        context: self.path(),
                        source,
                    });
                }
            }
            self.singletons.clear();
            tracing::debug!(context = %self.path(), reason, "Injector context disposed");
            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

impl fmt::Debug for InjectorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
