use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};

use crate::context::InjectorContext;
use crate::provider::{ProviderKind, Resolution, Value};
use crate::repository::Entry;
use crate::{
    AnyProvider, AnyToken, Dependencies, INJECTION_SCOPE, INJECTOR, Injector, InjectorError,
    RegistrationError, Repository, Resolved,
};

enum Found {
    Single(AnyProvider, Arc<InjectorContext>),
    Multi(Vec<(AnyProvider, Arc<InjectorContext>)>),
}

/// Resolves `token` from `context`.
///
/// Returns the resolution together with the context that produced it.
pub(crate) fn resolve(
    context: Arc<InjectorContext>,
    token: AnyToken,
    optional: bool,
) -> BoxFuture<'static, Result<(Resolution, Arc<InjectorContext>), InjectorError>> {
    Box::pin(async move {
        if context.is_disposed() {
            return Err(InjectorError::Disposed {
                context: context.path(),
            });
        }
        if token.key() == INJECTOR.key() {
            let injector = Injector::from_context(context.nearest_injector());
            return Ok((Resolution::Single(Arc::new(injector)), context));
        }
        if token.key() == INJECTION_SCOPE.key() {
            let scope = context.requester_scope();
            return Ok((Resolution::Single(Arc::new(scope)), context));
        }
        check_cycle(&context, &token)?;
        let Some(found) = lookup(&context, &token)? else {
            if optional {
                return Ok((Resolution::Missing, context));
            }
            return Err(InjectorError::MissingProvider {
                token: token.to_string(),
                context: context.path(),
            });
        };
        match found {
            Found::Single(provider, owner) => {
                let (value, producer) = instantiate(&context, &provider, owner).await?;
                Ok((Resolution::Single(value), producer))
            }
            Found::Multi(providers) => {
                let requester = &context;
                let values = try_join_all(providers.iter().map(|(provider, owner)| async move {
                    instantiate(requester, provider, owner.clone())
                        .await
                        .map(|(value, _)| value)
                }))
                .await?;
                Ok((Resolution::Multi(values), context))
            }
        }
    })
}

/// Returns `true` when `token` has a provider reachable from `context`.
pub(crate) fn can_resolve(context: &Arc<InjectorContext>, token: &AnyToken) -> bool {
    token.key() == INJECTOR.key()
        || token.key() == INJECTION_SCOPE.key()
        || matches!(lookup(context, token), Ok(Some(_)))
}

/// Resolves every dependency concurrently; fails on the first failure.
pub(crate) async fn resolve_dependencies(
    context: &Arc<InjectorContext>,
    deps: &Dependencies,
) -> Result<Resolved, InjectorError> {
    let resolutions = try_join_all(deps.iter().map(|dep| {
        let token = dep.token.clone();
        let future = resolve(context.clone(), token.clone(), dep.optional);
        async move {
            let (resolution, _) = future.await?;
            Ok::<_, InjectorError>((token.key(), (token, resolution)))
        }
    }))
    .await?;
    Ok(Resolved::new(
        resolutions.into_iter().collect(),
        HashMap::new(),
        context.scope().clone(),
    ))
}

fn check_cycle(context: &Arc<InjectorContext>, token: &AnyToken) -> Result<(), InjectorError> {
    let mut chain = Vec::new();
    let mut current = Some(context.clone());
    while let Some(context) = current {
        if let Some(resolving) = context.resolving() {
            chain.push(resolving.to_string());
            if resolving == token {
                chain.reverse();
                chain.push(token.to_string());
                return Err(InjectorError::CircularDependency { chain });
            }
        }
        current = context.resolution_parent();
    }
    Ok(())
}

/// Searches the context chain, then the process-wide repository.
///
/// Multi providers are collected from every level, outermost first. Global
/// providers already registered along the chain (by an ambient scan) are
/// only collected once. A single provider behind a multi level is a
/// registration conflict.
fn lookup(
    context: &Arc<InjectorContext>,
    token: &AnyToken,
) -> Result<Option<Found>, RegistrationError> {
    let key = token.key();
    let mut levels: Vec<(Vec<AnyProvider>, Arc<InjectorContext>)> = Vec::new();
    let mut current = Some(context.clone());
    let mut root = context.clone();
    while let Some(context) = current {
        match context.repository().lookup(key) {
            Some(Entry::Single(provider)) if levels.is_empty() => {
                return Ok(Some(Found::Single(provider, context)));
            }
            Some(Entry::Single(_)) => {
                return Err(RegistrationError::ExpectedMulti {
                    token: token.to_string(),
                });
            }
            Some(Entry::Multi(providers)) => levels.push((providers, context.clone())),
            None => {}
        }
        current = context.parent().cloned();
        root = context;
    }
    match Repository::global().lookup(key) {
        Some(Entry::Single(provider)) if levels.is_empty() => {
            return Ok(Some(Found::Single(provider, root)));
        }
        Some(Entry::Single(_)) => {
            return Err(RegistrationError::ExpectedMulti {
                token: token.to_string(),
            });
        }
        Some(Entry::Multi(providers)) => {
            let seen: HashSet<u64> = levels
                .iter()
                .flat_map(|(providers, _)| providers.iter().map(AnyProvider::id))
                .collect();
            let providers: Vec<_> = providers
                .into_iter()
                .filter(|v| !seen.contains(&v.id()))
                .collect();
            if !providers.is_empty() {
                levels.push((providers, root));
            }
        }
        None => {}
    }
    if levels.is_empty() {
        return Ok(None);
    }
    Ok(Some(Found::Multi(
        levels
            .into_iter()
            .rev()
            .flat_map(|(providers, owner)| {
                providers
                    .into_iter()
                    .map(move |provider| (provider, owner.clone()))
            })
            .collect(),
    )))
}

async fn instantiate(
    requester: &Arc<InjectorContext>,
    provider: &AnyProvider,
    owner: Arc<InjectorContext>,
) -> Result<(Value, Arc<InjectorContext>), InjectorError> {
    let restricted = match provider.restrict_scope() {
        Some(scope) => Some(requester.find_scope(scope).ok_or_else(|| {
            InjectorError::ScopeRestriction {
                token: provider.token().to_string(),
                scope: scope.to_string(),
                context: requester.path(),
            }
        })?),
        None => None,
    };
    if let ProviderKind::Value(value) = provider.kind() {
        return Ok((value.clone(), owner));
    }
    if !provider.is_singleton() {
        let value = build(requester.clone(), None, provider).await?;
        track_disposable(&requester.nearest_injector(), provider, &value);
        return Ok((value, requester.clone()));
    }
    let anchor = match restricted {
        Some(context) => context,
        None if provider.is_per_injector() => requester.nearest_injector(),
        None => owner,
    };
    // Concurrent requests for the same singleton wait for the first one.
    let cell = anchor.singleton_cell(provider.id());
    let owner = &anchor;
    let value = cell
        .get_or_try_init(move || async move {
            let value = build(owner.clone(), Some(requester), provider).await?;
            track_disposable(owner, provider, &value);
            Ok::<_, InjectorError>(value)
        })
        .await?
        .clone();
    Ok((value, anchor))
}

async fn build(
    parent: Arc<InjectorContext>,
    requester: Option<&Arc<InjectorContext>>,
    provider: &AnyProvider,
) -> Result<Value, InjectorError> {
    let factory = match provider.kind() {
        ProviderKind::Class { build, .. }
        | ProviderKind::Factory { build }
        | ProviderKind::AsyncFactory { build } => build.clone(),
        ProviderKind::Value(value) => return Ok(value.clone()),
    };
    let context = InjectorContext::for_provider(&parent, requester, provider)?;
    let deps = resolve_dependencies(&context, provider.deps()).await?;
    tracing::trace!(token = %provider.token(), context = %context.path(), "Building provider");
    factory(deps)
        .await
        .map_err(|source| InjectorError::Provider {
            token: provider.token().to_string(),
            source,
        })
}

fn track_disposable(context: &InjectorContext, provider: &AnyProvider, value: &Value) {
    if let Some(dispose) = provider.dispose_fn() {
        context.track_disposable(value.clone(), dispose.clone());
    }
}
