use std::collections::{HashMap, hash_map};
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use crate::{AnyProvider, AnyToken, Registerable, RegistrationError, TokenKey};

/// Origin of a registration, used to recognise repeated registrations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationSource {
    Container,
    Module(String),
    Scanner(String),
    Provider(String),
    Injector(String),
    Global,
}

impl fmt::Display for RegistrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationSource::Container => write!(f, "container"),
            RegistrationSource::Module(name) => write!(f, "module {name}"),
            RegistrationSource::Scanner(name) => write!(f, "scanner {name}"),
            RegistrationSource::Provider(name) => write!(f, "provider {name}"),
            RegistrationSource::Injector(name) => write!(f, "injector {name}"),
            RegistrationSource::Global => write!(f, "global registry"),
        }
    }
}

struct Registration {
    provider: AnyProvider,
    source: RegistrationSource,
}

impl Registration {
    fn is_same(&self, provider: &AnyProvider, source: &RegistrationSource) -> bool {
        if self.provider.id() == provider.id() {
            return true;
        }
        match (self.provider.class_type(), provider.class_type()) {
            (Some(lhs), Some(rhs)) => lhs == rhs && self.source == *source,
            _ => false,
        }
    }
}

enum Slot {
    Single(Registration),
    Multi(Vec<Registration>),
}

#[derive(Default)]
struct State {
    order: Vec<TokenKey>,
    slots: HashMap<TokenKey, (AnyToken, Slot)>,
}

#[derive(Clone)]
pub(crate) enum Entry {
    Single(AnyProvider),
    Multi(Vec<AnyProvider>),
}

/// Ordered store of providers, keyed by token.
///
/// Every injector context owns one repository. Registering a second single
/// provider for a token replaces the first; multi providers accumulate in
/// registration order.
pub struct Repository {
    name: String,
    state: Mutex<State>,
}

const GLOBAL_REPOSITORY: &str = "global";

static GLOBAL_REPOSITORIES: LazyLock<DashMap<String, Arc<Repository>>> =
    LazyLock::new(DashMap::new);

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Process-wide repository consulted after every context chain.
    ///
    /// It plays the role of definition-time registration: libraries add their
    /// injectables here and containers pick them up through
    /// [`crate::AmbientInjectableScanner`] or at resolution time. Use
    /// [`Repository::reset_global`] to isolate tests.
    pub fn global() -> Arc<Repository> {
        Self::for_key(GLOBAL_REPOSITORY)
    }

    /// Process-wide repository registered under `key`.
    pub fn for_key(key: &str) -> Arc<Repository> {
        GLOBAL_REPOSITORIES
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Repository::new(key)))
            .clone()
    }

    /// Drops every process-wide repository.
    ///
    /// Repositories already handed out keep their contents, but subsequent
    /// calls to [`Repository::global`] and [`Repository::for_key`] start empty.
    pub fn reset_global() {
        GLOBAL_REPOSITORIES.clear();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register<I>(&self, source: &RegistrationSource, items: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = Registerable>,
    {
        for item in items {
            match item {
                Registerable::Provider(provider) => self.register_provider(source, provider)?,
                Registerable::Module(module) => {
                    let source = RegistrationSource::Module(module.name().to_string());
                    self.register(&source, module.items().iter().cloned())?;
                }
            }
        }
        Ok(())
    }

    pub fn register_provider(
        &self,
        source: &RegistrationSource,
        provider: AnyProvider,
    ) -> Result<(), RegistrationError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let key = provider.token().key();
        let token = provider.token().clone();
        let registration = Registration {
            provider,
            source: source.clone(),
        };
        let slot = match state.slots.entry(key) {
            hash_map::Entry::Occupied(entry) => &mut entry.into_mut().1,
            hash_map::Entry::Vacant(entry) => {
                let slot = if registration.provider.is_multi() {
                    Slot::Multi(vec![registration])
                } else {
                    Slot::Single(registration)
                };
                entry.insert((token, slot));
                state.order.push(key);
                return Ok(());
            }
        };
        match slot {
            Slot::Multi(registrations) => {
                if !registration.provider.is_multi() {
                    return Err(RegistrationError::ExpectedMulti {
                        token: token.to_string(),
                    });
                }
                if registrations
                    .iter()
                    .any(|v| v.is_same(&registration.provider, source))
                {
                    return Ok(());
                }
                registrations.push(registration);
            }
            Slot::Single(current) => {
                if registration.provider.is_multi() {
                    return Err(RegistrationError::ExpectedSingle {
                        token: token.to_string(),
                    });
                }
                if current.is_same(&registration.provider, source) {
                    return Ok(());
                }
                tracing::debug!(
                    repository = %self.name,
                    token = %token,
                    previous = %current.source,
                    source = %source,
                    "Replacing provider",
                );
                *current = registration;
            }
        }
        Ok(())
    }

    /// Snapshot of the registered `(token, provider)` pairs in registration order.
    ///
    /// Each call takes a fresh snapshot, so the sequence can be traversed again.
    pub fn entries(&self) -> impl Iterator<Item = (AnyToken, AnyProvider)> + use<> {
        let state = self.state();
        let mut entries = Vec::new();
        for key in &state.order {
            let Some((token, slot)) = state.slots.get(key) else {
                continue;
            };
            match slot {
                Slot::Single(v) => entries.push((token.clone(), v.provider.clone())),
                Slot::Multi(v) => {
                    entries.extend(v.iter().map(|v| (token.clone(), v.provider.clone())))
                }
            }
        }
        entries.into_iter()
    }

    pub fn contains(&self, token: &AnyToken) -> bool {
        self.state().slots.contains_key(&token.key())
    }

    pub fn len(&self) -> usize {
        self.state().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().order.is_empty()
    }

    pub fn clear(&self) {
        *self.state() = State::default();
    }

    pub(crate) fn lookup(&self, key: TokenKey) -> Option<Entry> {
        let state = self.state();
        let (_, slot) = state.slots.get(&key)?;
        Some(match slot {
            Slot::Single(v) => Entry::Single(v.provider.clone()),
            Slot::Multi(v) => Entry::Multi(v.iter().map(|v| v.provider.clone()).collect()),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
