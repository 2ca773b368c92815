use crate::{AnyProvider, Provider};

/// Item accepted by repositories: a provider or a named group of items.
#[derive(Clone, Debug)]
pub enum Registerable {
    Provider(AnyProvider),
    Module(Module),
}

impl From<AnyProvider> for Registerable {
    fn from(value: AnyProvider) -> Self {
        Self::Provider(value)
    }
}

impl<T> From<Provider<T>> for Registerable
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: Provider<T>) -> Self {
        Self::Provider(value.into_any())
    }
}

impl From<Module> for Registerable {
    fn from(value: Module) -> Self {
        Self::Module(value)
    }
}

/// Named group of providers and nested modules.
///
/// ```rust
/// use trellis::{InjectionToken, Module, Provider};
///
/// let port = InjectionToken::<u16>::new("Port");
/// let module = Module::new("network").with(Provider::value(&port, 8080));
/// assert_eq!(module.name(), "network");
/// ```
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    items: Vec<Registerable>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn with(mut self, item: impl Into<Registerable>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn add(&mut self, item: impl Into<Registerable>) -> &mut Self {
        self.items.push(item.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[Registerable] {
        &self.items
    }

    /// Flattens nested modules into their providers, in declaration order.
    pub fn providers(&self) -> Vec<AnyProvider> {
        let mut result = Vec::new();
        for item in &self.items {
            match item {
                Registerable::Provider(provider) => result.push(provider.clone()),
                Registerable::Module(module) => result.extend(module.providers()),
            }
        }
        result
    }
}
