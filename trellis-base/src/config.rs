use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use trellis::{Dependencies, InjectionToken, Provider, StdError, SymbolToken};

/// Application configuration: a JSON document of named sections.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub(crate) sections: BTreeMap<String, serde_json::Value>,
}

/// Typed configuration section stored under [`ConfigSection::key`].
pub trait ConfigSection: DeserializeOwned + Send + Sync + 'static {
    fn key() -> &'static str;

    /// Token resolving to the section, see [`config_provider`].
    fn token() -> InjectionToken<Arc<Self>> {
        InjectionToken::for_class::<Self>()
    }
}

/// Resolves to the application [`Config`].
pub static CONFIG: LazyLock<InjectionToken<Arc<Config>>> =
    LazyLock::new(|| SymbolToken::local("trellis-base", "Config"));

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the section called `name`; a missing section deserializes from `null`.
    pub fn get<T>(&self, name: impl AsRef<str>) -> Result<T, StdError>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(
            self.sections
                .get(name.as_ref())
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        )?)
    }

    pub fn section<T>(&self) -> Result<T, StdError>
    where
        T: ConfigSection,
    {
        self.get(T::key())
    }

    pub fn set<T>(&mut self, name: impl Into<String>, value: T) -> Result<(), StdError>
    where
        T: Serialize,
    {
        self.sections
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn with<T>(mut self, name: impl Into<String>, value: T) -> Result<Self, StdError>
    where
        T: Serialize,
    {
        self.set(name, value)?;
        Ok(self)
    }

    /// Merges `other` into this config.
    ///
    /// Objects are merged key by key and arrays are concatenated; any other
    /// value from `other` replaces the current one.
    pub fn merge_from(&mut self, other: Self) {
        for (key, value) in other.sections {
            let entry = self.sections.entry(key);
            merge_json_from(entry.or_insert(serde_json::Value::Null), value);
        }
    }

    pub fn parse<T>(text: T) -> Result<Self, StdError>
    where
        T: AsRef<str>,
    {
        Ok(serde_json::from_str(text.as_ref())?)
    }

    pub async fn parse_file(path: impl AsRef<Path>) -> Result<Self, StdError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(text)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }
}

/// Provider exposing the [`Config`] under [`CONFIG`].
pub fn config_value_provider(config: Config) -> Provider<Arc<Config>> {
    Provider::value(&CONFIG, Arc::new(config))
}

/// Singleton provider reading section `T` from [`CONFIG`].
pub fn config_provider<T>() -> Provider<Arc<T>>
where
    T: ConfigSection,
{
    Provider::factory(&T::token(), |deps| {
        let config = deps.get(&CONFIG)?;
        Ok(Arc::new(config.section::<T>()?))
    })
    .deps(Dependencies::new().token(&CONFIG))
    .singleton()
}

fn merge_json_from(lhs: &mut serde_json::Value, rhs: serde_json::Value) {
    match (lhs, rhs) {
        (serde_json::Value::Object(l), serde_json::Value::Object(r)) => {
            for (key, value) in r {
                merge_json_from(l.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (serde_json::Value::Array(l), serde_json::Value::Array(r)) => l.extend(r),
        (lhs, rhs) => *lhs = rhs,
    }
}
