use std::any::type_name;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use walkdir::WalkDir;

use crate::scope::short_type_name;
use crate::{
    AnyProvider, Dependencies, Injectable, InjectionToken, Provider, Registerable, Repository,
    Resolved, StdError, SymbolToken, TokenOptions,
};

/// Source of registerable items discovered at container start.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self) -> Result<Vec<Registerable>, StdError>;

    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

/// Multi token collecting the scanners run by [`crate::ContainerBuilder::start`].
pub static SCANNER: LazyLock<InjectionToken<Arc<dyn Scanner>>> =
    LazyLock::new(|| SymbolToken::opinionated("trellis", "Scanner", TokenOptions::multi()));

/// Registers scanner `S` with `config` visible only while the scanner is built.
///
/// The configuration never leaks into the injector the scanner is registered in.
pub fn scanner_provider<S, C>(config_token: &InjectionToken<C>, config: C) -> AnyProvider
where
    S: Injectable<Handle = Arc<S>> + Scanner,
    C: Clone + Send + Sync + 'static,
{
    Provider::class_as::<S, _>(&SCANNER, |scanner| scanner as Arc<dyn Scanner>)
        .multi()
        .providers(vec![Provider::value(config_token, config).into_any()])
        .into_any()
}

/// Scanner returning a fixed list of items.
#[derive(Clone, Debug, Default)]
pub struct ManualScanner {
    items: Vec<Registerable>,
}

impl ManualScanner {
    pub fn new(items: Vec<Registerable>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl Scanner for ManualScanner {
    async fn scan(&self) -> Result<Vec<Registerable>, StdError> {
        Ok(self.items.clone())
    }
}

/// Scanner returning the providers of a process-wide repository.
#[derive(Clone, Debug)]
pub struct AmbientInjectableScanner {
    key: Option<String>,
}

impl AmbientInjectableScanner {
    /// Scans [`Repository::global`].
    pub fn new() -> Self {
        Self { key: None }
    }

    /// Scans [`Repository::for_key`].
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }

    fn repository(&self) -> Arc<Repository> {
        match &self.key {
            Some(key) => Repository::for_key(key),
            None => Repository::global(),
        }
    }
}

impl Default for AmbientInjectableScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scanner for AmbientInjectableScanner {
    async fn scan(&self) -> Result<Vec<Registerable>, StdError> {
        Ok(self
            .repository()
            .entries()
            .map(|(_, provider)| Registerable::Provider(provider))
            .collect())
    }
}

/// Converts a discovered file into registerable items.
pub type FileLoader =
    Arc<dyn Fn(&Path, String) -> Result<Vec<Registerable>, StdError> + Send + Sync>;

/// Single directory tree scanned by [`FileSystemScanner`].
#[derive(Clone)]
pub struct FileSystemScannerConfig {
    pub root: PathBuf,
    /// Extensions without the leading dot. Defaults to `json`.
    pub extensions: Vec<String>,
    /// Patterns matched against paths relative to `root`; empty matches every file.
    pub include: Vec<Regex>,
    pub loader: FileLoader,
}

impl FileSystemScannerConfig {
    pub fn new<F>(root: impl Into<PathBuf>, loader: F) -> Self
    where
        F: Fn(&Path, String) -> Result<Vec<Registerable>, StdError> + Send + Sync + 'static,
    {
        Self {
            root: root.into(),
            extensions: vec!["json".to_string()],
            include: Vec::new(),
            loader: Arc::new(loader),
        }
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn include(mut self, pattern: Regex) -> Self {
        self.include.push(pattern);
        self
    }

    fn matches(&self, path: &Path) -> bool {
        let extension = path.extension().and_then(|v| v.to_str()).unwrap_or_default();
        if !self.extensions.iter().any(|v| v == extension) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let relative = relative.to_string_lossy();
        self.include.iter().any(|v| v.is_match(&relative))
    }
}

impl fmt::Debug for FileSystemScannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemScannerConfig")
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .field("include", &self.include)
            .finish_non_exhaustive()
    }
}

pub static FILE_SYSTEM_SCANNER_CONFIG: LazyLock<InjectionToken<Arc<Vec<FileSystemScannerConfig>>>> =
    LazyLock::new(|| SymbolToken::local("trellis", "FileSystemScannerConfig"));

/// Scanner walking directory trees and loading matching files.
///
/// Files are visited in file name order. Any I/O or loader error aborts the
/// scan.
pub struct FileSystemScanner {
    configs: Arc<Vec<FileSystemScannerConfig>>,
}

impl FileSystemScanner {
    pub fn new(configs: Vec<FileSystemScannerConfig>) -> Self {
        Self {
            configs: Arc::new(configs),
        }
    }

    /// Provider registering the scanner with its configuration.
    pub fn with_config(configs: Vec<FileSystemScannerConfig>) -> AnyProvider {
        scanner_provider::<Self, _>(&FILE_SYSTEM_SCANNER_CONFIG, Arc::new(configs))
    }

    async fn scan_dir(config: &FileSystemScannerConfig) -> Result<Vec<Registerable>, StdError> {
        let mut items = Vec::new();
        for entry in WalkDir::new(&config.root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || !config.matches(entry.path()) {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            tracing::debug!(path = %entry.path().display(), "Loading scanned file");
            items.extend((config.loader)(entry.path(), content)?);
        }
        Ok(items)
    }
}

impl Injectable for FileSystemScanner {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            configs: deps.get(&FILE_SYSTEM_SCANNER_CONFIG)?,
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new().token(&FILE_SYSTEM_SCANNER_CONFIG)
    }
}

#[async_trait]
impl Scanner for FileSystemScanner {
    async fn scan(&self) -> Result<Vec<Registerable>, StdError> {
        let mut items = Vec::new();
        for config in self.configs.iter() {
            items.extend(Self::scan_dir(config).await?);
        }
        Ok(items)
    }
}
