//! # trellis
//!
//! Dependency injection runtime with token based resolution, hierarchical
//! injector contexts and async providers.
//!
//! ## Core Concepts
//!
//! - **Token**: identity based key naming a kind of injectable value
//! - **Provider**: declaration of how to produce a value for a token
//! - **Repository**: ordered store of providers owned by a context
//! - **Injector**: resolves tokens and invokes methods within a context
//! - **Container**: bootstraps the root injector from modules and scanners
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::{Container, Dependencies, Injectable, InjectionToken, Provider, Resolved, StdError};
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! impl Injectable for Database {
//!     type Handle = Arc<Self>;
//!
//!     async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
//!         let config = deps.get(&InjectionToken::<Arc<Config>>::for_class::<Config>())?;
//!         Ok(Arc::new(Self { config }))
//!     }
//!
//!     fn dependencies() -> Dependencies {
//!         Dependencies::new().token(&InjectionToken::<Arc<Config>>::for_class::<Config>())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InjectionToken::<Arc<Config>>::for_class::<Config>();
//!     let container = Container::builder()
//!         .add(Provider::value(&config, Arc::new(Config { url: "sqlite::memory:".into() })))
//!         .add(Database::provider().singleton())
//!         .start()
//!         .await?;
//!
//!     let database = container.injector().inject(&Database::token()).await?;
//!     println!("Database url: {}", database.config.url);
//!     container.dispose("shutdown").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Scopes
//!
//! Every injector owns a context. Child injectors, such as per-request
//! injectors, see the providers of their ancestors, may override them, and
//! release their own values when disposed. Singletons are cached in the
//! context that owns their provider, so a root singleton requested from a
//! request scope outlives the request.

mod container;
mod context;
mod error;
mod injectable;
mod injector;
mod method;
mod module;
mod provider;
mod repository;
mod resolver;
mod scanner;
mod scope;
mod token;

pub use container::{Container, ContainerBuilder, ENTRY_POINT, EntryPoint};
pub use context::{ContextKind, InjectorContext};
pub use error::{ContainerError, InjectorError, RegistrationError, StdError};
pub use injectable::{Disposable, Injectable};
pub use injector::{INJECTION_SCOPE, INJECTOR, Injector, ResolveResult};
pub use method::{Method, Param};
pub use module::{Module, Registerable};
pub use provider::{AnyProvider, Dependencies, Provider, Resolved, Value};
pub use repository::{RegistrationSource, Repository};
pub use scanner::{
    AmbientInjectableScanner, FILE_SYSTEM_SCANNER_CONFIG, FileLoader, FileSystemScanner,
    FileSystemScannerConfig, ManualScanner, SCANNER, Scanner, scanner_provider,
};
pub use scope::InjectionScope;
pub use token::{AnyToken, InjectionToken, SymbolToken, TokenKey, TokenOptions};

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
