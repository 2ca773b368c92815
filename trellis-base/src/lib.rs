//! # trellis-base
//!
//! Ambient services for trellis applications: configuration sections exposed
//! as providers, tracing setup and scope-exit helpers.
//!
//! ## Configuration Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use trellis::Container;
//! use trellis_base::{Config, ConfigSection, config_provider, config_value_provider};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct DatabaseConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! impl ConfigSection for DatabaseConfig {
//!     fn key() -> &'static str {
//!         "database"
//!     }
//! }
//!
//! # async fn example() -> Result<(), trellis::StdError> {
//! let config = Config::parse(r#"{"database": {"host": "localhost", "port": 5432}}"#)?;
//! let container = Container::builder()
//!     .add(config_value_provider(config))
//!     .add(config_provider::<DatabaseConfig>())
//!     .start()
//!     .await?;
//!
//! let database = container.injector().inject(&DatabaseConfig::token()).await?;
//! println!("Database: {}:{}", database.host, database.port);
//! # Ok(())
//! # }
//! ```

mod config;
mod defer;
mod tracing;

pub use config::*;
pub use defer::*;
pub use tracing::*;

pub use tokio_util::sync::CancellationToken;
