//! # trellis-http
//!
//! HTTP request pipeline and MVC layer for trellis applications.
//!
//! Every request runs in a child injector of the application injector
//! seeded with the matched [`Route`], the [`HttpRequest`] and its
//! [`HttpRequestInfo`]. The [`HttpPipeline`] then runs preparers, invokes the
//! route handler, applies result transformers, converts errors, renders the
//! result for the request's `Accept` header and writes the response. The
//! request injector is disposed once the response is written.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis::{Container, Injectable, Resolved, StdError};
//! use trellis_base::{Config, config_value_provider};
//! use trellis_http::{Action, Controller, HttpPipelineResult, RequestParamExt as _, http_server_module};
//!
//! struct HelloController;
//!
//! impl Injectable for HelloController {
//!     type Handle = Arc<Self>;
//!
//!     async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
//!         Ok(Arc::new(Self))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StdError> {
//!     let hello = Action::<HelloController>::new("hello", |_, args| async move {
//!         let name: String = args.param("name")?;
//!         Ok(HttpPipelineResult::from_data(format!("Hello, {name}!")))
//!     })
//!     .path_param::<String>("name");
//!     let config = Config::parse(r#"{"http_server": {"addr": "127.0.0.1:8080"}}"#)?;
//!     let container = Container::builder()
//!         .add(config_value_provider(config))
//!         .add_module(http_server_module())
//!         .add_module(Controller::<HelloController>::new("/hello").get(":name", hello).module())
//!         .start()
//!         .await?;
//!     container.run().await?;
//!     container.dispose("shutdown").await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod body;
mod controller;
mod cors;
mod error;
mod executor;
mod initializer;
mod mime;
mod module;
mod params;
mod pipeline;
mod renderer;
mod request;
mod response;
mod result;
mod route;
mod server;
mod trace;

pub use auth::*;
pub use body::*;
pub use controller::*;
pub use cors::*;
pub use error::*;
pub use executor::*;
pub use initializer::*;
pub use mime::*;
pub use module::*;
pub use params::*;
pub use pipeline::*;
pub use renderer::*;
pub use request::*;
pub use response::*;
pub use result::*;
pub use route::{
    ROUTE, ROUTES, Route, RouteHandler, RouteMatch, RouteTable, fill_path, join_path, match_path,
    path_params,
};
pub use server::*;

pub use axum::body::Bytes;
pub use axum::http::{HeaderMap, HeaderValue, Method as HttpMethod, StatusCode, header};
