//! # trellis-data
//!
//! Database transactions scoped to a trellis injector.
//!
//! A [`TransactionClient`] wraps one connection: the first query begins the
//! transaction, a failing query or commit rolls it back and disposing the
//! client commits a transaction left open. [`with_transaction`] runs work
//! in a [`DB_TRANSACTION_SCOPE`] child injector owning the client.

mod client;
mod error;
mod scope;

pub use client::*;
pub use error::*;
pub use scope::*;
