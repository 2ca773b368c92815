use std::error::Error;

use thiserror::Error;
use trellis::StdError;

use crate::TransactionState;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Cannot begin transaction")]
    Begin(#[source] StdError),
    #[error("Transaction query failed")]
    Query(#[source] StdError),
    #[error("Cannot map query rows")]
    Model(#[source] serde_json::Error),
    #[error("Cannot commit transaction")]
    Commit(#[source] StdError),
    #[error("Transaction already ended with {0}")]
    Ended(TransactionState),
    #[error(transparent)]
    Rollback(#[from] TransactionRollbackError),
}

impl TransactionError {
    /// Error to surface once a rollback caused by `self` has completed with
    /// `rollback`.
    ///
    /// A failed rollback wins, keeping `self` as its original error.
    pub fn after_rollback(self, rollback: Result<(), TransactionError>) -> TransactionError {
        match rollback {
            Ok(()) => self,
            Err(TransactionError::Rollback(err)) => err.with_original(Box::new(self)).into(),
            Err(err) => err,
        }
    }
}

/// Rollback failure, optionally caused by another error.
#[derive(Debug, Error)]
#[error("Error rolling back transaction")]
pub struct TransactionRollbackError {
    #[source]
    source: StdError,
    original: Option<StdError>,
}

impl TransactionRollbackError {
    pub fn new(source: StdError) -> Self {
        Self {
            source,
            original: None,
        }
    }

    pub fn with_original(mut self, original: StdError) -> Self {
        self.original = Some(original);
        self
    }

    /// Error that caused the rollback.
    pub fn original(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.original.as_deref()
    }
}
