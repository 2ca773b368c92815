use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use trellis::{Disposable, StdError};

use crate::{TransactionError, TransactionRollbackError};

/// Connection statements are sent over.
///
/// Rows are returned as JSON objects; arguments are positional.
#[async_trait]
pub trait DbQueryable: Send + Sync {
    async fn query(&self, cmd: &str, args: &[Value]) -> Result<Vec<Value>, StdError>;

    /// Returns the connection to its pool.
    async fn release(&self, reason: &str) {
        let _ = reason;
    }
}

#[async_trait]
impl<T> DbQueryable for Arc<T>
where
    T: DbQueryable + ?Sized,
{
    async fn query(&self, cmd: &str, args: &[Value]) -> Result<Vec<Value>, StdError> {
        T::query(self, cmd, args).await
    }

    async fn release(&self, reason: &str) {
        T::release(self, reason).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Unstarted,
    Begin,
    Commit,
    Rollback,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "UNSTARTED",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queries running in one transaction.
///
/// Disposing a client whose transaction is still open commits it.
#[async_trait]
pub trait DbTransactionClient: Disposable {
    /// Runs `cmd`, beginning the transaction first if needed.
    ///
    /// A failing query rolls the transaction back.
    async fn query(&self, cmd: &str, args: &[Value]) -> Result<Vec<Value>, TransactionError>;

    /// Commits the transaction; a failing commit rolls it back.
    async fn commit(&self) -> Result<(), TransactionError>;

    async fn rollback(&self) -> Result<(), TransactionError>;

    async fn state(&self) -> TransactionState;
}

#[async_trait]
pub trait DbTransactionClientExt: DbTransactionClient {
    /// Runs `cmd` and deserializes every row into `T`.
    ///
    /// Rows that cannot be deserialized roll the transaction back.
    async fn query_model<T>(&self, cmd: &str, args: &[Value]) -> Result<Vec<T>, TransactionError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rows = self.query(cmd, args).await?;
        match rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
        {
            Ok(v) => Ok(v),
            Err(err) => Err(TransactionError::Model(err).after_rollback(self.rollback().await)),
        }
    }
}

impl<C> DbTransactionClientExt for C where C: DbTransactionClient + ?Sized {}

/// [`DbTransactionClient`] over a single connection.
///
/// State moves `Unstarted -> Begin -> Commit | Rollback`; statements are
/// serialized on the connection.
pub struct TransactionClient<C> {
    client: C,
    state: Mutex<TransactionState>,
}

impl<C: DbQueryable> TransactionClient<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            state: Mutex::new(TransactionState::Unstarted),
        }
    }

    async fn begin(&self, state: &mut TransactionState) -> Result<(), TransactionError> {
        match *state {
            TransactionState::Unstarted => {
                *state = TransactionState::Begin;
                self.client
                    .query(TransactionState::Begin.as_str(), &[])
                    .await
                    .map_err(TransactionError::Begin)?;
                Ok(())
            }
            TransactionState::Begin => Ok(()),
            ended => Err(TransactionError::Ended(ended)),
        }
    }

    async fn commit_locked(&self, state: &mut TransactionState) -> Result<(), TransactionError> {
        match *state {
            TransactionState::Unstarted => {
                *state = TransactionState::Commit;
                return Ok(());
            }
            TransactionState::Begin => {}
            ended => return Err(TransactionError::Ended(ended)),
        }
        *state = TransactionState::Commit;
        if let Err(err) = self.client.query(TransactionState::Commit.as_str(), &[]).await {
            tracing::warn!(error = %err, "Error committing transaction");
            let rollback = self.rollback_locked(state).await;
            return Err(TransactionError::Commit(err).after_rollback(rollback));
        }
        Ok(())
    }

    async fn rollback_locked(&self, state: &mut TransactionState) -> Result<(), TransactionError> {
        match *state {
            TransactionState::Unstarted => {
                *state = TransactionState::Rollback;
                return Ok(());
            }
            TransactionState::Rollback => return Ok(()),
            TransactionState::Begin | TransactionState::Commit => {}
        }
        *state = TransactionState::Rollback;
        if let Err(err) = self.client.query(TransactionState::Rollback.as_str(), &[]).await {
            tracing::error!(error = %err, "Error rolling back transaction");
            return Err(TransactionRollbackError::new(err).into());
        }
        Ok(())
    }
}

#[async_trait]
impl<C: DbQueryable> DbTransactionClient for TransactionClient<C> {
    async fn query(&self, cmd: &str, args: &[Value]) -> Result<Vec<Value>, TransactionError> {
        let mut state = self.state.lock().await;
        self.begin(&mut state).await?;
        match self.client.query(cmd, args).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                let rollback = self.rollback_locked(&mut state).await;
                Err(TransactionError::Query(err).after_rollback(rollback))
            }
        }
    }

    async fn commit(&self) -> Result<(), TransactionError> {
        let mut state = self.state.lock().await;
        self.commit_locked(&mut state).await
    }

    async fn rollback(&self) -> Result<(), TransactionError> {
        let mut state = self.state.lock().await;
        self.rollback_locked(&mut state).await
    }

    async fn state(&self) -> TransactionState {
        *self.state.lock().await
    }
}

#[async_trait]
impl<C: DbQueryable> Disposable for TransactionClient<C> {
    async fn dispose(&self, reason: &str) -> Result<(), StdError> {
        let mut state = self.state.lock().await;
        let result = match *state {
            TransactionState::Begin => self.commit_locked(&mut state).await,
            _ => Ok(()),
        };
        self.client.release(reason).await;
        tracing::debug!(reason, state = state.as_str(), "Transaction client disposed");
        Ok(result?)
    }
}
