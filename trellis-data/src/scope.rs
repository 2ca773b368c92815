use std::future::Future;
use std::sync::{Arc, LazyLock};

use trellis::{
    Dependencies, InjectionScope, InjectionToken, Injector, Provider, StdError, SymbolToken,
    TokenOptions,
};

use crate::{DbQueryable, DbTransactionClient, TransactionClient, TransactionError, TransactionState};

/// Scope of the child injector a transaction runs in.
pub const DB_TRANSACTION_SCOPE: InjectionScope = InjectionScope::Named("DbTransaction");

/// Connection a transaction client takes over; a new one per transaction.
pub static DB_CONNECTION: LazyLock<InjectionToken<Arc<dyn DbQueryable>>> =
    LazyLock::new(|| SymbolToken::local("trellis-data", "DbConnection"));

/// Transaction client of the enclosing [`DB_TRANSACTION_SCOPE`].
pub static DB_TRANSACTION_CLIENT: LazyLock<InjectionToken<Arc<dyn DbTransactionClient>>> =
    LazyLock::new(|| {
        SymbolToken::opinionated(
            "trellis-data",
            "DbTransactionClient",
            TokenOptions::singleton().restrict_scope(DB_TRANSACTION_SCOPE),
        )
    });

/// [`TransactionClient`] over [`DB_CONNECTION`], disposed with its scope.
pub fn transaction_client_provider() -> Provider<Arc<dyn DbTransactionClient>> {
    Provider::async_factory(&DB_TRANSACTION_CLIENT, |deps| async move {
        let connection = deps.get(&DB_CONNECTION)?;
        Ok(Arc::new(TransactionClient::new(connection)) as Arc<dyn DbTransactionClient>)
    })
    .deps(Dependencies::new().token(&DB_CONNECTION))
    .disposable()
}

/// Runs `f` in a transaction scope child of `injector`.
///
/// `f` receives the child injector and its transaction client. On success
/// the scope is disposed, committing a transaction left open. On failure
/// the transaction is rolled back first; a failing rollback is returned as
/// a [`crate::TransactionRollbackError`] keeping the error of `f`.
pub async fn with_transaction<F, Fut, R>(injector: &Injector, f: F) -> Result<R, StdError>
where
    F: FnOnce(Injector, Arc<dyn DbTransactionClient>) -> Fut,
    Fut: Future<Output = Result<R, StdError>>,
{
    let scope = injector.create_child(DB_TRANSACTION_SCOPE, Vec::new())?;
    let client = match scope.inject(&DB_TRANSACTION_CLIENT).await {
        Ok(v) => v,
        Err(err) => {
            dispose(&scope, "transaction failed").await;
            return Err(err.into());
        }
    };
    match f(scope.clone(), client.clone()).await {
        Ok(value) => {
            scope.dispose("transaction complete").await?;
            Ok(value)
        }
        Err(err) => {
            let result = match client.state().await {
                TransactionState::Begin => client.rollback().await,
                _ => Ok(()),
            };
            dispose(&scope, "transaction failed").await;
            match result {
                Ok(()) => Err(err),
                Err(TransactionError::Rollback(rollback)) => Err(rollback.with_original(err).into()),
                Err(rollback) => Err(rollback.into()),
            }
        }
    }
}

async fn dispose(scope: &Injector, reason: &str) {
    if let Err(err) = scope.dispose(reason).await {
        tracing::warn!(error = %err, reason, "Cannot dispose transaction scope");
    }
}
