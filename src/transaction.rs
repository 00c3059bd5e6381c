//! Databases and task-scoped transactions.
//!
//! A [`Database`] is a pooled connection source with a process-unique
//! identity. Entering [`Database::transaction`] binds one live connection
//! to the current task for that identity; any nested entry on the same
//! task reuses it without acquiring another, and only the outermost entry
//! commits or rolls back. The binding lives in a `tokio::task_local!`
//! value, so it follows the logical task across worker threads and is
//! invisible to unrelated tasks sharing the pool.
//!
//! Within one task, scoped operations run strictly sequentially; the
//! connection mutex exists to share the transaction handle between the
//! scope and in-flight statements, not to coordinate concurrency. If the
//! surrounding task is cancelled mid-scope, dropping the scope returns the
//! connection to the pool with the transaction rolled back.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::value::{Value, bind_value};
use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

tokio::task_local! {
    /// Database identity to the scope currently bound on this task.
    static ACTIVE_SCOPES: HashMap<Uuid, TransactionScope>;
}

/// A pooled SQLite database with a process-unique identity.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    id: Uuid,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("id", &self.id).finish()
    }
}

impl Database {
    /// Connect using a URL. Pool options and the `writable` flag may be
    /// carried as query parameters, see [`DatabaseConfig::parse`].
    pub async fn connect(url: &str) -> Result<Database> {
        let config = DatabaseConfig::parse(url).map_err(Error::invalid_input)?;
        Self::connect_with(&config).await
    }

    /// Connect using an explicit configuration.
    pub async fn connect_with(config: &DatabaseConfig) -> Result<Database> {
        let mut options = SqliteConnectOptions::from_str(&config.connection_string)?;
        if config.writable {
            options = options.create_if_missing(true).read_only(false);
        } else {
            options = options.read_only(true);
        }

        let pool_opts = &config.pool_options;
        let pool = SqlitePoolOptions::new()
            .min_connections(pool_opts.min_connections_or_default())
            .max_connections(pool_opts.max_connections_or_default())
            .acquire_timeout(Duration::from_secs(pool_opts.acquire_timeout_or_default()))
            .idle_timeout(Some(Duration::from_secs(
                pool_opts.idle_timeout_or_default(),
            )))
            .test_before_acquire(pool_opts.test_before_acquire_or_default())
            .connect_with(options)
            .await?;

        let id = Uuid::new_v4();
        info!(
            database_id = %id,
            url = %config.connection_string,
            writable = config.writable,
            "connected to database"
        );
        Ok(Database { pool, id })
    }

    /// Pass-through access to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The identity transaction scoping is keyed by.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Close the pool. In-flight scopes fail on their next native call.
    pub async fn close(&self) {
        self.pool.close().await;
        info!(database_id = %self.id, "database closed");
    }

    /// Whether a transaction is bound for this database on the current
    /// task. Observation only, no side effects.
    pub fn in_transaction(&self) -> bool {
        ACTIVE_SCOPES
            .try_with(|scopes| scopes.contains_key(&self.id))
            .unwrap_or(false)
    }

    fn current_scope(&self) -> Option<TransactionScope> {
        ACTIVE_SCOPES
            .try_with(|scopes| scopes.get(&self.id).cloned())
            .ok()
            .flatten()
    }

    /// Run `body` inside a transaction scope.
    ///
    /// If a scope is already bound for this database on the current task,
    /// `body` joins it: same connection, and commit or rollback stays with
    /// the outermost entry. Otherwise a connection is acquired from the
    /// pool, `body` runs inside a fresh scope, and this call commits on
    /// success or rolls back on failure, re-throwing the error unchanged.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(scope) = self.current_scope() {
            debug!(database_id = %self.id, "joining enclosing transaction scope");
            return body(scope).await;
        }

        let tx = self.pool.begin().await?;
        let scope = TransactionScope::new(self.id, tx);
        debug!(database_id = %self.id, "transaction started");

        let mut scopes = ACTIVE_SCOPES
            .try_with(|scopes| scopes.clone())
            .unwrap_or_default();
        scopes.insert(self.id, scope.clone());

        match ACTIVE_SCOPES.scope(scopes, body(scope.clone())).await {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(err) => {
                scope.rollback().await;
                Err(err)
            }
        }
    }

    /// Run `body` inside the scope already bound for this database on the
    /// current task. Fails with [`Error::NoActiveTransaction`] before
    /// acquiring anything if no scope is bound.
    pub async fn require_transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.current_scope() {
            Some(scope) => body(scope).await,
            None => Err(Error::NoActiveTransaction),
        }
    }
}

struct ScopeShared {
    database_id: Uuid,
    conn: Mutex<Option<Transaction<'static, Sqlite>>>,
    closed: AtomicBool,
}

/// Handle to the live connection of one transaction scope.
///
/// Clones share the same connection; [`TransactionScope::same_connection`]
/// tells whether two handles refer to it.
#[derive(Clone)]
pub struct TransactionScope {
    shared: Arc<ScopeShared>,
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("database_id", &self.shared.database_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TransactionScope {
    fn new(database_id: Uuid, tx: Transaction<'static, Sqlite>) -> TransactionScope {
        TransactionScope {
            shared: Arc::new(ScopeShared {
                database_id,
                conn: Mutex::new(Some(tx)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Identity of the owning database.
    pub fn database_id(&self) -> Uuid {
        self.shared.database_id
    }

    /// Whether two handles share one underlying connection.
    pub fn same_connection(&self, other: &TransactionScope) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether the scope has already committed or rolled back.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    async fn take(&self) -> Result<Transaction<'static, Sqlite>> {
        self.shared
            .conn
            .lock()
            .await
            .take()
            .ok_or(Error::ScopeClosed)
    }

    async fn commit(&self) -> Result<()> {
        let tx = self.take().await?;
        let result = tx.commit().await;
        self.shared.closed.store(true, Ordering::Release);
        result?;
        info!(database_id = %self.shared.database_id, "transaction committed");
        Ok(())
    }

    /// Best-effort rollback on the failure path. The body's error is what
    /// propagates; a rollback failure is only logged.
    async fn rollback(&self) {
        if let Ok(tx) = self.take().await {
            match tx.rollback().await {
                Ok(()) => {
                    info!(database_id = %self.shared.database_id, "transaction rolled back");
                }
                Err(err) => {
                    warn!(
                        database_id = %self.shared.database_id,
                        error = %err,
                        "rollback failed"
                    );
                }
            }
        }
        self.shared.closed.store(true, Ordering::Release);
    }

    pub(crate) async fn execute(&self, sql: &str, arguments: &[Value]) -> Result<u64> {
        let mut guard = self.shared.conn.lock().await;
        let tx = guard.as_mut().ok_or(Error::ScopeClosed)?;

        let mut query = sqlx::query(sql);
        for value in arguments {
            query = bind_value(query, value);
        }
        let result = query.execute(&mut **tx).await?;

        debug!(
            sql = %sql,
            rows_affected = result.rows_affected(),
            "executed statement"
        );
        Ok(result.rows_affected())
    }

    pub(crate) async fn execute_returning_id(
        &self,
        sql: &str,
        arguments: &[Value],
    ) -> Result<i64> {
        let mut guard = self.shared.conn.lock().await;
        let tx = guard.as_mut().ok_or(Error::ScopeClosed)?;

        let mut query = sqlx::query(sql);
        for value in arguments {
            query = bind_value(query, value);
        }
        let result = query.execute(&mut **tx).await?;

        debug!(
            sql = %sql,
            rows_affected = result.rows_affected(),
            last_insert_rowid = result.last_insert_rowid(),
            "executed insert"
        );
        Ok(result.last_insert_rowid())
    }

    pub(crate) async fn fetch_rows(
        &self,
        sql: &str,
        arguments: &[Value],
    ) -> Result<Vec<SqliteRow>> {
        let mut guard = self.shared.conn.lock().await;
        let tx = guard.as_mut().ok_or(Error::ScopeClosed)?;

        let mut query = sqlx::query(sql);
        for value in arguments {
            query = bind_value(query, value);
        }
        let rows: Vec<SqliteRow> = query.fetch(&mut **tx).try_collect().await?;

        debug!(sql = %sql, row_count = rows.len(), "fetched rows");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:?writable=true")
            .await
            .expect("in-memory database")
    }

    #[tokio::test]
    async fn test_no_scope_outside_transaction() {
        let db = memory_db().await;
        assert!(!db.in_transaction());
    }

    #[tokio::test]
    async fn test_require_transaction_without_scope_fails() {
        let db = memory_db().await;
        let result = db
            .require_transaction(|_tx| async move { Ok(()) })
            .await;
        assert!(matches!(result, Err(Error::NoActiveTransaction)));
    }

    #[tokio::test]
    async fn test_scope_visible_inside_transaction() {
        let db = memory_db().await;
        let db2 = db.clone();
        db.transaction(|_tx| async move {
            assert!(db2.in_transaction());
            Ok(())
        })
        .await
        .unwrap();
        assert!(!db.in_transaction());
    }

    #[tokio::test]
    async fn test_nested_scope_shares_connection() {
        let db = memory_db().await;
        let inner_db = db.clone();
        db.transaction(|outer| async move {
            inner_db
                .transaction(|inner| async move {
                    assert!(outer.same_connection(&inner));
                    Ok(())
                })
                .await
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_databases_distinct_scopes() {
        let a = memory_db().await;
        let b = memory_db().await;
        let b2 = b.clone();
        a.transaction(|scope_a| async move {
            b2.transaction(|scope_b| async move {
                assert!(!scope_a.same_connection(&scope_b));
                Ok(())
            })
            .await
        })
        .await
        .unwrap();
    }
}
