//! Scoped, reentrant database sessions.
//!
//! A [`Database`] hands out sessions through scopes:
//! [`Database::with_session`] for blocking code and
//! [`Database::with_async_session`] for async code. The outermost scope opens
//! a connection, begins a transaction when the session is atomic, and on exit
//! commits (`autocommit`), rolls back leftover work, or rolls back after an
//! error. Nested scopes on the same thread (blocking) or task (async) reuse
//! the outer session, so query terminals called inside a scope join it.
//!
//! The current session lives in a thread-local slot (blocking) or a tokio
//! task-local slot (async), keyed by database, and only for the duration of
//! the scope. Spawned tasks never see the session of their parent.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use atrium_core::{AtriumError, AtriumResult};
use tracing::Instrument;

use crate::executor::{BlockingExecutor, ConnectionFactory, DbExecutor};
use crate::query::compiler::{DatabaseBackendType, Row};
use crate::value::Value;

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<HashMap<u64, Session>> = RefCell::new(HashMap::new());
}

tokio::task_local! {
    static CURRENT_ASYNC: RefCell<HashMap<u64, AsyncSession>>;
}

/// How a session treats transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run statements inside a transaction (`BEGIN` on open).
    pub atomic: bool,
    /// Commit when the outermost scope exits successfully. Otherwise
    /// uncommitted work is rolled back at close.
    pub autocommit: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            autocommit: false,
        }
    }
}

impl SessionOptions {
    /// Sets `atomic`.
    #[must_use]
    pub const fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Sets `autocommit`.
    #[must_use]
    pub const fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }
}

/// A database: a connection factory plus the session scopes opened on it.
#[derive(Clone)]
pub struct Database {
    id: u64,
    factory: Arc<dyn ConnectionFactory>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("backend", &self.factory.backend_type())
            .finish()
    }
}

impl Database {
    /// Creates a database over a connection factory.
    pub fn new(factory: impl ConnectionFactory) -> Self {
        Self::from_factory(Arc::new(factory))
    }

    /// Creates a database over a shared connection factory.
    pub fn from_factory(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            id: NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed),
            factory,
        }
    }

    /// Returns the backend type of this database.
    pub fn backend_type(&self) -> DatabaseBackendType {
        self.factory.backend_type()
    }

    /// The blocking session of the enclosing scope on this thread, if any.
    pub fn current_session(&self) -> Option<Session> {
        CURRENT.with(|slot| slot.borrow().get(&self.id).cloned())
    }

    /// The async session of the enclosing scope in this task, if any.
    pub fn current_async_session(&self) -> Option<AsyncSession> {
        CURRENT_ASYNC
            .try_with(|slot| slot.borrow().get(&self.id).cloned())
            .ok()
            .flatten()
    }

    /// Runs `f` with a blocking session.
    ///
    /// If a scope is already open on this thread the closure runs on its
    /// session and `options` are ignored. Otherwise a new session is opened
    /// and closed around `f`. An `Err` from `f` rolls the transaction back and
    /// is returned unchanged; a panic inside `f` also rolls back.
    pub fn with_session<T, F>(&self, options: SessionOptions, f: F) -> AtriumResult<T>
    where
        F: FnOnce(&Session) -> AtriumResult<T>,
    {
        if let Some(session) = self.current_session() {
            return f(&session);
        }

        let session = Session::open(self.factory.connect()?, options)?;
        let span = tracing::info_span!("session", id = session.id, atomic = options.atomic);
        let _entered = span.enter();

        CURRENT.with(|slot| slot.borrow_mut().insert(self.id, session.clone()));
        let mut guard = ScopeGuard {
            database: self.id,
            session: session.clone(),
            armed: true,
        };

        let result = f(&session);
        let closed = session.close(result.is_ok(), options);
        guard.armed = false;
        drop(guard);
        settle(result, closed)
    }

    /// Runs the future returned by `f` with an async session.
    ///
    /// If a scope is already open in this task the future runs on its
    /// session and `options` are ignored. Otherwise a new session is opened
    /// and closed around it. An `Err` rolls the transaction back and is
    /// returned unchanged; if the scope is dropped before completing, the
    /// transaction is rolled back in the background.
    pub async fn with_async_session<T, F, Fut>(&self, options: SessionOptions, f: F) -> AtriumResult<T>
    where
        F: FnOnce(AsyncSession) -> Fut,
        Fut: Future<Output = AtriumResult<T>>,
    {
        if let Some(session) = self.current_async_session() {
            return f(session).await;
        }

        let session = AsyncSession::open(self.factory.aconnect().await?, options).await?;
        let span = tracing::info_span!("session", id = session.id, atomic = options.atomic);
        let scope = run_async_scope(self.id, session.clone(), options, f).instrument(span);

        if CURRENT_ASYNC.try_with(|_| ()).is_ok() {
            // Another database already installed the slot for this task.
            CURRENT_ASYNC.with(|slot| slot.borrow_mut().insert(self.id, session));
            scope.await
        } else {
            let slot = RefCell::new(HashMap::from([(self.id, session)]));
            CURRENT_ASYNC.scope(slot, scope).await
        }
    }
}

async fn run_async_scope<T, F, Fut>(
    database: u64,
    session: AsyncSession,
    options: SessionOptions,
    f: F,
) -> AtriumResult<T>
where
    F: FnOnce(AsyncSession) -> Fut,
    Fut: Future<Output = AtriumResult<T>>,
{
    let mut guard = AsyncScopeGuard {
        database,
        session: session.clone(),
        armed: true,
    };
    let result = f(session.clone()).await;
    let closed = session.close(result.is_ok(), options).await;
    guard.armed = false;
    drop(guard);
    settle(result, closed)
}

fn settle<T>(result: AtriumResult<T>, closed: AtriumResult<()>) -> AtriumResult<T> {
    match result {
        Ok(value) => closed.map(|()| value),
        Err(err) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "Rollback after error failed");
            }
            Err(err)
        }
    }
}

fn transaction_error(action: &str, err: &AtriumError) -> AtriumError {
    AtriumError::TransactionError(format!("{action} failed: {err}"))
}

/// Removes the blocking slot on scope exit and rolls back if unwinding.
struct ScopeGuard {
    database: u64,
    session: Session,
    armed: bool,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| slot.borrow_mut().remove(&self.database));
        if self.armed && self.session.in_transaction() {
            tracing::warn!(session = self.session.id, "Session scope unwound, rolling back");
            if let Err(err) = self.session.rollback() {
                tracing::warn!(error = %err, "Rollback during unwind failed");
            }
        }
    }
}

/// Removes the async slot on scope exit and rolls back if cancelled.
struct AsyncScopeGuard {
    database: u64,
    session: AsyncSession,
    armed: bool,
}

impl Drop for AsyncScopeGuard {
    fn drop(&mut self) {
        let _ = CURRENT_ASYNC.try_with(|slot| slot.borrow_mut().remove(&self.database));
        if !self.armed || !self.session.in_transaction.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::warn!(session = self.session.id, "Session scope cancelled, rolling back");
        let conn = Arc::clone(&self.session.conn);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = conn.execute_sql("ROLLBACK", &[]).await {
                        tracing::warn!(error = %err, "Rollback after cancellation failed");
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime to roll back a cancelled session; dropping the connection"),
        }
    }
}

/// A blocking session: one connection plus its transaction state.
#[derive(Clone)]
pub struct Session {
    id: u64,
    atomic: bool,
    conn: Arc<dyn BlockingExecutor>,
    in_transaction: Arc<AtomicBool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("atomic", &self.atomic)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn open(conn: Arc<dyn BlockingExecutor>, options: SessionOptions) -> AtriumResult<Self> {
        let session = Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            atomic: options.atomic,
            conn,
            in_transaction: Arc::new(AtomicBool::new(false)),
        };
        session.begin_if_needed()?;
        Ok(session)
    }

    /// The process-unique session id.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether statements run inside a transaction.
    pub const fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Returns the backend type of the connection.
    pub fn backend_type(&self) -> DatabaseBackendType {
        self.conn.backend_type()
    }

    fn begin_if_needed(&self) -> AtriumResult<()> {
        if !self.atomic
            || self
                .in_transaction
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Ok(());
        }
        if let Err(err) = self.conn.execute_sql("BEGIN", &[]) {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(transaction_error("BEGIN", &err));
        }
        Ok(())
    }

    /// Runs a statement that does not return rows.
    pub fn execute_sql(&self, sql: &str, params: &[Value]) -> AtriumResult<u64> {
        self.begin_if_needed()?;
        tracing::debug!(session = self.id, sql = %sql, "Executing statement");
        self.conn.execute_sql(sql, params)
    }

    /// Runs a query and returns all result rows.
    pub fn query(&self, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>> {
        self.begin_if_needed()?;
        tracing::debug!(session = self.id, sql = %sql, "Executing query");
        self.conn.query(sql, params)
    }

    /// Runs an INSERT and returns the generated row id.
    pub fn insert_returning_id(&self, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        self.begin_if_needed()?;
        tracing::debug!(session = self.id, sql = %sql, "Executing insert");
        self.conn.insert_returning_id(sql, params)
    }

    /// Commits the open transaction, if any. The next statement begins a new one.
    pub fn commit(&self) -> AtriumResult<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.conn
                .execute_sql("COMMIT", &[])
                .map_err(|e| transaction_error("COMMIT", &e))?;
        }
        Ok(())
    }

    /// Rolls back the open transaction, if any.
    pub fn rollback(&self) -> AtriumResult<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.conn
                .execute_sql("ROLLBACK", &[])
                .map_err(|e| transaction_error("ROLLBACK", &e))?;
        }
        Ok(())
    }

    fn close(&self, succeeded: bool, options: SessionOptions) -> AtriumResult<()> {
        if succeeded && options.autocommit {
            return self.commit();
        }
        if self.in_transaction() {
            if succeeded {
                tracing::debug!(session = self.id, "Discarding uncommitted work");
            } else {
                tracing::warn!(session = self.id, "Rolling back session after error");
            }
        }
        self.rollback()
    }
}

/// An async session: one connection plus its transaction state.
#[derive(Clone)]
pub struct AsyncSession {
    id: u64,
    atomic: bool,
    conn: Arc<dyn DbExecutor>,
    in_transaction: Arc<AtomicBool>,
}

impl fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSession")
            .field("id", &self.id)
            .field("atomic", &self.atomic)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl AsyncSession {
    async fn open(conn: Arc<dyn DbExecutor>, options: SessionOptions) -> AtriumResult<Self> {
        let session = Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            atomic: options.atomic,
            conn,
            in_transaction: Arc::new(AtomicBool::new(false)),
        };
        session.begin_if_needed().await?;
        Ok(session)
    }

    /// The process-unique session id.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether statements run inside a transaction.
    pub const fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Returns the backend type of the connection.
    pub fn backend_type(&self) -> DatabaseBackendType {
        self.conn.backend_type()
    }

    async fn begin_if_needed(&self) -> AtriumResult<()> {
        if !self.atomic
            || self
                .in_transaction
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Ok(());
        }
        if let Err(err) = self.conn.execute_sql("BEGIN", &[]).await {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(transaction_error("BEGIN", &err));
        }
        Ok(())
    }

    /// Runs a statement that does not return rows.
    pub async fn execute_sql(&self, sql: &str, params: &[Value]) -> AtriumResult<u64> {
        self.begin_if_needed().await?;
        tracing::debug!(session = self.id, sql = %sql, "Executing statement");
        self.conn.execute_sql(sql, params).await
    }

    /// Runs a query and returns all result rows.
    pub async fn query(&self, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>> {
        self.begin_if_needed().await?;
        tracing::debug!(session = self.id, sql = %sql, "Executing query");
        self.conn.query(sql, params).await
    }

    /// Runs an INSERT and returns the generated row id.
    pub async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        self.begin_if_needed().await?;
        tracing::debug!(session = self.id, sql = %sql, "Executing insert");
        self.conn.insert_returning_id(sql, params).await
    }

    /// Commits the open transaction, if any. The next statement begins a new one.
    pub async fn commit(&self) -> AtriumResult<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.conn
                .execute_sql("COMMIT", &[])
                .await
                .map_err(|e| transaction_error("COMMIT", &e))?;
        }
        Ok(())
    }

    /// Rolls back the open transaction, if any.
    pub async fn rollback(&self) -> AtriumResult<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.conn
                .execute_sql("ROLLBACK", &[])
                .await
                .map_err(|e| transaction_error("ROLLBACK", &e))?;
        }
        Ok(())
    }

    async fn close(&self, succeeded: bool, options: SessionOptions) -> AtriumResult<()> {
        if succeeded && options.autocommit {
            return self.commit().await;
        }
        if self.in_transaction() {
            if succeeded {
                tracing::debug!(session = self.id, "Discarding uncommitted work");
            } else {
                tracing::warn!(session = self.id, "Rolling back session after error");
            }
        }
        self.rollback().await
    }
}
