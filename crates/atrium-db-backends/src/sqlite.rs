//! SQLite database backend using `rusqlite`.
//!
//! [`SqliteBackend`] wraps one `rusqlite` connection and implements both
//! executor traits: the blocking one directly, the async one through
//! `tokio::task::spawn_blocking`. [`SqliteConnector`] opens a fresh backend
//! for every session.
//!
//! Features:
//! - WAL mode enabled for file databases, so readers do not block the writer
//! - Foreign key enforcement on
//! - A busy timeout, so a second writer waits instead of failing at once
//! - A Unicode-aware `lower()`, so case-insensitive lookups fold non-ASCII
//!   letters too

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atrium_core::{AtriumError, AtriumResult, DatabaseSettings};
use atrium_db::query::compiler::{DatabaseBackendType, Row};
use atrium_db::value::Value;
use atrium_db::{BlockingExecutor, ConnectionFactory, DbExecutor};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;

/// Default time a connection waits for a lock held by another connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MEMORY: &str = ":memory:";

/// Maps a `rusqlite` error onto the framework error taxonomy.
fn map_error(err: rusqlite::Error) -> AtriumError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let detail = message.unwrap_or_else(|| failure.to_string());
            match failure.code {
                ErrorCode::ConstraintViolation => AtriumError::IntegrityError(detail),
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::ReadOnly => AtriumError::OperationalError(detail),
                _ => AtriumError::DatabaseError(detail),
            }
        }
        other => AtriumError::DatabaseError(other.to_string()),
    }
}

/// Replacement for SQLite's built-in `lower()`, which only folds ASCII.
fn unicode_lower(ctx: &Context<'_>) -> rusqlite::Result<Option<String>> {
    Ok(match ctx.get_raw(0) {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).to_lowercase())
        }
    })
}

/// A single SQLite connection.
///
/// The connection sits behind a `std::sync::Mutex`, which both the blocking
/// calls and the `spawn_blocking` closures of the async calls lock.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path with the default busy
    /// timeout. `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`AtriumError::OperationalError`] if the database cannot be
    /// opened or configured.
    pub fn open(path: impl Into<PathBuf>) -> AtriumResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a SQLite database with an explicit busy timeout.
    pub fn open_with_timeout(path: impl Into<PathBuf>, busy_timeout: Duration) -> AtriumResult<Self> {
        let path = path.into();
        let memory = path.to_str() == Some(MEMORY);
        let conn = if memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| AtriumError::OperationalError(format!("SQLite open failed: {e}")))?;

        let pragmas = if memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| AtriumError::OperationalError(format!("Failed to set pragmas: {e}")))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| AtriumError::OperationalError(format!("Failed to set busy timeout: {e}")))?;
        conn.create_scalar_function(
            "lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            unicode_lower,
        )
        .map_err(|e| AtriumError::OperationalError(format!("Failed to register lower(): {e}")))?;

        tracing::debug!(path = %path.display(), "Opened SQLite connection");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> AtriumResult<Self> {
        Self::open(MEMORY)
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Binds `Value` parameters to a `rusqlite` statement.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> AtriumResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string().as_str()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string().as_str()),
                Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339().as_str()),
                Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string().as_str()),
                Value::Duration(d) => stmt.raw_bind_parameter(idx, d.num_microseconds().unwrap_or(0)),
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string().as_str()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string().as_str()),
                Value::List(values) => {
                    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                    let json = serde_json::to_string(&items)
                        .map_err(|e| AtriumError::SerializationError(e.to_string()))?;
                    stmt.raw_bind_parameter(idx, json.as_str())
                }
            }
            .map_err(|e| AtriumError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to a generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> AtriumResult<Row> {
        let values = (0..column_names.len())
            .map(|i| {
                let value = match sqlite_row.get_ref(i).map_err(map_error)? {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                };
                Ok(value)
            })
            .collect::<AtriumResult<Vec<_>>>()?;
        Ok(Row::new(column_names.to_vec(), values))
    }

    fn lock(conn: &Mutex<rusqlite::Connection>) -> AtriumResult<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        conn.lock()
            .map_err(|_| AtriumError::OperationalError("SQLite connection lock poisoned".to_string()))
    }

    fn execute_on(conn: &Mutex<rusqlite::Connection>, sql: &str, params: &[Value]) -> AtriumResult<u64> {
        let conn = Self::lock(conn)?;
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        let count = stmt.raw_execute().map_err(map_error)?;
        Ok(count as u64)
    }

    fn query_on(conn: &Mutex<rusqlite::Connection>, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>> {
        let conn = Self::lock(conn)?;
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        Self::bind_params(&mut stmt, params)?;

        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(map_error)? {
            rows.push(Self::convert_row(row, &column_names)?);
        }
        Ok(rows)
    }

    fn insert_on(conn: &Mutex<rusqlite::Connection>, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        let conn = Self::lock(conn)?;
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        stmt.raw_execute().map_err(map_error)?;
        Ok(Value::Int(conn.last_insert_rowid()))
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn run_blocking<T, F>(&self, sql: &str, params: &[Value], f: F) -> AtriumResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Mutex<rusqlite::Connection>, &str, &[Value]) -> AtriumResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || f(&conn, &sql, &params))
            .await
            .map_err(|e| AtriumError::DatabaseError(format!("Task join error: {e}")))?
    }
}

impl BlockingExecutor for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    fn execute_sql(&self, sql: &str, params: &[Value]) -> AtriumResult<u64> {
        Self::execute_on(&self.conn, sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>> {
        Self::query_on(&self.conn, sql, params)
    }

    fn insert_returning_id(&self, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        Self::insert_on(&self.conn, sql, params)
    }
}

#[async_trait::async_trait]
impl DbExecutor for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> AtriumResult<u64> {
        self.run_blocking(sql, params, Self::execute_on).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>> {
        self.run_blocking(sql, params, Self::query_on).await
    }

    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        self.run_blocking(sql, params, Self::insert_on).await
    }
}

/// Opens a new [`SqliteBackend`] for every session.
///
/// Each connection to `:memory:` is a separate, empty database, so
/// persistent data needs a file path.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    /// Creates a connector for the database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Sets how long a connection waits for another connection's lock.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Builds a connector from database settings. The `name` is the file
    /// path; the optional `busy_timeout_ms` option sets the busy timeout.
    ///
    /// # Errors
    ///
    /// [`AtriumError::ImproperlyConfigured`] when the provider is not
    /// `sqlite` or `busy_timeout_ms` is not a number.
    pub fn from_settings(settings: &DatabaseSettings) -> AtriumResult<Self> {
        if settings.provider != "sqlite" {
            return Err(AtriumError::ImproperlyConfigured(format!(
                "SqliteConnector cannot serve database provider '{}'",
                settings.provider
            )));
        }
        let mut connector = Self::new(&settings.name);
        if let Some(raw) = settings.options.get("busy_timeout_ms") {
            let millis: u64 = raw.parse().map_err(|_| {
                AtriumError::ImproperlyConfigured(format!("busy_timeout_ms must be an integer, got '{raw}'"))
            })?;
            connector = connector.busy_timeout(Duration::from_millis(millis));
        }
        Ok(connector)
    }

    fn open(&self) -> AtriumResult<SqliteBackend> {
        SqliteBackend::open_with_timeout(&self.path, self.busy_timeout)
    }
}

#[async_trait::async_trait]
impl ConnectionFactory for SqliteConnector {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    fn connect(&self) -> AtriumResult<Arc<dyn BlockingExecutor>> {
        Ok(Arc::new(self.open()?))
    }

    async fn aconnect(&self) -> AtriumResult<Arc<dyn DbExecutor>> {
        let connector = self.clone();
        let backend = tokio::task::spawn_blocking(move || connector.open())
            .await
            .map_err(|e| AtriumError::OperationalError(format!("Task join error: {e}")))??;
        Ok(Arc::new(backend))
    }
}
