//! Executor traits and model persistence.
//!
//! [`BlockingExecutor`] and [`DbExecutor`] are the minimal blocking and async
//! interfaces the query engine needs from a connection. [`ConnectionFactory`]
//! opens a fresh connection for every outermost session. Concrete
//! implementations live in the `atrium-db-backends` crate.
//!
//! The free functions at the bottom persist model instances. Each runs in an
//! atomic session (joining the caller's session if one is open) and commits.

use std::sync::Arc;

use atrium_core::{AtriumError, AtriumResult};

use crate::model::Model;
use crate::query::compiler::{ColumnRef, DatabaseBackendType, Row, SqlCompiler, WhereNode};
use crate::query::lookups::Lookup;
use crate::session::{AsyncSession, Database, Session, SessionOptions};
use crate::value::Value;

/// A blocking connection.
pub trait BlockingExecutor: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a statement that does not return rows.
    /// Returns the number of rows affected.
    fn execute_sql(&self, sql: &str, params: &[Value]) -> AtriumResult<u64>;

    /// Runs a query and returns all result rows.
    fn query(&self, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>>;

    /// Runs an INSERT and returns the generated row id.
    fn insert_returning_id(&self, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        self.execute_sql(sql, params)?;
        let rows = self.query("SELECT last_insert_rowid() AS id", &[])?;
        rows.into_iter()
            .next()
            .map(|row| row.get::<Value>("id"))
            .transpose()?
            .ok_or_else(|| AtriumError::DatabaseError("Failed to retrieve last inserted ID".to_string()))
    }
}

/// An async connection.
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a statement that does not return rows.
    /// Returns the number of rows affected.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> AtriumResult<u64>;

    /// Runs a query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> AtriumResult<Vec<Row>>;

    /// Runs an INSERT and returns the generated row id.
    async fn insert_returning_id(&self, sql: &str, params: &[Value]) -> AtriumResult<Value> {
        self.execute_sql(sql, params).await?;
        let rows = self.query("SELECT last_insert_rowid() AS id", &[]).await?;
        rows.into_iter()
            .next()
            .map(|row| row.get::<Value>("id"))
            .transpose()?
            .ok_or_else(|| AtriumError::DatabaseError("Failed to retrieve last inserted ID".to_string()))
    }
}

/// Opens connections for sessions.
#[async_trait::async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Returns the backend type of the connections this factory opens.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Opens a blocking connection.
    fn connect(&self) -> AtriumResult<Arc<dyn BlockingExecutor>>;

    /// Opens an async connection.
    async fn aconnect(&self) -> AtriumResult<Arc<dyn DbExecutor>>;
}

// ── Model persistence ──────────────────────────────────────────────────

fn pk_condition<M: Model>(pk: Value) -> AtriumResult<WhereNode> {
    Ok(WhereNode::Condition {
        column: ColumnRef::new(M::table_name(), M::meta().pk_column()?),
        lookup: Lookup::Exact(pk),
    })
}

fn insert_sql<M: Model>(model: &M, backend: DatabaseBackendType) -> (String, Vec<Value>) {
    let fields = if model.pk().is_some() {
        model.field_values()
    } else {
        model.non_pk_field_values()
    };
    SqlCompiler::new(backend).compile_insert(M::table_name(), &fields)
}

fn missing_pk<M: Model>() -> AtriumError {
    AtriumError::DatabaseError(format!(
        "{} instance cannot be deleted because its primary key is not set",
        M::meta().label()
    ))
}

fn insert_in<M: Model>(session: &Session, model: &mut M) -> AtriumResult<()> {
    let (sql, params) = insert_sql(model, session.backend_type());
    let id = session.insert_returning_id(&sql, &params)?;
    if model.pk().is_none() {
        model.set_pk(id);
    }
    Ok(())
}

async fn ainsert_in<M: Model>(session: &AsyncSession, model: &mut M) -> AtriumResult<()> {
    let (sql, params) = insert_sql(model, session.backend_type());
    let id = session.insert_returning_id(&sql, &params).await?;
    if model.pk().is_none() {
        model.set_pk(id);
    }
    Ok(())
}

/// Inserts a new row for `model` and sets its primary key from the
/// generated id (unless the key was set explicitly).
pub fn insert_model<M: Model>(db: &Database, model: &mut M) -> AtriumResult<()> {
    db.with_session(SessionOptions::default(), |session| {
        insert_in(session, model)?;
        session.commit()
    })
}

/// Async version of [`insert_model`].
pub async fn ainsert_model<M: Model>(db: &Database, model: &mut M) -> AtriumResult<()> {
    db.with_async_session(SessionOptions::default(), |session| async move {
        ainsert_in(&session, model).await?;
        session.commit().await
    })
    .await
}

/// Saves a model instance.
///
/// Without a primary key the row is inserted and the generated key is set.
/// With one, the row is updated; if no row has that key it is inserted.
pub fn save_model<M: Model>(db: &Database, model: &mut M) -> AtriumResult<()> {
    db.with_session(SessionOptions::default(), |session| {
        match model.pk() {
            Some(pk) => {
                let fields = model.non_pk_field_values();
                let updated = if fields.is_empty() {
                    0
                } else {
                    let (sql, params) = SqlCompiler::new(session.backend_type()).compile_update(
                        M::table_name(),
                        &fields,
                        &pk_condition::<M>(pk)?,
                    );
                    session.execute_sql(&sql, &params)?
                };
                if updated == 0 {
                    insert_in(session, model)?;
                }
            }
            None => insert_in(session, model)?,
        }
        session.commit()
    })
}

/// Async version of [`save_model`].
pub async fn asave_model<M: Model>(db: &Database, model: &mut M) -> AtriumResult<()> {
    db.with_async_session(SessionOptions::default(), |session| async move {
        match model.pk() {
            Some(pk) => {
                let fields = model.non_pk_field_values();
                let updated = if fields.is_empty() {
                    0
                } else {
                    let (sql, params) = SqlCompiler::new(session.backend_type()).compile_update(
                        M::table_name(),
                        &fields,
                        &pk_condition::<M>(pk)?,
                    );
                    session.execute_sql(&sql, &params).await?
                };
                if updated == 0 {
                    ainsert_in(&session, model).await?;
                }
            }
            None => ainsert_in(&session, model).await?,
        }
        session.commit().await
    })
    .await
}

/// Deletes the row of a saved model instance. Returns the number of rows removed.
pub fn delete_model<M: Model>(db: &Database, model: &M) -> AtriumResult<u64> {
    let pk = model.pk().ok_or_else(missing_pk::<M>)?;
    let condition = pk_condition::<M>(pk)?;
    db.with_session(SessionOptions::default(), |session| {
        let (sql, params) =
            SqlCompiler::new(session.backend_type()).compile_delete(M::table_name(), &condition);
        let deleted = session.execute_sql(&sql, &params)?;
        session.commit()?;
        Ok(deleted)
    })
}

/// Async version of [`delete_model`].
pub async fn adelete_model<M: Model>(db: &Database, model: &M) -> AtriumResult<u64> {
    let pk = model.pk().ok_or_else(missing_pk::<M>)?;
    let condition = pk_condition::<M>(pk)?;
    db.with_async_session(SessionOptions::default(), |session| async move {
        let (sql, params) =
            SqlCompiler::new(session.backend_type()).compile_delete(M::table_name(), &condition);
        let deleted = session.execute_sql(&sql, &params).await?;
        session.commit().await?;
        Ok(deleted)
    })
    .await
}
