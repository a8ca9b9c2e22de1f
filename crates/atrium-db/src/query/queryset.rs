//! QuerySet and Manager for building and executing database queries.
//!
//! A [`QuerySet`] is an immutable builder around a [`Query`]. Builder calls
//! return a new `QuerySet` and leave the receiver untouched; lookups,
//! relationship paths and field names are resolved right away, so a bad key
//! fails at the builder call rather than at execution. Terminal methods
//! compile the query, run it inside a session (joining the caller's session
//! when one is open) and map rows to model instances. Every terminal has a
//! blocking form and an async form prefixed with `a`.
//!
//! The [`Manager`] is the entry point for a model, reached through
//! [`Model::objects`].

use std::fmt;
use std::marker::PhantomData;

use atrium_core::{AtriumError, AtriumResult};

use super::compiler::{ColumnRef, DatabaseBackendType, OrderBy, Query, Row, SqlCompiler, WhereNode};
use super::eager::{self, Fetched, PrefetchLevel, PrefetchStep};
use super::filter;
use super::joins::AliasCache;
use super::q::Q;
use crate::executor::{ainsert_model, insert_model};
use crate::model::Model;
use crate::session::{AsyncSession, Database, Session, SessionOptions};
use crate::value::Value;

/// A lazy, composable database query over model `M`.
pub struct QuerySet<M> {
    model: PhantomData<fn() -> M>,
    query: Query,
}

impl<M> Clone for QuerySet<M> {
    fn clone(&self) -> Self {
        Self {
            model: PhantomData,
            query: self.query.clone(),
        }
    }
}

impl<M> fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet").field("query", &self.query).finish()
    }
}

impl<M: Model> Default for QuerySet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> QuerySet<M> {
    /// Creates a queryset selecting every row of the model's table.
    pub fn new() -> Self {
        let mut query = Query::new(M::table_name());
        query.select = eager::model_columns(M::meta(), M::table_name());
        Self {
            model: PhantomData,
            query,
        }
    }

    const fn with_query(query: Query) -> Self {
        Self {
            model: PhantomData,
            query,
        }
    }

    /// Returns a reference to the underlying query AST.
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Compiles the SELECT for `backend`.
    pub fn to_sql(&self, backend: DatabaseBackendType) -> (String, Vec<Value>) {
        SqlCompiler::new(backend).compile_select(&self.query)
    }

    /// Compiles the `COUNT(*)` statement for `backend`.
    pub fn count_sql(&self, backend: DatabaseBackendType) -> (String, Vec<Value>) {
        SqlCompiler::new(backend).compile_count(&self.query)
    }

    fn compile(&self, q: &Q) -> AtriumResult<(Option<WhereNode>, Query)> {
        let mut query = self.query.clone();
        let node = filter::compile(q, M::meta(), &mut query, &mut AliasCache::new())?;
        Ok((node, query))
    }

    // ── Builders ────────────────────────────────────────────────────

    /// Narrows the queryset to rows matching `q`, ANDed with any existing
    /// filter.
    ///
    /// ```
    /// # use atrium_db::query::{QuerySet, Q};
    /// # fn demo<M: atrium_db::model::Model>(qs: QuerySet<M>) -> atrium_core::AtriumResult<()> {
    /// let recent = qs.filter(Q::lookup("author__username__icontains", "ali"))?;
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    ///
    /// Any query-construction error raised while resolving the lookups of
    /// `q`. The receiver is unchanged either way.
    pub fn filter(&self, q: Q) -> AtriumResult<Self> {
        let (node, mut query) = self.compile(&q)?;
        if let Some(node) = node {
            query.where_clause = Some(WhereNode::and_with(query.where_clause.take(), node));
        }
        Ok(Self::with_query(query))
    }

    /// Excludes rows matching `q`. The whole of `q` is negated, so
    /// `exclude(q!(a = 1, b = 2))` keeps rows where `NOT (a = 1 AND b = 2)`.
    ///
    /// # Errors
    ///
    /// Same as [`filter`](Self::filter).
    pub fn exclude(&self, q: Q) -> AtriumResult<Self> {
        let (node, mut query) = self.compile(&q)?;
        if let Some(node) = node {
            let negated = WhereNode::Not(Box::new(node));
            query.where_clause = Some(WhereNode::and_with(query.where_clause.take(), negated));
        }
        Ok(Self::with_query(query))
    }

    /// Appends ordering on root-model fields. A leading `-` sorts
    /// descending.
    ///
    /// # Errors
    ///
    /// [`AtriumError::UnknownAttribute`] for a name that is not a field of
    /// the model.
    pub fn order_by(&self, fields: &[&str]) -> AtriumResult<Self> {
        let meta = M::meta();
        let mut query = self.query.clone();
        for entry in fields {
            let (name, descending) = match entry.strip_prefix('-') {
                Some(name) => (name, true),
                None => (*entry, false),
            };
            let field = meta.get_field(name).ok_or_else(|| AtriumError::UnknownAttribute {
                model: meta.label(),
                name: name.to_string(),
                path: (*entry).to_string(),
            })?;
            let column = ColumnRef::new(&query.table, &field.column);
            query.order_by.push(if descending {
                OrderBy::desc(column)
            } else {
                OrderBy::asc(column)
            });
        }
        Ok(Self::with_query(query))
    }

    /// Loads the given relationship paths (`"author"`, `"author.profile"`)
    /// in the same statement through LEFT JOINs. Read them back with
    /// [`Fetched::related`] after [`fetch`](Self::fetch).
    ///
    /// # Errors
    ///
    /// [`AtriumError::UnknownRelationship`] for a path segment that is not a
    /// relationship, or an error resolving a relationship target.
    pub fn select_related(&self, paths: &[&str]) -> AtriumResult<Self> {
        let mut query = self.query.clone();
        for path in paths {
            eager::add_select_related(M::meta(), &mut query, path)?;
        }
        Ok(Self::with_query(query))
    }

    /// Loads the given relationship paths (`"comments"`,
    /// `"comments.author"`) with one follow-up query per hop. Read them back
    /// with [`Fetched::prefetched`] after [`fetch`](Self::fetch).
    ///
    /// # Errors
    ///
    /// Same as [`select_related`](Self::select_related).
    pub fn prefetch_related(&self, paths: &[&str]) -> AtriumResult<Self> {
        let mut query = self.query.clone();
        query
            .prefetch_related
            .extend(paths.iter().map(ToString::to_string));
        eager::plan_prefetch(M::meta(), &query.prefetch_related)?;
        Ok(Self::with_query(query))
    }

    /// Removes duplicate rows.
    #[must_use]
    pub fn distinct(&self) -> Self {
        let mut query = self.query.clone();
        query.distinct = true;
        Self::with_query(query)
    }

    /// Returns at most `n` rows.
    #[must_use]
    pub fn limit(&self, n: usize) -> Self {
        let mut query = self.query.clone();
        query.limit = Some(n);
        Self::with_query(query)
    }

    /// Skips the first `n` rows.
    #[must_use]
    pub fn offset(&self, n: usize) -> Self {
        let mut query = self.query.clone();
        query.offset = Some(n);
        Self::with_query(query)
    }

    fn first_query(&self) -> Query {
        let mut query = self.query.clone();
        query.limit = Some(query.limit.map_or(1, |n| n.min(1)));
        query
    }

    fn one_query(&self) -> Query {
        let mut query = self.query.clone();
        query.limit = Some(query.limit.map_or(2, |n| n.min(2)));
        query
    }

    fn map_rows(rows: &[Row]) -> AtriumResult<Vec<M>> {
        rows.iter().map(M::from_row).collect()
    }

    fn exactly_one(rows: &[Row]) -> AtriumResult<M> {
        match rows {
            [] => Err(AtriumError::NotFound(format!(
                "{} matching query does not exist",
                M::meta().label()
            ))),
            [row] => M::from_row(row),
            _ => Err(AtriumError::MultipleResults(format!(
                "query for {} returned more than one row",
                M::meta().label()
            ))),
        }
    }

    fn count_from(rows: &[Row]) -> AtriumResult<i64> {
        rows.first().map_or(Ok(0), |row| row.get::<i64>("count"))
    }

    fn not_found_to_none(result: AtriumResult<M>) -> AtriumResult<Option<M>> {
        match result {
            Ok(instance) => Ok(Some(instance)),
            Err(AtriumError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    // ── Blocking terminals ──────────────────────────────────────────

    fn run(db: &Database, query: &Query) -> AtriumResult<Vec<Row>> {
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_select(query);
        db.with_session(SessionOptions::default(), |session| session.query(&sql, &params))
    }

    /// Returns every matching instance.
    ///
    /// Joined `select_related` columns are read but not materialised; use
    /// [`fetch`](Self::fetch) to get related rows.
    pub fn all(&self, db: &Database) -> AtriumResult<Vec<M>> {
        Self::map_rows(&Self::run(db, &self.query)?)
    }

    /// Returns the first matching instance, if any.
    pub fn first(&self, db: &Database) -> AtriumResult<Option<M>> {
        Self::run(db, &self.first_query())?
            .first()
            .map(M::from_row)
            .transpose()
    }

    /// Returns the single matching instance.
    ///
    /// # Errors
    ///
    /// [`AtriumError::NotFound`] when nothing matches,
    /// [`AtriumError::MultipleResults`] when more than one row matches.
    pub fn one(&self, db: &Database) -> AtriumResult<M> {
        Self::exactly_one(&Self::run(db, &self.one_query())?)
    }

    /// Filters by `q`, then returns the single matching instance.
    ///
    /// # Errors
    ///
    /// As for [`filter`](Self::filter) and [`one`](Self::one).
    pub fn get(&self, db: &Database, q: Q) -> AtriumResult<M> {
        self.filter(q)?.one(db)
    }

    /// Like [`get`](Self::get) but returns `None` instead of
    /// [`AtriumError::NotFound`].
    pub fn get_or_none(&self, db: &Database, q: Q) -> AtriumResult<Option<M>> {
        Self::not_found_to_none(self.get(db, q))
    }

    /// Counts matching rows. Ordering, limit and offset do not apply.
    pub fn count(&self, db: &Database) -> AtriumResult<i64> {
        let (sql, params) = self.count_sql(db.backend_type());
        let rows = db.with_session(SessionOptions::default(), |session| session.query(&sql, &params))?;
        Self::count_from(&rows)
    }

    /// Returns whether any row matches.
    pub fn exists(&self, db: &Database) -> AtriumResult<bool> {
        Ok(self.count(db)? > 0)
    }

    /// Returns every matching instance along with its `select_related` and
    /// `prefetch_related` relations. All statements run in one session.
    pub fn fetch(&self, db: &Database) -> AtriumResult<Vec<Fetched<M>>> {
        let steps = eager::plan_prefetch(M::meta(), &self.query.prefetch_related)?;
        let compiler = SqlCompiler::new(db.backend_type());
        let (sql, params) = compiler.compile_select(&self.query);

        db.with_session(SessionOptions::default(), |session| {
            let rows = session.query(&sql, &params)?;
            let levels = prefetch(session, &compiler, &steps, &rows)?;
            eager::assemble(&rows, &self.query.select_related, &steps, levels)
        })
    }

    // ── Async terminals ─────────────────────────────────────────────

    async fn arun(db: &Database, query: &Query) -> AtriumResult<Vec<Row>> {
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_select(query);
        db.with_async_session(SessionOptions::default(), |session| async move {
            session.query(&sql, &params).await
        })
        .await
    }

    /// Async version of [`all`](Self::all).
    pub async fn aall(&self, db: &Database) -> AtriumResult<Vec<M>> {
        Self::map_rows(&Self::arun(db, &self.query).await?)
    }

    /// Async version of [`first`](Self::first).
    pub async fn afirst(&self, db: &Database) -> AtriumResult<Option<M>> {
        Self::arun(db, &self.first_query())
            .await?
            .first()
            .map(M::from_row)
            .transpose()
    }

    /// Async version of [`one`](Self::one).
    pub async fn aone(&self, db: &Database) -> AtriumResult<M> {
        Self::exactly_one(&Self::arun(db, &self.one_query()).await?)
    }

    /// Async version of [`get`](Self::get).
    pub async fn aget(&self, db: &Database, q: Q) -> AtriumResult<M> {
        self.filter(q)?.aone(db).await
    }

    /// Async version of [`get_or_none`](Self::get_or_none).
    pub async fn aget_or_none(&self, db: &Database, q: Q) -> AtriumResult<Option<M>> {
        Self::not_found_to_none(self.aget(db, q).await)
    }

    /// Async version of [`count`](Self::count).
    pub async fn acount(&self, db: &Database) -> AtriumResult<i64> {
        let (sql, params) = self.count_sql(db.backend_type());
        let rows = db
            .with_async_session(SessionOptions::default(), |session| async move {
                session.query(&sql, &params).await
            })
            .await?;
        Self::count_from(&rows)
    }

    /// Async version of [`exists`](Self::exists).
    pub async fn aexists(&self, db: &Database) -> AtriumResult<bool> {
        Ok(self.acount(db).await? > 0)
    }

    /// Async version of [`fetch`](Self::fetch).
    pub async fn afetch(&self, db: &Database) -> AtriumResult<Vec<Fetched<M>>> {
        let steps = eager::plan_prefetch(M::meta(), &self.query.prefetch_related)?;
        let compiler = SqlCompiler::new(db.backend_type());
        let (sql, params) = compiler.compile_select(&self.query);
        let related = &self.query.select_related;

        db.with_async_session(SessionOptions::default(), |session| async move {
            let rows = session.query(&sql, &params).await?;
            let levels = aprefetch(&session, &compiler, &steps, &rows).await?;
            eager::assemble(&rows, related, &steps, levels)
        })
        .await
    }
}

fn prefetch_parent<'a>(
    step: &PrefetchStep,
    root: &'a PrefetchLevel,
    levels: &'a [PrefetchLevel],
) -> &'a PrefetchLevel {
    step.parent.and_then(|i| levels.get(i)).unwrap_or(root)
}

fn prefetch(
    session: &Session,
    compiler: &SqlCompiler,
    steps: &[PrefetchStep],
    rows: &[Row],
) -> AtriumResult<Vec<PrefetchLevel>> {
    let root = PrefetchLevel::root(rows);
    let mut levels: Vec<PrefetchLevel> = Vec::with_capacity(steps.len());
    for step in steps {
        let parent = prefetch_parent(step, &root, &levels);
        let mut fetched: Vec<Row> = Vec::new();
        for query in step.queries(parent) {
            tracing::debug!(path = %step.key(), "Prefetching related rows");
            let (sql, params) = compiler.compile_select(&query);
            fetched.extend(session.query(&sql, &params)?);
        }
        let level = step.attach(parent, fetched);
        levels.push(level);
    }
    Ok(levels)
}

async fn aprefetch(
    session: &AsyncSession,
    compiler: &SqlCompiler,
    steps: &[PrefetchStep],
    rows: &[Row],
) -> AtriumResult<Vec<PrefetchLevel>> {
    let root = PrefetchLevel::root(rows);
    let mut levels: Vec<PrefetchLevel> = Vec::with_capacity(steps.len());
    for step in steps {
        let queries = step.queries(prefetch_parent(step, &root, &levels));
        let mut fetched: Vec<Row> = Vec::new();
        for query in queries {
            tracing::debug!(path = %step.key(), "Prefetching related rows");
            let (sql, params) = compiler.compile_select(&query);
            fetched.extend(session.query(&sql, &params).await?);
        }
        let level = step.attach(prefetch_parent(step, &root, &levels), fetched);
        levels.push(level);
    }
    Ok(levels)
}

/// The entry point for model-level query operations, reached through
/// [`Model::objects`].
///
/// The manager holds no query state; every call starts from a fresh
/// [`QuerySet`].
pub struct Manager<M> {
    model: PhantomData<fn() -> M>,
}

impl<M> fmt::Debug for Manager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager").finish()
    }
}

impl<M> Clone for Manager<M> {
    fn clone(&self) -> Self {
        Self { model: PhantomData }
    }
}

impl<M: Model> Default for Manager<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Manager<M> {
    /// Creates a new manager.
    pub const fn new() -> Self {
        Self { model: PhantomData }
    }

    /// Returns a queryset over every row.
    pub fn all(&self) -> QuerySet<M> {
        QuerySet::new()
    }

    /// Alias of [`all`](Self::all).
    pub fn get_queryset(&self) -> QuerySet<M> {
        self.all()
    }

    /// Shortcut for `all().filter(q)`.
    pub fn filter(&self, q: Q) -> AtriumResult<QuerySet<M>> {
        self.all().filter(q)
    }

    /// Shortcut for `all().exclude(q)`.
    pub fn exclude(&self, q: Q) -> AtriumResult<QuerySet<M>> {
        self.all().exclude(q)
    }

    /// Shortcut for `all().order_by(fields)`.
    pub fn order_by(&self, fields: &[&str]) -> AtriumResult<QuerySet<M>> {
        self.all().order_by(fields)
    }

    /// Shortcut for `all().select_related(paths)`.
    pub fn select_related(&self, paths: &[&str]) -> AtriumResult<QuerySet<M>> {
        self.all().select_related(paths)
    }

    /// Shortcut for `all().prefetch_related(paths)`.
    pub fn prefetch_related(&self, paths: &[&str]) -> AtriumResult<QuerySet<M>> {
        self.all().prefetch_related(paths)
    }

    /// Returns the single instance matching `q`.
    pub fn get(&self, db: &Database, q: Q) -> AtriumResult<M> {
        self.all().get(db, q)
    }

    /// Returns the single instance matching `q`, or `None`.
    pub fn get_or_none(&self, db: &Database, q: Q) -> AtriumResult<Option<M>> {
        self.all().get_or_none(db, q)
    }

    /// Returns every instance.
    pub fn list(&self, db: &Database) -> AtriumResult<Vec<M>> {
        self.all().all(db)
    }

    /// Async version of [`get`](Self::get).
    pub async fn aget(&self, db: &Database, q: Q) -> AtriumResult<M> {
        self.all().aget(db, q).await
    }

    /// Async version of [`get_or_none`](Self::get_or_none).
    pub async fn aget_or_none(&self, db: &Database, q: Q) -> AtriumResult<Option<M>> {
        self.all().aget_or_none(db, q).await
    }

    /// Async version of [`list`](Self::list).
    pub async fn alist(&self, db: &Database) -> AtriumResult<Vec<M>> {
        self.all().aall(db).await
    }

    /// Inserts `instance` in its own atomic session, commits, and returns it
    /// with the generated primary key set.
    pub fn create(&self, db: &Database, mut instance: M) -> AtriumResult<M> {
        insert_model(db, &mut instance)?;
        Ok(instance)
    }

    /// Async version of [`create`](Self::create).
    pub async fn acreate(&self, db: &Database, mut instance: M) -> AtriumResult<M> {
        ainsert_model(db, &mut instance).await?;
        Ok(instance)
    }
}
