//! SQL query AST and compiler.
//!
//! This module defines the [`Query`] AST that a [`QuerySet`](super::QuerySet)
//! builds up, and the [`SqlCompiler`] that translates it into parameterized SQL
//! strings. The compiler supports PostgreSQL (`$1, $2, ...`) and SQLite/MySQL
//! (`?`) parameter placeholder styles.
//!
//! Every column in the AST is a [`ColumnRef`] qualified by the table name or
//! by the alias of the join that introduced it, so filters across several
//! joined tables compile without ambiguity.

use std::fmt;

use super::eager::RelatedJoin;
use super::lookups::Lookup;
use super::q::RawSql;
use crate::value::Value;
use atrium_core::{AtriumError, AtriumResult};

/// The type of database backend, used by the compiler to generate
/// backend-specific SQL syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackendType {
    /// PostgreSQL (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// SQLite (uses `?` placeholders).
    SQLite,
    /// MySQL (uses `?` placeholders).
    MySQL,
}

/// A column qualified by the table name or join alias it is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// The table name or join alias.
    pub table: String,
    /// The column name.
    pub column: String,
}

impl ColumnRef {
    /// Creates a qualified column reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\".\"{}\"", self.table, self.column)
    }
}

/// A column ordering direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The column to order by.
    pub column: ColumnRef,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Creates an ascending order.
    pub const fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    /// Creates a descending order.
    pub const fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// A column to select in a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// A qualified column, returned under its own name.
    Column(ColumnRef),
    /// A qualified column returned under an alias (used by `select_related`).
    Aliased(ColumnRef, String),
    /// `COUNT(*)` under an alias.
    CountAll(String),
    /// All columns (`*`).
    Star,
}

/// A WHERE clause node in the query AST.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    /// A lookup against a single column.
    Condition {
        /// The column the lookup applies to.
        column: ColumnRef,
        /// The lookup and its operand.
        lookup: Lookup,
    },
    /// Equality between two columns (join conditions).
    Columns {
        /// Left-hand column.
        left: ColumnRef,
        /// Right-hand column.
        right: ColumnRef,
    },
    /// A raw SQL boolean fragment with `?` placeholders.
    Raw(RawSql),
    /// Logical AND of conditions.
    And(Vec<WhereNode>),
    /// Logical OR of conditions.
    Or(Vec<WhereNode>),
    /// Logical NOT of a condition.
    Not(Box<WhereNode>),
}

impl WhereNode {
    /// ANDs `other` onto an optional existing clause.
    pub fn and_with(existing: Option<Self>, other: Self) -> Self {
        match existing {
            Some(Self::And(mut children)) => {
                children.push(other);
                Self::And(children)
            }
            Some(node) => Self::And(vec![node, other]),
            None => other,
        }
    }
}

/// A JOIN clause in the query AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// The table to join.
    pub table: String,
    /// The alias the joined table is referenced by.
    pub alias: String,
    /// The type of join.
    pub join_type: JoinType,
    /// The ON condition.
    pub on: WhereNode,
}

/// SQL JOIN types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN, used for filter traversal.
    Inner,
    /// LEFT OUTER JOIN, used for joined eager loading.
    Left,
}

impl JoinType {
    /// Returns the SQL keyword for this join type.
    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// The complete query AST representing a SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The main table name.
    pub table: String,
    /// Columns to select.
    pub select: Vec<SelectColumn>,
    /// WHERE clause.
    pub where_clause: Option<WhereNode>,
    /// ORDER BY clauses.
    pub order_by: Vec<OrderBy>,
    /// JOIN clauses, in the order they were introduced.
    pub joins: Vec<Join>,
    /// LIMIT.
    pub limit: Option<usize>,
    /// OFFSET.
    pub offset: Option<usize>,
    /// DISTINCT flag.
    pub distinct: bool,
    /// Relations loaded through LEFT JOINs (`select_related`).
    pub select_related: Vec<RelatedJoin>,
    /// Dotted relation paths loaded by follow-up queries (`prefetch_related`).
    pub prefetch_related: Vec<String>,
    alias_seq: usize,
}

impl Query {
    /// Creates a new query for the given table, selecting `*`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: vec![SelectColumn::Star],
            where_clause: None,
            order_by: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            select_related: Vec::new(),
            prefetch_related: Vec::new(),
            alias_seq: 0,
        }
    }

    /// Allocates the next join alias (`T1`, `T2`, ...), unique within this query.
    pub fn next_alias(&mut self) -> String {
        self.alias_seq += 1;
        format!("T{}", self.alias_seq)
    }

    /// Returns the query used for counting: ordering, limit, offset and
    /// joined eager loads are stripped; filter joins are kept.
    pub fn for_count(&self) -> Self {
        let mut query = self.clone();
        query.order_by.clear();
        query.limit = None;
        query.offset = None;
        query.joins.retain(|j| j.join_type == JoinType::Inner);
        query.select.retain(|c| !matches!(c, SelectColumn::Aliased(..)));
        query.select_related.clear();
        query.prefetch_related.clear();
        query
    }
}

/// A generic database row for passing data between backends and the query engine.
///
/// `Row` holds a list of column names and their corresponding values. It
/// provides typed access via the [`get`](Row::get) method.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the value cannot be
    /// converted to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> AtriumResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            AtriumError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw Value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Returns the columns whose name starts with `prefix`, with the prefix
    /// removed. Used to split joined eager-load columns out of a row.
    pub fn strip_prefix(&self, prefix: &str) -> Self {
        let (columns, values) = self
            .columns
            .iter()
            .zip(&self.values)
            .filter_map(|(c, v)| c.strip_prefix(prefix).map(|c| (c.to_string(), v.clone())))
            .unzip();
        Self { columns, values }
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> AtriumResult<Self>;
}

fn unexpected(expected: &str, value: &Value) -> AtriumError {
    AtriumError::DatabaseError(format!("Expected {expected}, got {}", value.type_name()))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(unexpected("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::Int(i) => i32::try_from(*i).map_err(|e| {
                AtriumError::DatabaseError(format!("Int value out of i32 range: {e}"))
            }),
            _ => Err(unexpected("Int", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(unexpected("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            // SQLite stores booleans as integers.
            Value::Int(i) => Ok(*i != 0),
            _ => Err(unexpected("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(unexpected("String", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map_err(|e| AtriumError::DatabaseError(format!("Invalid UUID '{s}': {e}"))),
            _ => Err(unexpected("Uuid", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> AtriumResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

/// Wraps `value` in `%` wildcards for a substring `LIKE`. Backslashes, `%`
/// and `_` are escaped with a backslash so they match literally.
fn like_pattern(value: &str) -> Value {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    Value::String(pattern)
}

/// The SQL compiler translates a [`Query`] AST into parameterized SQL.
///
/// Different backends use different placeholder styles:
/// - PostgreSQL: `$1, $2, $3, ...`
/// - SQLite / MySQL: `?, ?, ?, ...`
pub struct SqlCompiler {
    backend: DatabaseBackendType,
}

impl SqlCompiler {
    /// Creates a new compiler for the given backend type.
    pub const fn new(backend: DatabaseBackendType) -> Self {
        Self { backend }
    }

    /// Returns a parameter placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String {
        match self.backend {
            DatabaseBackendType::PostgreSQL => format!("${index}"),
            DatabaseBackendType::SQLite | DatabaseBackendType::MySQL => "?".to_string(),
        }
    }

    fn push_param(&self, value: Value, params: &mut Vec<Value>) -> String {
        params.push(value);
        self.placeholder(params.len())
    }

    /// Compiles a SELECT query into SQL and parameters.
    pub fn compile_select(&self, query: &Query) -> (String, Vec<Value>) {
        let mut params: Vec<Value> = Vec::new();
        let mut sql = String::from("SELECT ");

        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        let select_parts: Vec<String> = if query.select.is_empty() {
            vec!["*".to_string()]
        } else {
            query
                .select
                .iter()
                .map(|col| match col {
                    SelectColumn::Column(column) => column.to_string(),
                    SelectColumn::Aliased(column, alias) => format!("{column} AS \"{alias}\""),
                    SelectColumn::CountAll(alias) => format!("COUNT(*) AS \"{alias}\""),
                    SelectColumn::Star => "*".to_string(),
                })
                .collect()
        };
        sql.push_str(&select_parts.join(", "));

        self.compile_from_where(query, &mut sql, &mut params);

        // ORDER BY
        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { " DESC" } else { " ASC" };
                    format!("{}{dir}", o.column)
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        // LIMIT / OFFSET
        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => match self.backend {
                // SQLite and MySQL need a LIMIT before OFFSET.
                DatabaseBackendType::SQLite => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                DatabaseBackendType::MySQL => {
                    sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {offset}"));
                }
                DatabaseBackendType::PostgreSQL => sql.push_str(&format!(" OFFSET {offset}")),
            },
            (None, None) => {}
        }

        (sql, params)
    }

    /// Compiles a `COUNT(*)` over the query with ordering, limit, offset and
    /// joined eager loads stripped. A DISTINCT query is counted through a
    /// subquery.
    pub fn compile_count(&self, query: &Query) -> (String, Vec<Value>) {
        let stripped = query.for_count();
        if stripped.distinct {
            let (inner, params) = self.compile_select(&stripped);
            return (
                format!("SELECT COUNT(*) AS \"count\" FROM ({inner}) AS \"distinct_rows\""),
                params,
            );
        }

        let mut counting = stripped;
        counting.select = vec![SelectColumn::CountAll("count".to_string())];
        self.compile_select(&counting)
    }

    fn compile_from_where(&self, query: &Query, sql: &mut String, params: &mut Vec<Value>) {
        sql.push_str(&format!(" FROM \"{}\"", query.table));

        for join in &query.joins {
            sql.push_str(&format!(
                " {} \"{}\" AS \"{}\" ON ",
                join.join_type.sql_keyword(),
                join.table,
                join.alias
            ));
            self.compile_where_node(&join.on, sql, params);
        }

        if let Some(ref where_clause) = query.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(where_clause, sql, params);
        }
    }

    /// Compiles an INSERT statement.
    pub fn compile_insert(&self, table: &str, fields: &[(&str, Value)]) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        if fields.is_empty() {
            return (format!("INSERT INTO \"{table}\" DEFAULT VALUES"), params);
        }

        let columns: Vec<String> = fields.iter().map(|(name, _)| format!("\"{name}\"")).collect();
        let placeholders: Vec<String> = fields
            .iter()
            .map(|(_, val)| self.push_param(val.clone(), &mut params))
            .collect();

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        (sql, params)
    }

    /// Compiles an UPDATE statement.
    pub fn compile_update(
        &self,
        table: &str,
        fields: &[(&str, Value)],
        where_clause: &WhereNode,
    ) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let set_parts: Vec<String> = fields
            .iter()
            .map(|(name, val)| {
                let ph = self.push_param(val.clone(), &mut params);
                format!("\"{name}\" = {ph}")
            })
            .collect();

        let mut sql = format!("UPDATE \"{}\" SET {} WHERE ", table, set_parts.join(", "));
        self.compile_where_node(where_clause, &mut sql, &mut params);

        (sql, params)
    }

    /// Compiles a DELETE statement.
    pub fn compile_delete(&self, table: &str, where_clause: &WhereNode) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM \"{table}\" WHERE ");
        self.compile_where_node(where_clause, &mut sql, &mut params);
        (sql, params)
    }

    /// Compiles a `WhereNode` into SQL, appending to the provided string.
    fn compile_where_node(&self, node: &WhereNode, sql: &mut String, params: &mut Vec<Value>) {
        match node {
            WhereNode::Condition { column, lookup } => {
                self.compile_lookup(column, lookup, sql, params);
            }
            WhereNode::Columns { left, right } => {
                sql.push_str(&format!("{left} = {right}"));
            }
            WhereNode::Raw(raw) => {
                // Renumber `?` placeholders for the target backend.
                let mut remaining = raw.params.iter();
                sql.push('(');
                for ch in raw.sql.chars() {
                    if ch == '?' {
                        if let Some(value) = remaining.next() {
                            let ph = self.push_param(value.clone(), params);
                            sql.push_str(&ph);
                            continue;
                        }
                    }
                    sql.push(ch);
                }
                sql.push(')');
            }
            WhereNode::And(children) => {
                if children.is_empty() {
                    sql.push_str("1=1");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    self.compile_where_node(child, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Or(children) => {
                if children.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    self.compile_where_node(child, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Not(inner) => {
                sql.push_str("NOT (");
                self.compile_where_node(inner, sql, params);
                sql.push(')');
            }
        }
    }

    /// Compiles a single lookup into SQL.
    fn compile_lookup(
        &self,
        column: &ColumnRef,
        lookup: &Lookup,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        match lookup {
            Lookup::Exact(val) => {
                if val.is_null() {
                    sql.push_str(&format!("{column} IS NULL"));
                } else {
                    let ph = self.push_param(val.clone(), params);
                    sql.push_str(&format!("{column} = {ph}"));
                }
            }
            Lookup::IExact(val) => {
                let ph = self.push_param(val.clone(), params);
                sql.push_str(&format!("LOWER({column}) = LOWER({ph})"));
            }
            Lookup::Contains(val) => match self.backend {
                DatabaseBackendType::SQLite => {
                    let ph = self.push_param(Value::String(val.clone()), params);
                    sql.push_str(&format!("instr({column}, {ph}) > 0"));
                }
                DatabaseBackendType::PostgreSQL => {
                    let ph = self.push_param(like_pattern(val), params);
                    sql.push_str(&format!("{column} LIKE {ph} ESCAPE '\\'"));
                }
                DatabaseBackendType::MySQL => {
                    let ph = self.push_param(like_pattern(val), params);
                    sql.push_str(&format!("{column} LIKE BINARY {ph}"));
                }
            },
            Lookup::IContains(val) => match self.backend {
                DatabaseBackendType::SQLite => {
                    let ph = self.push_param(Value::String(val.clone()), params);
                    sql.push_str(&format!("instr(LOWER({column}), LOWER({ph})) > 0"));
                }
                DatabaseBackendType::PostgreSQL => {
                    let ph = self.push_param(like_pattern(val), params);
                    sql.push_str(&format!("{column} ILIKE {ph} ESCAPE '\\'"));
                }
                DatabaseBackendType::MySQL => {
                    let ph = self.push_param(like_pattern(val), params);
                    sql.push_str(&format!("LOWER({column}) LIKE LOWER({ph})"));
                }
            },
            Lookup::In(vals) => {
                if vals.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                let placeholders: Vec<String> = vals
                    .iter()
                    .map(|v| self.push_param(v.clone(), params))
                    .collect();
                sql.push_str(&format!("{column} IN ({})", placeholders.join(", ")));
            }
            Lookup::Gt(val) => {
                let ph = self.push_param(val.clone(), params);
                sql.push_str(&format!("{column} > {ph}"));
            }
            Lookup::Gte(val) => {
                let ph = self.push_param(val.clone(), params);
                sql.push_str(&format!("{column} >= {ph}"));
            }
            Lookup::Lt(val) => {
                let ph = self.push_param(val.clone(), params);
                sql.push_str(&format!("{column} < {ph}"));
            }
            Lookup::Lte(val) => {
                let ph = self.push_param(val.clone(), params);
                sql.push_str(&format!("{column} <= {ph}"));
            }
            Lookup::IsNull(is_null) => {
                if *is_null {
                    sql.push_str(&format!("{column} IS NULL"));
                } else {
                    sql.push_str(&format!("{column} IS NOT NULL"));
                }
            }
        }
    }
}
