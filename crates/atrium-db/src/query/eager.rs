//! Eager loading of related rows.
//!
//! Two strategies are supported:
//!
//! - **Joined** (`select_related`): one LEFT JOIN per relationship hop in the
//!   main query. Related columns are selected under `<path>__<column>`
//!   aliases and split back out of each row.
//! - **Batched** (`prefetch_related`): after the main query, one follow-up
//!   query per hop selecting `<key> IN (<parent keys>)`, split into batches
//!   of [`PREFETCH_BATCH_SIZE`] keys. Related rows are
//!   grouped back onto the root rows they belong to, without duplicating
//!   root rows.
//!
//! Both attach their results to [`Fetched`] wrappers around the model
//! instances.

use std::collections::HashMap;
use std::ops::Deref;

use atrium_core::{AtriumError, AtriumResult};

use super::compiler::{ColumnRef, Join, JoinType, Query, Row, SelectColumn, WhereNode};
use super::lookups::Lookup;
use crate::model::{Model, ModelMeta};
use crate::relations::JoinHop;
use crate::value::Value;

/// Largest number of parent keys bound into one prefetch `IN (...)` list.
/// Keeps follow-up queries well below SQLite's bound-variable limit.
pub const PREFETCH_BATCH_SIZE: usize = 500;

/// A relationship loaded through a LEFT JOIN.
#[derive(Debug, Clone)]
pub struct RelatedJoin {
    /// Relationship names from the root model.
    pub path: Vec<String>,
    /// The join alias.
    pub alias: String,
    /// The related model.
    pub meta: &'static ModelMeta,
}

impl PartialEq for RelatedJoin {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.alias == other.alias && std::ptr::eq(self.meta, other.meta)
    }
}

impl RelatedJoin {
    /// The prefix of this relation's columns in result rows (`author__profile__`).
    pub fn column_prefix(&self) -> String {
        format!("{}__", self.path.join("__"))
    }
}

/// Selects the qualified columns of `meta` from `table`.
pub fn model_columns(meta: &ModelMeta, table: &str) -> Vec<SelectColumn> {
    meta.column_names()
        .map(|column| SelectColumn::Column(ColumnRef::new(table, column)))
        .collect()
}

fn parse_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

fn unknown_relationship(meta: &ModelMeta, name: &str, path: &str) -> AtriumError {
    AtriumError::UnknownRelationship {
        model: meta.label(),
        name: name.to_string(),
        path: path.to_string(),
    }
}

/// Adds the LEFT JOINs and aliased columns for a dotted `select_related`
/// path (`"author.profile"`). Hops already joined by an earlier path are
/// reused.
pub fn add_select_related(meta: &'static ModelMeta, query: &mut Query, path: &str) -> AtriumResult<()> {
    let segments = parse_path(path);
    let mut current = meta;
    let mut current_alias = query.table.clone();

    for depth in 0..segments.len() {
        let prefix: Vec<String> = segments[..=depth].iter().map(ToString::to_string).collect();
        if let Some(existing) = query.select_related.iter().find(|j| j.path == prefix) {
            current = existing.meta;
            current_alias = existing.alias.clone();
            continue;
        }

        let segment = segments[depth];
        let relation = current
            .get_relation(segment)
            .ok_or_else(|| unknown_relationship(current, segment, path))?;
        let hop = relation.hop(current)?;
        let alias = query.next_alias();

        query.joins.push(Join {
            table: hop.target.db_table.clone(),
            alias: alias.clone(),
            join_type: JoinType::Left,
            on: WhereNode::Columns {
                left: ColumnRef::new(&alias, &hop.remote_column),
                right: ColumnRef::new(&current_alias, &hop.local_column),
            },
        });
        let joined = RelatedJoin {
            path: prefix,
            alias: alias.clone(),
            meta: hop.target,
        };
        let column_prefix = joined.column_prefix();
        query.select.extend(hop.target.column_names().map(|column| {
            SelectColumn::Aliased(
                ColumnRef::new(&alias, column),
                format!("{column_prefix}{column}"),
            )
        }));
        tracing::debug!(path = %path, alias = %alias, "Adding select_related join");
        query.select_related.push(joined);

        current = hop.target;
        current_alias = alias;
    }
    Ok(())
}

/// One follow-up query of a prefetch plan.
#[derive(Debug, Clone)]
pub struct PrefetchStep {
    /// Relationship names from the root model.
    pub path: Vec<String>,
    /// Index of the step this one hangs off, or `None` for the root rows.
    pub parent: Option<usize>,
    /// The relationship being followed.
    pub hop: JoinHop,
}

impl PrefetchStep {
    /// The dotted key results are stored under (`"comments.author"`).
    pub fn key(&self) -> String {
        self.path.join(".")
    }
}

/// Resolves dotted prefetch paths into an ordered list of steps, one per
/// distinct relationship prefix, parents before children.
pub fn plan_prefetch(meta: &ModelMeta, paths: &[String]) -> AtriumResult<Vec<PrefetchStep>> {
    let mut steps: Vec<PrefetchStep> = Vec::new();

    for path in paths {
        let segments = parse_path(path);
        let mut current = meta;
        let mut parent = None;

        for depth in 0..segments.len() {
            let prefix: Vec<String> = segments[..=depth].iter().map(ToString::to_string).collect();
            if let Some(index) = steps.iter().position(|s| s.path == prefix) {
                current = steps[index].hop.target;
                parent = Some(index);
                continue;
            }

            let segment = segments[depth];
            let relation = current
                .get_relation(segment)
                .ok_or_else(|| unknown_relationship(current, segment, path))?;
            let hop = relation.hop(current)?;
            current = hop.target;
            steps.push(PrefetchStep {
                path: prefix,
                parent,
                hop,
            });
            parent = Some(steps.len() - 1);
        }
    }
    Ok(steps)
}

/// Rows fetched for one prefetch step, each tagged with the indices of the
/// root rows it belongs to.
#[derive(Debug, Clone, Default)]
pub struct PrefetchLevel {
    rows: Vec<Row>,
    roots: Vec<Vec<usize>>,
}

impl PrefetchLevel {
    /// The level of the main query's rows: row `i` belongs to root `i`.
    pub fn root(rows: &[Row]) -> Self {
        Self {
            rows: rows.to_vec(),
            roots: (0..rows.len()).map(|i| vec![i]).collect(),
        }
    }

    /// The fetched rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl PrefetchStep {
    /// Builds the follow-up queries for the rows of `parent`, one per batch
    /// of at most [`PREFETCH_BATCH_SIZE`] keys. Empty when the parent rows
    /// carry no keys.
    pub fn queries(&self, parent: &PrefetchLevel) -> Vec<Query> {
        let mut keys: Vec<Value> = Vec::new();
        for row in &parent.rows {
            if let Some(key) = row.get_value(&self.hop.local_column) {
                if !key.is_null() && !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        let target = self.hop.target;
        keys.chunks(PREFETCH_BATCH_SIZE)
            .map(|batch| {
                let mut query = Query::new(target.db_table.clone());
                query.select = model_columns(target, &target.db_table);
                query.where_clause = Some(WhereNode::Condition {
                    column: ColumnRef::new(&target.db_table, &self.hop.remote_column),
                    lookup: Lookup::In(batch.to_vec()),
                });
                query
            })
            .collect()
    }

    /// Tags each fetched row with the root rows whose parents it matches.
    pub fn attach(&self, parent: &PrefetchLevel, rows: Vec<Row>) -> PrefetchLevel {
        let mut groups: Vec<(&Value, Vec<usize>)> = Vec::new();
        for (row, roots) in parent.rows.iter().zip(&parent.roots) {
            let Some(key) = row.get_value(&self.hop.local_column) else {
                continue;
            };
            if key.is_null() {
                continue;
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => existing.extend(roots),
                None => groups.push((key, roots.clone())),
            }
        }

        let roots = rows
            .iter()
            .map(|row| {
                let mut matched: Vec<usize> = row
                    .get_value(&self.hop.remote_column)
                    .and_then(|key| groups.iter().find(|(k, _)| *k == key))
                    .map(|(_, roots)| roots.clone())
                    .unwrap_or_default();
                matched.sort_unstable();
                matched.dedup();
                matched
            })
            .collect();

        PrefetchLevel { rows, roots }
    }
}

/// A model instance together with its eagerly loaded related rows.
#[derive(Debug, Clone)]
pub struct Fetched<M> {
    /// The model instance.
    pub instance: M,
    related: HashMap<String, Option<Row>>,
    prefetched: HashMap<String, Vec<Row>>,
}

impl<M> Deref for Fetched<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.instance
    }
}

impl<M> Fetched<M> {
    /// Unwraps the model instance.
    pub fn into_inner(self) -> M {
        self.instance
    }

    /// The joined row for a `select_related` path, `None` when the
    /// relationship is empty or was not loaded.
    pub fn related_row(&self, path: &str) -> Option<&Row> {
        self.related.get(path).and_then(Option::as_ref)
    }

    /// Builds the related model loaded by `select_related(path)`.
    ///
    /// # Errors
    ///
    /// [`AtriumError::ImproperlyConfigured`] if `path` was not selected, or
    /// the error of `T::from_row`.
    pub fn related<T: Model>(&self, path: &str) -> AtriumResult<Option<T>> {
        match self.related.get(path) {
            Some(Some(row)) => T::from_row(row).map(Some),
            Some(None) => Ok(None),
            None => Err(not_loaded("select_related", path)),
        }
    }

    /// The rows loaded by `prefetch_related(path)`, in query order.
    pub fn prefetched_rows(&self, path: &str) -> Option<&[Row]> {
        self.prefetched.get(path).map(Vec::as_slice)
    }

    /// Builds the related models loaded by `prefetch_related(path)`.
    ///
    /// Intermediate hops of a nested path are available too:
    /// `prefetch_related(["comments.author"])` also loads `"comments"`.
    pub fn prefetched<T: Model>(&self, path: &str) -> AtriumResult<Vec<T>> {
        self.prefetched
            .get(path)
            .ok_or_else(|| not_loaded("prefetch_related", path))?
            .iter()
            .map(T::from_row)
            .collect()
    }
}

fn not_loaded(method: &str, path: &str) -> AtriumError {
    AtriumError::ImproperlyConfigured(format!("'{path}' was not loaded with {method}"))
}

/// Builds the fetched instances from the main query's rows, the joined
/// relations and the prefetch levels (one per step, same order).
pub fn assemble<M: Model>(
    rows: &[Row],
    related: &[RelatedJoin],
    steps: &[PrefetchStep],
    levels: Vec<PrefetchLevel>,
) -> AtriumResult<Vec<Fetched<M>>> {
    let mut fetched = rows
        .iter()
        .map(|row| {
            let joined = related
                .iter()
                .map(|join| {
                    let columns = row.strip_prefix(&join.column_prefix());
                    let present = columns
                        .columns()
                        .iter()
                        .any(|c| columns.get_value(c).is_some_and(|v| !v.is_null()));
                    (join.path.join("."), present.then_some(columns))
                })
                .collect();
            Ok(Fetched {
                instance: M::from_row(row)?,
                related: joined,
                prefetched: steps.iter().map(|s| (s.key(), Vec::new())).collect(),
            })
        })
        .collect::<AtriumResult<Vec<_>>>()?;

    for (step, level) in steps.iter().zip(levels) {
        let key = step.key();
        for (row, roots) in level.rows.into_iter().zip(level.roots) {
            for root in roots {
                if let Some(rows) = fetched.get_mut(root).and_then(|f| f.prefetched.get_mut(&key)) {
                    rows.push(row.clone());
                }
            }
        }
    }
    Ok(fetched)
}
