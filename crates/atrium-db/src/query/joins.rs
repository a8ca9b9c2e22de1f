//! Join resolution for lookup paths.
//!
//! [`resolve`] walks a path such as `["author", "profile", "bio"]` from a
//! root model, adding one INNER JOIN per relationship hop. Joins are
//! deduplicated through an [`AliasCache`] keyed by path prefix, so
//! `author__username` and `author__email` in the same filter share a
//! single join of the users table.

use std::collections::HashMap;

use atrium_core::{AtriumError, AtriumResult};

use super::compiler::{ColumnRef, Join, JoinType, Query, WhereNode};
use crate::model::ModelMeta;

/// Path prefix → join alias, private to one compilation pass.
pub type AliasCache = HashMap<Vec<String>, String>;

/// Resolves `path` against `meta` and returns the qualified column.
///
/// Relationship joins are appended to `query` the first time their prefix is
/// seen; later traversals of the same prefix reuse the cached alias. `key`
/// is the caller's full lookup key, reported in errors.
///
/// # Errors
///
/// [`AtriumError::UnknownRelationship`] when a non-final segment is not a
/// relationship, [`AtriumError::UnknownAttribute`] when the final segment is
/// not a column (or the path is empty), and any error raised while resolving
/// a relationship target.
pub fn resolve(
    meta: &ModelMeta,
    query: &mut Query,
    aliases: &mut AliasCache,
    path: &[&str],
    key: &str,
) -> AtriumResult<ColumnRef> {
    let Some((last, hops)) = path.split_last() else {
        return Err(AtriumError::UnknownAttribute {
            model: meta.label(),
            name: key.to_string(),
            path: key.to_string(),
        });
    };

    let mut current: &ModelMeta = meta;
    let mut current_alias = query.table.clone();

    for (depth, segment) in hops.iter().enumerate() {
        let relation =
            current
                .get_relation(segment)
                .ok_or_else(|| AtriumError::UnknownRelationship {
                    model: current.label(),
                    name: (*segment).to_string(),
                    path: key.to_string(),
                })?;
        let hop = relation.hop(current)?;

        let prefix: Vec<String> = path[..=depth].iter().map(ToString::to_string).collect();
        let alias = if let Some(alias) = aliases.get(&prefix) {
            alias.clone()
        } else {
            let alias = query.next_alias();
            tracing::debug!(
                path = %prefix.join("__"),
                table = %hop.target.db_table,
                alias = %alias,
                "Adding join"
            );
            query.joins.push(Join {
                table: hop.target.db_table.clone(),
                alias: alias.clone(),
                join_type: JoinType::Inner,
                on: WhereNode::Columns {
                    left: ColumnRef::new(&alias, &hop.remote_column),
                    right: ColumnRef::new(&current_alias, &hop.local_column),
                },
            });
            aliases.insert(prefix, alias.clone());
            alias
        };

        current = hop.target;
        current_alias = alias;
    }

    let field = current
        .get_field(last)
        .ok_or_else(|| AtriumError::UnknownAttribute {
            model: current.label(),
            name: (*last).to_string(),
            path: key.to_string(),
        })?;
    Ok(ColumnRef::new(current_alias, &field.column))
}
