//! Compiles `Q` trees into WHERE nodes.

use atrium_core::AtriumResult;

use super::compiler::{Query, WhereNode};
use super::joins::{self, AliasCache};
use super::lookups;
use super::q::{Connector, QChild, Q};
use crate::model::ModelMeta;

/// Compiles `q` against `meta` into a single boolean expression.
///
/// Joins needed by lookup paths are appended to `query` and deduplicated
/// through `aliases`. Returns `None` when the tree has no constraint.
pub fn compile(
    q: &Q,
    meta: &ModelMeta,
    query: &mut Query,
    aliases: &mut AliasCache,
) -> AtriumResult<Option<WhereNode>> {
    let mut parts = Vec::with_capacity(q.children().len());

    for child in q.children() {
        match child {
            QChild::Node(inner) => {
                if let Some(node) = compile(inner, meta, query, aliases)? {
                    parts.push(node);
                }
            }
            QChild::Lookups(pairs) => {
                for (key, value) in pairs {
                    let (path, suffix) = lookups::split(key);
                    let column = joins::resolve(meta, query, aliases, &path, key)?;
                    parts.push(lookups::apply(column, key, suffix, value)?);
                }
            }
            QChild::Raw(raw) => parts.push(WhereNode::Raw(raw.clone())),
        }
    }

    let combined = match parts.len() {
        0 => return Ok(None),
        1 => parts.remove(0),
        _ => match q.connector() {
            Connector::And => WhereNode::And(parts),
            Connector::Or => WhereNode::Or(parts),
        },
    };

    Ok(Some(if q.is_negated() {
        WhereNode::Not(Box::new(combined))
    } else {
        combined
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::query::compiler::{ColumnRef, DatabaseBackendType, SqlCompiler};
    use crate::query::lookups::Lookup;
    use crate::testing::{self, Post};
    use crate::value::Value;
    use atrium_core::AtriumError;

    fn compile_post(q: &Q) -> AtriumResult<(Option<WhereNode>, Query)> {
        let mut query = Query::new(Post::table_name());
        let node = compile(q, Post::meta(), &mut query, &mut AliasCache::new())?;
        Ok((node, query))
    }

    fn where_sql(q: &Q) -> String {
        let (node, mut query) = compile_post(q).unwrap();
        query.where_clause = node;
        SqlCompiler::new(DatabaseBackendType::SQLite)
            .compile_select(&query)
            .0
    }

    fn eq(table: &str, column: &str, value: impl Into<Value>) -> WhereNode {
        WhereNode::Condition {
            column: ColumnRef::new(table, column),
            lookup: Lookup::Exact(value.into()),
        }
    }

    #[test]
    fn test_empty_q_is_no_constraint() {
        let (node, query) = compile_post(&Q::new()).unwrap();
        assert!(node.is_none());
        assert!(query.joins.is_empty());
        assert!(compile_post(&!Q::new()).unwrap().0.is_none());
    }

    #[test]
    fn test_single_lookup_is_not_wrapped() {
        let (node, _) = compile_post(&Q::lookup("id", 3)).unwrap();
        assert_eq!(node, Some(eq("blog_posts", "id", 3)));
    }

    #[test]
    fn test_mapping_in_insertion_order() {
        let (node, _) = compile_post(&Q::lookups([("title", "a"), ("id", "b")])).unwrap();
        assert_eq!(
            node,
            Some(WhereNode::And(vec![
                eq("blog_posts", "title", "a"),
                eq("blog_posts", "id", "b"),
            ]))
        );
    }

    #[test]
    fn test_or_and_not() {
        let q = Q::lookup("id", 1) | !Q::lookup("id", 2);
        let (node, _) = compile_post(&q).unwrap();
        assert_eq!(
            node,
            Some(WhereNode::Or(vec![
                eq("blog_posts", "id", 1),
                WhereNode::Not(Box::new(eq("blog_posts", "id", 2))),
            ]))
        );
    }

    #[test]
    fn test_double_negation_compiles_like_original() {
        let a = Q::lookups([("title__icontains", Value::from("rust")), ("id__gt", Value::Int(3))]);
        assert_eq!(where_sql(&!!a.clone()), where_sql(&a));
    }

    #[test]
    fn test_and_is_commutative_up_to_ordering() {
        let a = Q::lookup("id", 1);
        let b = Q::lookup("title", "x");
        let (ab, _) = compile_post(&(a.clone() & b.clone())).unwrap();
        let (ba, _) = compile_post(&(b & a)).unwrap();
        match (ab, ba) {
            (Some(WhereNode::And(mut left)), Some(WhereNode::And(right))) => {
                left.reverse();
                assert_eq!(left, right);
            }
            other => panic!("expected two conjunctions, got {other:?}"),
        }
    }

    #[test]
    fn test_compilation_does_not_mutate_q() {
        testing::register();
        let a = Q::lookup("author__username", "ann") | Q::lookup("title", "x");
        let before = a.clone();
        compile_post(&a).unwrap();
        assert_eq!(a, before);
    }

    #[test]
    fn test_or_across_same_relationship_uses_one_join() {
        testing::register();
        let q = Q::lookup("author__username", "ann") | Q::lookup("author__email__icontains", "example");
        let (_, query) = compile_post(&q).unwrap();
        assert_eq!(query.joins.len(), 1);
        assert_eq!(
            where_sql(&q),
            "SELECT * FROM \"blog_posts\" INNER JOIN \"auth_users\" AS \"T1\" \
             ON \"T1\".\"id\" = \"blog_posts\".\"author_id\" \
             WHERE (\"T1\".\"username\" = ? OR instr(LOWER(\"T1\".\"email\"), LOWER(?)) > 0)"
        );
    }

    #[test]
    fn test_raw_child_passes_through() {
        let q = Q::raw("\"blog_posts\".\"id\" % ? = 0", vec![Value::Int(2)]) & Q::lookup("published", true);
        assert_eq!(
            where_sql(&q),
            "SELECT * FROM \"blog_posts\" WHERE ((\"blog_posts\".\"id\" % ? = 0) AND \"blog_posts\".\"published\" = ?)"
        );
    }

    #[test]
    fn test_errors_propagate() {
        testing::register();
        assert!(matches!(
            compile_post(&Q::lookup("title__like", "x")),
            Err(AtriumError::UnknownRelationship { .. })
        ));
        assert!(matches!(
            compile_post(&Q::lookup("id__in", 5)),
            Err(AtriumError::InvalidLookupValue { .. })
        ));
        assert!(matches!(
            compile_post(&(Q::lookup("id", 1) & Q::lookup("author__nickname", "x"))),
            Err(AtriumError::UnknownAttribute { .. })
        ));
    }
}
