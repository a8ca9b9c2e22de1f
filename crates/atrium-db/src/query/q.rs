//! `Q` objects: composable filter trees.
//!
//! A [`Q`] holds an ordered list of children (nested `Q` nodes, keyword
//! lookup mappings, raw SQL fragments), a connector and a negation flag.
//! `Q` values are immutable: `&`, `|` and `!` build new nodes and share the
//! operands' children through an [`Arc`].
//!
//! # Examples
//!
//! ```
//! use atrium_db::q;
//! use atrium_db::query::Q;
//!
//! // author__username = "ann" AND published = true
//! let mine = q!(author__username = "ann", published = true);
//!
//! // title contains "rust" OR title contains "tokio"
//! let topical = q!(title__icontains = "rust") | q!(title__icontains = "tokio");
//!
//! // NOT (id IN (1, 2))
//! let rest = !Q::lookup("id__in", vec![1, 2]);
//!
//! let combined = mine & topical & rest;
//! assert_eq!(combined.children().len(), 2);
//! ```

use std::ops;
use std::sync::Arc;

use crate::value::Value;

/// How the children of a [`Q`] are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    /// All children must hold.
    #[default]
    And,
    /// At least one child must hold.
    Or,
}

/// A raw SQL boolean fragment with `?` placeholders, bound in order to `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    /// The SQL fragment.
    pub sql: String,
    /// The bound parameters.
    pub params: Vec<Value>,
}

impl RawSql {
    /// Creates a raw fragment.
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A child of a [`Q`] node.
#[derive(Debug, Clone, PartialEq)]
pub enum QChild {
    /// A nested filter node.
    Node(Q),
    /// Keyword lookups (`"author__username__iexact" = value`), in insertion order.
    Lookups(Vec<(String, Value)>),
    /// A raw boolean expression, passed through unchanged.
    Raw(RawSql),
}

/// A composable filter node.
#[derive(Debug, Clone, PartialEq)]
pub struct Q {
    children: Arc<[QChild]>,
    connector: Connector,
    negated: bool,
}

impl Default for Q {
    fn default() -> Self {
        Self::new()
    }
}

impl Q {
    /// An empty node. Compiles to no constraint at all.
    pub fn new() -> Self {
        Self::from_children(Vec::new(), Connector::And)
    }

    /// Builds a node from explicit children.
    pub fn from_children(children: Vec<QChild>, connector: Connector) -> Self {
        Self {
            children: Arc::from(children),
            connector,
            negated: false,
        }
    }

    /// A node with a single keyword lookup.
    pub fn lookup(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::lookups([(key, value)])
    }

    /// A node with several keyword lookups, ANDed in the given order.
    pub fn lookups<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let pairs: Vec<(String, Value)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if pairs.is_empty() {
            return Self::new();
        }
        Self::from_children(vec![QChild::Lookups(pairs)], Connector::And)
    }

    /// A node wrapping a raw SQL boolean fragment.
    ///
    /// Columns in the fragment must be written qualified by the table name
    /// (`"blog_posts"."title"`) when the query joins other tables.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self::from_children(vec![QChild::Raw(RawSql::new(sql, params))], Connector::And)
    }

    /// The node's children, in order.
    pub fn children(&self) -> &[QChild] {
        &self.children
    }

    /// The node's connector.
    pub const fn connector(&self) -> Connector {
        self.connector
    }

    /// Whether the node is negated.
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Returns `true` if the node has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn combine(self, other: Self, connector: Connector) -> Self {
        Self::from_children(vec![QChild::Node(self), QChild::Node(other)], connector)
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.combine(rhs, Connector::And)
    }
}

impl ops::BitAnd for &Q {
    type Output = Q;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.clone().combine(rhs.clone(), Connector::And)
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.combine(rhs, Connector::Or)
    }
}

impl ops::BitOr for &Q {
    type Output = Q;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.clone().combine(rhs.clone(), Connector::Or)
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(mut self) -> Self::Output {
        self.negated = !self.negated;
        self
    }
}

impl ops::Not for &Q {
    type Output = Q;

    fn not(self) -> Self::Output {
        !self.clone()
    }
}

/// Builds a [`Q`] from keyword lookups.
///
/// Keys are identifiers (`author__username__iexact = "ann"`) or string
/// literals (`"type" = "draft"`) for names that are Rust keywords.
/// `q!()` is the empty filter.
#[macro_export]
macro_rules! q {
    () => {
        $crate::query::Q::new()
    };
    ($($key:ident = $value:expr),+ $(,)?) => {
        $crate::query::Q::lookups([
            $((stringify!($key), $crate::value::Value::from($value))),+
        ])
    };
    ($($key:literal = $value:expr),+ $(,)?) => {
        $crate::query::Q::lookups([
            $(($key, $crate::value::Value::from($value))),+
        ])
    };
}
