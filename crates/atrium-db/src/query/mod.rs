//! Query building, compilation, and execution.
//!
//! This module contains the complete query pipeline:
//!
//! - [`q`] - the `Q` filter tree and the `q!` macro
//! - [`lookups`] - the lookup table and the lookup-key splitter
//! - [`joins`] - relationship path resolution with alias reuse
//! - [`filter`] - compiles a `Q` tree into a WHERE node
//! - [`eager`] - `select_related` joins and `prefetch_related` plans
//! - [`compiler`] - Query AST and SQL compilation
//! - [`queryset`] - QuerySet and Manager for lazy query building

pub mod compiler;
pub mod eager;
pub mod filter;
pub mod joins;
pub mod lookups;
pub mod q;
pub mod queryset;

pub use compiler::{
    ColumnRef, DatabaseBackendType, FromValue, OrderBy, Query, Row, SelectColumn, SqlCompiler,
    WhereNode,
};
pub use eager::Fetched;
pub use lookups::Lookup;
pub use q::{Connector, QChild, RawSql, Q};
pub use queryset::{Manager, QuerySet};
