//! The lookup table and the lookup-key splitter.
//!
//! A lookup key such as `author__username__iexact` names a path through the
//! schema followed by an optional suffix. [`split`] separates the two, and
//! [`apply`] turns the suffix and the caller's value into a
//! [`WhereNode::Condition`] on a resolved column.

use atrium_core::{AtriumError, AtriumResult};

use super::compiler::{ColumnRef, WhereNode};
use crate::value::Value;

/// The suffix used when a key does not end in a known suffix.
pub const DEFAULT_LOOKUP: &str = "exact";

/// A field-level comparison, ready to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exact match (`field = value`, or `field IS NULL` for NULL).
    Exact(Value),
    /// Case-insensitive exact match (`LOWER(field) = LOWER(value)`).
    IExact(Value),
    /// Case-sensitive substring match. `%` and `_` in the value are literal.
    Contains(String),
    /// Case-insensitive substring match. `%` and `_` in the value are literal.
    IContains(String),
    /// Membership test (`field IN (values...)`); empty is always false.
    In(Vec<Value>),
    /// Greater than (`field > value`).
    Gt(Value),
    /// Greater than or equal (`field >= value`).
    Gte(Value),
    /// Less than (`field < value`).
    Lt(Value),
    /// Less than or equal (`field <= value`).
    Lte(Value),
    /// NULL test (`field IS NULL` or `field IS NOT NULL`).
    IsNull(bool),
}

/// Why a value cannot be used with a lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupValueError {
    /// `in` needs a list.
    #[error("expected a list of values, got {0}")]
    ExpectedList(&'static str),
    /// Scalar comparisons do not accept lists.
    #[error("expected a single value, got a list")]
    UnexpectedList,
    /// `in` lists must be flat.
    #[error("nested lists are not supported")]
    NestedList,
    /// Pattern lookups need something that renders as text.
    #[error("expected a text-compatible value, got {0}")]
    ExpectedText(&'static str),
    /// Ordering comparisons against NULL are never true.
    #[error("cannot compare against null; use the isnull lookup instead")]
    NullComparison,
}

/// Builds a [`Lookup`] from a caller-supplied value.
pub type LookupBuilder = fn(&Value) -> Result<Lookup, LookupValueError>;

const LOOKUP_TABLE: [(&str, LookupBuilder); 10] = [
    ("exact", build_exact),
    ("iexact", build_iexact),
    ("contains", build_contains),
    ("icontains", build_icontains),
    ("in", build_in),
    ("lt", build_lt),
    ("lte", build_lte),
    ("gt", build_gt),
    ("gte", build_gte),
    ("isnull", build_isnull),
];

/// Returns the builder registered for `suffix`.
pub fn lookup_builder(suffix: &str) -> Option<LookupBuilder> {
    LOOKUP_TABLE
        .iter()
        .find(|(name, _)| *name == suffix)
        .map(|(_, builder)| *builder)
}

/// Returns `true` if `suffix` is a known lookup.
pub fn is_lookup(suffix: &str) -> bool {
    lookup_builder(suffix).is_some()
}

/// Returns the supported suffixes.
pub fn supported_lookups() -> impl Iterator<Item = &'static str> {
    LOOKUP_TABLE.iter().map(|(name, _)| *name)
}

/// Splits a lookup key into its path segments and suffix.
///
/// The last segment is taken as the suffix when it is a known lookup, even
/// if a field with that name exists; otherwise the suffix is `exact`.
///
/// ```
/// use atrium_db::query::lookups::split;
///
/// assert_eq!(
///     split("user__profile__email__icontains"),
///     (vec!["user", "profile", "email"], "icontains")
/// );
/// assert_eq!(split("name"), (vec!["name"], "exact"));
/// ```
pub fn split(key: &str) -> (Vec<&str>, &str) {
    let mut segments: Vec<&str> = key.split("__").collect();
    match segments.last() {
        Some(last) if is_lookup(last) => {
            let suffix = *last;
            segments.pop();
            (segments, suffix)
        }
        _ => (segments, DEFAULT_LOOKUP),
    }
}

/// Builds the predicate for `suffix` against `column`.
///
/// `key` is the caller's full lookup key, reported in errors.
///
/// # Errors
///
/// [`AtriumError::UnsupportedLookup`] for an unknown suffix and
/// [`AtriumError::InvalidLookupValue`] when the value cannot build the
/// predicate; its `source()` is the [`LookupValueError`].
pub fn apply(column: ColumnRef, key: &str, suffix: &str, value: &Value) -> AtriumResult<WhereNode> {
    let builder = lookup_builder(suffix).ok_or_else(|| AtriumError::UnsupportedLookup {
        key: key.to_string(),
        lookup: suffix.to_string(),
    })?;
    let lookup = builder(value).map_err(|source| AtriumError::InvalidLookupValue {
        key: key.to_string(),
        lookup: suffix.to_string(),
        source: Box::new(source),
    })?;
    Ok(WhereNode::Condition { column, lookup })
}

fn scalar(value: &Value) -> Result<Value, LookupValueError> {
    match value {
        Value::List(_) => Err(LookupValueError::UnexpectedList),
        other => Ok(other.clone()),
    }
}

fn comparable(value: &Value) -> Result<Value, LookupValueError> {
    match value {
        Value::Null => Err(LookupValueError::NullComparison),
        other => scalar(other),
    }
}

fn text(value: &Value) -> Result<String, LookupValueError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Uuid(_) | Value::Date(_) | Value::DateTime(_) => {
            Ok(value.to_string())
        }
        Value::Null => Err(LookupValueError::NullComparison),
        Value::List(_) => Err(LookupValueError::UnexpectedList),
        other => Err(LookupValueError::ExpectedText(other.type_name())),
    }
}

fn build_exact(value: &Value) -> Result<Lookup, LookupValueError> {
    scalar(value).map(Lookup::Exact)
}

fn build_iexact(value: &Value) -> Result<Lookup, LookupValueError> {
    match value {
        Value::Null => Ok(Lookup::Exact(Value::Null)),
        other => text(other).map(|s| Lookup::IExact(Value::String(s))),
    }
}

fn build_contains(value: &Value) -> Result<Lookup, LookupValueError> {
    text(value).map(Lookup::Contains)
}

fn build_icontains(value: &Value) -> Result<Lookup, LookupValueError> {
    text(value).map(Lookup::IContains)
}

fn build_in(value: &Value) -> Result<Lookup, LookupValueError> {
    match value {
        Value::Null => Ok(Lookup::In(Vec::new())),
        Value::List(items) => {
            if items.iter().any(|v| matches!(v, Value::List(_))) {
                return Err(LookupValueError::NestedList);
            }
            Ok(Lookup::In(items.clone()))
        }
        other => Err(LookupValueError::ExpectedList(other.type_name())),
    }
}

fn build_lt(value: &Value) -> Result<Lookup, LookupValueError> {
    comparable(value).map(Lookup::Lt)
}

fn build_lte(value: &Value) -> Result<Lookup, LookupValueError> {
    comparable(value).map(Lookup::Lte)
}

fn build_gt(value: &Value) -> Result<Lookup, LookupValueError> {
    comparable(value).map(Lookup::Gt)
}

fn build_gte(value: &Value) -> Result<Lookup, LookupValueError> {
    comparable(value).map(Lookup::Gte)
}

#[allow(clippy::unnecessary_wraps)]
fn build_isnull(value: &Value) -> Result<Lookup, LookupValueError> {
    Ok(Lookup::IsNull(value.is_truthy()))
}
